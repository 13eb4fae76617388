//! Translation between the client chat-completion contract and the upstream dialect.
//!
//! Requests, buffered responses and stream frames are translated here. All
//! translation functions are pure (no I/O).

pub mod client_types;
pub mod reasoning;
pub mod request;
pub mod response;
pub mod streaming;
pub mod upstream_types;
