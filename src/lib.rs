pub mod config;
pub mod emit;
pub mod error;
pub mod logging;
pub mod models;
pub mod providers;
pub mod proxy;
pub mod server;
pub mod sse;
pub mod translate;
pub mod upstream;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use logging::RequestLog;
pub use server::{build_router, AppState};
pub use upstream::UpstreamClient;
