//! Writing results to the client.
//!
//! Buffered results go out as one JSON document. Streams go out as
//! `data: <json>` events, one per item, ending with `data: [DONE]`.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Serialize;

use crate::proxy::EventStream;
use crate::translate::streaming::OutboundItem;
use crate::translate::upstream_types::DONE_SENTINEL;

pub fn json_response<T: Serialize>(body: T) -> Response {
    Json(body).into_response()
}

/// Stream `items` as server-sent events. Each item becomes its own event so
/// it is written as soon as it is produced.
pub fn event_stream_response(items: EventStream) -> Response {
    let events = items.map(|item| -> Result<Event, Infallible> { Ok(Event::default().data(encode(&item))) });

    (
        [("x-accel-buffering", "no")],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

/// The `data:` payload for one item.
#[must_use]
pub fn encode(item: &OutboundItem) -> String {
    let encoded = match item {
        OutboundItem::Chunk(chunk) => serde_json::to_string(chunk),
        OutboundItem::Error(err) => serde_json::to_string(err),
        OutboundItem::Done => return DONE_SENTINEL.to_string(),
    };
    encoded.unwrap_or_else(|e| {
        serde_json::json!({
            "error": {"message": format!("failed to encode chunk: {e}"), "type": "api_error", "code": 500}
        })
        .to_string()
    })
}
