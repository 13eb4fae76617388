use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::logging::RequestLog;
use crate::sse::FrameDecoder;
use crate::translate::client_types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::translate::request::normalize_request;
use crate::translate::response::{assemble_response, replay_as_chunks, truncate, ResponseFolder};
use crate::translate::streaming::{OutboundItem, StreamTranslator};
use crate::translate::upstream_types::UpstreamFrame;
use crate::upstream::{ByteStream, UpstreamBody, UpstreamClient};

use bytes::Bytes;
use futures::stream::{self, Stream};
use futures::StreamExt;
use std::pin::Pin;

/// Outcome of proxying a streaming request: client items ending in `Done`.
pub type EventStream = Pin<Box<dyn Stream<Item = OutboundItem> + Send>>;

/// Forward a non-streaming request and assemble the complete response.
pub async fn proxy_non_streaming(
    req: &ChatCompletionRequest,
    config: &RelayConfig,
    upstream: &UpstreamClient,
    log: &RequestLog,
) -> Result<ChatCompletionResponse> {
    let payload = normalize_request(req, config)?;

    log.info(
        "proxy",
        format!(
            "POST {} model={} max_tokens={} upstream_stream={}",
            upstream.endpoint(),
            payload.model,
            payload.max_tokens,
            payload.stream
        ),
    );

    let reply = upstream.send(&payload).await?;
    let show_reasoning = config.reasoning.display;

    let resp = match reply.body {
        UpstreamBody::Buffered(body) => {
            log.debug("proxy", format!("Response status={} body_len={}", reply.status, body.len()));
            assemble_response(&body, &req.model, show_reasoning)?
        }
        UpstreamBody::Streaming(bytes) => {
            log.debug("proxy", "Upstream streamed; folding frames into one response");
            fold_stream(transport_errors(bytes), ResponseFolder::new(&req.model, show_reasoning), log).await?
        }
    };

    log.info(
        "proxy",
        format!(
            "Completed: choices={} in={} out={} tokens",
            resp.choices.len(),
            resp.usage.prompt_tokens,
            resp.usage.completion_tokens
        ),
    );

    Ok(resp)
}

/// Forward a streaming request. Failures before the upstream starts answering
/// are returned as errors; later failures become error frames in the stream.
pub async fn proxy_streaming(
    req: &ChatCompletionRequest,
    config: &RelayConfig,
    upstream: &UpstreamClient,
    log: &RequestLog,
) -> Result<EventStream> {
    let payload = normalize_request(req, config)?;

    log.info(
        "proxy",
        format!(
            "POST {} model={} max_tokens={} (streaming)",
            upstream.endpoint(),
            payload.model,
            payload.max_tokens
        ),
    );

    let reply = upstream.send(&payload).await?;
    let show_reasoning = config.reasoning.display;

    match reply.body {
        UpstreamBody::Streaming(bytes) => {
            let translator = StreamTranslator::new(&req.model, show_reasoning);
            Ok(Box::pin(demultiplex(transport_errors(bytes), translator, log.clone())))
        }
        UpstreamBody::Buffered(body) => {
            log.debug("proxy", "Upstream answered with a buffered body; replaying as chunks");
            let resp = assemble_response(&body, &req.model, show_reasoning)?;
            let items: Vec<OutboundItem> = replay_as_chunks(&resp)
                .into_iter()
                .map(OutboundItem::Chunk)
                .chain(std::iter::once(OutboundItem::Done))
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }
}

fn transport_errors(bytes: ByteStream) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    bytes.map(|r| r.map_err(|e| RelayError::from_transport(&e)))
}

/// Turn an upstream event-stream body into client items.
///
/// Frames are decoded and translated one at a time, in arrival order, and each
/// item is yielded as soon as it exists. The sequence always ends with exactly
/// one `Done`; a transport or framing failure is reported as one error item
/// first. Nothing is read from upstream after its `[DONE]`, and dropping the
/// returned stream drops the upstream body with it.
pub fn demultiplex<S>(
    byte_stream: S,
    translator: StreamTranslator,
    log: RequestLog,
) -> impl Stream<Item = OutboundItem> + Send + 'static
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    async_stream::stream! {
        let mut translator = translator;
        let mut decoder = FrameDecoder::new();
        let mut guard = DisconnectGuard::new(log.clone());
        let mut byte_stream = Box::pin(byte_stream);
        let mut done_sent = false;

        'read: while let Some(fragment) = byte_stream.next().await {
            let fragment = match fragment {
                Ok(f) => f,
                Err(e) => {
                    log.error("stream", format!("Upstream stream failed: {e}"));
                    if let Some(item) = translator.close_reasoning() {
                        yield item;
                    }
                    yield translator.fail(e.to_body());
                    break 'read;
                }
            };

            decoder.push(&fragment);

            loop {
                match decoder.next_frame() {
                    Ok(Some(payload)) => {
                        let Some(frame) = decode_frame(&payload, &log) else {
                            continue;
                        };
                        if frame.is_terminal() {
                            if let Some(item) = translator.close_reasoning() {
                                guard.frames += 1;
                                yield item;
                            }
                        }
                        if let Some(item) = translator.step(frame) {
                            done_sent = item == OutboundItem::Done;
                            guard.frames += 1;
                            yield item;
                        }
                        if translator.is_finished() {
                            break 'read;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log.error("stream", format!("Upstream framing failed: {e}"));
                        if let Some(item) = translator.close_reasoning() {
                            yield item;
                        }
                        yield translator.fail(RelayError::malformed(e.to_string()).to_body());
                        break 'read;
                    }
                }
            }
        }

        // Release the upstream connection before the final frame goes out.
        drop(byte_stream);

        if !translator.is_finished() {
            if let Some(frame) = decoder.finish().and_then(|payload| decode_frame(&payload, &log)) {
                if frame.is_terminal() {
                    if let Some(item) = translator.close_reasoning() {
                        yield item;
                    }
                }
                if let Some(item) = translator.step(frame) {
                    done_sent = item == OutboundItem::Done;
                    yield item;
                }
            }
        }

        guard.completed = true;
        if !done_sent {
            if let Some(item) = translator.close_reasoning() {
                yield item;
            }
            yield translator.finish();
        }
        log.info("stream", format!("Stream completed after {} frames", guard.frames));
    }
}

/// Read an upstream event stream to the end and fold it into one response.
pub async fn fold_stream<S>(byte_stream: S, mut folder: ResponseFolder, log: &RequestLog) -> Result<ChatCompletionResponse>
where
    S: Stream<Item = Result<Bytes>> + Send,
{
    let mut decoder = FrameDecoder::new();
    let mut terminated = false;
    futures::pin_mut!(byte_stream);

    'read: while let Some(fragment) = byte_stream.next().await {
        decoder.push(&fragment?);
        while let Some(payload) = decoder.next_frame().map_err(|e| RelayError::malformed(e.to_string()))? {
            match decode_frame(&payload, log) {
                Some(UpstreamFrame::Chunk(chunk)) => folder.push(chunk),
                Some(UpstreamFrame::Done) => {
                    terminated = true;
                    break 'read;
                }
                None => {}
            }
        }
    }

    if !terminated {
        if let Some(UpstreamFrame::Chunk(chunk)) = decoder.finish().and_then(|payload| decode_frame(&payload, log)) {
            folder.push(chunk);
        }
    }

    Ok(folder.finish())
}

/// Decode one frame payload. Undecodable frames are logged and dropped.
fn decode_frame(payload: &str, log: &RequestLog) -> Option<UpstreamFrame> {
    match UpstreamFrame::decode(payload) {
        Ok(frame) => Some(frame),
        Err(e) => {
            log.warn(
                "stream",
                format!("Dropping undecodable frame: {e}. Payload: {}", truncate(payload, 200)),
            );
            None
        }
    }
}

/// Notices when the client goes away before the stream completed.
struct DisconnectGuard {
    log: RequestLog,
    frames: usize,
    completed: bool,
}

impl DisconnectGuard {
    fn new(log: RequestLog) -> Self {
        Self {
            log,
            frames: 0,
            completed: false,
        }
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.log.warn(
                "stream",
                format!(
                    "Client disconnected after {} frames; upstream request aborted",
                    self.frames
                ),
            );
        }
    }
}
