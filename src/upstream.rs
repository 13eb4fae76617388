//! Outbound HTTP to the upstream chat endpoint.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, CONTENT_TYPE};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::translate::response::truncate;
use crate::translate::upstream_types::{UpstreamErrorResponse, UpstreamRequest};

pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

/// Body of a successful upstream reply. The shape follows the response's
/// content type, not the flag we sent.
pub enum UpstreamBody {
    Streaming(ByteStream),
    Buffered(Bytes),
}

impl std::fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Streaming(_) => f.write_str("Streaming(..)"),
            Self::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
        }
    }
}

#[derive(Debug)]
pub struct UpstreamReply {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

#[derive(Clone, Debug)]
pub struct UpstreamClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            timeout,
        }
    }

    /// Build from config, resolving the base URL and API key eagerly.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let base_url = config.effective_base_url()?;
        let api_key = config.resolve_api_key()?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::new(http, &base_url, api_key, config.upstream_timeout()))
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue one request. Non-2xx replies become `UpstreamError`.
    pub async fn send(&self, payload: &UpstreamRequest) -> Result<UpstreamReply> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| RelayError::from_transport(&e))?;

        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::upstream(status.as_u16(), error_message(&body)));
        }

        let is_event_stream = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = if is_event_stream {
            UpstreamBody::Streaming(Box::pin(response.bytes_stream()))
        } else {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| RelayError::from_transport(&e))?;
            UpstreamBody::Buffered(bytes)
        };

        Ok(UpstreamReply {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<UpstreamErrorResponse>(body) {
        Ok(err) => err.error.message,
        Err(_) if body.trim().is_empty() => "empty error body".to_string(),
        Err(_) => truncate(body.trim(), 500).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::upstream_types::UpstreamMessage;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(stream: bool) -> UpstreamRequest {
        UpstreamRequest {
            model: "meta/llama-3.1-8b-instruct".into(),
            messages: vec![UpstreamMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            temperature: 0.6,
            max_tokens: 100,
            stream,
            top_p: None,
            stop: None,
            chat_template_kwargs: None,
        }
    }

    fn client(server: &MockServer, timeout: Duration) -> UpstreamClient {
        UpstreamClient::new(reqwest::Client::new(), &format!("{}/v1/", server.uri()), "sk-test", timeout)
    }

    #[tokio::test]
    async fn test_buffered_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"stream": false, "max_tokens": 100})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server, Duration::from_secs(5)).send(&payload(false)).await.unwrap();
        assert_eq!(reply.status, 200);
        let UpstreamBody::Buffered(body) = reply.body else {
            panic!("expected buffered body");
        };
        assert_eq!(&body[..], br#"{"choices":[]}"#);
    }

    #[tokio::test]
    async fn test_event_stream_reply_is_streamed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"))
            .mount(&server)
            .await;

        let reply = client(&server, Duration::from_secs(5)).send(&payload(true)).await.unwrap();
        let UpstreamBody::Streaming(mut stream) = reply.body else {
            panic!("expected streaming body");
        };
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_error_status_is_propagated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit reached", "type": "rate_limit_error"}
            })))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5)).send(&payload(false)).await.unwrap_err();
        match err {
            RelayError::UpstreamError { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deadline_is_upstream_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"choices": []}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_millis(200)).send(&payload(false)).await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamTimeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let upstream = UpstreamClient::new(
            reqwest::Client::new(),
            &format!("http://{addr}/v1"),
            "sk-test",
            Duration::from_secs(2),
        );
        let err = upstream.send(&payload(false)).await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamUnreachable { .. }), "{err:?}");
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(error_message(""), "empty error body");
        assert_eq!(error_message("  upstream exploded \n"), "upstream exploded");
        assert_eq!(error_message(r#"{"error":{"message":"nope"}}"#), "nope");
    }
}
