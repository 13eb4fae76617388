use chat_relay::{build_router, AppState, RelayConfig, RequestLog, UpstreamClient};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_body(frames: &[serde_json::Value]) -> String {
    let mut body: String = frames
        .iter()
        .map(|f| format!("data: {f}\n\n"))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn delta_frame(content: Option<&str>, reasoning: Option<&str>, finish: Option<&str>) -> serde_json::Value {
    let mut delta = serde_json::Map::new();
    if let Some(c) = content {
        delta.insert("content".into(), c.into());
    }
    if let Some(r) = reasoning {
        delta.insert("reasoning_content".into(), r.into());
    }
    serde_json::json!({
        "id": "chatcmpl-up",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "deepseek-ai/deepseek-v3.1",
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish}]
    })
}

/// Start a relay in front of `upstream`, returning its address.
async fn start_relay(upstream: &MockServer, configure: impl FnOnce(&mut RelayConfig)) -> SocketAddr {
    let mut config = RelayConfig::default();
    config.upstream.base_url = Some(format!("{}/v1", upstream.uri()));
    configure(&mut config);

    let client = UpstreamClient::new(
        reqwest::Client::new(),
        &assert_ok!(config.effective_base_url()),
        "sk-test",
        config.upstream_timeout(),
    );
    let state = Arc::new(AppState::new(config, client, RequestLog::tracing_only()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    addr
}

async fn post_chat(addr: SocketAddr, body: serde_json::Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/v1/chat/completions"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn collect_events(resp: reqwest::Response) -> Vec<String> {
    resp.bytes_stream()
        .eventsource()
        .map(|event| event.unwrap().data)
        .collect()
        .await
}

fn event_text(events: &[String]) -> String {
    events
        .iter()
        .filter(|d| d.as_str() != "[DONE]")
        .filter_map(|d| {
            let json: serde_json::Value = serde_json::from_str(d).unwrap();
            json["choices"][0]["delta"]["content"].as_str().map(String::from)
        })
        .collect()
}

#[tokio::test]
async fn test_non_streaming_roundtrip() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "deepseek-ai/deepseek-v3.1",
            "max_tokens": 800,
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-xyz",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "deepseek-ai/deepseek-v3.1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "pong", "reasoning_content": "they said ping"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 4, "completion_tokens": 1, "total_tokens": 5}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let addr = start_relay(&upstream, |_| {}).await;
    let resp = post_chat(
        addr,
        serde_json::json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "ping"}]}),
    )
    .await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["choices"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "pong");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], 5);
}

#[tokio::test]
async fn test_streaming_roundtrip_with_reasoning() {
    let upstream = MockServer::start().await;
    let body = sse_body(&[
        delta_frame(None, Some("thinking"), None),
        delta_frame(Some("He"), None, None),
        delta_frame(Some("llo"), None, None),
        delta_frame(None, None, Some("stop")),
    ]);
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "stream": true,
            "chat_template_kwargs": {"thinking": true}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&upstream)
        .await;

    let addr = start_relay(&upstream, |c| {
        c.reasoning.display = true;
        c.reasoning.thinking_mode = true;
    })
    .await;
    let resp = post_chat(
        addr,
        serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        }),
    )
    .await;

    assert_eq!(resp.status(), 200);
    assert!(resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream")));

    let events = collect_events(resp).await;
    assert_eq!(events.len(), 5);
    assert_eq!(events.last().map(String::as_str), Some("[DONE]"));
    assert_eq!(events.iter().filter(|d| d.as_str() == "[DONE]").count(), 1);
    assert_eq!(event_text(&events), "<think>\nthinking\n</think>\n\nHello");

    let finish: serde_json::Value = serde_json::from_str(&events[3]).unwrap();
    assert_eq!(finish["choices"][0]["finish_reason"], "stop");
    assert_eq!(finish["object"], "chat.completion.chunk");
}

#[tokio::test]
async fn test_forced_upstream_stream_is_folded_for_non_streaming_client() {
    let upstream = MockServer::start().await;
    let body = sse_body(&[
        delta_frame(Some("Hel"), Some("hidden"), None),
        delta_frame(Some("lo"), None, Some("length")),
    ]);
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&upstream)
        .await;

    let addr = start_relay(&upstream, |c| c.upstream.force_stream = true).await;
    let resp = post_chat(
        addr,
        serde_json::json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello");
    assert_eq!(body["choices"][0]["finish_reason"], "length");
}

#[tokio::test]
async fn test_buffered_upstream_is_replayed_to_streaming_client() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"index": 0, "message": {"content": "all at once"}, "finish_reason": "stop"}]
        })))
        .mount(&upstream)
        .await;

    let addr = start_relay(&upstream, |_| {}).await;
    let resp = post_chat(
        addr,
        serde_json::json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        }),
    )
    .await;

    let events = collect_events(resp).await;
    assert_eq!(events.len(), 2);
    assert_eq!(event_text(&events), "all at once");
    assert_eq!(events[1], "[DONE]");
}

#[tokio::test]
async fn test_upstream_error_status_is_propagated() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "error": {"message": "model is overloaded"}
        })))
        .mount(&upstream)
        .await;

    let addr = start_relay(&upstream, |_| {}).await;
    for stream in [false, true] {
        let resp = post_chat(
            addr,
            serde_json::json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": stream
            }),
        )
        .await;

        assert_eq!(resp.status(), 503);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], 503);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("model is overloaded"));
    }
}

#[tokio::test]
async fn test_upstream_timeout_is_500() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"choices": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&upstream)
        .await;

    let addr = start_relay(&upstream, |c| c.upstream.timeout_secs = 1).await;
    let resp = post_chat(
        addr,
        serde_json::json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "upstream_timeout");
}

#[tokio::test]
async fn test_invalid_requests_never_reach_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let addr = start_relay(&upstream, |_| {}).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/v1/chat/completions"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = post_chat(addr, serde_json::json!({"model": "gpt-4", "messages": []})).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");

    let resp = post_chat(addr, serde_json::json!({"model": "gpt-4"})).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_health_models_and_unknown_routes() {
    let upstream = MockServer::start().await;
    let addr = start_relay(&upstream, |c| c.reasoning.display = true).await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["service"], "chat-relay");
    assert_eq!(health["reasoning_display"], true);
    assert_eq!(health["thinking_mode"], false);

    let models: serde_json::Value = client
        .get(format!("http://{addr}/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["object"], "list");
    let ids: Vec<&str> = models["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"gpt-4o"));
    assert_eq!(models["data"][0]["object"], "model");

    let resp = client
        .get(format!("http://{addr}/v1/engines"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Endpoint /v1/engines not found");
    assert_eq!(body["error"]["code"], 404);

    let wrong_method = [
        client.get(format!("http://{addr}/v1/chat/completions")),
        client.post(format!("http://{addr}/health")),
        client.delete(format!("http://{addr}/v1/models")),
    ];
    for req in wrong_method {
        let resp = req.send().await.unwrap();
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], 404);
    }
}

#[tokio::test]
async fn test_oversized_max_tokens_is_capped() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({"max_tokens": 4096})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"index": 0, "message": {"content": "ok"}, "finish_reason": "stop"}]
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let addr = start_relay(&upstream, |_| {}).await;
    let resp = post_chat(
        addr,
        serde_json::json!({
            "model": "gpt-4",
            "max_tokens": 5_000_000_000_u64,
            "messages": [{"role": "user", "content": "hi"}]
        }),
    )
    .await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "ok");
}
