//! Demonstrate the translation layer without a server or upstream.
//!
//! Usage:
//!   `cargo run --example translate_only`

use chat_relay::translate::client_types::{ChatCompletionRequest, ChatMessage, Role};
use chat_relay::translate::request::normalize_request;
use chat_relay::translate::streaming::{OutboundItem, StreamTranslator};
use chat_relay::translate::upstream_types::UpstreamFrame;
use chat_relay::RelayConfig;

fn main() -> anyhow::Result<()> {
    let mut config = RelayConfig::default();
    config.reasoning.display = true;
    config.reasoning.thinking_mode = true;
    config.prompt.system_preamble = Some("Answer briefly.".to_string());

    // What an OpenAI client sends
    let client_req = ChatCompletionRequest {
        model: "gpt-4o".to_string(),
        messages: vec![ChatMessage::new(Role::User, "What is the capital of France?")],
        temperature: None,
        max_tokens: Some(100_000),
        stream: Some(true),
        top_p: None,
        stop: None,
    };

    let upstream_req = normalize_request(&client_req, &config)?;
    println!("=== Upstream request ===");
    println!("{}", serde_json::to_string_pretty(&upstream_req)?);

    // What the upstream streams back, one payload per event
    let payloads = [
        r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{"reasoning_content":"The user wants a capital."}}]}"#,
        r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"Paris"}}]}"#,
        r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ];

    println!();
    println!("=== Client stream ===");
    let mut translator = StreamTranslator::new(&client_req.model, config.reasoning.display);
    for payload in payloads {
        let Some(item) = translator.step(UpstreamFrame::decode(payload)?) else {
            continue;
        };
        match item {
            OutboundItem::Chunk(chunk) => println!("data: {}", serde_json::to_string(&chunk)?),
            OutboundItem::Error(err) => println!("data: {}", serde_json::to_string(&err)?),
            OutboundItem::Done => println!("data: [DONE]"),
        }
    }

    Ok(())
}
