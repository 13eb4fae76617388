//! Static model routing.
//!
//! Clients ask for familiar OpenAI model names; the route table maps them onto
//! upstream model identifiers. Lookups never fail: unknown names fall back to
//! the configured default model.

use std::collections::HashMap;
use std::hash::BuildHasher;

use crate::translate::client_types::{ModelCard, ModelList};

/// Upstream model used when a request names a model missing from the table.
pub const DEFAULT_UPSTREAM_MODEL: &str = "meta/llama-3.1-70b-instruct";

/// Route table used when the config file does not provide `[models]`.
#[must_use]
pub fn default_model_routes() -> HashMap<String, String> {
    [
        ("gpt-3.5-turbo", "meta/llama-3.1-8b-instruct"),
        ("gpt-4", "meta/llama-3.1-70b-instruct"),
        ("gpt-4-turbo", "meta/llama-3.1-405b-instruct"),
        ("gpt-4o", "deepseek-ai/deepseek-v3.1"),
        ("gpt-4o-mini", "meta/llama-3.1-8b-instruct"),
        ("claude-3-opus", "qwen/qwen3-235b-a22b"),
        ("claude-3-sonnet", "moonshotai/kimi-k2-instruct"),
        ("gemini-pro", "qwen/qwen3-next-80b-a3b-thinking"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

/// Resolve a client-facing model name to the upstream identifier.
pub fn resolve_model<'a, S: BuildHasher>(
    routes: &'a HashMap<String, String, S>,
    default_model: &'a str,
    requested: &str,
) -> &'a str {
    routes
        .get(requested)
        .map_or(default_model, String::as_str)
}

/// The `/v1/models` listing: one card per routed name, sorted for stable output.
#[must_use]
pub fn list_models<S: BuildHasher>(
    routes: &HashMap<String, String, S>,
    owned_by: &str,
    created: i64,
) -> ModelList {
    let mut names: Vec<&String> = routes.keys().collect();
    names.sort();

    ModelList {
        object: "list".to_string(),
        data: names
            .into_iter()
            .map(|name| ModelCard {
                id: name.clone(),
                object: "model".to_string(),
                created,
                owned_by: owned_by.to_string(),
            })
            .collect(),
    }
}
