use crate::error::{RelayError, Result};
use crate::models::{default_model_routes, DEFAULT_UPSTREAM_MODEL};
use crate::providers::ProviderPreset;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_upstream_model")]
    pub default_model: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default = "default_model_routes")]
    pub models: HashMap<String, String>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Always ask the upstream for an event stream, even for non-streaming clients.
    #[serde(default)]
    pub force_stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    #[serde(default = "default_max_tokens_ceiling")]
    pub max_tokens_ceiling: u32,
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Show upstream reasoning to clients wrapped in `<think>` tags.
    #[serde(default)]
    pub display: bool,
    /// Ask the upstream to think (`chat_template_kwargs.thinking`).
    #[serde(default)]
    pub thinking_mode: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// System message prepended to every conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_preamble: Option<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_upstream_model() -> String {
    DEFAULT_UPSTREAM_MODEL.to_string()
}

fn default_provider_name() -> String {
    "nvidia-nim".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    800
}

fn default_max_tokens_ceiling() -> u32 {
    4096
}

fn default_temperature() -> f64 {
    0.6
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            force_stream: false,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            max_tokens_ceiling: default_max_tokens_ceiling(),
            default_temperature: default_temperature(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            default_model: default_upstream_model(),
            upstream: UpstreamConfig::default(),
            models: default_model_routes(),
            limits: LimitsConfig::default(),
            reasoning: ReasoningConfig::default(),
            prompt: PromptConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let mut config: Self = toml::from_str(&content)?;
        config.limits.normalize();
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source; keys mirror the usual
    /// deployment environment variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| RelayError::config(format!("PORT is not a valid port: {port}")))?;
        }
        if let Some(url) = lookup("UPSTREAM_BASE_URL") {
            self.upstream.base_url = Some(url);
        }
        if let Some(model) = lookup("DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(secs) = lookup("UPSTREAM_TIMEOUT_SECS") {
            self.upstream.timeout_secs = secs.trim().parse().map_err(|_| {
                RelayError::config(format!("UPSTREAM_TIMEOUT_SECS is not a number: {secs}"))
            })?;
        }
        if let Some(flag) = lookup("SHOW_REASONING") {
            self.reasoning.display = parse_flag("SHOW_REASONING", &flag)?;
        }
        if let Some(flag) = lookup("ENABLE_THINKING_MODE") {
            self.reasoning.thinking_mode = parse_flag("ENABLE_THINKING_MODE", &flag)?;
        }
        if let Some(flag) = lookup("FORCE_UPSTREAM_STREAM") {
            self.upstream.force_stream = parse_flag("FORCE_UPSTREAM_STREAM", &flag)?;
        }
        self.limits.normalize();
        Ok(())
    }

    /// Resolve the effective base URL (config override or provider preset default)
    pub fn effective_base_url(&self) -> Result<String> {
        if let Some(ref url) = self.upstream.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }

        let preset = ProviderPreset::from_name(&self.upstream.name).ok_or_else(|| {
            RelayError::config(format!(
                "Unknown provider '{}' and no base_url configured. Known providers: {}",
                self.upstream.name,
                ProviderPreset::all()
                    .iter()
                    .map(|p| p.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        Ok(preset.base_url.to_string())
    }

    /// Name of the environment variable holding the upstream API key.
    #[must_use]
    pub fn api_key_env(&self) -> String {
        if let Some(ref name) = self.upstream.api_key_env {
            return name.clone();
        }
        ProviderPreset::from_name(&self.upstream.name)
            .map_or_else(|| "UPSTREAM_API_KEY".to_string(), |p| p.default_api_key_env.to_string())
    }

    /// Resolve the API key from the configured environment variable
    pub fn resolve_api_key(&self) -> Result<String> {
        let var = self.api_key_env();
        std::env::var(&var).map_err(|_| {
            RelayError::config(format!(
                "Environment variable '{var}' not set. Set it with your upstream API key."
            ))
        })
    }

    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs.max(1))
    }
}

impl LimitsConfig {
    /// Keep the ceiling at least 1 and the default within `1..=ceiling`.
    fn normalize(&mut self) {
        self.max_tokens_ceiling = self.max_tokens_ceiling.max(1);
        self.default_max_tokens = self.default_max_tokens.clamp(1, self.max_tokens_ceiling);
        if !self.default_temperature.is_finite() || self.default_temperature < 0.0 {
            self.default_temperature = default_temperature();
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(RelayError::config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("chat-relay.toml")];

    if cfg!(target_os = "macos") {
        if let Some(home) = home_dir() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("chat-relay")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("chat-relay").join("config.toml"));
        }
        if let Some(home) = home_dir() {
            paths.push(home.join(".config").join("chat-relay").join("config.toml"));
        }
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(".chat-relay.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
