use chat_relay::config::config_search_paths;
use chat_relay::providers::ProviderPreset;
use chat_relay::{build_router, AppState, RelayConfig, RequestLog, UpstreamClient};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chat-relay",
    about = "OpenAI-compatible relay that translates chat completions to an upstream provider",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream provider preset (overrides config)
    #[arg(long)]
    provider: Option<String>,

    /// Also append request log entries to this file as JSON lines
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = RelayConfig::find_and_load(cli.config.as_deref())?;
    config.apply_env()?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ref provider) = cli.provider {
        if ProviderPreset::from_name(provider).is_none() && config.upstream.base_url.is_none() {
            anyhow::bail!("Unknown provider '{provider}' and no base_url configured");
        }
        config.upstream.name = provider.clone();
        config.upstream.api_key_env = None;
    }

    let log = match cli.log_file {
        Some(ref path) => RequestLog::with_file(path)?,
        None => RequestLog::tracing_only(),
    };

    // Fails fast on a missing API key or unknown provider.
    let upstream = UpstreamClient::from_config(&config)?;

    info!("chat-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:   {} ({})", config.upstream.name, upstream.endpoint());
    info!("  Timeout:    {}s", config.upstream.timeout_secs);
    info!("  Models:     {} mapped, default {}", config.models.len(), config.default_model);
    info!("  Reasoning:  display={} thinking={}", config.reasoning.display, config.reasoning.thinking_mode);
    info!("  Force SSE:  {}", config.upstream.force_stream);

    log.info(
        "startup",
        format!("Starting chat-relay upstream={} port={}", upstream.endpoint(), config.port),
    );

    let port = config.port;
    let state = Arc::new(AppState::new(config, upstream, log));

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  OPENAI_BASE_URL=http://localhost:{}/v1", port);

    axum::serve(listener, app).await?;

    Ok(())
}
