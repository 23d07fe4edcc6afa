use clap::Parser;
use converse_proxy::{
    build_router, default_model_aliases, AppState, ModelRegistry, ProxyConfig, SharedLogger,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "converse-proxy",
    about = "OpenAI-compatible front end for Converse-style inference providers",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log file path
    #[arg(long, default_value = "converse-proxy.log")]
    log_file: PathBuf,

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
                .unwrap_or_else(|_| "converse_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        println!("  1. converse-proxy.toml (current directory)");
        if cfg!(target_os = "macos") {
            println!("  2. ~/Library/Application Support/converse-proxy/config.toml");
        } else {
            println!("  2. $XDG_CONFIG_HOME/converse-proxy/config.toml");
            println!("     ~/.config/converse-proxy/config.toml");
        }
        println!("  3. ~/.converse-proxy.toml");
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }

    if config.models.is_empty() {
        match config.provider.default_model.clone() {
            Some(id) => {
                info!("No [models] table configured, aliasing common names to {id}");
                config.models = default_model_aliases(&id);
            }
            None => {
                warn!("No [models] table and no provider.default_model; only namespaced model ids will resolve");
            }
        }
    }

    let logger = SharedLogger::new(&cli.log_file)?;

    // Fail fast on missing credentials rather than on the first request.
    let _api_key = config.resolve_api_key()?;

    info!("converse-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Provider:  {}", config.provider.name);
    info!("  Base URL:  {}", config.base_url());
    info!("  Port:      {}", config.port);
    info!("  Models:    {} mapped", config.models.len());
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting converse-proxy provider={} base_url={} port={}",
            config.provider.name,
            config.base_url(),
            config.port
        ),
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let registry = ModelRegistry::new(config.models.clone(), config.provider.name.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        registry,
        client,
        logger: logger.clone(),
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
