use anyhow::Result;
use clap::Parser;
use std::path::Path;
use towerec::server::create_router;
use towerec::{init_tracing, AppState, Config};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve top-K recommendations from trained artifacts", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Overrides `server.port`.
    #[arg(short, long)]
    port: Option<u16>,

    /// Overrides `artifacts.dir`.
    #[arg(long)]
    artifacts: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut config = if Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file {} not found, using default configuration", args.config);
        Config::default()
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.artifacts {
        config.artifacts.dir = dir.into();
    }

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?
        .block_on(serve(config))
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting towerec server with config: {:?}", config.server);
    let addr = config.server.socket_addr()?;
    let state = AppState::new(config);

    // a missing model is not fatal; /health reports it and /reload picks it up later
    let serving = state.serving.clone();
    match tokio::task::spawn_blocking(move || serving.reload()).await? {
        Ok(()) => info!("Model loaded from {}", state.serving.artifacts().dir().display()),
        Err(e) if e.is_unavailable() => warn!("Starting without a model: {}", e),
        Err(e) => error!("Failed to load model artifacts: {}", e),
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
