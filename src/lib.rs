pub mod algorithms;
pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod utils;

pub use algorithms::EmbeddingModel;
pub use config::Config;
pub use error::{RecError, Result};
pub use models::*;

use services::artifacts::ArtifactStore;
use services::serving::ServingService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub serving: Arc<ServingService>,
}

impl AppState {
    /// Starts with an empty snapshot; call `serving.reload()` to load artifacts.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let serving = Arc::new(ServingService::new(ArtifactStore::from_config(&config.artifacts)));
        Self { config, serving }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
