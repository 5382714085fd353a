use crate::error::{RecError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub evaluation: EvaluationConfig,
    pub retrieval: RetrievalConfig,
    pub search: SearchConfig,
    pub artifacts: ArtifactConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    pub users_file: String,
    pub items_file: String,
    pub interactions_file: String,
}

impl DataConfig {
    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(&self.users_file)
    }

    pub fn items_path(&self) -> PathBuf {
        self.data_dir.join(&self.items_file)
    }

    pub fn interactions_path(&self) -> PathBuf {
        self.data_dir.join(&self.interactions_file)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

/// Which numeric path `Trainer::fit` takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainerBackend {
    /// Mini-batch gradient descent.
    Gradient,
    /// Seeded random factors, no fitting. The resulting model is flagged untrained.
    Untrained,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub dim: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
    pub optimizer: OptimizerKind,
    pub backend: TrainerBackend,
    pub aggregate_duplicates: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub validation_fraction: f64,
    pub split_seed: u64,
    pub k_list: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub build_index: bool,
    /// Rows scanned per parallel task when searching the index.
    pub partition_rows: usize,
    pub default_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    pub dim_min: usize,
    pub dim_max: usize,
    pub dim_step: usize,
    pub learning_rate_min: f64,
    pub learning_rate_max: f64,
    pub epochs_min: usize,
    pub epochs_max: usize,
    pub batch_sizes: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub n_trials: usize,
    pub objective: String,
    pub timeout_secs: Option<u64>,
    pub parallelism: usize,
    pub seed: u64,
    pub space: SearchSpace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                workers: num_cpus::get(),
            },
            data: DataConfig {
                data_dir: PathBuf::from("."),
                users_file: "users.csv".to_string(),
                items_file: "items.csv".to_string(),
                interactions_file: "interactions.csv".to_string(),
            },
            training: TrainingConfig {
                dim: 32,
                learning_rate: 0.01,
                epochs: 5,
                batch_size: 512,
                seed: 42,
                optimizer: OptimizerKind::Adam,
                backend: TrainerBackend::Gradient,
                aggregate_duplicates: true,
            },
            evaluation: EvaluationConfig {
                validation_fraction: 0.2,
                split_seed: 42,
                k_list: vec![5, 10, 20],
            },
            retrieval: RetrievalConfig {
                build_index: true,
                partition_rows: 4096,
                default_k: 5,
            },
            search: SearchConfig {
                n_trials: 20,
                objective: "recall@10".to_string(),
                timeout_secs: None,
                parallelism: 1,
                seed: 42,
                space: SearchSpace::default(),
            },
            artifacts: ArtifactConfig {
                dir: PathBuf::from(".artifacts"),
            },
        }
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            dim_min: 8,
            dim_max: 64,
            dim_step: 8,
            learning_rate_min: 1e-4,
            learning_rate_max: 1e-1,
            epochs_min: 3,
            epochs_max: 15,
            batch_sizes: vec![128, 256, 512],
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("TOWEREC").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no pipeline stage can run with.
    pub fn validate(&self) -> Result<()> {
        crate::utils::validation::validate_train_params(&self.training.params())?;
        crate::utils::validation::validate_split_fraction(self.evaluation.validation_fraction)?;
        crate::utils::validation::validate_k_list(&self.evaluation.k_list)?;
        crate::utils::validation::validate_search_space(&self.search.space)?;

        let known = crate::algorithms::evaluator::metric_names(&self.evaluation.k_list);
        if !known.contains(&self.search.objective) {
            return Err(RecError::invalid(
                "search.objective",
                &self.search.objective,
                &format!("must be one of {:?}", known),
            ));
        }
        if self.retrieval.partition_rows == 0 {
            return Err(RecError::invalid(
                "retrieval.partition_rows",
                self.retrieval.partition_rows,
                "must be positive",
            ));
        }
        Ok(())
    }
}

impl TrainingConfig {
    pub fn params(&self) -> crate::models::TrainParams {
        crate::models::TrainParams {
            dim: self.dim,
            learning_rate: self.learning_rate,
            epochs: self.epochs,
            batch_size: self.batch_size,
            seed: self.seed,
            optimizer: self.optimizer,
        }
    }
}
