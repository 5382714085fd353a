use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use towerec::config::{OptimizerKind, TrainerBackend};
use towerec::data::synthetic::{generate, write_csv, SyntheticSpec};
use towerec::services::search::HyperparameterSearch;
use towerec::services::training::TrainingService;
use towerec::{init_tracing, Config};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline training, evaluation and hyperparameter search", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a reproducible synthetic dataset as CSV.
    Generate {
        #[arg(long, default_value = "data")]
        out: PathBuf,
        #[arg(long, default_value_t = 100)]
        users: usize,
        #[arg(long, default_value_t = 50)]
        items: usize,
        #[arg(long, default_value_t = 5000)]
        interactions: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Train one model, evaluate it on the validation split and save artifacts.
    Train(TrainOverrides),
    /// Search hyperparameters, retrain the best on all data and save artifacts.
    Search {
        #[arg(long)]
        trials: Option<usize>,
        #[arg(long)]
        objective: Option<String>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[arg(long)]
        parallelism: Option<usize>,
        #[command(flatten)]
        common: CommonOverrides,
    },
}

#[derive(ClapArgs, Debug)]
struct TrainOverrides {
    #[arg(long)]
    dim: Option<usize>,
    #[arg(long)]
    learning_rate: Option<f64>,
    #[arg(long)]
    epochs: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long, value_enum)]
    optimizer: Option<OptimizerArg>,
    /// Skip fitting and save seeded factors flagged as untrained.
    #[arg(long)]
    untrained: bool,
    #[command(flatten)]
    common: CommonOverrides,
}

#[derive(ClapArgs, Debug)]
struct CommonOverrides {
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    artifacts: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    no_index: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OptimizerArg {
    Adam,
    Sgd,
}

impl CommonOverrides {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.data_dir {
            config.data.data_dir = dir.clone();
        }
        if let Some(dir) = &self.artifacts {
            config.artifacts.dir = dir.clone();
        }
        if let Some(seed) = self.seed {
            config.training.seed = seed;
            config.search.seed = seed;
        }
        if self.no_index {
            config.retrieval.build_index = false;
        }
    }
}

impl TrainOverrides {
    fn apply(&self, config: &mut Config) {
        self.common.apply(config);
        if let Some(dim) = self.dim {
            config.training.dim = dim;
        }
        if let Some(lr) = self.learning_rate {
            config.training.learning_rate = lr;
        }
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(optimizer) = self.optimizer {
            config.training.optimizer = match optimizer {
                OptimizerArg::Adam => OptimizerKind::Adam,
                OptimizerArg::Sgd => OptimizerKind::Sgd,
            };
        }
        if self.untrained {
            config.training.backend = TrainerBackend::Untrained;
        }
    }
}

fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Ok(Config::from_file(path)?)
    } else {
        info!("Config file {} not found, using default configuration", path);
        Ok(Config::default())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut config = load_config(&args.config)?;

    match args.command {
        Command::Generate {
            out,
            users,
            items,
            interactions,
            seed,
        } => {
            let store = generate(&SyntheticSpec {
                num_users: users,
                num_items: items,
                num_interactions: interactions,
                seed,
                ..SyntheticSpec::default()
            });
            write_csv(&store, &out)?;
        }
        Command::Train(overrides) => {
            overrides.apply(&mut config);
            config.validate()?;
            info!("Training configuration: {:?}", config.training);

            let service = TrainingService::new(Arc::new(config));
            let outcome = service.run()?;
            println!("{}", serde_json::to_string_pretty(&outcome.meta)?);
        }
        Command::Search {
            trials,
            objective,
            timeout_secs,
            parallelism,
            common,
        } => {
            common.apply(&mut config);
            if let Some(trials) = trials {
                config.search.n_trials = trials;
            }
            if let Some(objective) = objective {
                config.search.objective = objective;
            }
            if timeout_secs.is_some() {
                config.search.timeout_secs = timeout_secs;
            }
            if let Some(parallelism) = parallelism {
                config.search.parallelism = parallelism;
            }
            config.validate()?;
            info!("Search configuration: {:?}", config.search);

            let search = HyperparameterSearch::new(Arc::new(config));
            let store = search.training().load_data()?;
            let data = search.training().prepare(&store)?;
            let outcome = search.run(&data)?;
            search.persist(&outcome)?;
            println!("{}", serde_json::to_string_pretty(&outcome.summary().best)?);
        }
    }

    Ok(())
}
