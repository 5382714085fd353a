use crate::algorithms::evaluator::metric_names;
use crate::algorithms::EmbeddingModel;
use crate::config::{Config, SearchSpace};
use crate::error::{RecError, Result};
use crate::models::{ModelMeta, TrainingReport, TrialConfig, TrialRecord};
use crate::services::artifacts::{describe_model, SEARCH_RESULTS_FILE};
use crate::services::training::{PreparedData, TrainingService};
use crate::utils::validation::validate_search_space;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Proposes trial configurations and learns from their scores.
pub trait SearchStrategy: Send {
    fn suggest(&mut self, space: &SearchSpace) -> TrialConfig;
    fn report(&mut self, config: &TrialConfig, score: f64);
}

/// Independent seeded draws: stepped dimension, log-uniform learning rate,
/// uniform epochs, categorical batch size.
pub struct RandomSearch {
    rng: StdRng,
    history: Vec<(TrialConfig, f64)>,
}

impl RandomSearch {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[(TrialConfig, f64)] {
        &self.history
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, space: &SearchSpace) -> TrialConfig {
        let dims: Vec<usize> = (space.dim_min..=space.dim_max).step_by(space.dim_step.max(1)).collect();
        let dim = dims.choose(&mut self.rng).copied().unwrap_or(space.dim_min);

        let learning_rate = if space.learning_rate_min < space.learning_rate_max {
            let low = space.learning_rate_min.ln();
            let high = space.learning_rate_max.ln();
            self.rng.gen_range(low..high).exp()
        } else {
            space.learning_rate_min
        };

        let epochs = self.rng.gen_range(space.epochs_min..=space.epochs_max);
        let batch_size = space
            .batch_sizes
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(1);

        TrialConfig {
            dim,
            learning_rate,
            epochs,
            batch_size,
        }
    }

    fn report(&mut self, config: &TrialConfig, score: f64) {
        self.history.push((config.clone(), score));
    }
}

pub struct SearchOutcome {
    pub objective: String,
    pub best: TrialRecord,
    pub trials: Vec<TrialRecord>,
    /// Trials never started because the time budget ran out.
    pub skipped_trials: usize,
    /// Retrained on train + validation with the best configuration.
    pub final_model: EmbeddingModel,
    pub final_report: TrainingReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSummary {
    pub objective: String,
    pub best: TrialRecord,
    pub trials: Vec<TrialRecord>,
    pub skipped_trials: usize,
    pub final_train_loss: Option<f64>,
    pub final_examples: usize,
}

impl SearchOutcome {
    pub fn summary(&self) -> SearchSummary {
        SearchSummary {
            objective: self.objective.clone(),
            best: self.best.clone(),
            trials: self.trials.clone(),
            skipped_trials: self.skipped_trials,
            final_train_loss: self.final_report.final_loss(),
            final_examples: self.final_report.examples,
        }
    }
}

/// Random search over the configured space, scored on a fixed split.
pub struct HyperparameterSearch {
    training: TrainingService,
}

impl HyperparameterSearch {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            training: TrainingService::new(config),
        }
    }

    pub fn training(&self) -> &TrainingService {
        &self.training
    }

    /// Runs `n_trials` trials, keeps the best by `objective`, then retrains
    /// the best configuration on train and validation combined.
    pub fn search<S: SearchStrategy>(
        &self,
        strategy: &mut S,
        data: &PreparedData,
        objective: &str,
        n_trials: usize,
        space: &SearchSpace,
    ) -> Result<SearchOutcome> {
        let config = self.training.config();
        validate_search_space(space)?;
        if n_trials == 0 {
            return Err(RecError::invalid("n_trials", n_trials, "must be positive"));
        }
        if !metric_names(&config.evaluation.k_list).iter().any(|m| m == objective) {
            return Err(RecError::invalid(
                "objective",
                objective,
                "must be a metric reported by the evaluator",
            ));
        }

        let started = Instant::now();
        let deadline = config.search.timeout_secs.map(|secs| started + Duration::from_secs(secs));
        let best: Mutex<Option<TrialRecord>> = Mutex::new(None);

        let run_trial = |trial: usize, trial_config: &TrialConfig| -> Result<Option<TrialRecord>> {
            // the first trial always runs so there is something to retrain
            if trial > 0 && deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
            let record = self.run_trial(trial, trial_config, data, objective)?;
            offer_best(&best, &record);
            Ok(Some(record))
        };

        let parallelism = config.search.parallelism.max(1);
        let mut trials: Vec<TrialRecord> = Vec::with_capacity(n_trials);
        let mut skipped = 0usize;

        if parallelism == 1 {
            for trial in 0..n_trials {
                let trial_config = strategy.suggest(space);
                match run_trial(trial, &trial_config)? {
                    Some(record) => {
                        strategy.report(&record.config, record.objective);
                        trials.push(record);
                    }
                    None => skipped += 1,
                }
            }
        } else {
            // configurations are drawn up front so a seeded search stays reproducible
            let configs: Vec<TrialConfig> = (0..n_trials).map(|_| strategy.suggest(space)).collect();
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(parallelism)
                .build()
                .map_err(|e| RecError::invalid("search.parallelism", parallelism, &e.to_string()))?;
            info!("Running {} trials on {} threads", n_trials, parallelism);

            let results: Vec<Option<TrialRecord>> = pool.install(|| {
                configs
                    .par_iter()
                    .enumerate()
                    .map(|(trial, trial_config)| run_trial(trial, trial_config))
                    .collect::<Result<Vec<_>>>()
            })?;
            for result in results {
                match result {
                    Some(record) => {
                        strategy.report(&record.config, record.objective);
                        trials.push(record);
                    }
                    None => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            warn!("Search time budget exhausted, skipped {} of {} trials", skipped, n_trials);
        }

        let best = best
            .into_inner()
            .ok_or_else(|| RecError::EmbeddingsUnavailable("no search trial completed".to_string()))?;
        info!(
            "Best trial {} with {}={:.4}: {:?}",
            best.trial, objective, best.objective, best.config
        );

        let params = best
            .config
            .to_params(config.training.seed, config.training.optimizer);
        let all = data.all();
        let (final_model, final_report) = self.training.fit(&all, data.shape, &params)?;
        info!(
            "Retrained best configuration on {} train+validation rows, final loss {:?}",
            final_report.examples,
            final_report.final_loss()
        );

        Ok(SearchOutcome {
            objective: objective.to_string(),
            best,
            trials,
            skipped_trials: skipped,
            final_model,
            final_report,
        })
    }

    /// Search with the configured objective, trial count, space and seed.
    pub fn run(&self, data: &PreparedData) -> Result<SearchOutcome> {
        let search = &self.training.config().search;
        let mut strategy = RandomSearch::new(search.seed);
        self.search(&mut strategy, data, &search.objective, search.n_trials, &search.space)
    }

    fn run_trial(
        &self,
        trial: usize,
        trial_config: &TrialConfig,
        data: &PreparedData,
        objective: &str,
    ) -> Result<TrialRecord> {
        let config = self.training.config();
        let params = trial_config.to_params(config.training.seed, config.training.optimizer);
        let (_, training, evaluation) = self.training.train_and_evaluate(data, &params)?;
        let score = evaluation.metric(objective).unwrap_or(0.0);
        info!(
            "Trial {}: dim={} lr={:.5} epochs={} batch_size={} -> {}={:.4}",
            trial,
            trial_config.dim,
            trial_config.learning_rate,
            trial_config.epochs,
            trial_config.batch_size,
            objective,
            score
        );
        Ok(TrialRecord {
            trial,
            config: trial_config.clone(),
            objective: score,
            metrics: evaluation.metrics,
            final_train_loss: training.final_loss(),
        })
    }

    /// Persists the retrained model (with a fresh index) and the trial log.
    pub fn persist(&self, outcome: &SearchOutcome) -> Result<ModelMeta> {
        let config = self.training.config();
        let params = outcome
            .best
            .config
            .to_params(config.training.seed, config.training.optimizer);
        let index = self.training.build_index(&outcome.final_model)?;
        let meta = describe_model(
            &outcome.final_model,
            &params,
            outcome.best.metrics.clone(),
            index.is_some(),
            "train+validation",
        );

        let store = self.training.artifacts();
        store.save(&outcome.final_model, &meta, index.as_ref())?;
        let path = store.write_json(SEARCH_RESULTS_FILE, &outcome.summary())?;
        info!("Wrote search results to {}", path.display());
        Ok(meta)
    }
}

/// Replaces the best record when `record` scores higher, or ties with an
/// earlier trial number.
fn offer_best(best: &Mutex<Option<TrialRecord>>, record: &TrialRecord) {
    let mut guard = best.lock();
    let better = match guard.as_ref() {
        None => true,
        Some(current) => {
            record.objective > current.objective
                || (record.objective == current.objective && record.trial < current.trial)
        }
    };
    if better {
        *guard = Some(record.clone());
    }
}
