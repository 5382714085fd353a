use crate::algorithms::evaluator::evaluate;
use crate::algorithms::flat_index::FlatIndex;
use crate::algorithms::trainer::Trainer;
use crate::algorithms::EmbeddingModel;
use crate::config::Config;
use crate::data::{aggregate, loader, split, InteractionStore};
use crate::error::Result;
use crate::models::{EvaluationReport, Interaction, MatrixShape, ModelMeta, TrainParams, TrainingReport};
use crate::services::artifacts::{describe_model, ArtifactStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Train/validation split plus the table shape every model trained on it shares.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub shape: MatrixShape,
    pub train: Vec<Interaction>,
    pub validation: Vec<Interaction>,
}

impl PreparedData {
    pub fn from_store(store: &InteractionStore, validation_fraction: f64, seed: u64) -> Result<Self> {
        let (train, validation) = split(store.interactions(), validation_fraction, seed)?;
        info!(
            "Split {} interactions into {} train / {} validation",
            store.interactions().len(),
            train.len(),
            validation.len()
        );
        Ok(Self {
            shape: store.shape(),
            train,
            validation,
        })
    }

    /// Train and validation together, for the final deployable model.
    pub fn all(&self) -> Vec<Interaction> {
        let mut all = Vec::with_capacity(self.train.len() + self.validation.len());
        all.extend_from_slice(&self.train);
        all.extend_from_slice(&self.validation);
        all
    }
}

pub struct TrainingOutcome {
    pub model: EmbeddingModel,
    pub training: TrainingReport,
    pub evaluation: EvaluationReport,
    pub index: Option<FlatIndex>,
    pub meta: ModelMeta,
}

/// Offline pipeline: load, split, fit, evaluate, index, persist.
pub struct TrainingService {
    config: Arc<Config>,
    trainer: Trainer,
    store: ArtifactStore,
}

impl TrainingService {
    pub fn new(config: Arc<Config>) -> Self {
        let trainer = Trainer::new(config.training.backend);
        let store = ArtifactStore::from_config(&config.artifacts);
        Self {
            config,
            trainer,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn trainer(&self) -> Trainer {
        self.trainer
    }

    pub fn load_data(&self) -> Result<InteractionStore> {
        loader::load_store(&self.config.data)
    }

    pub fn prepare(&self, store: &InteractionStore) -> Result<PreparedData> {
        PreparedData::from_store(
            store,
            self.config.evaluation.validation_fraction,
            self.config.evaluation.split_seed,
        )
    }

    /// Rows the trainer sees: one per (user, item) with summed weight, or the
    /// raw rows when aggregation is switched off.
    pub fn training_rows(&self, rows: &[Interaction]) -> Vec<Interaction> {
        if self.config.training.aggregate_duplicates {
            aggregate(rows)
        } else {
            rows.to_vec()
        }
    }

    pub fn fit(&self, rows: &[Interaction], shape: MatrixShape, params: &TrainParams) -> Result<(EmbeddingModel, TrainingReport)> {
        let rows = self.training_rows(rows);
        self.trainer.fit(&rows, shape, params)
    }

    pub fn train_and_evaluate(
        &self,
        data: &PreparedData,
        params: &TrainParams,
    ) -> Result<(EmbeddingModel, TrainingReport, EvaluationReport)> {
        let (model, training) = self.fit(&data.train, data.shape, params)?;
        let evaluation = evaluate(
            model.user_vectors(),
            model.item_vectors(),
            &data.validation,
            &self.config.evaluation.k_list,
        )?;
        Ok((model, training, evaluation))
    }

    pub fn build_index(&self, model: &EmbeddingModel) -> Result<Option<FlatIndex>> {
        if !self.config.retrieval.build_index {
            warn!("Retrieval index disabled; serving will use brute force");
            return Ok(None);
        }
        let started = Instant::now();
        let index = FlatIndex::build(model.item_vectors(), self.config.retrieval.partition_rows)?;
        info!(
            "Built retrieval index over {} items in {} ms",
            index.len(),
            started.elapsed().as_millis()
        );
        Ok(Some(index))
    }

    /// Loads the configured CSV tables and runs the whole pipeline.
    pub fn run(&self) -> Result<TrainingOutcome> {
        let store = self.load_data()?;
        self.run_with_store(&store)
    }

    pub fn run_with_store(&self, store: &InteractionStore) -> Result<TrainingOutcome> {
        let data = self.prepare(store)?;
        let params = self.config.training.params();
        let (model, training, evaluation) = self.train_and_evaluate(&data, &params)?;
        let index = self.build_index(&model)?;

        let meta = describe_model(&model, &params, evaluation.metrics.clone(), index.is_some(), "train");
        self.store.save(&model, &meta, index.as_ref())?;

        info!(
            "Training run {} done: final loss {:?}, metrics {:?}",
            meta.run_id,
            training.final_loss(),
            evaluation.metrics
        );
        Ok(TrainingOutcome {
            model,
            training,
            evaluation,
            index,
            meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{generate, SyntheticSpec};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.artifacts.dir = std::env::temp_dir().join(format!("towerec-training-{}", uuid::Uuid::new_v4()));
        config.training.dim = 8;
        config.training.epochs = 3;
        config.training.batch_size = 64;
        config
    }

    #[test]
    fn test_training_rows_respect_aggregation_flag() {
        let rows = vec![Interaction::new(1, 2, 1.0, 0), Interaction::new(1, 2, 3.0, 5)];
        let mut config = test_config();
        let service = TrainingService::new(Arc::new(config.clone()));
        let merged = service.training_rows(&rows);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].weight, 4.0);

        config.training.aggregate_duplicates = false;
        let service = TrainingService::new(Arc::new(config));
        assert_eq!(service.training_rows(&rows).len(), 2);
    }

    #[test]
    fn test_run_persists_artifacts() {
        let config = test_config();
        let dir = config.artifacts.dir.clone();
        let service = TrainingService::new(Arc::new(config));
        let store = generate(&SyntheticSpec {
            num_users: 20,
            num_items: 15,
            num_interactions: 400,
            ..SyntheticSpec::default()
        });

        let outcome = service.run_with_store(&store).unwrap();
        assert_eq!(outcome.training.epoch_losses.len(), 3);
        assert_eq!(outcome.model.user_rows(), 21);
        assert_eq!(outcome.model.item_rows(), 1016);
        assert!(outcome.evaluation.metric("recall@10").is_some());
        assert_eq!(outcome.meta.trained_on, "train");

        let loaded = service.artifacts().load().unwrap();
        assert_eq!(loaded.model, outcome.model);
        assert!(loaded.index.is_some());

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_run_without_data_files_fails() {
        let mut config = test_config();
        config.data.data_dir = std::env::temp_dir().join(format!("towerec-nodata-{}", uuid::Uuid::new_v4()));
        let service = TrainingService::new(Arc::new(config));
        assert!(matches!(
            service.run(),
            Err(crate::error::RecError::MissingInput { .. })
        ));
    }
}
