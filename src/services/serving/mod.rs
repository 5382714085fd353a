use crate::algorithms::flat_index::FlatIndex;
use crate::algorithms::retriever::{select_strategy, RetrievalStrategy};
use crate::algorithms::EmbeddingModel;
use crate::error::{RecError, Result};
use crate::models::{HealthStatus, ModelMeta, RecommendationResponse, StrategyKind, UserId};
use crate::services::artifacts::{ArtifactStore, ModelArtifacts};
use crate::utils::row_to_vec;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Immutable view of one trained model and its retrieval strategy. Serving
/// reads a snapshot; reloading replaces it whole.
pub struct ModelSnapshot {
    model: Option<EmbeddingModel>,
    strategy: Option<Box<dyn RetrievalStrategy>>,
    meta: Option<ModelMeta>,
}

impl ModelSnapshot {
    pub fn empty() -> Self {
        Self {
            model: None,
            strategy: None,
            meta: None,
        }
    }

    pub fn new(model: EmbeddingModel, index: Option<FlatIndex>, meta: Option<ModelMeta>) -> Self {
        let strategy = select_strategy(model.item_matrix(), index);
        Self {
            model: Some(model),
            strategy: Some(strategy),
            meta,
        }
    }

    pub fn from_artifacts(artifacts: ModelArtifacts) -> Self {
        Self::new(artifacts.model, artifacts.index, Some(artifacts.meta))
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&EmbeddingModel> {
        self.model.as_ref()
    }

    pub fn meta(&self) -> Option<&ModelMeta> {
        self.meta.as_ref()
    }

    pub fn strategy_kind(&self) -> Option<StrategyKind> {
        self.strategy.as_ref().map(|s| s.kind())
    }

    /// Top `k` items for `user_id` by cosine similarity, best first.
    pub fn recommend(&self, user_id: UserId, k: usize) -> Result<RecommendationResponse> {
        let (Some(model), Some(strategy)) = (self.model.as_ref(), self.strategy.as_ref()) else {
            return Err(RecError::EmbeddingsUnavailable(
                "no embeddings loaded; train a model first".to_string(),
            ));
        };
        if k == 0 {
            return Err(RecError::invalid("k", k, "must be positive"));
        }

        let query = row_to_vec(model.user_vector(user_id)?);
        let item_indices = strategy
            .search(&query, k)?
            .into_iter()
            .map(|scored| scored.item_index)
            .collect();

        Ok(RecommendationResponse {
            user_id,
            k,
            item_indices,
            strategy: strategy.kind(),
            model_trained: model.is_trained(),
        })
    }
}

pub struct ServingService {
    snapshot: RwLock<Arc<ModelSnapshot>>,
    store: ArtifactStore,
    last_error: RwLock<Option<String>>,
    serving_stats: DashMap<String, u64>,
}

impl ServingService {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(ModelSnapshot::empty())),
            store,
            last_error: RwLock::new(None),
            serving_stats: DashMap::new(),
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.store
    }

    /// The snapshot current at the time of the call.
    pub fn snapshot(&self) -> Arc<ModelSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn install(&self, snapshot: ModelSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write() = snapshot;
        *self.last_error.write() = None;
        self.increment_stat("model_updates");
    }

    /// Reads the artifact directory into a new snapshot and swaps it in. On
    /// failure the current snapshot stays in place.
    pub fn reload(&self) -> Result<()> {
        let started = Instant::now();
        match self.store.load() {
            Ok(artifacts) => {
                let snapshot = ModelSnapshot::from_artifacts(artifacts);
                let run_id = snapshot.meta().map(|m| m.run_id);
                let strategy = snapshot.strategy_kind();
                self.install(snapshot);
                info!(
                    "Swapped in model {:?} ({:?} retrieval) in {} ms",
                    run_id,
                    strategy,
                    started.elapsed().as_millis()
                );
                Ok(())
            }
            Err(e) => {
                error!("Reload from {} failed: {}", self.store.dir().display(), e);
                *self.last_error.write() = Some(e.to_string());
                self.increment_stat("reload_failures");
                Err(e)
            }
        }
    }

    pub fn recommend(&self, user_id: UserId, k: usize) -> Result<RecommendationResponse> {
        self.increment_stat("total_requests");
        let start_time = Instant::now();

        let result = self.snapshot().recommend(user_id, k);
        match &result {
            Ok(response) => {
                self.increment_stat("successful_requests");
                debug!(
                    "Recommended {} items to user {} in {:?}",
                    response.item_indices.len(),
                    user_id,
                    start_time.elapsed()
                );
            }
            Err(e) if e.is_not_found() => self.increment_stat("not_found"),
            Err(e) if e.is_unavailable() => self.increment_stat("unavailable"),
            Err(_) => self.increment_stat("failed_requests"),
        }
        self.update_latency_stat(start_time.elapsed().as_micros() as u64);
        result
    }

    pub fn health(&self) -> HealthStatus {
        let snapshot = self.snapshot();
        let model = snapshot.model();
        HealthStatus {
            status: if snapshot.is_loaded() { "ok" } else { "unavailable" }.to_string(),
            index_loaded: snapshot.strategy_kind() == Some(StrategyKind::Indexed),
            item_vectors_loaded: model.is_some(),
            user_vectors_loaded: model.is_some(),
            model_trained: model.map(|m| m.is_trained()),
            last_error: self.last_error.read().clone(),
        }
    }

    pub fn stats(&self) -> HashMap<String, u64> {
        self.serving_stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    fn increment_stat(&self, key: &str) {
        *self.serving_stats.entry(key.to_string()).or_insert(0) += 1;
    }

    fn update_latency_stat(&self, latency_us: u64) {
        let requests = self.serving_stats.get("total_requests").map(|v| *v).unwrap_or(1).max(1);
        let current_avg = self.serving_stats.get("avg_latency_us").map(|v| *v).unwrap_or(0);
        let new_avg = (current_avg * (requests - 1) + latency_us) / requests;
        self.serving_stats.insert("avg_latency_us".to_string(), new_avg);

        let current_max = self.serving_stats.get("max_latency_us").map(|v| *v).unwrap_or(0);
        if latency_us > current_max {
            self.serving_stats.insert("max_latency_us".to_string(), latency_us);
        }
    }
}
