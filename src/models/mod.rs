use crate::config::OptimizerKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type UserId = usize;
pub type ItemId = usize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: ItemId,
    pub category: Option<String>,
    pub price: Option<f64>,
}

/// Implicit signal behind an interaction, ordered by strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Click,
    CartAdd,
    Purchase,
}

impl InteractionKind {
    pub fn weight(&self) -> f32 {
        match self {
            InteractionKind::View => 1.0,
            InteractionKind::Click => 2.0,
            InteractionKind::CartAdd => 3.0,
            InteractionKind::Purchase => 4.0,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "view" | "visto" => Some(InteractionKind::View),
            "click" | "clic" => Some(InteractionKind::Click),
            "cart_add" | "add_to_cart" | "agregado_al_carrito" => Some(InteractionKind::CartAdd),
            "purchase" | "compra" => Some(InteractionKind::Purchase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Click => "click",
            InteractionKind::CartAdd => "cart_add",
            InteractionKind::Purchase => "purchase",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub weight: f32,
    /// Unix seconds. Only used for temporal splitting.
    pub timestamp: i64,
}

impl Interaction {
    pub fn new(user_id: UserId, item_id: ItemId, weight: f32, timestamp: i64) -> Self {
        Self {
            user_id,
            item_id,
            weight,
            timestamp,
        }
    }

    pub fn from_kind(user_id: UserId, item_id: ItemId, kind: InteractionKind, timestamp: i64) -> Self {
        Self::new(user_id, item_id, kind.weight(), timestamp)
    }
}

/// Largest user and item ids a factor matrix must address. Row 0 is reserved,
/// so the matrices have `num_users + 1` and `num_items + 1` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixShape {
    pub num_users: usize,
    pub num_items: usize,
}

impl MatrixShape {
    pub fn new(num_users: usize, num_items: usize) -> Self {
        Self {
            num_users,
            num_items,
        }
    }

    pub fn from_interactions(interactions: &[Interaction]) -> Self {
        let num_users = interactions.iter().map(|i| i.user_id).max().unwrap_or(0);
        let num_items = interactions.iter().map(|i| i.item_id).max().unwrap_or(0);
        Self::new(num_users, num_items)
    }

    pub fn user_rows(&self) -> usize {
        self.num_users + 1
    }

    pub fn item_rows(&self) -> usize {
        self.num_items + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    pub dim: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
    pub optimizer: OptimizerKind,
}

impl TrainParams {
    pub fn new(dim: usize, learning_rate: f64, epochs: usize, batch_size: usize) -> Self {
        Self {
            dim,
            learning_rate,
            epochs,
            batch_size,
            seed: 42,
            optimizer: OptimizerKind::Adam,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epoch_losses: Vec<f64>,
    pub examples: usize,
    pub skipped_out_of_range: usize,
    pub elapsed_ms: u64,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metrics: BTreeMap<String, f64>,
    pub users_evaluated: usize,
    pub users_skipped: usize,
}

impl EvaluationReport {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Exact,
    Indexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_index: ItemId,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub dim: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub num_users: usize,
    pub num_items: usize,
    pub index_path: Option<String>,
    pub validation_metrics: BTreeMap<String, f64>,
    pub trained: bool,
    pub trained_on: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub index_loaded: bool,
    pub item_vectors_loaded: bool,
    pub user_vectors_loaded: bool,
    pub model_trained: Option<bool>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: UserId,
    pub k: usize,
    pub item_indices: Vec<ItemId>,
    pub strategy: StrategyKind,
    pub model_trained: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialConfig {
    pub dim: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
}

impl TrialConfig {
    pub fn to_params(&self, seed: u64, optimizer: OptimizerKind) -> TrainParams {
        TrainParams::new(self.dim, self.learning_rate, self.epochs, self.batch_size)
            .with_seed(seed)
            .with_optimizer(optimizer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: usize,
    pub config: TrialConfig,
    pub objective: f64,
    pub metrics: BTreeMap<String, f64>,
    pub final_train_loss: Option<f64>,
}
