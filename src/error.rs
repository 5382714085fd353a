use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("user {user_id} is out of range (learned user rows: {rows})")]
    UserOutOfRange { user_id: usize, rows: usize },

    #[error("item {item_id} is out of range (learned item rows: {rows})")]
    ItemOutOfRange { item_id: usize, rows: usize },

    #[error("embeddings unavailable: {0}")]
    EmbeddingsUnavailable(String),

    #[error("invalid hyperparameter {name}={value}: {constraint}")]
    InvalidHyperparameter {
        name: String,
        value: String,
        constraint: String,
    },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    #[error("missing input file {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("malformed data in {}: {message}", path.display())]
    MalformedData { path: PathBuf, message: String },

    #[error("storage error at {}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {} is corrupt", path.display())]
    CorruptArtifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact {} belongs to run {found}, expected run {expected}", path.display())]
    MixedArtifacts {
        path: PathBuf,
        expected: uuid::Uuid,
        found: uuid::Uuid,
    },

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, RecError>;

impl RecError {
    pub fn invalid(name: &str, value: impl ToString, constraint: &str) -> Self {
        Self::InvalidHyperparameter {
            name: name.to_string(),
            value: value.to_string(),
            constraint: constraint.to_string(),
        }
    }

    /// Unknown user or item at lookup time.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UserOutOfRange { .. } | Self::ItemOutOfRange { .. })
    }

    /// Nothing has been trained (or loaded) yet.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::EmbeddingsUnavailable(_))
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidHyperparameter { .. } | Self::DimensionMismatch { .. }
        )
    }
}
