use crate::algorithms::flat_index::FlatIndex;
use crate::algorithms::EmbeddingModel;
use crate::config::ArtifactConfig;
use crate::error::{RecError, Result};
use crate::models::{ModelMeta, TrainParams};
use chrono::Utc;
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const USER_VECS_FILE: &str = "user_vecs.json";
pub const ITEM_VECS_FILE: &str = "item_vecs.json";
pub const MODEL_META_FILE: &str = "model_meta.json";
pub const INDEX_FILE: &str = "retrieval_index.json";
pub const SEARCH_RESULTS_FILE: &str = "search_results.json";

/// A factor table tagged with the run that produced it.
#[derive(Serialize, Deserialize)]
struct FactorTable<T> {
    run_id: Uuid,
    vectors: T,
}

pub struct ModelArtifacts {
    pub model: EmbeddingModel,
    pub meta: ModelMeta,
    pub index: Option<FlatIndex>,
}

/// Metadata record for a freshly produced model.
pub fn describe_model(
    model: &EmbeddingModel,
    params: &TrainParams,
    validation_metrics: BTreeMap<String, f64>,
    has_index: bool,
    trained_on: &str,
) -> ModelMeta {
    let shape = model.shape();
    ModelMeta {
        run_id: Uuid::new_v4(),
        created_at: Utc::now(),
        dim: model.dim(),
        epochs: params.epochs,
        learning_rate: params.learning_rate,
        batch_size: params.batch_size,
        num_users: shape.num_users,
        num_items: shape.num_items,
        index_path: has_index.then(|| INDEX_FILE.to_string()),
        validation_metrics,
        trained: model.is_trained(),
        trained_on: trained_on.to_string(),
    }
}

/// Directory of JSON artifacts shared by the trainer and the server.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &ArtifactConfig) -> Self {
        Self::new(config.dir.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// True when the files needed to serve are all present.
    pub fn has_model(&self) -> bool {
        [USER_VECS_FILE, ITEM_VECS_FILE, MODEL_META_FILE]
            .iter()
            .all(|name| self.path(name).exists())
    }

    /// Writes the factor tables, the optional index and finally the metadata,
    /// so a reader that sees new metadata also sees the matching tables.
    pub fn save(&self, model: &EmbeddingModel, meta: &ModelMeta, index: Option<&FlatIndex>) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| RecError::Storage {
            path: self.dir.clone(),
            source,
        })?;

        self.write_json(
            USER_VECS_FILE,
            &FactorTable {
                run_id: meta.run_id,
                vectors: model.user_matrix(),
            },
        )?;
        self.write_json(
            ITEM_VECS_FILE,
            &FactorTable {
                run_id: meta.run_id,
                vectors: model.item_matrix(),
            },
        )?;
        match index {
            Some(index) => {
                self.write_json(INDEX_FILE, index)?;
            }
            None => self.remove_if_present(INDEX_FILE)?,
        }
        self.write_json(MODEL_META_FILE, meta)?;

        info!(
            "Saved model {} ({}x{} users, {}x{} items, index: {}) to {}",
            meta.run_id,
            model.user_rows(),
            model.dim(),
            model.item_rows(),
            model.dim(),
            index.is_some(),
            self.dir.display()
        );
        Ok(())
    }

    /// Missing files mean nothing has been trained yet; unreadable or
    /// inconsistent files are storage errors. Both factor tables must carry the
    /// run id of the metadata, so a load racing a save never mixes two runs.
    /// A broken index only costs the fast path.
    pub fn load(&self) -> Result<ModelArtifacts> {
        if !self.has_model() {
            return Err(RecError::EmbeddingsUnavailable(format!(
                "no trained model in {}",
                self.dir.display()
            )));
        }

        let meta: ModelMeta = self.read_json(MODEL_META_FILE)?;
        let user_vecs = self.read_table(USER_VECS_FILE, meta.run_id)?;
        let item_vecs = self.read_table(ITEM_VECS_FILE, meta.run_id)?;
        let model = EmbeddingModel::new(user_vecs, item_vecs, meta.trained)?;

        if model.dim() != meta.dim {
            return Err(RecError::DimensionMismatch {
                expected: format!("dim {} from {}", meta.dim, MODEL_META_FILE),
                actual: format!("dim {} in stored vectors", model.dim()),
            });
        }

        let index = if self.path(INDEX_FILE).exists() {
            match self.read_json::<FlatIndex>(INDEX_FILE) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!("Ignoring unreadable retrieval index: {}", e);
                    None
                }
            }
        } else {
            None
        };

        info!(
            "Loaded model {} (dim={}, trained={}, index={}) from {}",
            meta.run_id,
            meta.dim,
            meta.trained,
            index.is_some(),
            self.dir.display()
        );
        Ok(ModelArtifacts { model, meta, index })
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.path(name);
        let bytes = serde_json::to_vec(value).map_err(|source| RecError::CorruptArtifact {
            path: path.clone(),
            source,
        })?;

        // write then rename, so readers never see a half-written file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|source| RecError::Storage {
                path: path.clone(),
                source,
            })?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        let bytes = fs::read(&path).map_err(|source| RecError::Storage {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| RecError::CorruptArtifact { path, source })
    }

    fn read_table(&self, name: &str, run_id: Uuid) -> Result<Array2<f32>> {
        let table: FactorTable<Array2<f32>> = self.read_json(name)?;
        if table.run_id != run_id {
            return Err(RecError::MixedArtifacts {
                path: self.path(name),
                expected: run_id,
                found: table.run_id,
            });
        }
        Ok(table.vectors)
    }

    fn remove_if_present(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed stale {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RecError::Storage { path, source }),
        }
    }
}
