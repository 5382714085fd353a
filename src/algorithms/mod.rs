pub mod evaluator;
pub mod flat_index;
pub mod initializer;
pub mod optimizer;
pub mod retriever;
pub mod trainer;

use crate::error::{RecError, Result};
use crate::models::{ItemId, MatrixShape, UserId};
use crate::utils::{dot, validation::validate_factor_matrices};
use ndarray::{Array2, ArrayView1, ArrayView2};

/// Two-tower latent factor model: one row per user id and per item id, scored
/// by inner product. Once built it is only ever read.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingModel {
    user_vecs: Array2<f32>,
    item_vecs: Array2<f32>,
    trained: bool,
}

impl EmbeddingModel {
    pub fn new(user_vecs: Array2<f32>, item_vecs: Array2<f32>, trained: bool) -> Result<Self> {
        validate_factor_matrices(&user_vecs, &item_vecs)?;
        Ok(Self {
            user_vecs,
            item_vecs,
            trained,
        })
    }

    pub fn dim(&self) -> usize {
        self.user_vecs.ncols()
    }

    pub fn user_rows(&self) -> usize {
        self.user_vecs.nrows()
    }

    pub fn item_rows(&self) -> usize {
        self.item_vecs.nrows()
    }

    /// Largest addressable ids, i.e. rows minus the reserved slot.
    pub fn shape(&self) -> MatrixShape {
        MatrixShape::new(
            self.user_rows().saturating_sub(1),
            self.item_rows().saturating_sub(1),
        )
    }

    /// False when the factors come from the seeded fallback and were never fitted.
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn user_vectors(&self) -> ArrayView2<'_, f32> {
        self.user_vecs.view()
    }

    pub fn item_vectors(&self) -> ArrayView2<'_, f32> {
        self.item_vecs.view()
    }

    pub fn user_matrix(&self) -> &Array2<f32> {
        &self.user_vecs
    }

    pub fn item_matrix(&self) -> &Array2<f32> {
        &self.item_vecs
    }

    pub fn user_vector(&self, user_id: UserId) -> Result<ArrayView1<'_, f32>> {
        if user_id >= self.user_rows() {
            return Err(RecError::UserOutOfRange {
                user_id,
                rows: self.user_rows(),
            });
        }
        Ok(self.user_vecs.row(user_id))
    }

    pub fn item_vector(&self, item_id: ItemId) -> Result<ArrayView1<'_, f32>> {
        if item_id >= self.item_rows() {
            return Err(RecError::ItemOutOfRange {
                item_id,
                rows: self.item_rows(),
            });
        }
        Ok(self.item_vecs.row(item_id))
    }

    pub fn score(&self, user_id: UserId, item_id: ItemId) -> Result<f32> {
        let user = self.user_vector(user_id)?;
        let item = self.item_vector(item_id)?;
        Ok(user.dot(&item))
    }

    /// Scores of one user against every item row.
    pub fn score_all(&self, user_id: UserId) -> Result<Vec<f32>> {
        let user = self.user_vector(user_id)?;
        Ok(self
            .item_vecs
            .rows()
            .into_iter()
            .map(|item| match (user.as_slice(), item.as_slice()) {
                (Some(u), Some(i)) => dot(u, i),
                _ => user.dot(&item),
            })
            .collect())
    }
}
