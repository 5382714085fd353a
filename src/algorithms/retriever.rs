use super::flat_index::FlatIndex;
use crate::error::{RecError, Result};
use crate::models::{ScoredItem, StrategyKind};
use crate::utils::{cosine_scores, normalize_rows, normalize_vector_copy, top_k_scored};
use ndarray::Array2;
use tracing::{info, warn};

/// Top-k cosine search over the item table. Both implementations normalise
/// and score the same way, so they return identical results.
pub trait RetrievalStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scores every item row.
#[derive(Debug, Clone)]
pub struct ExactBruteForce {
    normalized: Array2<f32>,
}

impl ExactBruteForce {
    pub fn new(item_vecs: &Array2<f32>) -> Self {
        Self {
            normalized: normalize_rows(item_vecs),
        }
    }

    pub fn scores(&self, query: &[f32]) -> Result<Vec<f32>> {
        if query.len() != self.normalized.ncols() {
            return Err(RecError::DimensionMismatch {
                expected: self.normalized.ncols().to_string(),
                actual: query.len().to_string(),
            });
        }
        Ok(cosine_scores(self.normalized.view(), &normalize_vector_copy(query)))
    }
}

impl RetrievalStrategy for ExactBruteForce {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Exact
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>> {
        Ok(top_k_scored(&self.scores(query)?, k)
            .into_iter()
            .map(|(item_index, score)| ScoredItem { item_index, score })
            .collect())
    }

    fn len(&self) -> usize {
        self.normalized.nrows()
    }
}

/// Answers from a prebuilt, persisted [`FlatIndex`].
#[derive(Debug, Clone)]
pub struct ApproximateIndexed {
    index: FlatIndex,
}

impl ApproximateIndexed {
    pub fn new(index: FlatIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }
}

impl RetrievalStrategy for ApproximateIndexed {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Indexed
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>> {
        self.index.search(query, k)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Uses the index when it was built from exactly `item_vecs`, otherwise falls
/// back to brute force and says so.
pub fn select_strategy(item_vecs: &Array2<f32>, index: Option<FlatIndex>) -> Box<dyn RetrievalStrategy> {
    match index {
        Some(index) if index.is_built_from(item_vecs) => {
            info!("Using indexed retrieval over {} items", index.len());
            Box::new(ApproximateIndexed::new(index))
        }
        Some(index) => {
            warn!(
                "Retrieval index is stale ({} items, dim {}; item matrix is {}x{}), falling back to brute force",
                index.len(),
                index.dim(),
                item_vecs.nrows(),
                item_vecs.ncols()
            );
            Box::new(ExactBruteForce::new(item_vecs))
        }
        None => {
            warn!("No retrieval index available, falling back to brute force");
            Box::new(ExactBruteForce::new(item_vecs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn items() -> Array2<f32> {
        array![
            [0.0f32, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [2.0, 0.0],
            [0.7, 0.7],
        ]
    }

    #[test]
    fn test_brute_force_ranks_by_cosine_with_index_ties() {
        let strategy = ExactBruteForce::new(&items());
        let results = strategy.search(&[1.0, 0.0], 3).unwrap();
        let order: Vec<usize> = results.iter().map(|s| s.item_index).collect();
        // items 1 and 3 tie at cosine 1
        assert_eq!(order, vec![1, 3, 4]);
        assert_eq!(strategy.kind(), StrategyKind::Exact);
        assert_eq!(strategy.search(&[1.0, 0.0], 50).unwrap().len(), 5);
    }

    #[test]
    fn test_strategies_agree() {
        let items = items();
        let index = FlatIndex::build(items.view(), 2).unwrap();
        let exact = ExactBruteForce::new(&items);
        let indexed = ApproximateIndexed::new(index);
        for query in [[1.0f32, 0.1], [-0.3, 0.9], [0.5, 0.5], [0.0, 0.0]] {
            assert_eq!(exact.search(&query, 3).unwrap(), indexed.search(&query, 3).unwrap());
        }
    }

    #[test]
    fn test_select_strategy_falls_back() {
        let items = items();
        assert_eq!(select_strategy(&items, None).kind(), StrategyKind::Exact);

        let index = FlatIndex::build(items.view(), 2).unwrap();
        assert_eq!(
            select_strategy(&items, Some(index.clone())).kind(),
            StrategyKind::Indexed
        );

        let mut retrained = items.clone();
        retrained[[1, 1]] = 0.5;
        assert_eq!(select_strategy(&retrained, Some(index)).kind(), StrategyKind::Exact);
    }

    #[test]
    fn test_query_dimension_is_checked() {
        let strategy = ExactBruteForce::new(&items());
        assert!(matches!(
            strategy.search(&[1.0, 0.0, 0.0], 2),
            Err(RecError::DimensionMismatch { .. })
        ));
    }
}
