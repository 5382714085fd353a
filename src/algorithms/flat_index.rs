//! Exact inner-product index over L2-normalised item vectors.
//!
//! The normalised table is stored once, so serving skips the normalisation
//! pass, and queries scan it in row partitions on the rayon pool. Each
//! partition keeps its own top-k; merging them gives exactly the brute-force
//! ranking. The index remembers a fingerprint of the matrix it was built
//! from; [`FlatIndex::is_built_from`] detects a stale index after retraining.

use crate::error::{RecError, Result};
use crate::models::ScoredItem;
use crate::utils::{cosine_scores, matrix_fingerprint, normalize_rows, normalize_vector_copy, rank_order, top_k_scored};
use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    vectors: Array2<f32>,
    partition_rows: usize,
    source_fingerprint: u64,
}

impl FlatIndex {
    pub fn build(item_vecs: ArrayView2<'_, f32>, partition_rows: usize) -> Result<Self> {
        if partition_rows == 0 {
            return Err(RecError::invalid("partition_rows", partition_rows, "must be positive"));
        }
        let owned = item_vecs.to_owned();
        Ok(Self {
            vectors: normalize_rows(&owned),
            partition_rows,
            source_fingerprint: matrix_fingerprint(&owned),
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn partition_rows(&self) -> usize {
        self.partition_rows
    }

    pub fn source_fingerprint(&self) -> u64 {
        self.source_fingerprint
    }

    /// True when the index was built from exactly this item matrix.
    pub fn is_built_from(&self, item_vecs: &Array2<f32>) -> bool {
        self.len() == item_vecs.nrows()
            && self.dim() == item_vecs.ncols()
            && self.source_fingerprint == matrix_fingerprint(item_vecs)
    }

    /// Top `k` items by cosine similarity to `query`, best first, ties by
    /// ascending item index.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>> {
        if query.len() != self.dim() {
            return Err(RecError::DimensionMismatch {
                expected: self.dim().to_string(),
                actual: query.len().to_string(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = normalize_vector_copy(query);
        let partitions = self.len().div_ceil(self.partition_rows);
        let mut found: Vec<(usize, f32)> = (0..partitions)
            .into_par_iter()
            .flat_map_iter(|part| {
                let start = part * self.partition_rows;
                let end = (start + self.partition_rows).min(self.len());
                let scores = cosine_scores(self.vectors.slice(s![start..end, ..]), &query);
                top_k_scored(&scores, k)
                    .into_iter()
                    .map(move |(offset, score)| (start + offset, score))
            })
            .collect();

        found.sort_by(|a, b| rank_order(*a, *b));
        found.truncate(k);
        Ok(found
            .into_iter()
            .map(|(item_index, score)| ScoredItem { item_index, score })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::initializer::standard_normal;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_simple_fn((rows, cols), || standard_normal(&mut rng))
    }

    fn brute_force(items: &Array2<f32>, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let scores = cosine_scores(normalize_rows(items).view(), &normalize_vector_copy(query));
        top_k_scored(&scores, k)
    }

    #[test]
    fn test_partitioned_search_matches_full_scan() {
        let items = random_matrix(20_000, 32, 1);
        let index = FlatIndex::build(items.view(), 1024).unwrap();
        assert_eq!(index.len(), 20_000);

        for seed in 0..25 {
            let query = random_matrix(1, 32, 100 + seed).row(0).to_vec();
            let found: Vec<(usize, f32)> = index
                .search(&query, 10)
                .unwrap()
                .into_iter()
                .map(|s| (s.item_index, s.score))
                .collect();
            assert_eq!(found, brute_force(&items, &query, 10), "query seed {}", seed);
        }
    }

    #[test]
    fn test_partition_size_does_not_change_results() {
        let items = random_matrix(97, 8, 2);
        let query = random_matrix(1, 8, 3).row(0).to_vec();
        let reference = FlatIndex::build(items.view(), 97).unwrap().search(&query, 15).unwrap();
        for partition_rows in [1, 7, 50, 1000] {
            let index = FlatIndex::build(items.view(), partition_rows).unwrap();
            assert_eq!(index.search(&query, 15).unwrap(), reference, "partition_rows {}", partition_rows);
        }
    }

    #[test]
    fn test_ties_across_partitions_break_by_index() {
        let items = ndarray::array![[0.0f32, 1.0], [1.0, 0.0], [0.0, 1.0], [2.0, 0.0], [0.0, 3.0]];
        let index = FlatIndex::build(items.view(), 2).unwrap();
        let order: Vec<usize> = index
            .search(&[0.0, 1.0], 3)
            .unwrap()
            .iter()
            .map(|s| s.item_index)
            .collect();
        assert_eq!(order, vec![0, 2, 4]);
    }

    #[test]
    fn test_tracks_source_matrix() {
        let items = random_matrix(40, 4, 3);
        let index = FlatIndex::build(items.view(), 16).unwrap();
        assert!(index.is_built_from(&items));

        let mut changed = items.clone();
        changed[[0, 0]] += 1.0;
        assert!(!index.is_built_from(&changed));
    }

    #[test]
    fn test_search_edge_cases() {
        let empty = Array2::<f32>::zeros((0, 3));
        let index = FlatIndex::build(empty.view(), 16).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());

        let items = random_matrix(3, 3, 4);
        let index = FlatIndex::build(items.view(), 16).unwrap();
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).unwrap().len(), 3);
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(RecError::DimensionMismatch { .. })
        ));
        assert!(FlatIndex::build(items.view(), 0).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_serde_round_trip_keeps_results() {
        let items = random_matrix(25, 6, 5);
        let index = FlatIndex::build(items.view(), 8).unwrap();
        let json = serde_json::to_string(&index).unwrap();
        let restored: FlatIndex = serde_json::from_str(&json).unwrap();
        let query = [0.3, -0.2, 0.9, 0.0, 0.1, 0.5];
        assert_eq!(index.search(&query, 4).unwrap(), restored.search(&query, 4).unwrap());
        assert!(restored.is_built_from(&items));
    }
}
