use crate::models::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ranking quality of one user's full ranking against their held-out items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetrics {
    /// `(k, recall@k)` in the order of the calculator's cutoffs.
    pub recall: Vec<(usize, f64)>,
    pub ndcg: Vec<(usize, f64)>,
    pub reciprocal_rank: f64,
}

#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    k_list: Vec<usize>,
}

impl MetricsCalculator {
    pub fn new(k_list: &[usize]) -> Self {
        Self {
            k_list: k_list.to_vec(),
        }
    }

    pub fn k_list(&self) -> &[usize] {
        &self.k_list
    }

    /// Users with no relevant items score zero on every metric.
    pub fn score_user(&self, ranking: &[ItemId], relevant: &HashSet<ItemId>) -> UserMetrics {
        UserMetrics {
            recall: self
                .k_list
                .iter()
                .map(|&k| (k, recall_at_k(ranking, relevant, k)))
                .collect(),
            ndcg: self
                .k_list
                .iter()
                .map(|&k| (k, ndcg_at_k(ranking, relevant, k)))
                .collect(),
            reciprocal_rank: reciprocal_rank(ranking, relevant),
        }
    }
}

pub fn recall_at_k(ranking: &[ItemId], relevant: &HashSet<ItemId>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }

    let hits = ranking
        .iter()
        .take(k)
        .filter(|item| relevant.contains(item))
        .count();

    hits as f64 / relevant.len() as f64
}

pub fn ndcg_at_k(ranking: &[ItemId], relevant: &HashSet<ItemId>, k: usize) -> f64 {
    let idcg = ideal_dcg(relevant.len(), k);
    if idcg == 0.0 {
        0.0
    } else {
        dcg_at_k(ranking, relevant, k) / idcg
    }
}

fn dcg_at_k(ranking: &[ItemId], relevant: &HashSet<ItemId>, k: usize) -> f64 {
    ranking
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, item)| relevant.contains(item))
        .map(|(rank, _)| 1.0 / ((rank + 2) as f64).log2())
        .sum()
}

fn ideal_dcg(num_relevant: usize, k: usize) -> f64 {
    (0..num_relevant.min(k))
        .map(|rank| 1.0 / ((rank + 2) as f64).log2())
        .sum()
}

/// 1 / (1-indexed position of the first relevant item), 0 when none appears.
pub fn reciprocal_rank(ranking: &[ItemId], relevant: &HashSet<ItemId>) -> f64 {
    ranking
        .iter()
        .position(|item| relevant.contains(item))
        .map(|pos| 1.0 / (pos + 1) as f64)
        .unwrap_or(0.0)
}
