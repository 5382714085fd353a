use crate::data::ground_truth;
use crate::error::{RecError, Result};
use crate::models::{EvaluationReport, Interaction, ItemId};
use crate::utils::metrics::{MetricsCalculator, UserMetrics};
use crate::utils::validation::validate_k_list;
use crate::utils::{normalize_rows, normalize_vector_copy, rank_indices, row_to_vec};
use ndarray::ArrayView2;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

pub fn recall_key(k: usize) -> String {
    format!("recall@{}", k)
}

pub fn ndcg_key(k: usize) -> String {
    format!("ndcg@{}", k)
}

pub const MRR_KEY: &str = "mrr";

/// Every metric name `evaluate` reports for these cutoffs.
pub fn metric_names(k_list: &[usize]) -> Vec<String> {
    let mut names: Vec<String> = k_list.iter().map(|&k| recall_key(k)).collect();
    names.extend(k_list.iter().map(|&k| ndcg_key(k)));
    names.push(MRR_KEY.to_string());
    names
}

/// Ranks every item for each validation user by cosine similarity and averages
/// Recall@K, NDCG@K and MRR over the users that have a row in `user_vecs`.
///
/// Held-out items without a row in `item_vecs` cannot be ranked and are
/// dropped from that user's ground truth; the user is still counted.
pub fn evaluate(
    user_vecs: ArrayView2<'_, f32>,
    item_vecs: ArrayView2<'_, f32>,
    validation: &[Interaction],
    k_list: &[usize],
) -> Result<EvaluationReport> {
    validate_k_list(k_list)?;
    if user_vecs.ncols() != item_vecs.ncols() {
        return Err(RecError::DimensionMismatch {
            expected: format!("user dim {}", user_vecs.ncols()),
            actual: format!("item dim {}", item_vecs.ncols()),
        });
    }

    let names = metric_names(k_list);
    let truth = ground_truth(validation);
    if truth.is_empty() {
        warn!("Validation set is empty; reporting zero metrics");
        return Ok(EvaluationReport {
            metrics: names.into_iter().map(|name| (name, 0.0)).collect(),
            users_evaluated: 0,
            users_skipped: 0,
        });
    }

    let items = normalize_rows(&item_vecs.to_owned());
    let item_rows = items.nrows();
    let calculator = MetricsCalculator::new(k_list);
    let users: Vec<_> = truth.into_iter().collect();

    let per_user: Vec<Option<UserMetrics>> = users
        .par_iter()
        .map(|(user_id, held_out)| {
            if *user_id >= user_vecs.nrows() {
                return None;
            }
            let query = normalize_vector_copy(&row_to_vec(user_vecs.row(*user_id)));
            let scores = items.dot(&ndarray::ArrayView1::from(&query[..]));
            let ranking: Vec<ItemId> = match scores.as_slice() {
                Some(slice) => rank_indices(slice),
                None => rank_indices(&scores.to_vec()),
            };
            let relevant: HashSet<ItemId> = held_out.iter().copied().filter(|&i| i < item_rows).collect();
            Some(calculator.score_user(&ranking, &relevant))
        })
        .collect();

    let mut sums: BTreeMap<String, f64> = names.iter().map(|name| (name.clone(), 0.0)).collect();
    let mut evaluated = 0usize;
    let mut skipped = 0usize;
    for metrics in per_user {
        let Some(metrics) = metrics else {
            skipped += 1;
            continue;
        };
        evaluated += 1;
        for (k, value) in &metrics.recall {
            *sums.entry(recall_key(*k)).or_default() += value;
        }
        for (k, value) in &metrics.ndcg {
            *sums.entry(ndcg_key(*k)).or_default() += value;
        }
        *sums.entry(MRR_KEY.to_string()).or_default() += metrics.reciprocal_rank;
    }

    if skipped > 0 {
        warn!("Skipped {} validation users without a learned vector", skipped);
    }

    let metrics = sums
        .into_iter()
        .map(|(name, total)| {
            let mean = if evaluated == 0 { 0.0 } else { total / evaluated as f64 };
            (name, mean)
        })
        .collect();

    let report = EvaluationReport {
        metrics,
        users_evaluated: evaluated,
        users_skipped: skipped,
    };
    info!(
        "Evaluated {} users ({} skipped): {:?}",
        report.users_evaluated, report.users_skipped, report.metrics
    );
    Ok(report)
}
