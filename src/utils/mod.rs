use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::cmp::Ordering;

pub mod metrics;
pub mod validation;

/// Added to every norm so all-zero vectors normalise to zero instead of NaN.
pub const NORM_EPSILON: f32 = 1e-8;

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn normalize_vector(vector: &mut [f32]) {
    let norm = l2_norm(vector) + NORM_EPSILON;
    for x in vector.iter_mut() {
        *x /= norm;
    }
}

pub fn normalize_vector_copy(vector: &[f32]) -> Vec<f32> {
    let mut normalized = vector.to_vec();
    normalize_vector(&mut normalized);
    normalized
}

/// Row-wise L2 normalisation with the epsilon guard.
pub fn normalize_rows(matrix: &Array2<f32>) -> Array2<f32> {
    let mut normalized = matrix.clone();
    for mut row in normalized.axis_iter_mut(Axis(0)) {
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
        row.mapv_inplace(|x| x / norm);
    }
    normalized
}

/// Dot product of `query` with every row. Both sides are expected to be
/// normalised already, which makes this the cosine similarity.
pub fn cosine_scores(normalized: ArrayView2<'_, f32>, query: &[f32]) -> Vec<f32> {
    normalized
        .rows()
        .into_iter()
        .map(|row| match row.as_slice() {
            Some(slice) => dot(query, slice),
            None => row.iter().zip(query).map(|(a, b)| a * b).sum(),
        })
        .collect()
}

pub fn row_to_vec(row: ArrayView1<'_, f32>) -> Vec<f32> {
    row.iter().copied().collect()
}

/// Descending by score, ties broken by ascending index. `-0.0` and `0.0`
/// count as equal scores.
pub fn rank_order(a: (usize, f32), b: (usize, f32)) -> Ordering {
    (b.1 + 0.0).total_cmp(&(a.1 + 0.0)).then(a.0.cmp(&b.0))
}

/// Full ranking of `scores` (best first).
pub fn rank_indices(scores: &[f32]) -> Vec<usize> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| rank_order(*a, *b));
    indexed.into_iter().map(|(i, _)| i).collect()
}

pub fn top_k_scored(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    let k = k.min(indexed.len());
    if k == 0 {
        return Vec::new();
    }
    if k < indexed.len() {
        indexed.select_nth_unstable_by(k - 1, |a, b| rank_order(*a, *b));
        indexed.truncate(k);
    }
    indexed.sort_by(|a, b| rank_order(*a, *b));
    indexed
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the shape and the little-endian bits of every value.
/// Persisted next to derived structures, so the algorithm must not change.
pub fn matrix_fingerprint(matrix: &Array2<f32>) -> u64 {
    let (rows, cols) = matrix.dim();
    let header = (rows as u64)
        .to_le_bytes()
        .into_iter()
        .chain((cols as u64).to_le_bytes());
    let values = matrix.iter().flat_map(|v| v.to_bits().to_le_bytes());
    header.chain(values).fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dot() {
        assert_eq!(dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
    }

    #[test]
    fn test_normalize_vector() {
        let mut v = vec![3.0, 4.0];
        normalize_vector(&mut v);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);

        let zero = normalize_vector_copy(&[0.0, 0.0]);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_normalize_rows() {
        let m = array![[3.0f32, 4.0], [0.0, 0.0]];
        let n = normalize_rows(&m);
        assert!((n[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((n[[0, 1]] - 0.8).abs() < 1e-6);
        assert_eq!(n[[1, 0]], 0.0);
    }

    #[test]
    fn test_top_k_scored() {
        let scores = vec![0.1, 0.5, 0.3, 0.9, 0.2];
        assert_eq!(top_k_scored(&scores, 2), vec![(3, 0.9), (1, 0.5)]);
        assert_eq!(top_k_scored(&scores, 10).len(), 5);
        assert!(top_k_scored(&scores, 0).is_empty());
    }

    #[test]
    fn test_ties_break_by_ascending_index() {
        let scores = vec![0.5, 0.9, 0.5, 0.9, 0.5];
        let top: Vec<usize> = top_k_scored(&scores, 3).into_iter().map(|(i, _)| i).collect();
        assert_eq!(top, vec![1, 3, 0]);
        assert_eq!(rank_indices(&scores), vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_signed_zero_scores_tie() {
        let scores = vec![-0.0f32, 0.0, -0.0, 0.0];
        assert_eq!(rank_indices(&scores), vec![0, 1, 2, 3]);
        let top: Vec<usize> = top_k_scored(&scores, 2).into_iter().map(|(i, _)| i).collect();
        assert_eq!(top, vec![0, 1]);
    }

    #[test]
    fn test_cosine_scores() {
        let m = array![[1.0f32, 0.0], [0.6, 0.8]];
        assert_eq!(cosine_scores(m.view(), &[0.0, 1.0]), vec![0.0, 0.8]);
    }

    #[test]
    fn test_fingerprint_is_pinned() {
        let m = array![[1.0f32, 2.0], [3.0, 4.0]];
        assert_eq!(matrix_fingerprint(&m), 0x3f88_de06_5db9_6918);
        assert_ne!(matrix_fingerprint(&m), matrix_fingerprint(&m.t().to_owned()));
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = array![[1.0f32, 2.0], [3.0, 4.0]];
        let mut b = a.clone();
        assert_eq!(matrix_fingerprint(&a), matrix_fingerprint(&b));
        b[[1, 1]] = 4.5;
        assert_ne!(matrix_fingerprint(&a), matrix_fingerprint(&b));
    }
}
