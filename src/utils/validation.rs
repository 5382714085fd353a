use crate::config::SearchSpace;
use crate::error::{RecError, Result};
use crate::models::{Interaction, TrainParams};
use ndarray::Array2;

const MAX_EMBEDDING_DIM: usize = 2048;

pub fn validate_train_params(params: &TrainParams) -> Result<()> {
    if params.dim == 0 || params.dim > MAX_EMBEDDING_DIM {
        return Err(RecError::invalid(
            "dim",
            params.dim,
            &format!("must be in 1..={}", MAX_EMBEDDING_DIM),
        ));
    }

    if !params.learning_rate.is_finite() || params.learning_rate <= 0.0 {
        return Err(RecError::invalid(
            "learning_rate",
            params.learning_rate,
            "must be a positive finite number",
        ));
    }

    if params.batch_size == 0 {
        return Err(RecError::invalid("batch_size", params.batch_size, "must be positive"));
    }

    Ok(())
}

pub fn validate_split_fraction(fraction: f64) -> Result<()> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(RecError::invalid(
            "validation_fraction",
            fraction,
            "must be strictly between 0 and 1",
        ));
    }
    Ok(())
}

pub fn validate_k_list(k_list: &[usize]) -> Result<()> {
    if k_list.is_empty() {
        return Err(RecError::invalid("k_list", "[]", "needs at least one cutoff"));
    }
    if k_list.contains(&0) {
        return Err(RecError::invalid("k_list", format!("{:?}", k_list), "cutoffs must be positive"));
    }
    Ok(())
}

pub fn validate_search_space(space: &SearchSpace) -> Result<()> {
    if space.dim_min == 0 || space.dim_min > space.dim_max {
        return Err(RecError::invalid(
            "search.space.dim",
            format!("{}..{}", space.dim_min, space.dim_max),
            "needs 0 < min <= max",
        ));
    }
    if space.dim_step == 0 {
        return Err(RecError::invalid("search.space.dim_step", 0, "must be positive"));
    }
    if !(space.learning_rate_min > 0.0 && space.learning_rate_min <= space.learning_rate_max) {
        return Err(RecError::invalid(
            "search.space.learning_rate",
            format!("{}..{}", space.learning_rate_min, space.learning_rate_max),
            "needs 0 < min <= max",
        ));
    }
    if space.epochs_min > space.epochs_max {
        return Err(RecError::invalid(
            "search.space.epochs",
            format!("{}..{}", space.epochs_min, space.epochs_max),
            "needs min <= max",
        ));
    }
    if space.batch_sizes.is_empty() || space.batch_sizes.contains(&0) {
        return Err(RecError::invalid(
            "search.space.batch_sizes",
            format!("{:?}", space.batch_sizes),
            "needs at least one positive batch size",
        ));
    }
    Ok(())
}

pub fn validate_interaction(interaction: &Interaction) -> std::result::Result<(), String> {
    if !interaction.weight.is_finite() {
        return Err(format!(
            "weight for user {} item {} is not finite",
            interaction.user_id, interaction.item_id
        ));
    }
    if interaction.weight <= 0.0 {
        return Err(format!(
            "weight for user {} item {} must be positive, got {}",
            interaction.user_id, interaction.item_id, interaction.weight
        ));
    }
    Ok(())
}

/// Factor matrices read back from storage must be finite and agree on `dim`.
pub fn validate_factor_matrices(user_vecs: &Array2<f32>, item_vecs: &Array2<f32>) -> Result<()> {
    if user_vecs.ncols() != item_vecs.ncols() {
        return Err(RecError::DimensionMismatch {
            expected: format!("user dim {}", user_vecs.ncols()),
            actual: format!("item dim {}", item_vecs.ncols()),
        });
    }
    validate_finite(user_vecs, "user_vecs")?;
    validate_finite(item_vecs, "item_vecs")
}

pub fn validate_finite(matrix: &Array2<f32>, name: &str) -> Result<()> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(RecError::invalid(name, "matrix", "contains NaN or infinite values"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_validate_train_params() {
        assert!(validate_train_params(&TrainParams::new(8, 0.01, 5, 32)).is_ok());
        assert!(validate_train_params(&TrainParams::new(0, 0.01, 5, 32)).is_err());
        assert!(validate_train_params(&TrainParams::new(8, 0.0, 5, 32)).is_err());
        assert!(validate_train_params(&TrainParams::new(8, f64::NAN, 5, 32)).is_err());
        assert!(validate_train_params(&TrainParams::new(8, 0.01, 5, 0)).is_err());
    }

    #[test]
    fn test_validate_split_fraction() {
        assert!(validate_split_fraction(0.2).is_ok());
        assert!(validate_split_fraction(0.0).is_err());
        assert!(validate_split_fraction(1.0).is_err());
    }

    #[test]
    fn test_validate_interaction() {
        assert!(validate_interaction(&Interaction::new(1, 2, 3.0, 0)).is_ok());
        assert!(validate_interaction(&Interaction::new(1, 2, -1.0, 0)).is_err());
        assert!(validate_interaction(&Interaction::new(1, 2, f32::NAN, 0)).is_err());
    }

    #[test]
    fn test_validate_factor_matrices() {
        let users = Array2::<f32>::zeros((3, 4));
        let items = Array2::<f32>::zeros((5, 4));
        assert!(validate_factor_matrices(&users, &items).is_ok());

        let narrow = Array2::<f32>::zeros((5, 3));
        assert!(validate_factor_matrices(&users, &narrow).is_err());

        let mut bad = items.clone();
        bad[[2, 1]] = f32::INFINITY;
        assert!(validate_factor_matrices(&users, &bad).is_err());
    }

    #[test]
    fn test_validate_search_space() {
        assert!(validate_search_space(&SearchSpace::default()).is_ok());
        let mut space = SearchSpace::default();
        space.batch_sizes.clear();
        assert!(validate_search_space(&space).is_err());
    }
}
