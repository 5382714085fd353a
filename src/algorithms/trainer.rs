use super::initializer::{EmbeddingInitializer, InitializationMethod};
use super::optimizer::build_optimizer;
use super::EmbeddingModel;
use crate::config::TrainerBackend;
use crate::error::{RecError, Result};
use crate::models::{Interaction, MatrixShape, TrainParams, TrainingReport};
use crate::utils::validation::validate_train_params;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Fits an [`EmbeddingModel`] to interaction weights with mini-batch gradient
/// descent on the squared error of `score(u, i)`.
#[derive(Debug, Clone, Copy)]
pub struct Trainer {
    backend: TrainerBackend,
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new(TrainerBackend::Gradient)
    }
}

impl Trainer {
    pub fn new(backend: TrainerBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> TrainerBackend {
        self.backend
    }

    /// Trains fresh factors of the given shape. Rows whose ids fall outside
    /// the shape are skipped and counted in the report.
    pub fn fit(
        &self,
        train: &[Interaction],
        shape: MatrixShape,
        params: &TrainParams,
    ) -> Result<(EmbeddingModel, TrainingReport)> {
        validate_train_params(params)?;
        let started = Instant::now();

        let user_rows = shape.user_rows();
        let item_rows = shape.item_rows();
        let examples: Vec<&Interaction> = train
            .iter()
            .filter(|i| i.user_id < user_rows && i.item_id < item_rows)
            .collect();
        let skipped = train.len() - examples.len();
        if skipped > 0 {
            warn!("Skipping {} training rows outside the {}x{} factor tables", skipped, user_rows, item_rows);
        }
        if examples.is_empty() {
            return Err(RecError::EmptyTrainingSet);
        }

        let initializer = EmbeddingInitializer::new(InitializationMethod::ScaledNormal, params.dim, params.seed);
        let (mut user_vecs, mut item_vecs) = initializer.initialize_tables(user_rows, item_rows);

        let mut report = TrainingReport {
            epoch_losses: Vec::with_capacity(params.epochs),
            examples: examples.len(),
            skipped_out_of_range: skipped,
            elapsed_ms: 0,
        };

        if self.backend == TrainerBackend::Untrained {
            warn!(
                "Trainer backend is 'untrained': returning seeded factors (dim={}, seed={}) without fitting",
                params.dim, params.seed
            );
            report.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok((EmbeddingModel::new(user_vecs, item_vecs, false)?, report));
        }

        info!(
            "Training on {} examples: dim={} lr={} epochs={} batch_size={} optimizer={:?}",
            examples.len(),
            params.dim,
            params.learning_rate,
            params.epochs,
            params.batch_size,
            params.optimizer
        );

        let mut user_optimizer = build_optimizer(params.optimizer, params.learning_rate);
        let mut item_optimizer = build_optimizer(params.optimizer, params.learning_rate);
        let mut user_grads = Array2::<f32>::zeros(user_vecs.raw_dim());
        let mut item_grads = Array2::<f32>::zeros(item_vecs.raw_dim());

        // separate stream from the initializer so shuffling does not shift the factors
        let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(1));
        let mut order: Vec<usize> = (0..examples.len()).collect();

        for epoch in 0..params.epochs {
            order.shuffle(&mut rng);
            let mut total_loss = 0.0f64;

            for batch in order.chunks(params.batch_size) {
                user_grads.fill(0.0);
                item_grads.fill(0.0);
                let scale = 2.0 / batch.len() as f32;

                for &idx in batch {
                    let example = examples[idx];
                    let user = user_vecs.row(example.user_id);
                    let item = item_vecs.row(example.item_id);
                    let error = user.dot(&item) - example.weight;
                    total_loss += f64::from(error * error);

                    user_grads.row_mut(example.user_id).scaled_add(scale * error, &item);
                    item_grads.row_mut(example.item_id).scaled_add(scale * error, &user);
                }

                user_optimizer.step(&mut user_vecs, &user_grads);
                item_optimizer.step(&mut item_vecs, &item_grads);
            }

            let epoch_loss = total_loss / examples.len() as f64;
            info!("Epoch {}/{} loss={:.6}", epoch + 1, params.epochs, epoch_loss);
            report.epoch_losses.push(epoch_loss);
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        debug!("Training finished in {} ms", report.elapsed_ms);

        // zero epochs leaves the seeded factors untouched
        let trained = params.epochs > 0;
        if !trained {
            warn!("No epochs run: returning seeded factors flagged as untrained");
        }
        Ok((EmbeddingModel::new(user_vecs, item_vecs, trained)?, report))
    }

    /// Seeded factors with no fitting at all, flagged as untrained.
    pub fn untrained(shape: MatrixShape, dim: usize, seed: u64) -> Result<EmbeddingModel> {
        if dim == 0 {
            return Err(RecError::invalid("dim", dim, "must be positive"));
        }
        warn!("Using untrained fallback embeddings (dim={}, seed={})", dim, seed);
        let initializer = EmbeddingInitializer::new(InitializationMethod::ScaledNormal, dim, seed);
        let (user_vecs, item_vecs) = initializer.initialize_tables(shape.user_rows(), shape.item_rows());
        EmbeddingModel::new(user_vecs, item_vecs, false)
    }
}

/// Trains with the gradient backend on tables sized from the interactions themselves.
pub fn fit(train: &[Interaction], params: &TrainParams) -> Result<EmbeddingModel> {
    let shape = MatrixShape::from_interactions(train);
    Trainer::default().fit(train, shape, params).map(|(model, _)| model)
}
