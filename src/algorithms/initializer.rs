use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

/// Standard normal sample via the Box-Muller transform.
pub fn standard_normal<R: Rng>(rng: &mut R) -> f32 {
    // gen() is in [0, 1); shift away from 0 so ln() stays finite
    let u1: f32 = 1.0 - rng.gen::<f32>();
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub fn normal<R: Rng>(rng: &mut R, size: usize, mean: f32, std_dev: f32) -> Vec<f32> {
    (0..size)
        .map(|_| standard_normal(rng) * std_dev + mean)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitializationMethod {
    /// N(0, 1) scaled by 1/sqrt(dim), so initial dot products have unit variance.
    ScaledNormal,
    Normal { mean: f32, std_dev: f32 },
    Zeros,
}

impl InitializationMethod {
    pub fn initialize_matrix<R: Rng>(&self, rng: &mut R, rows: usize, cols: usize) -> Array2<f32> {
        match *self {
            InitializationMethod::ScaledNormal => {
                let scale = 1.0 / (cols.max(1) as f32).sqrt();
                Array2::from_shape_simple_fn((rows, cols), || standard_normal(rng) * scale)
            }
            InitializationMethod::Normal { mean, std_dev } => {
                Array2::from_shape_simple_fn((rows, cols), || standard_normal(rng) * std_dev + mean)
            }
            InitializationMethod::Zeros => Array2::zeros((rows, cols)),
        }
    }
}

/// Seeded factory for the user and item factor tables. The same seed, shape and
/// dimension always yield bit-identical matrices.
pub struct EmbeddingInitializer {
    method: InitializationMethod,
    dimension: usize,
    seed: u64,
}

impl EmbeddingInitializer {
    pub fn new(method: InitializationMethod, dimension: usize, seed: u64) -> Self {
        Self {
            method,
            dimension,
            seed,
        }
    }

    /// User table first, item table second, from one seeded stream.
    pub fn initialize_tables(&self, user_rows: usize, item_rows: usize) -> (Array2<f32>, Array2<f32>) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let users = self.method.initialize_matrix(&mut rng, user_rows, self.dimension);
        let items = self.method.initialize_matrix(&mut rng, item_rows, self.dimension);
        (users, items)
    }
}
