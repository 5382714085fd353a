use crate::config::OptimizerKind;
use ndarray::{Array2, Zip};

/// Updates one parameter table from its gradient, keeping whatever per-table
/// state the method needs.
pub trait Optimizer: Send {
    fn step(&mut self, params: &mut Array2<f32>, gradients: &Array2<f32>);
    fn reset(&mut self);
}

pub fn build_optimizer(kind: OptimizerKind, learning_rate: f64) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Adam => Box::new(Adam::new(learning_rate, 0.9, 0.999, 1e-8)),
        OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
    }
}

#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut Array2<f32>, gradients: &Array2<f32>) {
        params.scaled_add(-(self.learning_rate as f32), gradients);
    }

    fn reset(&mut self) {}
}

/// Adam with bias-corrected moments. Moments cover the whole table, so rows
/// without gradient in a batch still move along their running momentum.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: Option<Array2<f32>>,
    v: Option<Array2<f32>>,
}

impl Adam {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: None,
            v: None,
        }
    }

    pub fn steps(&self) -> i32 {
        self.t
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut Array2<f32>, gradients: &Array2<f32>) {
        self.t += 1;

        let shape = params.raw_dim();
        let m = self.m.get_or_insert_with(|| Array2::zeros(shape.clone()));
        let v = self.v.get_or_insert_with(|| Array2::zeros(shape));

        let beta1 = self.beta1 as f32;
        let beta2 = self.beta2 as f32;
        let eps = self.epsilon as f32;
        let lr = self.learning_rate as f32;
        let bias1 = 1.0 - beta1.powi(self.t);
        let bias2 = 1.0 - beta2.powi(self.t);

        Zip::from(params)
            .and(gradients)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }

    fn reset(&mut self) {
        self.t = 0;
        self.m = None;
        self.v = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sgd_step() {
        let mut sgd = Sgd::new(0.1);
        let mut params = array![[1.0f32, 2.0]];
        sgd.step(&mut params, &array![[1.0f32, -1.0]]);
        assert!((params[[0, 0]] - 0.9).abs() < 1e-6);
        assert!((params[[0, 1]] - 2.1).abs() < 1e-6);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        // with bias correction the first step is lr * sign(g)
        let mut adam = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let mut params = array![[1.0f32, 1.0, 1.0]];
        adam.step(&mut params, &array![[0.5f32, -2.0, 0.0]]);
        assert!((params[[0, 0]] - 0.99).abs() < 1e-5);
        assert!((params[[0, 1]] - 1.01).abs() < 1e-5);
        assert_eq!(params[[0, 2]], 1.0);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_adam_minimizes_quadratic() {
        let mut adam = Adam::new(0.1, 0.9, 0.999, 1e-8);
        let mut params = array![[3.0f32, -2.0]];
        for _ in 0..500 {
            let grads = params.mapv(|x| 2.0 * x);
            adam.step(&mut params, &grads);
        }
        assert!(params.iter().all(|x| x.abs() < 0.05));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut adam = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let mut params = array![[1.0f32]];
        adam.step(&mut params, &array![[1.0f32]]);
        adam.reset();
        assert_eq!(adam.steps(), 0);
    }
}
