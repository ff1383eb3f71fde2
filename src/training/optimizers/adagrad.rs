//! Adagrad optimizer
//!
//! Per-parameter learning rates scaled by the accumulated squared gradients:
//!
//! ```text
//! acc   <- acc + g^2
//! theta <- theta - lr * g / (sqrt(acc) + eps)
//! ```

use candle_core::backprop::GradStore;
use candle_core::{Result, Tensor, Var};
use candle_nn::Optimizer;

/// Adagrad hyperparameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamsAdagrad {
    pub lr: f64,
    /// Starting value of every accumulator slot
    pub initial_accumulator_value: f64,
    pub eps: f64,
}

impl Default for ParamsAdagrad {
    fn default() -> Self {
        Self {
            lr: 0.01,
            initial_accumulator_value: 0.1,
            eps: 0.0,
        }
    }
}

#[derive(Debug)]
struct AdagradVar {
    var: Var,
    accumulator: Tensor,
}

/// Adagrad over a fixed set of variables
#[derive(Debug)]
pub struct Adagrad {
    vars: Vec<AdagradVar>,
    params: ParamsAdagrad,
}

impl Optimizer for Adagrad {
    type Config = ParamsAdagrad;

    fn new(vars: Vec<Var>, params: ParamsAdagrad) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let accumulator = var.ones_like()?.affine(params.initial_accumulator_value, 0.0)?;
                Ok(AdagradVar { var, accumulator })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { vars, params })
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        for slot in self.vars.iter_mut() {
            let theta = &slot.var;
            if let Some(g) = grads.get(theta) {
                let accumulator = slot.accumulator.add(&g.sqr()?)?;
                let denom = accumulator.sqrt()?.affine(1.0, self.params.eps)?;
                let update = g.div(&denom)?.affine(self.params.lr, 0.0)?;
                theta.set(&theta.sub(&update)?)?;
                slot.accumulator = accumulator;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;

    #[test]
    fn test_single_step_matches_closed_form() {
        let var = Var::new(&[1.0f32], &Device::Cpu).unwrap();
        let mut opt = Adagrad::new(
            vec![var.clone()],
            ParamsAdagrad {
                lr: 0.5,
                ..Default::default()
            },
        )
        .unwrap();

        // loss = 2 * theta, gradient 2
        let loss = var.as_tensor().affine(2.0, 0.0).unwrap().sum_all().unwrap();
        opt.backward_step(&loss).unwrap();

        let expected = 1.0 - 0.5 * 2.0 / (0.1f64 + 4.0).sqrt();
        let value = var.as_tensor().to_vec1::<f32>().unwrap()[0];
        assert_relative_eq!(value as f64, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_steps_shrink_as_gradients_accumulate() {
        let var = Var::new(&[0.0f32], &Device::Cpu).unwrap();
        let mut opt = Adagrad::new(
            vec![var.clone()],
            ParamsAdagrad {
                lr: 1.0,
                ..Default::default()
            },
        )
        .unwrap();

        let mut previous = 0.0f32;
        let mut deltas = Vec::new();
        for _ in 0..3 {
            let loss = var.as_tensor().sum_all().unwrap();
            opt.backward_step(&loss).unwrap();
            let current = var.as_tensor().to_vec1::<f32>().unwrap()[0];
            deltas.push((previous - current).abs());
            previous = current;
        }
        assert!(deltas[0] > deltas[1] && deltas[1] > deltas[2]);
    }
}
