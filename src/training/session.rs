//! Optimizer and clipping state for one training run
//!
//! A [`TrainingSession`] is created once the configuration has been validated
//! and is threaded through every training-mode batch. Each call to
//! [`TrainingSession::apply`] is one blocking backward, clip and update step.

use anyhow::Result;
use candle_core::Tensor;
use tracing::debug;

use crate::error::Error;
use crate::training::model::DialogueModel;
use crate::training::optimizers::{
    create_optimizer, GradientClipper, GradientReport, OptimizerState, OptimizerType,
};

/// Optimizer, clipper and step count
#[derive(Debug)]
pub struct TrainingSession {
    optimizer: OptimizerState,
    clipper: GradientClipper,
    steps: usize,
}

impl TrainingSession {
    /// Build the optimizer over the model's trainable parameters
    pub fn new(
        model: &DialogueModel,
        optimizer_type: OptimizerType,
        learning_rate: f64,
        grad_clip: f64,
    ) -> Result<Self> {
        let clipper = GradientClipper::new(grad_clip, model.var_map(), model.sparse_gradient_params())?;
        let optimizer = create_optimizer(optimizer_type, learning_rate, clipper.vars())?;

        debug!(
            "Created {} optimizer (lr={}, grad_clip={}) over {} parameters",
            optimizer_type,
            learning_rate,
            grad_clip,
            model.parameter_count()
        );

        Ok(Self {
            optimizer,
            clipper,
            steps: 0,
        })
    }

    /// Backpropagate `loss`, clip the gradients and apply one update
    pub fn apply(&mut self, loss: &Tensor) -> Result<GradientReport> {
        let mut grads = loss
            .backward()
            .map_err(|err| Error::model_execution(format!("backward pass failed: {}", err)))?;

        let report = self.clipper.clip(&mut grads)?;

        self.optimizer
            .step(&grads)
            .map_err(|err| Error::model_execution(format!("optimizer step failed: {}", err)))?;
        self.steps += 1;

        debug!(
            "Step {}: grad_norm={:.4} clipped_grad_norm={:.4}",
            self.steps, report.norm, report.clipped_norm
        );
        Ok(report)
    }

    /// Updates applied so far
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn optimizer_type(&self) -> OptimizerType {
        self.optimizer.optimizer_type()
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::tests::mock_model::ToyEncoderDecoder;
    use candle_core::Device;

    #[test]
    fn test_apply_updates_parameters() {
        let toy = ToyEncoderDecoder::new(12, 6, &Device::Cpu).unwrap();
        let loss_input = toy.scalar_probe().unwrap();
        let model = DialogueModel::basic(toy);
        let before = model.var_map().all_vars()[0].as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();

        let mut session = TrainingSession::new(&model, OptimizerType::Sgd, 0.5, 5.0).unwrap();
        let report = session.apply(&loss_input).unwrap();

        let after = model.var_map().all_vars()[0].as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_ne!(before, after);
        assert!(report.clipped_norm <= report.norm + 1e-9);
        assert_eq!(session.steps(), 1);
        assert_eq!(session.optimizer_type(), OptimizerType::Sgd);
    }
}
