//! Element-wise gradient clipping
//!
//! Every dense gradient element is clamped into `[-clip, clip]`. Parameters
//! declared sparse by the model (embedding lookups) are left unclipped. The
//! global L2 norm is measured over all gradients both before and after
//! clipping.

use std::collections::HashSet;

use candle_core::backprop::GradStore;
use candle_core::{DType, Var};
use candle_nn::VarMap;
use tracing::debug;

use crate::error::{Error, Result};

/// Gradient norms of one training step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientReport {
    /// Global norm before clipping
    pub norm: f64,
    /// Global norm of the gradients actually applied
    pub clipped_norm: f64,
}

/// Clamps gradients of a fixed parameter set
pub struct GradientClipper {
    clip: f64,
    vars: Vec<(String, Var)>,
    sparse: HashSet<String>,
}

impl GradientClipper {
    /// Clipper over every variable in `var_map`; `clip <= 0` disables clipping
    pub fn new(clip: f64, var_map: &VarMap, sparse: HashSet<String>) -> Result<Self> {
        let data = var_map
            .data()
            .lock()
            .map_err(|_| Error::internal("parameter map lock poisoned"))?;
        let mut vars: Vec<(String, Var)> = data
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        drop(data);
        vars.sort_by(|a, b| a.0.cmp(&b.0));

        for name in &sparse {
            if !vars.iter().any(|(var_name, _)| var_name == name) {
                debug!("Sparse gradient parameter '{}' is not a trainable variable", name);
            }
        }

        Ok(Self { clip, vars, sparse })
    }

    pub fn is_enabled(&self) -> bool {
        self.clip > 0.0
    }

    /// Variables in name order
    pub fn vars(&self) -> Vec<Var> {
        self.vars.iter().map(|(_, var)| var.clone()).collect()
    }

    /// L2 norm over every gradient present in `grads`
    pub fn global_norm(&self, grads: &GradStore) -> Result<f64> {
        let mut sum_sq = 0.0f64;
        for (_, var) in &self.vars {
            if let Some(grad) = grads.get(var.as_tensor()) {
                sum_sq += grad
                    .sqr()?
                    .sum_all()?
                    .to_dtype(DType::F64)?
                    .to_scalar::<f64>()?;
            }
        }
        Ok(sum_sq.sqrt())
    }

    /// Clamp dense gradients in place and report the norms
    pub fn clip(&self, grads: &mut GradStore) -> Result<GradientReport> {
        let norm = self.global_norm(grads)?;
        if !self.is_enabled() {
            return Ok(GradientReport {
                norm,
                clipped_norm: norm,
            });
        }

        for (name, var) in &self.vars {
            if self.sparse.contains(name) {
                continue;
            }
            if let Some(grad) = grads.remove(var.as_tensor()) {
                let clipped = grad.clamp(-self.clip, self.clip)?;
                grads.insert(var.as_tensor(), clipped);
            }
        }

        let clipped_norm = self.global_norm(grads)?;
        Ok(GradientReport { norm, clipped_norm })
    }
}

impl std::fmt::Debug for GradientClipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradientClipper")
            .field("clip", &self.clip)
            .field("vars", &self.vars.len())
            .field("sparse", &self.sparse)
            .finish()
    }
}
