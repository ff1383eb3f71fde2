//! Optimizer selection and gradient clipping
//!
//! The learner supports three gradient-descent algorithms, chosen by name and
//! configured from the learning rate alone. Plain SGD and Adam come from
//! `candle_nn`; Adagrad is implemented here against the same
//! [`candle_nn::Optimizer`] trait.

pub mod adagrad;
pub mod clipping;

pub use adagrad::{Adagrad, ParamsAdagrad};
pub use clipping::{GradientClipper, GradientReport};

use std::fmt;
use std::str::FromStr;

use candle_core::backprop::GradStore;
use candle_core::Var;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, SGD};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported optimizer algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerType {
    Sgd,
    Adagrad,
    Adam,
}

impl OptimizerType {
    /// Names accepted by [`FromStr`]
    pub const NAMES: [&'static str; 3] = ["sgd", "adagrad", "adam"];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sgd => "sgd",
            Self::Adagrad => "adagrad",
            Self::Adam => "adam",
        }
    }
}

impl fmt::Display for OptimizerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptimizerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sgd" => Ok(Self::Sgd),
            "adagrad" => Ok(Self::Adagrad),
            "adam" => Ok(Self::Adam),
            other => Err(Error::config(format!(
                "unknown optimizer '{}', expected one of {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

/// A constructed optimizer
pub enum OptimizerState {
    Sgd(SGD),
    Adagrad(Adagrad),
    Adam(AdamW),
}

impl OptimizerState {
    /// Apply one update from `grads`
    pub fn step(&mut self, grads: &GradStore) -> candle_core::Result<()> {
        match self {
            Self::Sgd(opt) => opt.step(grads),
            Self::Adagrad(opt) => opt.step(grads),
            Self::Adam(opt) => opt.step(grads),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::Sgd(opt) => opt.learning_rate(),
            Self::Adagrad(opt) => opt.learning_rate(),
            Self::Adam(opt) => opt.learning_rate(),
        }
    }

    pub fn optimizer_type(&self) -> OptimizerType {
        match self {
            Self::Sgd(_) => OptimizerType::Sgd,
            Self::Adagrad(_) => OptimizerType::Adagrad,
            Self::Adam(_) => OptimizerType::Adam,
        }
    }
}

impl fmt::Debug for OptimizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizerState")
            .field("type", &self.optimizer_type())
            .field("learning_rate", &self.learning_rate())
            .finish()
    }
}

/// Build the optimizer for `vars`
pub fn create_optimizer(
    optimizer_type: OptimizerType,
    learning_rate: f64,
    vars: Vec<Var>,
) -> Result<OptimizerState> {
    let optimizer = match optimizer_type {
        OptimizerType::Sgd => OptimizerState::Sgd(SGD::new(vars, learning_rate)?),
        OptimizerType::Adagrad => OptimizerState::Adagrad(Adagrad::new(
            vars,
            ParamsAdagrad {
                lr: learning_rate,
                ..Default::default()
            },
        )?),
        OptimizerType::Adam => OptimizerState::Adam(AdamW::new(
            vars,
            ParamsAdamW {
                lr: learning_rate,
                beta1: 0.9,
                beta2: 0.999,
                eps: 1e-8,
                weight_decay: 0.0,
            },
        )?),
    };
    Ok(optimizer)
}
