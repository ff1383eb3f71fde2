//! Dialogue learner - truncated-sequence training loop for dialogue models
//!
//! This crate trains sequence-to-sequence dialogue models, with or without a
//! dynamic knowledge graph, by streaming long dialogues as chunks and carrying
//! recurrent state between them.

#![warn(rustdoc::broken_intra_doc_links)]

pub mod error;
pub mod training;
pub mod utils;

// Re-exports
pub use error::{Error, Result};
pub use training::{
    DataGenerator, DialogueModel, Evaluator, GraphContext, Learner, LearnerArgs, LearnerConfig, OptimizerType,
    TrainingEvent, TrainingResult,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
