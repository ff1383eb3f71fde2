//! Truncated-sequence training for dialogue encoder-decoders
//!
//! This module drives a sequence-to-sequence dialogue model, optionally
//! augmented with a dynamic knowledge graph, through chunked training and
//! evaluation. The model, the data source, the knowledge graph and the
//! evaluator's metrics are external collaborators expressed as traits.
//!
//! # Main Components
//!
//! - **Learner**: epoch loop, reporting, checkpointing and best-model tracking
//! - **Runner**: per-dialogue chunk loop carrying recurrent state across chunks
//! - **Feed**: per-chunk model inputs for plain and graph models
//! - **Session**: optimizer and element-wise gradient clipping
//! - **Metrics**: running summaries reset at every report
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dialogue_learner::training::{DialogueModel, Learner, LearnerConfig};
//!
//! let mut learner = Learner::new(data, DialogueModel::basic(model), evaluator);
//! let config = LearnerConfig::from_file("learner.yaml")?;
//! let result = learner.learn(&config, "train")?;
//! ```

pub mod checkpoints;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod evaluation;
pub mod feed;
pub mod graph;
pub mod learner;
pub mod metrics;
pub mod model;
pub mod optimizers;
pub mod runner;
pub mod session;

// Tests module
#[cfg(test)]
pub mod tests;

pub use checkpoints::CheckpointManager;
pub use config::{LearnerArgs, LearnerConfig};
pub use data::{BatchStream, Chunk, DataGenerator, DialogueBatch, TextIntMap, TextStage, Vocabulary};
pub use diagnostics::DiagnosticPrinter;
pub use evaluation::{BestModelRecord, BestModelTracker, EvalSplit, Evaluator};
pub use feed::{DecoderFeed, EncoderFeed, FeedAssembler, FeedBundle, GraphFeed};
pub use graph::{CopyTable, GraphContext, GraphData};
pub use learner::{Learner, TrainingEvent, TrainingResult};
pub use metrics::{RunningStat, SummaryMap};
pub use model::{
    BasicEncoderDecoder, DecoderOutput, DialogueModel, EncoderDecoder, GraphEncoderDecoder, GraphOutput,
    GraphState,
};
pub use optimizers::{create_optimizer, GradientClipper, GradientReport, OptimizerState, OptimizerType};
pub use runner::{BatchRunner, RunMode};
pub use session::TrainingSession;
