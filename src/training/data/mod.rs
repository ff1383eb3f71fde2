//! Data source contract for dialogue training
//!
//! The data generator, vocabulary and text-integerization pipeline live outside
//! this crate. This module defines the traits the learner drives them through,
//! plus the batch structures they produce.

use anyhow::Result;

pub mod batching;
pub mod loaders;

// Re-exports
pub use batching::{Chunk, DialogueBatch};
pub use loaders::BatchStream;

/// Vocabulary the decoder generates from
#[cfg_attr(test, mockall::automock)]
pub trait Vocabulary {
    /// Number of base vocabulary entries; copy indices start here
    fn size(&self) -> usize;

    /// Whether the token id refers to an entity
    fn is_entity(&self, id: u32) -> bool;
}

/// Which side of the model a sequence of ids belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStage {
    /// Encoder input ids
    Encoding,
    /// Decoder input ids
    Decoding,
    /// Decoder target ids
    Target,
}

/// Maps integer ids back to readable tokens
pub trait TextIntMap {
    /// Convert a sequence of ids to tokens for the given stage
    fn int_to_text(&self, ids: &[u32], stage: TextStage) -> Vec<String>;
}

/// Source of dialogue batches
///
/// `generator` returns a restartable stream: it reports the number of dialogue
/// batches in one epoch and keeps producing batches lazily for as long as the
/// learner pulls from it.
pub trait DataGenerator {
    /// Open a batch stream for a split
    fn generator(&mut self, split: &str, batch_size: usize) -> Result<BatchStream>;

    /// Base vocabulary
    fn vocab(&self) -> &dyn Vocabulary;

    /// Id to text mapping used by diagnostics
    fn textint_map(&self) -> &dyn TextIntMap;

    /// Whether entity targets are rewritten into graph copy indices
    fn copy(&self) -> bool;
}
