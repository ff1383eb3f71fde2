//! Lazy dialogue batch streams

use anyhow::Result;
use tracing::debug;

use super::DialogueBatch;
use crate::error::Error;

type BatchIter = Box<dyn Iterator<Item = Result<DialogueBatch>>>;

/// Lazily produced dialogue batches for one split
///
/// `num_batches` is the size of one epoch. The underlying iterator is expected
/// to keep producing batches across epochs; running dry is a data contract
/// violation.
pub struct BatchStream {
    num_batches: usize,
    batches: BatchIter,
    produced: usize,
}

impl BatchStream {
    /// Stream over fallible batches
    pub fn new<I>(num_batches: usize, batches: I) -> Self
    where
        I: IntoIterator<Item = Result<DialogueBatch>>,
        I::IntoIter: 'static,
    {
        Self {
            num_batches,
            batches: Box::new(batches.into_iter()),
            produced: 0,
        }
    }

    /// Stream over already materialized batches
    pub fn from_batches<I>(num_batches: usize, batches: I) -> Self
    where
        I: IntoIterator<Item = DialogueBatch>,
        I::IntoIter: 'static,
    {
        Self::new(num_batches, batches.into_iter().map(Ok))
    }

    /// Endless stream that builds each batch on demand
    pub fn repeat_with<F>(num_batches: usize, mut make_batch: F) -> Self
    where
        F: FnMut(usize) -> Result<DialogueBatch> + 'static,
    {
        let mut index = 0usize;
        Self::new(
            num_batches,
            std::iter::repeat_with(move || {
                let batch = make_batch(index);
                index += 1;
                batch
            }),
        )
    }

    /// Number of dialogue batches in one epoch
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Batches pulled so far
    pub fn produced(&self) -> usize {
        self.produced
    }

    /// Pull the next dialogue batch
    pub fn next_batch(&mut self) -> Result<DialogueBatch> {
        match self.batches.next() {
            Some(batch) => {
                self.produced += 1;
                debug!("Pulled dialogue batch {}", self.produced);
                batch
            }
            None => Err(Error::malformed_batch(format!(
                "batch stream exhausted after {} batches",
                self.produced
            ))
            .into()),
        }
    }
}

impl std::fmt::Debug for BatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchStream")
            .field("num_batches", &self.num_batches)
            .field("produced", &self.produced)
            .finish()
    }
}
