//! Held-out evaluation contract and best-model tracking

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::training::data::BatchStream;
use crate::training::model::DialogueModel;

/// One held-out split to evaluate after every epoch
#[derive(Debug)]
pub struct EvalSplit {
    pub split: String,
    /// Stream shared by the loss pass and the sampling pass
    pub data: BatchStream,
    pub num_batches: usize,
}

/// Computes sampling metrics on held-out data
///
/// BLEU and entity recall are computed externally; the learner only consumes
/// the two numbers.
#[cfg_attr(test, mockall::automock)]
pub trait Evaluator {
    /// Splits to evaluate, opened fresh for every call
    fn dataset(&mut self) -> Result<Vec<EvalSplit>>;

    /// `(bleu, entity_recall)` over `num_batches` batches of `data`
    fn test_bleu(
        &mut self,
        model: &DialogueModel,
        data: &mut BatchStream,
        num_batches: usize,
    ) -> Result<(f64, f64)>;
}

/// Metrics of the retained best checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestModelRecord {
    pub loss: f64,
    pub bleu: f64,
    pub entity_recall: f64,
    /// Zero-based epoch that produced the snapshot
    pub epoch: usize,
    pub timestamp: DateTime<Utc>,
}

/// Tracks the lowest dev loss seen so far
#[derive(Debug, Clone, Default)]
pub struct BestModelTracker {
    best: Option<BestModelRecord>,
}

impl BestModelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest loss so far, `f64::INFINITY` before the first observation
    pub fn best_loss(&self) -> f64 {
        self.best.as_ref().map_or(f64::INFINITY, |record| record.loss)
    }

    pub fn best(&self) -> Option<&BestModelRecord> {
        self.best.as_ref()
    }

    /// Returns the new record when `loss` is strictly lower than the best so far
    pub fn observe(&mut self, loss: f64, bleu: f64, entity_recall: f64, epoch: usize) -> Option<BestModelRecord> {
        let improved = loss < self.best_loss();
        if !improved {
            return None;
        }
        let record = BestModelRecord {
            loss,
            bleu,
            entity_recall,
            epoch,
            timestamp: Utc::now(),
        };
        self.best = Some(record.clone());
        Some(record)
    }

    pub fn into_best(self) -> Option<BestModelRecord> {
        self.best
    }
}
