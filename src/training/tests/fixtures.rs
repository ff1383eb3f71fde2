//! Test fixtures for setting up common test scenarios

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::training::config::LearnerConfig;
use crate::training::evaluation::{EvalSplit, MockEvaluator};
use crate::training::learner::TrainingEvent;

use super::mock_data::mock_stream;

/// In-memory `Write` sink that can be read back after it was handed out
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Temporary checkpoint directory plus a small learner configuration
pub struct LearnerFixture {
    pub temp_dir: TempDir,
    pub config: LearnerConfig,
}

impl LearnerFixture {
    pub fn new(max_epochs: usize) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = LearnerConfig {
            optimizer: "sgd".to_string(),
            learning_rate: 0.05,
            max_epochs,
            checkpoint: temp_dir.path().join("ckpt"),
            batch_size: 2,
            ..Default::default()
        };
        Self { temp_dir, config }
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.config.checkpoint.clone()
    }

    pub fn best_dir(&self) -> PathBuf {
        self.temp_dir.path().join("ckpt-best")
    }
}

/// Evaluator mock offering `splits` every epoch with fixed sampling metrics
pub fn evaluator_for(splits: &[&str], num_batches: usize, graph_nodes: Option<Vec<u32>>) -> MockEvaluator {
    let splits: Vec<String> = splits.iter().map(|s| s.to_string()).collect();
    let mut evaluator = MockEvaluator::new();
    let mut round = 0u64;
    evaluator.expect_dataset().returning(move || {
        round += 1;
        Ok(splits
            .iter()
            .map(|split| EvalSplit {
                split: split.clone(),
                data: mock_stream(num_batches, 2, 2, graph_nodes.clone(), 1000 * round),
                num_batches,
            })
            .collect())
    });
    evaluator
        .expect_test_bleu()
        .returning(|_, _, _| Ok((0.25, 0.5)));
    evaluator
}

/// Evaluator mock that scripts the model loss of each evaluation round
///
/// Before round `k` hands out its dev stream, `losses[k]` is written into
/// `loss_handle` so the held-out loss of that round equals it.
pub fn scripted_evaluator(losses: Vec<f32>, loss_handle: Arc<Mutex<f32>>) -> MockEvaluator {
    let mut pending: VecDeque<f32> = losses.into();
    let mut evaluator = MockEvaluator::new();
    evaluator.expect_dataset().returning(move || {
        if let Some(loss) = pending.pop_front() {
            *loss_handle.lock() = loss;
        }
        Ok(vec![EvalSplit {
            split: "dev".to_string(),
            data: mock_stream(2, 2, 2, None, 500),
            num_batches: 2,
        }])
    });
    evaluator
        .expect_test_bleu()
        .returning(|_, _, _| Ok((0.1, 0.2)));
    evaluator
}

/// Unbounded event channel
pub fn event_channel() -> (
    mpsc::UnboundedSender<TrainingEvent>,
    mpsc::UnboundedReceiver<TrainingEvent>,
) {
    mpsc::unbounded_channel()
}

/// Every event currently queued
pub fn drain(rx: &mut mpsc::UnboundedReceiver<TrainingEvent>) -> Vec<TrainingEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
