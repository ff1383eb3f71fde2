//! Training loop for dialogue encoder-decoders
//!
//! The [`Learner`] owns the data source, the model and the evaluator. A call to
//! [`Learner::learn`] validates the configuration, builds the optimizer, then
//! runs `max_epochs` epochs of truncated-sequence training. After every epoch
//! it saves a checkpoint and evaluates each held-out split; a strictly lower
//! loss on the dev split replaces the retained best snapshot. All epochs always
//! run.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::error::Error;
use crate::training::checkpoints::CheckpointManager;
use crate::training::config::LearnerConfig;
use crate::training::data::{BatchStream, DataGenerator};
use crate::training::diagnostics::DiagnosticPrinter;
use crate::training::evaluation::{BestModelRecord, BestModelTracker, EvalSplit, Evaluator};
use crate::training::metrics::SummaryMap;
use crate::training::model::DialogueModel;
use crate::training::runner::{BatchRunner, RunMode};
use crate::training::session::TrainingSession;
use crate::utils::memory::resident_memory_mb;
use crate::utils::timing::Timer;

/// Training events for monitoring
#[derive(Debug, Clone)]
pub enum TrainingEvent {
    EpochStarted { epoch: usize },
    Report {
        step: usize,
        num_per_epoch: usize,
        epoch: usize,
        summary: SummaryMap,
    },
    CheckpointSaved { path: PathBuf, epoch: usize },
    EvaluationCompleted {
        split: String,
        loss: f64,
        bleu: f64,
        entity_recall: f64,
    },
    NewBestModel { record: BestModelRecord },
    TrainingCompleted { total_steps: usize },
}

/// Training result information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResult {
    /// One checkpoint per epoch, in epoch order
    pub epoch_checkpoints: Vec<PathBuf>,

    /// Metrics of the retained best model, if the dev split ever improved
    pub best_model: Option<BestModelRecord>,

    /// Path to best model checkpoint
    pub best_checkpoint_path: Option<PathBuf>,

    /// Total training steps
    pub total_steps: usize,

    /// Training duration
    pub training_duration: Duration,
}

/// Truncated-sequence trainer for dialogue models
pub struct Learner {
    data: Box<dyn DataGenerator>,
    model: DialogueModel,
    evaluator: Box<dyn Evaluator>,
    verbose: bool,
    diagnostics: DiagnosticPrinter,
    event_tx: Option<mpsc::UnboundedSender<TrainingEvent>>,
}

impl Learner {
    pub fn new(data: Box<dyn DataGenerator>, model: DialogueModel, evaluator: Box<dyn Evaluator>) -> Self {
        Self {
            data,
            model,
            evaluator,
            verbose: false,
            diagnostics: DiagnosticPrinter::stdout(),
            event_tx: None,
        }
    }

    /// Set up event monitoring
    pub fn with_event_monitoring(mut self, tx: mpsc::UnboundedSender<TrainingEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Send verbose dumps to `sink` instead of stdout
    pub fn with_diagnostic_sink(mut self, sink: Box<dyn std::io::Write + Send>) -> Self {
        self.diagnostics = DiagnosticPrinter::new(sink);
        self
    }

    pub fn model(&self) -> &DialogueModel {
        &self.model
    }

    /// Train on `split` according to `config`
    #[instrument(skip(self, config), fields(model = self.model.kind()))]
    pub fn learn(&mut self, config: &LearnerConfig, split: &str) -> Result<TrainingResult> {
        // Nothing is touched before the optimizer name is known to be valid
        let optimizer_type = config.optimizer_type()?;
        config.validate().context("Learner configuration validation failed")?;

        let training_start = Instant::now();
        self.verbose = config.verbose;

        if let Some(init_from) = &config.init_from {
            let path = CheckpointManager::resolve(init_from)?;
            CheckpointManager::restore(self.model.var_map(), &path)?;
        }

        let mut session =
            TrainingSession::new(&self.model, optimizer_type, config.learning_rate, config.grad_clip)?;
        let checkpoints = CheckpointManager::new(&config.checkpoint)?;

        let mut train_data = self.data.generator(split, config.batch_size)?;
        let num_per_epoch = config.num_per_epoch.unwrap_or_else(|| train_data.num_batches());
        if num_per_epoch == 0 {
            return Err(Error::malformed_batch(format!("split '{}' has no dialogue batches", split)).into());
        }

        info!(
            "Training {} model with {} parameters: {} epochs x {} batches, optimizer {}",
            self.model.kind(),
            self.model.parameter_count(),
            config.max_epochs,
            num_per_epoch,
            optimizer_type
        );

        let mut tracker = BestModelTracker::new();
        let mut summary = SummaryMap::new();
        let mut epoch_checkpoints = Vec::with_capacity(config.max_epochs);
        let mut best_checkpoint_path = None;
        let mut total_steps = 0;

        for epoch in 0..config.max_epochs {
            info!("================== Epoch {} ==================", epoch + 1);
            self.send_event(TrainingEvent::EpochStarted { epoch });

            self.train_epoch(
                &mut train_data,
                &mut session,
                &mut summary,
                epoch,
                num_per_epoch,
                config.print_every,
            )?;
            total_steps += num_per_epoch;

            let path = checkpoints.save_epoch(self.model.var_map(), epoch)?;
            self.send_event(TrainingEvent::CheckpointSaved {
                path: path.clone(),
                epoch,
            });
            epoch_checkpoints.push(path);

            for eval_split in self.evaluator.dataset().context("Failed to open evaluation splits")? {
                let (split, loss, bleu, entity_recall) = self.evaluate_split(eval_split)?;

                if split == config.dev_split {
                    if let Some(record) = tracker.observe(loss, bleu, entity_recall, epoch) {
                        info!("New best model");
                        best_checkpoint_path = Some(checkpoints.save_best(self.model.var_map(), &record)?);
                        self.send_event(TrainingEvent::NewBestModel { record });
                    }
                }
            }
        }

        let result = TrainingResult {
            epoch_checkpoints,
            best_model: tracker.into_best(),
            best_checkpoint_path,
            total_steps,
            training_duration: training_start.elapsed(),
        };

        info!("Training completed in {:?}", result.training_duration);
        self.send_event(TrainingEvent::TrainingCompleted { total_steps });

        Ok(result)
    }

    /// Mean chunk loss over `num_batches` dialogue batches of `data`
    pub fn test_loss(&self, data: &mut BatchStream, num_batches: usize) -> Result<f64> {
        let runner = self.runner();
        let mut summary = SummaryMap::new();

        for _ in 0..num_batches {
            let batch = data.next_batch()?;
            runner.run(&batch, RunMode::Eval, &mut summary)?;
        }

        summary
            .mean("loss")
            .ok_or_else(|| Error::malformed_batch("evaluation data produced no chunks").into())
    }

    fn train_epoch(
        &self,
        train_data: &mut BatchStream,
        session: &mut TrainingSession,
        summary: &mut SummaryMap,
        epoch: usize,
        num_per_epoch: usize,
        print_every: usize,
    ) -> Result<()> {
        let runner = self.runner();

        for step in 1..=num_per_epoch {
            let timer = Timer::new("train_batch");
            let batch = train_data.next_batch()?;
            runner.run(&batch, RunMode::Train(&mut *session), summary)?;

            summary.update("time(s)/batch", timer.elapsed_secs());
            if let Some(mb) = resident_memory_mb() {
                summary.update("memory(MB)", mb);
            }

            if step % print_every == 0 || step == num_per_epoch {
                info!("{}/{} (epoch {}) {}", step, num_per_epoch, epoch + 1, summary);
                self.send_event(TrainingEvent::Report {
                    step,
                    num_per_epoch,
                    epoch,
                    summary: summary.clone(),
                });
                summary.reset();
            }
        }

        Ok(())
    }

    fn evaluate_split(&mut self, eval_split: EvalSplit) -> Result<(String, f64, f64, f64)> {
        let EvalSplit {
            split,
            mut data,
            num_batches,
        } = eval_split;

        info!("================== Eval {} ==================", split);
        info!("================== Perplexity ==================");
        let timer = Timer::new("test_loss");
        let loss = self
            .test_loss(&mut data, num_batches)
            .with_context(|| format!("Failed to compute loss on '{}'", split))?;
        info!("loss={:.4} time(s)={:.4}", loss, timer.elapsed_secs());

        info!("================== Sampling ==================");
        let timer = Timer::new("test_bleu");
        let (bleu, entity_recall) = self
            .evaluator
            .test_bleu(&self.model, &mut data, num_batches)
            .with_context(|| format!("Failed to sample on '{}'", split))?;
        info!(
            "bleu={:.4} entity_recall={:.4} time(s)={:.4}",
            bleu,
            entity_recall,
            timer.elapsed_secs()
        );

        self.send_event(TrainingEvent::EvaluationCompleted {
            split: split.clone(),
            loss,
            bleu,
            entity_recall,
        });
        Ok((split, loss, bleu, entity_recall))
    }

    fn runner(&self) -> BatchRunner<'_> {
        BatchRunner {
            model: &self.model,
            vocab: self.data.vocab(),
            textint: self.data.textint_map(),
            copy: self.data.copy(),
            diagnostics: self.verbose.then_some(&self.diagnostics),
        }
    }

    fn send_event(&self, event: TrainingEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.send(event).is_err() {
                debug!("Training event receiver dropped");
            }
        }
    }
}
