//! Truncated-sequence batch runner
//!
//! Drives one dialogue batch through the model chunk by chunk. The recurrent
//! state produced by chunk `i` is detached and fed as the initial state of
//! chunk `i + 1`; the first chunk of every dialogue batch starts from the
//! model's zero state. Graph models additionally fold the utterance history
//! through the chunk sequence.

use anyhow::Result;
use candle_core::{DType, Tensor, D};
use tracing::trace;

use crate::error::Error;
use crate::training::data::{Chunk, DialogueBatch, TextIntMap, Vocabulary};
use crate::training::diagnostics::DiagnosticPrinter;
use crate::training::feed::{FeedAssembler, GraphFeed};
use crate::training::graph::GraphContext;
use crate::training::metrics::SummaryMap;
use crate::training::model::{BasicEncoderDecoder, DialogueModel, GraphEncoderDecoder};
use crate::training::session::TrainingSession;

/// Whether a batch updates the parameters
pub enum RunMode<'a> {
    /// Backward, clip and optimizer step after every chunk
    Train(&'a mut TrainingSession),
    /// Forward only
    Eval,
}

impl RunMode<'_> {
    pub fn is_train(&self) -> bool {
        matches!(self, Self::Train(_))
    }
}

/// Runs dialogue batches through a model
pub struct BatchRunner<'a> {
    pub model: &'a DialogueModel,
    pub vocab: &'a dyn Vocabulary,
    pub textint: &'a dyn TextIntMap,
    /// Rewrite entity targets into copy indices
    pub copy: bool,
    /// Set in verbose mode
    pub diagnostics: Option<&'a DiagnosticPrinter>,
}

impl<'a> BatchRunner<'a> {
    /// Run every chunk of `batch`, recording `loss` (and `grad_norm` when
    /// training) into `summary`
    pub fn run(&self, batch: &DialogueBatch, mut mode: RunMode<'_>, summary: &mut SummaryMap) -> Result<()> {
        match self.model {
            DialogueModel::Basic(model) => self.run_basic(model.as_ref(), batch, &mut mode, summary),
            DialogueModel::Graph(model) => {
                let graph = batch.graph.as_deref().ok_or_else(|| {
                    Error::malformed_batch("graph model received a dialogue batch without graph context")
                })?;
                self.run_graph(model.as_ref(), graph, batch, &mut mode, summary)
            }
        }
    }

    fn assembler(&self) -> FeedAssembler {
        FeedAssembler::new(self.vocab.size(), self.copy)
    }

    fn run_basic(
        &self,
        model: &dyn BasicEncoderDecoder,
        batch: &DialogueBatch,
        mode: &mut RunMode<'_>,
        summary: &mut SummaryMap,
    ) -> Result<()> {
        let assembler = self.assembler();
        let mut init_state: Option<Tensor> = None;

        for (i, chunk) in batch.batch_seq.iter().enumerate() {
            let feed = assembler.assemble(chunk, init_state.take(), None)?;
            let output = model
                .forward(&feed)
                .map_err(|err| Error::model_execution(format!("chunk {}: {:#}", i, err)))?;

            self.record(mode, &output.loss, summary)?;

            if let Some(printer) = self.diagnostics {
                let preds = output.logits.argmax(D::Minus1)?;
                self.print(printer, chunk, &preds, &output.seq_loss)?;
            }

            init_state = Some(output.final_state.detach());
            trace!("Finished chunk {} of {}", i + 1, batch.len());
        }

        Ok(())
    }

    fn run_graph(
        &self,
        model: &dyn GraphEncoderDecoder,
        graph: &dyn GraphContext,
        batch: &DialogueBatch,
        mode: &mut RunMode<'_>,
        summary: &mut SummaryMap,
    ) -> Result<()> {
        let assembler = self.assembler();
        let mut init_state: Option<Tensor> = None;
        let mut utterances: Option<Tensor> = None;

        for (i, chunk) in batch.batch_seq.iter().enumerate() {
            let data = graph.batch_data(&chunk.encoder_tokens, &chunk.decoder_tokens, utterances.as_ref())?;
            let checklists = graph.checklists(&chunk.targets, self.vocab)?;
            let copied_nodes = graph.copied_nodes(&chunk.targets, self.vocab)?;
            let feed = assembler.assemble(
                chunk,
                init_state.take(),
                Some(GraphFeed {
                    context: graph,
                    data,
                    checklists,
                    copied_nodes,
                }),
            )?;

            let output = model
                .forward(&feed)
                .map_err(|err| Error::model_execution(format!("chunk {}: {:#}", i, err)))?;

            self.record(mode, &output.decoder.loss, summary)?;

            if let Some(printer) = self.diagnostics {
                let preds = output.decoder.logits.argmax(D::Minus1)?;
                let preds = graph.copy_preds(&preds, self.vocab.size())?;
                self.print(printer, chunk, &preds, &output.decoder.seq_loss)?;
            }

            init_state = Some(output.decoder.final_state.core.detach());
            utterances = Some(output.utterances.detach());
            trace!("Finished graph chunk {} of {}", i + 1, batch.len());
        }

        Ok(())
    }

    fn record(&self, mode: &mut RunMode<'_>, loss: &Tensor, summary: &mut SummaryMap) -> Result<()> {
        let value = scalar(loss)?;
        summary.update("loss", value);

        if let RunMode::Train(session) = mode {
            let report = session.apply(loss)?;
            summary.update("grad_norm", report.clipped_norm);
        }
        Ok(())
    }

    fn print(&self, printer: &DiagnosticPrinter, chunk: &Chunk, preds: &Tensor, seq_loss: &Tensor) -> Result<()> {
        printer.print_batch(chunk, preds, seq_loss, self.textint)
    }
}

/// Mean of a loss tensor as `f64`
fn scalar(loss: &Tensor) -> Result<f64> {
    let value = loss
        .mean_all()
        .and_then(|mean| mean.to_dtype(DType::F64))
        .and_then(|mean| mean.to_scalar::<f64>())
        .map_err(|err| Error::model_execution(format!("loss is not a readable scalar: {}", err)))?;
    Ok(value)
}
