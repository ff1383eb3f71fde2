//! Encoder-decoder model contract
//!
//! The model's tensor graph is external. The learner only needs a forward pass
//! over a [`FeedBundle`](crate::training::feed::FeedBundle) and access to the
//! trainable parameters. Whether a model is plain or graph-augmented is fixed
//! when the [`DialogueModel`] is built and never changes afterwards.

use std::collections::HashSet;

use anyhow::Result;
use candle_core::Tensor;
use candle_nn::VarMap;

use crate::training::feed::FeedBundle;

/// Decoder outputs of one model step
#[derive(Debug, Clone)]
pub struct DecoderOutput<S> {
    /// Prediction logits `[batch, dec_len, output_vocab]`
    pub logits: Tensor,
    /// Recurrent state at the end of the chunk
    pub final_state: S,
    /// Scalar training loss
    pub loss: Tensor,
    /// Per-example loss `[batch]`
    pub seq_loss: Tensor,
}

/// Final state of a graph decoder
#[derive(Debug, Clone)]
pub struct GraphState {
    /// Recurrent core state; the only part carried into the next chunk
    pub core: Tensor,
    /// Attention over graph nodes at the last step
    pub attention: Tensor,
    /// Graph context vector at the last step
    pub context: Tensor,
}

/// Outputs of one graph model step
#[derive(Debug, Clone)]
pub struct GraphOutput {
    /// Decoder outputs
    pub decoder: DecoderOutput<GraphState>,
    /// Utterance history after this chunk
    pub utterances: Tensor,
}

/// Parameters shared by every encoder-decoder
pub trait EncoderDecoder {
    /// Trainable parameters
    fn var_map(&self) -> &VarMap;

    /// Parameters whose gradients are sparse (embedding lookups); never clipped
    fn sparse_gradient_params(&self) -> HashSet<String> {
        HashSet::new()
    }
}

/// Plain sequence-to-sequence model
pub trait BasicEncoderDecoder: EncoderDecoder {
    /// Run one chunk through the model
    fn forward(&self, feed: &FeedBundle) -> Result<DecoderOutput<Tensor>>;
}

/// Sequence-to-sequence model reading a dynamic knowledge graph
pub trait GraphEncoderDecoder: EncoderDecoder {
    /// Run one chunk through the model
    fn forward(&self, feed: &FeedBundle) -> Result<GraphOutput>;
}

/// The model driven by the learner, tagged with its execution mode
pub enum DialogueModel {
    /// Plain encoder-decoder
    Basic(Box<dyn BasicEncoderDecoder>),
    /// Graph-augmented encoder-decoder
    Graph(Box<dyn GraphEncoderDecoder>),
}

impl DialogueModel {
    /// Wrap a plain encoder-decoder
    pub fn basic(model: impl BasicEncoderDecoder + 'static) -> Self {
        Self::Basic(Box::new(model))
    }

    /// Wrap a graph encoder-decoder
    pub fn graph(model: impl GraphEncoderDecoder + 'static) -> Self {
        Self::Graph(Box::new(model))
    }

    /// Trainable parameters
    pub fn var_map(&self) -> &VarMap {
        match self {
            Self::Basic(model) => model.var_map(),
            Self::Graph(model) => model.var_map(),
        }
    }

    /// Parameters excluded from gradient clipping
    pub fn sparse_gradient_params(&self) -> HashSet<String> {
        match self {
            Self::Basic(model) => model.sparse_gradient_params(),
            Self::Graph(model) => model.sparse_gradient_params(),
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Basic(_) => "basic",
            Self::Graph(_) => "graph",
        }
    }

    /// Total number of trainable scalars
    pub fn parameter_count(&self) -> usize {
        self.var_map()
            .all_vars()
            .iter()
            .map(|var| var.as_tensor().elem_count())
            .sum()
    }
}

impl std::fmt::Debug for DialogueModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueModel")
            .field("kind", &self.kind())
            .field("parameters", &self.parameter_count())
            .finish()
    }
}
