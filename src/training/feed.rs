//! Per-chunk feed assembly
//!
//! Builds the input bundle handed to the model for one chunk. The bundle
//! differs by mode: graph models additionally receive entity references, the
//! utterance history, the graph embedder inputs, checklists and copied nodes.

use anyhow::Result;
use candle_core::Tensor;

use crate::error::Error;
use crate::training::data::Chunk;
use crate::training::graph::{GraphContext, GraphData};

/// Encoder inputs for one chunk
#[derive(Debug, Clone)]
pub struct EncoderFeed {
    pub inputs: Tensor,
    pub last_inds: Tensor,
    /// Carried recurrent state; `None` selects the model's zero state
    pub init_state: Option<Tensor>,
    pub entities: Option<Tensor>,
    pub utterances: Option<Tensor>,
}

/// Decoder inputs for one chunk
#[derive(Debug, Clone)]
pub struct DecoderFeed {
    pub inputs: Tensor,
    pub last_inds: Tensor,
    pub entities: Option<Tensor>,
    pub utterances: Option<Tensor>,
    pub checklists: Option<Tensor>,
    pub copied_nodes: Option<Tensor>,
}

/// Everything the model reads for one chunk
#[derive(Debug, Clone)]
pub struct FeedBundle {
    pub encoder: EncoderFeed,
    pub decoder: DecoderFeed,
    /// Targets, rewritten to copy indices when copying is enabled
    pub targets: Tensor,
    /// Graph embedding context; present only for graph models
    pub graph_embedder: Option<GraphData>,
}

impl FeedBundle {
    /// Whether this bundle carries graph context
    pub fn has_graph(&self) -> bool {
        self.graph_embedder.is_some()
    }
}

/// Graph-side inputs for one chunk
pub struct GraphFeed<'a> {
    pub context: &'a dyn GraphContext,
    pub data: GraphData,
    pub checklists: Tensor,
    pub copied_nodes: Tensor,
}

/// Builds [`FeedBundle`]s
#[derive(Debug, Clone, Copy)]
pub struct FeedAssembler {
    vocab_size: usize,
    copy: bool,
}

impl FeedAssembler {
    pub fn new(vocab_size: usize, copy: bool) -> Self {
        Self { vocab_size, copy }
    }

    /// Assemble the model inputs for `chunk`
    pub fn assemble(
        &self,
        chunk: &Chunk,
        init_state: Option<Tensor>,
        graph: Option<GraphFeed<'_>>,
    ) -> Result<FeedBundle> {
        chunk.validate()?;
        let batch_size = chunk.batch_size()?;

        // The carried state is opaque here; its layout belongs to the model.
        let Some(graph) = graph else {
            return Ok(FeedBundle {
                encoder: EncoderFeed {
                    inputs: chunk.encoder_inputs.clone(),
                    last_inds: chunk.encoder_last_inds.clone(),
                    init_state,
                    entities: None,
                    utterances: None,
                },
                decoder: DecoderFeed {
                    inputs: chunk.decoder_inputs.clone(),
                    last_inds: chunk.decoder_last_inds.clone(),
                    entities: None,
                    utterances: None,
                    checklists: None,
                    copied_nodes: None,
                },
                targets: chunk.targets.clone(),
                graph_embedder: None,
            });
        };

        graph.data.validate(batch_size)?;
        for (name, tensor) in [("checklists", &graph.checklists), ("copied_nodes", &graph.copied_nodes)] {
            let size = tensor.dim(0)?;
            if size != batch_size {
                return Err(Error::malformed_batch(format!(
                    "{} has batch size {}, chunk has {}",
                    name, size, batch_size
                ))
                .into());
            }
        }

        let targets = if self.copy {
            graph.context.copy_targets(&chunk.targets, self.vocab_size)?
        } else {
            chunk.targets.clone()
        };

        let utterances = graph.data.utterances.clone();
        Ok(FeedBundle {
            encoder: EncoderFeed {
                inputs: chunk.encoder_inputs.clone(),
                last_inds: chunk.encoder_last_inds.clone(),
                init_state,
                entities: Some(graph.data.encoder_entities.clone()),
                utterances: Some(utterances.clone()),
            },
            decoder: DecoderFeed {
                inputs: chunk.decoder_inputs.clone(),
                last_inds: chunk.decoder_last_inds.clone(),
                entities: Some(graph.data.decoder_entities.clone()),
                utterances: Some(utterances),
                checklists: Some(graph.checklists),
                copied_nodes: Some(graph.copied_nodes),
            },
            targets,
            graph_embedder: Some(graph.data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use crate::training::tests::mock_data::{make_chunk, MockGraph, MockVocab};
    use candle_core::{DType, Device};

    #[test]
    fn test_basic_feed_passes_targets_through() {
        let chunk = make_chunk(2, 3, 4, 20, 11);
        let feed = FeedAssembler::new(20, true).assemble(&chunk, None, None).unwrap();

        assert!(!feed.has_graph());
        assert!(feed.encoder.init_state.is_none());
        assert!(feed.decoder.checklists.is_none());
        assert_eq!(
            feed.targets.to_vec2::<u32>().unwrap(),
            chunk.targets.to_vec2::<u32>().unwrap()
        );
    }

    #[test]
    fn test_stacked_state_is_passed_through() {
        let chunk = make_chunk(2, 3, 4, 20, 11);
        // [num_layers, batch, hidden]
        let state = Tensor::arange(0f32, 24.0, &Device::Cpu)
            .unwrap()
            .reshape((3, 2, 4))
            .unwrap();
        let feed = FeedAssembler::new(20, false)
            .assemble(&chunk, Some(state.clone()), None)
            .unwrap();

        let carried = feed.encoder.init_state.unwrap();
        assert_eq!(carried.dims(), &[3, 2, 4]);
        assert_eq!(
            carried.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            state.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
    }

    #[test]
    fn test_scalar_state_is_passed_through() {
        let chunk = make_chunk(2, 3, 4, 20, 11);
        let state = Tensor::new(0.5f32, &Device::Cpu).unwrap();
        let feed = FeedAssembler::new(20, false)
            .assemble(&chunk, Some(state), None)
            .unwrap();
        assert_eq!(feed.encoder.init_state.unwrap().to_scalar::<f32>().unwrap(), 0.5);
    }

    #[test]
    fn test_checklist_batch_mismatch_is_malformed() {
        let vocab = MockVocab::new(20, &[5]);
        let chunk = make_chunk(2, 3, 3, 20, 4);
        let graph = MockGraph::new(20, vec![vec![5]; 2]);
        let data = graph
            .batch_data(&chunk.encoder_tokens, &chunk.decoder_tokens, None)
            .unwrap();
        let copied_nodes = graph.copied_nodes(&chunk.targets, &vocab).unwrap();
        let checklists = Tensor::zeros((3, 3), DType::F32, &Device::Cpu).unwrap();

        let err = FeedAssembler::new(20, false)
            .assemble(
                &chunk,
                None,
                Some(GraphFeed {
                    context: &graph,
                    data,
                    checklists,
                    copied_nodes,
                }),
            )
            .unwrap_err();
        assert!(matches!(classify(&err), Some(Error::MalformedBatch(_))));
    }

    #[test]
    fn test_graph_feed_copies_targets() {
        let vocab = MockVocab::new(20, &[5]);
        let mut chunk = make_chunk(1, 3, 3, 20, 2);
        chunk.targets = Tensor::new(&[[1u32, 5, 2]], &Device::Cpu).unwrap();
        let graph = MockGraph::new(20, vec![vec![5]]);

        let feed_for = |copy: bool| {
            let data = graph
                .batch_data(&chunk.encoder_tokens, &chunk.decoder_tokens, None)
                .unwrap();
            let checklists = graph.checklists(&chunk.targets, &vocab).unwrap();
            let copied_nodes = graph.copied_nodes(&chunk.targets, &vocab).unwrap();
            FeedAssembler::new(20, copy)
                .assemble(
                    &chunk,
                    None,
                    Some(GraphFeed {
                        context: &graph,
                        data,
                        checklists,
                        copied_nodes,
                    }),
                )
                .unwrap()
        };

        let copied = feed_for(true);
        assert!(copied.has_graph());
        assert!(copied.encoder.entities.is_some());
        assert!(copied.decoder.utterances.is_some());
        assert_eq!(copied.targets.to_vec2::<u32>().unwrap(), vec![vec![1, 20, 2]]);

        let plain = feed_for(false);
        assert_eq!(plain.targets.to_vec2::<u32>().unwrap(), vec![vec![1, 5, 2]]);
    }
}
