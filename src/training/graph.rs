//! Knowledge-graph context contract and copy-index mapping
//!
//! The dynamic knowledge graph itself is external. A [`GraphContext`] is scoped
//! to one dialogue batch and hands the learner the auxiliary tensors each chunk
//! needs. The utterance history is not stored in the graph: the learner folds
//! it through the chunk loop and passes the latest value back in.

use std::collections::HashMap;

use anyhow::Result;
use candle_core::Tensor;

use crate::error::Error;
use crate::training::data::Vocabulary;

/// Per-chunk graph tensors consumed by the encoder, decoder and graph embedder
#[derive(Debug, Clone)]
pub struct GraphData {
    /// Entity references in the encoder inputs `[batch, enc_len]`
    pub encoder_entities: Tensor,
    /// Entity references in the decoder inputs `[batch, dec_len]`
    pub decoder_entities: Tensor,
    /// Utterance history shared by encoder and decoder
    pub utterances: Tensor,
    /// Remaining graph embedder inputs (node ids, relation paths, masks), by name
    pub embedder_inputs: HashMap<String, Tensor>,
}

impl GraphData {
    /// Graph data without extra embedder inputs
    pub fn new(encoder_entities: Tensor, decoder_entities: Tensor, utterances: Tensor) -> Self {
        Self {
            encoder_entities,
            decoder_entities,
            utterances,
            embedder_inputs: HashMap::new(),
        }
    }

    /// Check the per-example tensors against the chunk batch size
    pub fn validate(&self, batch_size: usize) -> Result<()> {
        for (name, tensor) in [
            ("encoder_entities", &self.encoder_entities),
            ("decoder_entities", &self.decoder_entities),
        ] {
            let size = tensor.dim(0)?;
            if size != batch_size {
                return Err(Error::malformed_batch(format!(
                    "graph {} has batch size {}, chunk has {}",
                    name, size, batch_size
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Dynamic knowledge graph scoped to one dialogue batch
pub trait GraphContext {
    /// Auxiliary tensors for one chunk, given the utterance history so far
    fn batch_data(
        &self,
        encoder_tokens: &[Vec<String>],
        decoder_tokens: &[Vec<String>],
        utterances: Option<&Tensor>,
    ) -> Result<GraphData>;

    /// Which graph entities the targets mention, per decoding step
    fn checklists(&self, targets: &Tensor, vocab: &dyn Vocabulary) -> Result<Tensor>;

    /// Which graph nodes the targets copy
    fn copied_nodes(&self, targets: &Tensor, vocab: &dyn Vocabulary) -> Result<Tensor>;

    /// Rewrite entity targets as copy indices (`vocab_size + node`)
    fn copy_targets(&self, targets: &Tensor, vocab_size: usize) -> Result<Tensor>;

    /// Map copy indices in predictions back to vocabulary ids
    fn copy_preds(&self, preds: &Tensor, vocab_size: usize) -> Result<Tensor>;
}

/// Copy-index table for a batch of graphs
///
/// `node_tokens[i][n]` is the vocabulary id of node `n` in the graph of example
/// `i`. A target id that names a node becomes `vocab_size + n`; a prediction at
/// or above `vocab_size` maps back to the node's id.
#[derive(Debug, Clone)]
pub struct CopyTable {
    vocab_size: usize,
    node_tokens: Vec<Vec<u32>>,
    lookup: Vec<HashMap<u32, u32>>,
}

impl CopyTable {
    /// Build the table from per-example node vocabulary ids
    pub fn new(vocab_size: usize, node_tokens: Vec<Vec<u32>>) -> Self {
        let lookup = node_tokens
            .iter()
            .map(|nodes| {
                let mut index = HashMap::with_capacity(nodes.len());
                for (node, &token) in nodes.iter().enumerate() {
                    // first node wins when two nodes share a surface token
                    index.entry(token).or_insert(node as u32);
                }
                index
            })
            .collect();

        Self {
            vocab_size,
            node_tokens,
            lookup,
        }
    }

    /// Base vocabulary size the copy indices are offset by
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Number of examples covered
    pub fn batch_size(&self) -> usize {
        self.node_tokens.len()
    }

    /// Largest node count over the batch
    pub fn max_nodes(&self) -> usize {
        self.node_tokens.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Node index for a token in example `row`, if the token is copyable
    pub fn node_of(&self, row: usize, token: u32) -> Option<u32> {
        self.lookup.get(row).and_then(|index| index.get(&token).copied())
    }

    /// Encode a row of target ids
    pub fn encode_row(&self, row: usize, ids: &[u32]) -> Vec<u32> {
        ids.iter()
            .map(|&id| match self.node_of(row, id) {
                Some(node) => self.vocab_size as u32 + node,
                None => id,
            })
            .collect()
    }

    /// Decode a row of predicted ids
    pub fn decode_row(&self, row: usize, ids: &[u32]) -> Vec<u32> {
        let vocab_size = self.vocab_size as u32;
        ids.iter()
            .map(|&id| {
                if id < vocab_size {
                    return id;
                }
                self.node_tokens
                    .get(row)
                    .and_then(|nodes| nodes.get((id - vocab_size) as usize))
                    .copied()
                    .unwrap_or(id)
            })
            .collect()
    }

    /// Encode a `[batch, len]` tensor of target ids
    pub fn encode(&self, targets: &Tensor) -> Result<Tensor> {
        self.map_rows(targets, |row, ids| self.encode_row(row, ids))
    }

    /// Decode a `[batch, len]` tensor of predicted ids
    pub fn decode(&self, preds: &Tensor) -> Result<Tensor> {
        self.map_rows(preds, |row, ids| self.decode_row(row, ids))
    }

    fn map_rows<F>(&self, ids: &Tensor, f: F) -> Result<Tensor>
    where
        F: Fn(usize, &[u32]) -> Vec<u32>,
    {
        let (batch, len) = ids.dims2()?;
        if batch != self.batch_size() {
            return Err(Error::malformed_batch(format!(
                "copy table covers {} examples, tensor has {}",
                self.batch_size(),
                batch
            ))
            .into());
        }

        let rows = ids.to_dtype(candle_core::DType::U32)?.to_vec2::<u32>()?;
        let mapped: Vec<u32> = rows
            .iter()
            .enumerate()
            .flat_map(|(row, ids)| f(row, ids))
            .collect();

        Ok(Tensor::from_vec(mapped, (batch, len), ids.device())?)
    }
}
