//! Chunk and dialogue batch structures

use anyhow::Result;
use candle_core::Tensor;

use crate::error::Error;
use crate::training::graph::GraphContext;

/// One truncated segment of a batch of dialogues, fed as a single model step
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Encoder token ids `[batch, enc_len]`
    pub encoder_inputs: Tensor,
    /// Index of the last valid encoder position per example `[batch]`
    pub encoder_last_inds: Tensor,
    /// Decoder token ids `[batch, dec_len]`
    pub decoder_inputs: Tensor,
    /// Index of the last valid decoder position per example `[batch]`
    pub decoder_last_inds: Tensor,
    /// Raw encoder tokens per example
    pub encoder_tokens: Vec<Vec<String>>,
    /// Raw decoder tokens per example
    pub decoder_tokens: Vec<Vec<String>>,
    /// Target token ids `[batch, dec_len]`
    pub targets: Tensor,
}

impl Chunk {
    /// Batch-first dimension, checked against every tensor in the chunk
    pub fn batch_size(&self) -> Result<usize> {
        let batch_size = self.encoder_inputs.dim(0)?;

        let checks = [
            ("encoder_last_inds", self.encoder_last_inds.dim(0)?),
            ("decoder_inputs", self.decoder_inputs.dim(0)?),
            ("decoder_last_inds", self.decoder_last_inds.dim(0)?),
            ("targets", self.targets.dim(0)?),
        ];
        for (name, size) in checks {
            if size != batch_size {
                return Err(Error::malformed_batch(format!(
                    "{} has batch size {} but encoder_inputs has {}",
                    name, size, batch_size
                ))
                .into());
            }
        }

        Ok(batch_size)
    }

    /// Validate the shape contract of the chunk
    pub fn validate(&self) -> Result<()> {
        let batch_size = self.batch_size()?;

        if self.encoder_inputs.rank() != 2 || self.decoder_inputs.rank() != 2 {
            return Err(Error::malformed_batch("encoder and decoder inputs must be [batch, len]").into());
        }
        if self.targets.dims() != self.decoder_inputs.dims() {
            return Err(Error::malformed_batch(format!(
                "targets shape {:?} does not match decoder inputs {:?}",
                self.targets.dims(),
                self.decoder_inputs.dims()
            ))
            .into());
        }
        if self.encoder_tokens.len() != batch_size || self.decoder_tokens.len() != batch_size {
            return Err(Error::malformed_batch(format!(
                "raw token lists cover {}/{} examples, expected {}",
                self.encoder_tokens.len(),
                self.decoder_tokens.len(),
                batch_size
            ))
            .into());
        }

        Ok(())
    }
}

/// Ordered chunks of one group of parallel dialogues
pub struct DialogueBatch {
    /// Chunks in dialogue order
    pub batch_seq: Vec<Chunk>,
    /// Knowledge graph scoped to these dialogues, if the model uses one
    pub graph: Option<Box<dyn GraphContext>>,
}

impl DialogueBatch {
    /// Plain batch without graph context
    pub fn new(batch_seq: Vec<Chunk>) -> Self {
        Self { batch_seq, graph: None }
    }

    /// Batch with a knowledge graph
    pub fn with_graph(batch_seq: Vec<Chunk>, graph: Box<dyn GraphContext>) -> Self {
        Self {
            batch_seq,
            graph: Some(graph),
        }
    }

    /// Number of chunks
    pub fn len(&self) -> usize {
        self.batch_seq.len()
    }

    /// Whether the batch has no chunks
    pub fn is_empty(&self) -> bool {
        self.batch_seq.is_empty()
    }
}

impl std::fmt::Debug for DialogueBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueBatch")
            .field("chunks", &self.batch_seq.len())
            .field("has_graph", &self.graph.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use crate::training::tests::mock_data::make_chunk;
    use candle_core::{DType, Device};

    #[test]
    fn test_valid_chunk() {
        let chunk = make_chunk(3, 4, 5, 20, 7);
        assert_eq!(chunk.batch_size().unwrap(), 3);
        assert!(chunk.validate().is_ok());
    }

    #[test]
    fn test_mismatched_targets_are_malformed() {
        let mut chunk = make_chunk(3, 4, 5, 20, 7);
        chunk.targets = Tensor::zeros((2, 5), DType::U32, &Device::Cpu).unwrap();
        let err = chunk.validate().unwrap_err();
        assert!(matches!(classify(&err), Some(Error::MalformedBatch(_))));
    }

    #[test]
    fn test_missing_raw_tokens_are_malformed() {
        let mut chunk = make_chunk(2, 4, 5, 20, 1);
        chunk.decoder_tokens.pop();
        assert!(chunk.validate().is_err());
    }
}
