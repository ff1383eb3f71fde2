//! Verbose per-example dumps
//!
//! In verbose mode the runner prints, for every chunk, the first example whose
//! decoder side is non-empty: raw tokens, the integerized inputs mapped back to
//! text, the target, the argmax prediction and the example's loss.

use std::io::Write;

use anyhow::{Context, Result};
use candle_core::{DType, Tensor};
use parking_lot::Mutex;

use crate::training::data::{Chunk, TextIntMap, TextStage};

/// Writes diagnostic dumps to a shared sink
pub struct DiagnosticPrinter {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl DiagnosticPrinter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Print the first non-empty example of `chunk`
    ///
    /// `preds` is `[batch, dec_len]` in vocabulary ids and `seq_loss` is
    /// `[batch]`. Nothing is printed when every example has an empty decoder
    /// side.
    pub fn print_batch(
        &self,
        chunk: &Chunk,
        preds: &Tensor,
        seq_loss: &Tensor,
        textint: &dyn TextIntMap,
    ) -> Result<()> {
        let Some(i) = chunk.decoder_tokens.iter().position(|tokens| !tokens.is_empty()) else {
            return Ok(());
        };

        let row = |tensor: &Tensor| -> Result<Vec<u32>> {
            Ok(tensor.get(i)?.to_dtype(DType::U32)?.to_vec1::<u32>()?)
        };
        let encoder_inputs = row(&chunk.encoder_inputs)?;
        let decoder_inputs = row(&chunk.decoder_inputs)?;
        let targets = row(&chunk.targets)?;
        let preds = row(preds)?;
        let loss = seq_loss.get(i)?.to_dtype(DType::F64)?.to_scalar::<f64>()?;

        let mut sink = self.sink.lock();
        let out = &mut *sink;
        writeln!(out, "-------------- batch ----------------")?;
        writeln!(out, "{}", i)?;
        writeln!(out, "RAW INPUT: {}", chunk.encoder_tokens[i].join(" "))?;
        writeln!(out, "RAW TARGET: {}", chunk.decoder_tokens[i].join(" "))?;
        writeln!(out, "----------")?;
        writeln!(
            out,
            "ENC INPUT: {}",
            textint.int_to_text(&encoder_inputs, TextStage::Encoding).join(" ")
        )?;
        writeln!(
            out,
            "DEC INPUT: {}",
            textint.int_to_text(&decoder_inputs, TextStage::Decoding).join(" ")
        )?;
        writeln!(out, "TARGET: {}", textint.int_to_text(&targets, TextStage::Target).join(" "))?;
        writeln!(out, "PRED: {}", textint.int_to_text(&preds, TextStage::Target).join(" "))?;
        writeln!(out, "LOSS: {:.4}", loss)?;
        out.flush().context("Failed to flush diagnostic output")?;

        Ok(())
    }
}

impl std::fmt::Debug for DiagnosticPrinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticPrinter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::tests::fixtures::SharedBuffer;
    use crate::training::tests::mock_data::{make_chunk, MockTextIntMap};
    use candle_core::Device;

    #[test]
    fn test_prints_first_non_empty_example_only() {
        let buffer = SharedBuffer::default();
        let printer = DiagnosticPrinter::new(Box::new(buffer.clone()));
        let mut chunk = make_chunk(3, 2, 2, 10, 4);
        chunk.decoder_tokens[0].clear();
        chunk.decoder_tokens[1] = vec!["hello".into(), "there".into()];
        chunk.decoder_tokens[2] = vec!["ignored".into()];

        let preds = Tensor::new(&[[1u32, 2], [3, 4], [5, 6]], &Device::Cpu).unwrap();
        let seq_loss = Tensor::new(&[0.5f32, 1.5, 2.5], &Device::Cpu).unwrap();
        printer.print_batch(&chunk, &preds, &seq_loss, &MockTextIntMap).unwrap();

        let output = buffer.contents();
        assert!(output.contains("RAW TARGET: hello there"));
        assert!(output.contains("PRED: t3 t4"));
        assert!(output.contains("LOSS: 1.5000"));
        assert!(!output.contains("ignored"));
        assert_eq!(output.matches("RAW INPUT:").count(), 1);
    }

    #[test]
    fn test_all_empty_prints_nothing() {
        let buffer = SharedBuffer::default();
        let printer = DiagnosticPrinter::new(Box::new(buffer.clone()));
        let mut chunk = make_chunk(2, 2, 2, 10, 4);
        chunk.decoder_tokens.iter_mut().for_each(Vec::clear);

        let preds = Tensor::zeros((2, 2), DType::U32, &Device::Cpu).unwrap();
        let seq_loss = Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap();
        printer.print_batch(&chunk, &preds, &seq_loss, &MockTextIntMap).unwrap();

        assert!(buffer.contents().is_empty());
    }
}
