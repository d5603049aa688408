//! Core traits for streaming compression and decompression.
//!
//! Compression is push-style: the caller hands in input and output slices
//! together with an [`Action`] and gets back how far each cursor moved.
//! Decompression is pull-style: the decoder owns its source and fills the
//! caller's output buffer on demand.

use crate::error::Result;

/// What the caller asks a compressor to do with the input it passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Consume input, emitting output only when a block fills.
    #[default]
    Run,
    /// Consume the given input, then close the current block and emit it.
    Flush,
    /// Consume the given input, emit the last block and the stream trailer.
    Finish,
}

/// Outcome of one compressor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressStatus {
    /// The stream is running and accepts more input.
    RunOk,
    /// A flush is in progress; call again with [`Action::Flush`].
    FlushOk,
    /// A finish is in progress; call again with [`Action::Finish`].
    FinishOk,
    /// The stream trailer has been fully delivered.
    StreamEnd,
}

/// Status of a streaming decompression operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressStatus {
    /// The output buffer filled up; more decoded data is pending.
    NeedsOutput,
    /// The end-of-stream marker was reached and verified.
    Done,
}

/// A push-style streaming compressor.
pub trait Compressor {
    /// Run one step of the compressor.
    ///
    /// # Returns
    ///
    /// A tuple of (bytes consumed from input, bytes written to output, status)
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        action: Action,
    ) -> Result<(usize, usize, CompressStatus)>;

    /// Check if the stream trailer has been emitted.
    fn is_finished(&self) -> bool;

    /// Compress all data at once (convenience method).
    fn compress_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut input_pos = 0;
        let mut buffer = vec![0u8; 32768];

        // Feed everything with Run first
        while input_pos < input.len() {
            let (consumed, produced, _) =
                self.compress(&input[input_pos..], &mut buffer, Action::Run)?;
            input_pos += consumed;
            output.extend_from_slice(&buffer[..produced]);
        }

        loop {
            let (_, produced, status) = self.compress(&[], &mut buffer, Action::Finish)?;
            output.extend_from_slice(&buffer[..produced]);
            if status == CompressStatus::StreamEnd {
                break;
            }
        }

        Ok(output)
    }
}

/// A pull-style streaming decompressor.
pub trait Decompressor {
    /// Decode into `output`.
    ///
    /// # Returns
    ///
    /// A tuple of (bytes written to output, status)
    fn decompress(&mut self, output: &mut [u8]) -> Result<(usize, DecompressStatus)>;

    /// Check if the end-of-stream marker has been verified.
    fn is_finished(&self) -> bool;

    /// Decompress the rest of the stream (convenience method).
    fn decompress_all(&mut self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut buffer = vec![0u8; 32768];

        loop {
            let (produced, status) = self.decompress(&mut buffer)?;
            output.extend_from_slice(&buffer[..produced]);
            if status == DecompressStatus::Done {
                break;
            }
        }

        Ok(output)
    }
}
