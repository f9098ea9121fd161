//! The processor contract.
//!
//! A processor is a synchronous, stateful, chunked transform. The engine
//! calls it from one worker thread at a time and never concurrently.

use crate::blob::Blob;

/// Whether a processor call reached the end of its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    EndOfStream,
}

/// Outcome of a single [`Processor::write`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Input bytes consumed by this call
    pub consumed: usize,
    pub flow: Flow,
}

impl Step {
    pub fn consumed(consumed: usize) -> Self {
        Self {
            consumed,
            flow: Flow::Continue,
        }
    }

    pub fn end_of_stream(consumed: usize) -> Self {
        Self {
            consumed,
            flow: Flow::EndOfStream,
        }
    }
}

/// Pluggable transform driven by a stream.
///
/// `write` and `finish` produce output by writing into
/// [`Blob::spare_mut`] and calling [`Blob::advance`]. The engine grows the
/// blob before each call.
pub trait Processor: Send + 'static {
    /// Processor-specific failure.
    type Error: std::error::Error + Send + 'static;

    /// Short name used in logs.
    const NAME: &'static str;

    /// Prepare the transform. Runs synchronously when the stream opens.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Feed `input`, writing whatever output fits.
    fn write(&mut self, input: &[u8], out: &mut Blob) -> Result<Step, Self::Error>;

    /// Flush pending output. Called repeatedly until it returns
    /// [`Flow::EndOfStream`].
    fn finish(&mut self, out: &mut Blob) -> Result<Flow, Self::Error>;

    /// Release transform resources. Called at most once after a successful
    /// `init`.
    fn destroy(&mut self);
}
