use flate2::{Decompress, FlushDecompress, Status};

use super::CodecError;
use crate::blob::Blob;
use crate::processor::{Flow, Processor, Step};

/// zlib decompressor.
///
/// Reports end of stream as soon as the compressed stream ends; bytes after
/// that are left unconsumed.
#[derive(Default)]
pub struct Inflate {
    decompress: Option<Decompress>,
}

impl Inflate {
    pub fn new() -> Self {
        Self::default()
    }

    fn decompressor(&mut self) -> Result<&mut Decompress, CodecError> {
        self.decompress.as_mut().ok_or(CodecError::Closed)
    }
}

impl Processor for Inflate {
    type Error = CodecError;
    const NAME: &'static str = "inflate";

    fn init(&mut self) -> Result<(), CodecError> {
        self.decompress = Some(Decompress::new(true));
        Ok(())
    }

    fn write(&mut self, input: &[u8], out: &mut Blob) -> Result<Step, CodecError> {
        let decompress = self.decompressor()?;
        let (in_before, out_before) = (decompress.total_in(), decompress.total_out());

        let status = decompress.decompress(input, out.spare_mut(), FlushDecompress::None)?;

        let consumed = (decompress.total_in() - in_before) as usize;
        out.advance((decompress.total_out() - out_before) as usize);
        match status {
            Status::StreamEnd => Ok(Step::end_of_stream(consumed)),
            _ => Ok(Step::consumed(consumed)),
        }
    }

    fn finish(&mut self, out: &mut Blob) -> Result<Flow, CodecError> {
        let decompress = self.decompressor()?;
        let out_before = decompress.total_out();

        let status = decompress.decompress(&[], out.spare_mut(), FlushDecompress::Finish)?;

        let produced = (decompress.total_out() - out_before) as usize;
        out.advance(produced);
        match status {
            Status::StreamEnd => Ok(Flow::EndOfStream),
            // Input is exhausted; only buffered output can still appear.
            _ if produced > 0 => Ok(Flow::Continue),
            _ => Err(CodecError::Truncated),
        }
    }

    fn destroy(&mut self) {
        self.decompress = None;
    }
}
