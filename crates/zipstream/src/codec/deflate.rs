use flate2::{Compress, Compression, FlushCompress, Status};

use super::CodecError;
use crate::blob::Blob;
use crate::processor::{Flow, Processor, Step};

/// zlib compressor.
pub struct Deflate {
    level: u32,
    compress: Option<Compress>,
}

impl Deflate {
    /// `level` runs from 0 (store) to 9 (best); checked on open.
    pub fn new(level: u32) -> Self {
        Self {
            level,
            compress: None,
        }
    }

    fn compressor(&mut self) -> Result<&mut Compress, CodecError> {
        self.compress.as_mut().ok_or(CodecError::Closed)
    }
}

impl Default for Deflate {
    fn default() -> Self {
        Self::new(Compression::default().level())
    }
}

impl Processor for Deflate {
    type Error = CodecError;
    const NAME: &'static str = "deflate";

    fn init(&mut self) -> Result<(), CodecError> {
        if self.level > 9 {
            return Err(CodecError::Level(self.level));
        }
        self.compress = Some(Compress::new(Compression::new(self.level), true));
        Ok(())
    }

    fn write(&mut self, input: &[u8], out: &mut Blob) -> Result<Step, CodecError> {
        let compress = self.compressor()?;
        let (in_before, out_before) = (compress.total_in(), compress.total_out());

        compress.compress(input, out.spare_mut(), FlushCompress::None)?;

        let consumed = (compress.total_in() - in_before) as usize;
        let produced = (compress.total_out() - out_before) as usize;
        out.advance(produced);
        Ok(Step::consumed(consumed))
    }

    fn finish(&mut self, out: &mut Blob) -> Result<Flow, CodecError> {
        let compress = self.compressor()?;
        let out_before = compress.total_out();

        let status = compress.compress(&[], out.spare_mut(), FlushCompress::Finish)?;

        out.advance((compress.total_out() - out_before) as usize);
        match status {
            Status::StreamEnd => Ok(Flow::EndOfStream),
            _ => Ok(Flow::Continue),
        }
    }

    fn destroy(&mut self) {
        self.compress = None;
    }
}
