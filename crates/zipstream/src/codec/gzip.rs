//! gzip framing (RFC 1952) around raw deflate.

use flate2::{Compress, Compression, Crc, Decompress, FlushCompress, FlushDecompress, Status};

use super::CodecError;
use crate::blob::Blob;
use crate::processor::{Flow, Processor, Step};

const MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
const OS_UNKNOWN: u8 = 0xff;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

/// Largest header (extra field, name, comment) we are willing to buffer.
const MAX_HEADER: usize = 64 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Gzip
// ─────────────────────────────────────────────────────────────────────────────

/// gzip compressor.
pub struct Gzip {
    level: u32,
    compress: Option<Compress>,
    crc: Crc,
    /// Header or trailer bytes not yet copied out
    pending: Vec<u8>,
    body_done: bool,
}

impl Gzip {
    pub fn new(level: u32) -> Self {
        Self {
            level,
            compress: None,
            crc: Crc::new(),
            pending: Vec::new(),
            body_done: false,
        }
    }

    /// Copy out as much pending framing as fits. True when none is left.
    fn flush_pending(&mut self, out: &mut Blob) -> bool {
        let n = out.fill(&self.pending);
        self.pending.drain(..n);
        self.pending.is_empty()
    }
}

impl Default for Gzip {
    fn default() -> Self {
        Self::new(Compression::default().level())
    }
}

impl Processor for Gzip {
    type Error = CodecError;
    const NAME: &'static str = "gzip";

    fn init(&mut self) -> Result<(), CodecError> {
        if self.level > 9 {
            return Err(CodecError::Level(self.level));
        }
        self.compress = Some(Compress::new(Compression::new(self.level), false));
        self.crc = Crc::new();
        self.body_done = false;
        self.pending = vec![MAGIC[0], MAGIC[1], METHOD_DEFLATE, 0, 0, 0, 0, 0, 0, OS_UNKNOWN];
        Ok(())
    }

    fn write(&mut self, input: &[u8], out: &mut Blob) -> Result<Step, CodecError> {
        if !self.flush_pending(out) {
            return Ok(Step::consumed(0));
        }

        let compress = self.compress.as_mut().ok_or(CodecError::Closed)?;
        let (in_before, out_before) = (compress.total_in(), compress.total_out());

        compress.compress(input, out.spare_mut(), FlushCompress::None)?;

        let consumed = (compress.total_in() - in_before) as usize;
        out.advance((compress.total_out() - out_before) as usize);
        self.crc.update(&input[..consumed]);
        Ok(Step::consumed(consumed))
    }

    fn finish(&mut self, out: &mut Blob) -> Result<Flow, CodecError> {
        if !self.flush_pending(out) {
            return Ok(Flow::Continue);
        }

        if !self.body_done {
            let compress = self.compress.as_mut().ok_or(CodecError::Closed)?;
            let out_before = compress.total_out();
            let status = compress.compress(&[], out.spare_mut(), FlushCompress::Finish)?;
            out.advance((compress.total_out() - out_before) as usize);
            if status != Status::StreamEnd {
                return Ok(Flow::Continue);
            }

            self.body_done = true;
            self.pending.extend_from_slice(&self.crc.sum().to_le_bytes());
            self.pending.extend_from_slice(&self.crc.amount().to_le_bytes());
        }

        if self.flush_pending(out) {
            Ok(Flow::EndOfStream)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn destroy(&mut self) {
        self.compress = None;
        self.pending.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gunzip
// ─────────────────────────────────────────────────────────────────────────────

enum Phase {
    Header(Vec<u8>),
    Body,
    Trailer(Vec<u8>),
    Done,
}

/// gzip decompressor for a single member.
///
/// Reports end of stream once the trailer has been checked.
pub struct Gunzip {
    decompress: Option<Decompress>,
    crc: Crc,
    phase: Phase,
}

impl Gunzip {
    pub fn new() -> Self {
        Self {
            decompress: None,
            crc: Crc::new(),
            phase: Phase::Header(Vec::new()),
        }
    }

    /// Returns bytes consumed, bytes produced and the inflater status.
    fn inflate(
        &mut self,
        input: &[u8],
        out: &mut Blob,
        flush: FlushDecompress,
    ) -> Result<(usize, usize, Status), CodecError> {
        let decompress = self.decompress.as_mut().ok_or(CodecError::Closed)?;
        let (in_before, out_before) = (decompress.total_in(), decompress.total_out());
        let start = out.len();

        let status = decompress.decompress(input, out.spare_mut(), flush)?;

        let consumed = (decompress.total_in() - in_before) as usize;
        let produced = (decompress.total_out() - out_before) as usize;
        out.advance(produced);
        self.crc.update(&out.as_slice()[start..]);
        Ok((consumed, produced, status))
    }

    fn check_trailer(&self, trailer: &[u8]) -> Result<(), CodecError> {
        let crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let size = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
        if crc != self.crc.sum() || size != self.crc.amount() {
            return Err(CodecError::Checksum);
        }
        Ok(())
    }
}

impl Default for Gunzip {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Gunzip {
    type Error = CodecError;
    const NAME: &'static str = "gunzip";

    fn init(&mut self) -> Result<(), CodecError> {
        self.decompress = Some(Decompress::new(false));
        self.crc = Crc::new();
        self.phase = Phase::Header(Vec::new());
        Ok(())
    }

    fn write(&mut self, input: &[u8], out: &mut Blob) -> Result<Step, CodecError> {
        match &mut self.phase {
            Phase::Header(buf) => {
                let before = buf.len();
                buf.extend_from_slice(input);
                match parse_header(buf)? {
                    Some(end) => {
                        self.phase = Phase::Body;
                        Ok(Step::consumed(end - before))
                    }
                    None if buf.len() > MAX_HEADER => Err(CodecError::Header("header too long")),
                    None => Ok(Step::consumed(input.len())),
                }
            }
            Phase::Body => {
                let (consumed, _, status) = self.inflate(input, out, FlushDecompress::None)?;
                if status == Status::StreamEnd {
                    self.phase = Phase::Trailer(Vec::with_capacity(8));
                }
                Ok(Step::consumed(consumed))
            }
            Phase::Trailer(buf) => {
                let take = (8 - buf.len()).min(input.len());
                buf.extend_from_slice(&input[..take]);
                if buf.len() < 8 {
                    return Ok(Step::consumed(take));
                }
                let trailer = std::mem::take(buf);
                self.check_trailer(&trailer)?;
                self.phase = Phase::Done;
                Ok(Step::end_of_stream(take))
            }
            Phase::Done => Ok(Step::end_of_stream(0)),
        }
    }

    fn finish(&mut self, out: &mut Blob) -> Result<Flow, CodecError> {
        match self.phase {
            Phase::Done => Ok(Flow::EndOfStream),
            Phase::Body => {
                let (_, produced, _) = self.inflate(&[], out, FlushDecompress::Finish)?;
                // Buffered output may still drain; the trailer never will.
                if produced > 0 {
                    Ok(Flow::Continue)
                } else {
                    Err(CodecError::Truncated)
                }
            }
            Phase::Header(_) | Phase::Trailer(_) => Err(CodecError::Truncated),
        }
    }

    fn destroy(&mut self) {
        self.decompress = None;
    }
}

/// Length of the member header at the start of `buf`, or `None` if more
/// bytes are needed.
fn parse_header(buf: &[u8]) -> Result<Option<usize>, CodecError> {
    if buf.len() >= 2 && buf[..2] != MAGIC {
        return Err(CodecError::Header("not a gzip stream"));
    }
    if buf.len() < 10 {
        return Ok(None);
    }
    if buf[2] != METHOD_DEFLATE {
        return Err(CodecError::Header("unsupported compression method"));
    }

    let flags = buf[3];
    let mut pos = 10;
    if flags & FEXTRA != 0 {
        if buf.len() < pos + 2 {
            return Ok(None);
        }
        let xlen = u16::from_le_bytes([buf[pos], buf[pos + 1]]) as usize;
        pos += 2 + xlen;
        if buf.len() < pos {
            return Ok(None);
        }
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            match buf[pos..].iter().position(|&b| b == 0) {
                Some(nul) => pos += nul + 1,
                None => return Ok(None),
            }
        }
    }
    if flags & FHCRC != 0 {
        pos += 2;
        if buf.len() < pos {
            return Ok(None);
        }
    }
    Ok(Some(pos))
}
