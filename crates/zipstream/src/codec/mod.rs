//! Reference processors over `flate2`.
//!
//! `Deflate`/`Inflate` use zlib framing, `Gzip`/`Gunzip` gzip framing. All of
//! them write straight into the blob's spare room.

mod deflate;
mod gzip;
mod inflate;

pub use deflate::Deflate;
pub use gzip::{Gunzip, Gzip};
pub use inflate::Inflate;

/// Errors raised by the bundled codecs.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Compression failed: {0}")]
    Compress(#[from] flate2::CompressError),

    #[error("Decompression failed: {0}")]
    Decompress(#[from] flate2::DecompressError),

    #[error("Compressed stream ended early")]
    Truncated,

    #[error("Invalid gzip header: {0}")]
    Header(&'static str),

    #[error("gzip trailer does not match the decompressed data")]
    Checksum,

    #[error("Invalid compression level {0}, expected 0-9")]
    Level(u32),

    #[error("Codec used after destroy")]
    Closed,
}
