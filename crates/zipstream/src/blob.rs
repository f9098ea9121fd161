//! Growable output buffer.
//!
//! A [`Blob`] collects the bytes one operation produces. Processors write
//! straight into its spare region and then report how much they produced.

/// Errors from [`Blob::grow_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GrowError {
    #[error("Allocation of {0} bytes failed")]
    Alloc(usize),

    #[error("Output would exceed the {limit} byte ceiling")]
    Limit { limit: usize },
}

/// Append-only byte buffer that grows on demand.
///
/// The bytes in `data[len..]` are zeroed spare room handed to processors.
#[derive(Debug, Default)]
pub struct Blob {
    data: Vec<u8>,
    len: usize,
    limit: Option<usize>,
}

impl Blob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a blob that refuses to grow past `limit` bytes.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            data: Vec::new(),
            len: 0,
            limit,
        }
    }

    /// Make sure at least `n` bytes of spare room are available.
    ///
    /// With a limit the room is clamped to what is left under it; only a
    /// blob already holding `limit` bytes refuses to grow.
    pub fn grow_by(&mut self, n: usize) -> Result<(), GrowError> {
        let mut target = self.len.checked_add(n).ok_or(GrowError::Alloc(n))?;
        if let Some(limit) = self.limit {
            if self.len >= limit {
                return Err(GrowError::Limit { limit });
            }
            target = target.min(limit);
        }
        if target <= self.data.len() {
            return Ok(());
        }

        let additional = target - self.data.len();
        self.data
            .try_reserve(additional)
            .map_err(|_| GrowError::Alloc(additional))?;
        self.data.resize(target, 0);
        Ok(())
    }

    /// Spare room after the written bytes.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    pub fn spare_len(&self) -> usize {
        self.data.len() - self.len
    }

    /// Mark `n` bytes of the spare room as written.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.spare_len(), "advance past spare room");
        self.len += n.min(self.spare_len());
    }

    /// Copy `bytes` into the spare room, returning how many fit.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.spare_len());
        self.spare_mut()[..n].copy_from_slice(&bytes[..n]);
        self.len += n;
        n
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.len);
        self.data
    }
}
