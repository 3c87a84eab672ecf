use std::ops::Range;

use crate::error::{Error, Result};

/// The value bytes of every field in a message, concatenated in field order.
///
/// Each field owns one contiguous range; the field table records where. Growth goes through
/// `try_reserve`, so running out of memory surfaces as [`Error::AllocationFailure`] instead of an
/// abort. Capacity grows geometrically, as `Vec` does.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct DataStore {
    buf: Vec<u8>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy a value region out of a larger buffer.
    pub fn copy_from(data: &[u8]) -> Result<Self> {
        let mut store = Self::new();
        store.reserve(data.len())?;
        store.buf.extend_from_slice(data);
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn get(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        self.buf
            .try_reserve(additional)
            .map_err(|source| Error::AllocationFailure {
                requested: additional,
                source,
            })
    }

    /// Append bytes at the end, returning the offset they landed at.
    pub fn append(&mut self, data: &[u8]) -> Result<usize> {
        let offset = self.buf.len();
        self.reserve(data.len())?;
        self.buf.extend_from_slice(data);
        Ok(offset)
    }

    /// Insert bytes at `at`, moving everything after it back.
    pub fn insert(&mut self, at: usize, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?;
        self.buf.splice(at..at, data.iter().copied());
        Ok(())
    }

    /// Replace the bytes in `range` with `data`, which may be a different length.
    pub fn replace(&mut self, range: Range<usize>, data: &[u8]) -> Result<()> {
        if data.len() == range.len() {
            self.buf[range].copy_from_slice(data);
            return Ok(());
        }
        self.reserve(data.len().saturating_sub(range.len()))?;
        self.buf.splice(range, data.iter().copied());
        Ok(())
    }

    pub fn remove(&mut self, range: Range<usize>) {
        self.buf.drain(range);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
