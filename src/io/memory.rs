//! In-memory and memory-mapped byte sources.

use std::fs::File;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use memmap2::Mmap;

use super::source::{check_range, ByteSource};
use crate::error::IoError;

/// A byte source over an owned buffer.
///
/// Reads are zero-copy slices of the shared buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    identifier: String,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// A byte source over a memory-mapped file.
///
/// The mapping is read-only and owned by a `Bytes` handle, so reads are
/// slices into the page cache with no copying or locking.
#[derive(Debug, Clone)]
pub struct MmapSource {
    inner: MemorySource,
}

impl MmapSource {
    /// Map the file at `path`.
    ///
    /// The file must not be truncated while the source is alive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let open_err = |e: std::io::Error| IoError::Open {
            path: display.clone(),
            message: e.to_string(),
        };

        let file = File::open(path).map_err(open_err)?;
        // SAFETY: the mapping is read-only; callers keep the file unmodified.
        let mmap = unsafe { Mmap::map(&file) }.map_err(open_err)?;

        Ok(Self {
            inner: MemorySource::new(Bytes::from_owner(mmap), display),
        })
    }
}

#[async_trait]
impl ByteSource for MmapSource {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.inner.read_exact_at(offset, len).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
