//! Inputs backed by shared, immutable bytes.
//!
//! Both backends hand out [`SharedInput`]s: the memory storage over its
//! `Arc<[u8]>` buffers, the file storage over a memory map. Slices and clones
//! only bump a reference count.

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{Result, TesseraError};
use crate::storage::{StorageError, StorageInput};

/// The bytes behind an input.
#[derive(Clone)]
pub enum ByteSource {
    /// Heap-allocated bytes.
    Heap(Arc<[u8]>),
    /// A read-only memory map.
    Mapped(Arc<Mmap>),
}

impl ByteSource {
    fn as_slice(&self) -> &[u8] {
        match self {
            ByteSource::Heap(bytes) => bytes,
            ByteSource::Mapped(map) => map,
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Heap(bytes) => write!(f, "Heap({} bytes)", bytes.len()),
            ByteSource::Mapped(map) => write!(f, "Mapped({} bytes)", map.len()),
        }
    }
}

/// A [`StorageInput`] over a window `[start, end)` of a [`ByteSource`].
#[derive(Debug, Clone)]
pub struct SharedInput {
    description: String,
    source: ByteSource,
    start: usize,
    end: usize,
    pos: usize,
}

impl SharedInput {
    /// Create an input over the whole source.
    pub fn new<S: Into<String>>(description: S, source: ByteSource) -> Self {
        let end = source.as_slice().len();
        SharedInput {
            description: description.into(),
            source,
            start: 0,
            end,
            pos: 0,
        }
    }

    fn window(&self) -> &[u8] {
        &self.source.as_slice()[self.start..self.end]
    }
}

impl Read for SharedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let window = &self.source.as_slice()[self.start..self.end];
        let available = &window[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl StorageInput for SharedInput {
    fn description(&self) -> &str {
        &self.description
    }

    fn length(&self) -> u64 {
        (self.end - self.start) as u64
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.length() {
            return Err(StorageError::EndOfFile(self.description.clone()).into());
        }
        self.pos = pos as usize;
        Ok(())
    }

    fn slice(
        &self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> Result<Box<dyn StorageInput>> {
        let too_long = offset
            .checked_add(length)
            .is_none_or(|slice_end| slice_end > self.length());
        if too_long {
            return Err(TesseraError::corrupt(
                &self.description,
                format!(
                    "slice [{offset}, +{length}) out of bounds for length {}",
                    self.length()
                ),
            ));
        }

        let start = self.start + offset as usize;
        Ok(Box::new(SharedInput {
            description: format!("{} [slice={description}]", self.description),
            source: self.source.clone(),
            start,
            end: start + length as usize,
            pos: 0,
        }))
    }

    fn clone_input(&self) -> Box<dyn StorageInput> {
        Box::new(self.clone())
    }
}

impl AsRef<[u8]> for SharedInput {
    fn as_ref(&self) -> &[u8] {
        self.window()
    }
}
