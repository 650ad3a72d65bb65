//! Storage abstraction layer for Tessera.
//!
//! A [`Storage`] is a flat namespace of named, write-once files. Everything
//! above this layer (codecs, segment writers, the index checker) reaches the
//! disk only through the primitives defined here.
//!
//! # Architecture
//!
//! - **Storage trait**: create/open/delete/rename/list files, exclusive locks
//! - **StorageInput / StorageOutput**: sequential streams; inputs can be sliced
//! - **StorageConfig enum**: type-safe configuration for the supported backends
//! - **StorageFactory**: helper for constructing concrete storage instances
//! - **checksum / text**: streams that maintain a running CRC-32 and write or
//!   verify the file footer, in binary and human-readable flavours
//!
//! # Example
//!
//! ```
//! use std::io::{Read, Write};
//!
//! use tessera::storage::memory::MemoryStorageConfig;
//! use tessera::storage::{StorageConfig, StorageFactory};
//!
//! # fn main() -> tessera::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?;
//!
//! let mut output = storage.create_output("_0.doc")?;
//! output.write_all(b"postings")?;
//! output.close()?;
//!
//! let mut input = storage.open_input("_0.doc")?;
//! let mut buffer = Vec::new();
//! input.read_to_end(&mut buffer)?;
//! assert_eq!(buffer, b"postings");
//! # Ok(())
//! # }
//! ```

use std::fmt::Debug;
use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};

pub mod checksum;
pub mod file;
pub mod memory;
pub mod shared;
pub mod text;

/// Name of the lock file guarding a storage against concurrent writers.
pub const WRITE_LOCK_NAME: &str = "write.lock";

/// A flat namespace of write-once files.
///
/// Implementations must be safe to call from several threads at once. They
/// provide no cross-process coordination beyond [`Storage::obtain_lock`].
pub trait Storage: Send + Sync + Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a new file for writing.
    ///
    /// Files are written strictly sequentially and never overwritten: this
    /// fails if a file with the same name already exists.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Fails if it does not exist.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all file names, sorted.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the length of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Atomically rename `from` to `to`, replacing `to` if it exists.
    fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    /// Ensure the named files are durable.
    fn sync(&self, names: &[String]) -> Result<()>;

    /// Acquire an exclusive lock.
    ///
    /// Never blocks: if the lock is already held this fails immediately with
    /// [`TesseraError::LockHeld`].
    fn obtain_lock(&self, name: &str) -> Result<Box<dyn StorageLock>>;
}

/// A sequential reader over one file, or over a slice of one.
pub trait StorageInput: Read + Send + Debug {
    /// Human-readable description used in corruption messages.
    fn description(&self) -> &str;

    /// Total number of bytes visible through this input.
    fn length(&self) -> u64;

    /// Current read position, relative to the start of this input.
    fn position(&self) -> u64;

    /// Move the read position. Seeking past the end is an error.
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Create a view over `length` bytes starting at `offset`.
    ///
    /// The slice shares the underlying bytes with this input; dropping either
    /// one does not affect the other.
    fn slice(&self, description: &str, offset: u64, length: u64)
    -> Result<Box<dyn StorageInput>>;

    /// Clone this input, including its current position.
    fn clone_input(&self) -> Box<dyn StorageInput>;

    /// Bytes left between the current position and the end.
    fn remaining(&self) -> u64 {
        self.length().saturating_sub(self.position())
    }
}

/// An append-only writer for one file.
///
/// Dropping an output without calling [`StorageOutput::close`] still releases
/// its handle; whatever was written so far stays in the storage.
pub trait StorageOutput: Write + Send + Debug {
    /// The file name this output writes.
    fn name(&self) -> &str;

    /// Number of bytes written so far.
    fn position(&self) -> u64;

    /// Flush and close the output. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// An exclusive lock held on a storage.
///
/// The lock is released by [`StorageLock::release`] or when dropped.
pub trait StorageLock: Send + Debug {
    /// Get the name of the lock.
    fn name(&self) -> &str;

    /// Release the lock. Releasing twice is a no-op.
    fn release(&mut self) -> Result<()>;

    /// Check if the lock is still held.
    fn is_valid(&self) -> bool;
}

impl StorageInput for Box<dyn StorageInput> {
    fn description(&self) -> &str {
        self.as_ref().description()
    }

    fn length(&self) -> u64 {
        self.as_ref().length()
    }

    fn position(&self) -> u64 {
        self.as_ref().position()
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.as_mut().seek(pos)
    }

    fn slice(
        &self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> Result<Box<dyn StorageInput>> {
        self.as_ref().slice(description, offset, length)
    }

    fn clone_input(&self) -> Box<dyn StorageInput> {
        self.as_ref().clone_input()
    }
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn position(&self) -> u64 {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// Configuration for storage backends.
///
/// ```
/// use tessera::storage::StorageConfig;
/// use tessera::storage::file::FileStorageConfig;
///
/// let mut file_config = FileStorageConfig::new("/data/index");
/// file_config.use_mmap = false;
/// let config = StorageConfig::File(file_config);
/// assert!(matches!(config, StorageConfig::File(_)));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    /// File-based storage configuration (includes path).
    File(file::FileStorageConfig),

    /// Memory-based storage configuration.
    Memory(memory::MemoryStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(memory::MemoryStorageConfig::default())
    }
}

/// A factory for creating storage instances.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a new storage instance with the given configuration.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(mem_config) => {
                Ok(Arc::new(memory::MemoryStorage::new(mem_config)))
            }
            StorageConfig::File(file_config) => Ok(Arc::new(file::FileStorage::new(file_config)?)),
        }
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// File already exists.
    FileExists(String),

    /// Lock acquisition failed because someone else holds it.
    LockHeld(String),

    /// Read or seek past the end of an input.
    EndOfFile(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::FileExists(name) => write!(f, "File already exists: {name}"),
            StorageError::LockHeld(name) => write!(f, "Lock already held: {name}"),
            StorageError::EndOfFile(name) => write!(f, "Read past EOF: {name}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for TesseraError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LockHeld(name) => TesseraError::lock_held(name),
            StorageError::EndOfFile(name) => TesseraError::corrupt(name, "read past EOF"),
            other => TesseraError::storage(other.to_string()),
        }
    }
}
