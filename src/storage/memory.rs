//! In-memory storage implementation for testing and temporary indexes.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::shared::{ByteSource, SharedInput};
use crate::storage::{Storage, StorageError, StorageInput, StorageLock, StorageOutput};

/// Configuration for [`MemoryStorage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    /// Upper bound on the total bytes held, or `None` for unbounded.
    ///
    /// A write that would exceed the bound fails with an I/O error, which is
    /// how tests simulate a full disk.
    pub max_bytes: Option<u64>,
}

type FileMap = Arc<RwLock<HashMap<String, Arc<[u8]>>>>;

/// An in-memory storage implementation.
#[derive(Debug)]
pub struct MemoryStorage {
    files: FileMap,
    locks: Arc<Mutex<HashSet<String>>>,
    used_bytes: Arc<AtomicU64>,
    config: MemoryStorageConfig,
}

impl MemoryStorage {
    /// Create a new memory storage.
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(RwLock::new(HashMap::new())),
            locks: Arc::new(Mutex::new(HashSet::new())),
            used_bytes: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    /// Create a new memory storage with default configuration.
    pub fn new_default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Get the total size of all files, including outputs still being written.
    pub fn total_size(&self) -> u64 {
        self.used_bytes.load(Ordering::SeqCst)
    }

    /// Overwrite a published file in place.
    ///
    /// Outputs never do this; it exists so tests can corrupt files.
    pub fn replace_contents(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let mut files = self.files.write();
        let old = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;
        self.used_bytes.fetch_sub(old.len() as u64, Ordering::SeqCst);
        self.used_bytes.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        files.insert(name.to_string(), Arc::from(bytes));
        Ok(())
    }

    /// Read a whole file into a vector.
    pub fn read_contents(&self, name: &str) -> Result<Vec<u8>> {
        let files = self.files.read();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;
        Ok(data.to_vec())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new_default()
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let files = self.files.read();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(Box::new(SharedInput::new(
            name,
            ByteSource::Heap(Arc::clone(data)),
        )))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let mut files = self.files.write();
        if files.contains_key(name) {
            return Err(StorageError::FileExists(name.to_string()).into());
        }
        // The name is reserved right away so a second create fails.
        let reservation: Arc<[u8]> = Arc::from(Vec::new());
        files.insert(name.to_string(), Arc::clone(&reservation));
        debug!("memory storage: created {name}");

        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            reservation,
            files: Arc::clone(&self.files),
            used_bytes: Arc::clone(&self.used_bytes),
            max_bytes: self.config.max_bytes,
            closed: false,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let removed = self
            .files
            .write()
            .remove(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;
        self.used_bytes
            .fetch_sub(removed.len() as u64, Ordering::SeqCst);
        debug!("memory storage: deleted {name}");
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.read();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;
        Ok(data.len() as u64)
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files.write();
        let data = files
            .remove(from)
            .ok_or_else(|| StorageError::FileNotFound(from.to_string()))?;
        if let Some(replaced) = files.insert(to.to_string(), data) {
            self.used_bytes
                .fetch_sub(replaced.len() as u64, Ordering::SeqCst);
        }
        debug!("memory storage: renamed {from} -> {to}");
        Ok(())
    }

    fn sync(&self, names: &[String]) -> Result<()> {
        let files = self.files.read();
        for name in names {
            if !files.contains_key(name) {
                return Err(StorageError::FileNotFound(name.clone()).into());
            }
        }
        Ok(())
    }

    fn obtain_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        let mut locks = self.locks.lock();
        if !locks.insert(name.to_string()) {
            return Err(StorageError::LockHeld(name.to_string()).into());
        }
        debug!("memory storage: obtained lock {name}");
        Ok(Box::new(MemoryLock {
            name: name.to_string(),
            locks: Arc::clone(&self.locks),
            released: false,
        }))
    }
}

/// A memory-based output. Its bytes are published on close or drop.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    reservation: Arc<[u8]>,
    files: FileMap,
    used_bytes: Arc<AtomicU64>,
    max_bytes: Option<u64>,
    closed: bool,
}

impl MemoryOutput {
    /// Replace the reservation with the written bytes. If the file was
    /// deleted or renamed while open, the bytes are discarded.
    fn publish(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        let mut files = self.files.write();
        match files.get_mut(&self.name) {
            Some(slot) if Arc::ptr_eq(slot, &self.reservation) => {
                *slot = Arc::from(buffer);
            }
            _ => {
                self.used_bytes
                    .fetch_sub(buffer.len() as u64, Ordering::SeqCst);
                debug!(
                    "memory storage: {} was removed while open; dropping {} bytes",
                    self.name,
                    buffer.len()
                );
            }
        }
        self.closed = true;
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other("Output is closed"));
        }

        let len = buf.len() as u64;
        if let Some(max) = self.max_bytes {
            let reserved = self.used_bytes.fetch_add(len, Ordering::SeqCst);
            if reserved + len > max {
                self.used_bytes.fetch_sub(len, Ordering::SeqCst);
                return Err(io::Error::new(
                    io::ErrorKind::StorageFull,
                    format!("capacity of {max} bytes exceeded writing {}", self.name),
                ));
            }
        } else {
            self.used_bytes.fetch_add(len, Ordering::SeqCst);
        }

        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.publish();
        }
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        if !self.closed {
            self.publish();
        }
    }
}

/// A lock held on a [`MemoryStorage`].
#[derive(Debug)]
struct MemoryLock {
    name: String,
    locks: Arc<Mutex<HashSet<String>>>,
    released: bool,
}

impl StorageLock for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.locks.lock().remove(&self.name);
            self.released = true;
            debug!("memory storage: released lock {}", self.name);
        }
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.released
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::error::TesseraError;

    #[test]
    fn test_create_and_read_file() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("test.bin").unwrap();
        output.write_all(b"Hello, Memory!").unwrap();
        assert_eq!(output.position(), 14);
        output.close().unwrap();

        let mut input = storage.open_input("test.bin").unwrap();
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer).unwrap();

        assert_eq!(buffer, b"Hello, Memory!");
        assert_eq!(input.length(), 14);
        assert_eq!(storage.file_count(), 1);
        assert_eq!(storage.total_size(), 14);
    }

    #[test]
    fn test_file_operations() {
        let storage = MemoryStorage::new_default();
        assert!(!storage.file_exists("test.bin"));

        let mut output = storage.create_output("test.bin").unwrap();
        output.write_all(b"Test content").unwrap();
        output.close().unwrap();

        assert!(storage.file_exists("test.bin"));
        assert_eq!(storage.file_size("test.bin").unwrap(), 12);
        assert_eq!(storage.list_files().unwrap(), vec!["test.bin"]);

        storage.rename_file("test.bin", "renamed.bin").unwrap();
        assert!(!storage.file_exists("test.bin"));
        assert!(storage.file_exists("renamed.bin"));

        storage.delete_file("renamed.bin").unwrap();
        assert!(!storage.file_exists("renamed.bin"));
        assert_eq!(storage.total_size(), 0);
        assert!(storage.delete_file("renamed.bin").is_err());
    }

    #[test]
    fn test_create_existing_file_fails() {
        let storage = MemoryStorage::new_default();
        let _open = storage.create_output("a.bin").unwrap();
        assert!(storage.create_output("a.bin").is_err());
    }

    #[test]
    fn test_capacity_exceeded_leaves_partial_file() {
        let storage = MemoryStorage::new(MemoryStorageConfig {
            max_bytes: Some(8),
        });

        {
            let mut output = storage.create_output("big.bin").unwrap();
            output.write_all(b"12345").unwrap();
            let err = output.write_all(b"6789").unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::StorageFull);
            // dropped without close
        }

        assert_eq!(storage.read_contents("big.bin").unwrap(), b"12345");
    }

    #[test]
    fn test_file_deleted_while_open_stays_deleted() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("gone.bin").unwrap();
        output.write_all(b"abc").unwrap();
        storage.delete_file("gone.bin").unwrap();
        output.close().unwrap();

        assert!(!storage.file_exists("gone.bin"));
        assert_eq!(storage.file_count(), 0);
        assert_eq!(storage.total_size(), 0);
    }

    #[test]
    fn test_file_renamed_while_open_keeps_one_name() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("a.bin").unwrap();
        output.write_all(b"abc").unwrap();
        storage.rename_file("a.bin", "b.bin").unwrap();
        drop(output);

        assert!(!storage.file_exists("a.bin"));
        assert!(storage.file_exists("b.bin"));
        assert_eq!(storage.list_files().unwrap(), vec!["b.bin"]);
        assert_eq!(storage.total_size(), storage.file_size("b.bin").unwrap());
    }

    #[test]
    fn test_recreated_file_is_not_overwritten_by_stale_output() {
        let storage = MemoryStorage::new_default();

        let mut stale = storage.create_output("a.bin").unwrap();
        stale.write_all(b"old").unwrap();
        storage.delete_file("a.bin").unwrap();

        let mut fresh = storage.create_output("a.bin").unwrap();
        fresh.write_all(b"new!").unwrap();
        fresh.close().unwrap();
        stale.close().unwrap();

        assert_eq!(storage.read_contents("a.bin").unwrap(), b"new!");
        assert_eq!(storage.total_size(), 4);
    }

    #[test]
    fn test_lock_exclusivity() {
        let storage = MemoryStorage::new_default();

        let mut lock = storage.obtain_lock("write.lock").unwrap();
        assert!(lock.is_valid());

        let err = storage.obtain_lock("write.lock").unwrap_err();
        assert!(matches!(err, TesseraError::LockHeld(_)));

        lock.release().unwrap();
        assert!(!lock.is_valid());

        let relock = storage.obtain_lock("write.lock").unwrap();
        drop(relock);
        assert!(storage.obtain_lock("write.lock").is_ok());
    }
}
