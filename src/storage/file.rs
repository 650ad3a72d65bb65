//! File-based storage implementation.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use log::{debug, warn};
use memmap2::MmapOptions;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::storage::shared::{ByteSource, SharedInput};
use crate::storage::{Storage, StorageError, StorageInput, StorageLock, StorageOutput};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding the files.
    pub path: PathBuf,

    /// Map inputs into memory instead of reading them onto the heap.
    pub use_mmap: bool,

    /// Write buffer size in bytes.
    pub buffer_size: usize,

    /// Call `fsync` when an output is closed.
    pub sync_on_close: bool,
}

impl FileStorageConfig {
    /// Create a configuration with defaults for the given directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            use_mmap: true,
            buffer_size: 65536,
            sync_on_close: false,
        }
    }
}

/// A directory on the local file system.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    config: FileStorageConfig,
    held_locks: Arc<Mutex<HashSet<String>>>,
}

impl FileStorage {
    /// Open (creating if necessary) the directory named in the config.
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        let directory = config.path.clone();

        if !directory.exists() {
            fs::create_dir_all(&directory)
                .map_err(|e| TesseraError::storage(format!("Failed to create directory: {e}")))?;
        }

        if !directory.is_dir() {
            return Err(TesseraError::storage(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        if config.buffer_size == 0 {
            return Err(TesseraError::invalid_argument("buffer_size must be > 0"));
        }

        Ok(FileStorage {
            directory,
            config,
            held_locks: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// The directory this storage lives in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn not_found_or_io(name: &str, e: io::Error) -> TesseraError {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::FileNotFound(name.to_string()).into()
        } else {
            TesseraError::Io(e)
        }
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let mut file =
            File::open(self.file_path(name)).map_err(|e| Self::not_found_or_io(name, e))?;
        let length = file.metadata()?.len();

        // Zero-length files cannot be mapped on every platform.
        let source = if self.config.use_mmap && length > 0 {
            let map = unsafe { MmapOptions::new().map(&file)? };
            ByteSource::Mapped(Arc::new(map))
        } else {
            let mut bytes = Vec::with_capacity(length as usize);
            file.read_to_end(&mut bytes)?;
            ByteSource::Heap(Arc::from(bytes))
        };

        Ok(Box::new(SharedInput::new(name, source)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.file_path(name))
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    StorageError::FileExists(name.to_string()).into()
                } else {
                    TesseraError::Io(e)
                }
            })?;
        debug!("file storage: created {name}");

        Ok(Box::new(FileOutput {
            name: name.to_string(),
            writer: Some(BufWriter::with_capacity(self.config.buffer_size, file)),
            sync_on_close: self.config.sync_on_close,
            position: 0,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.file_path(name).is_file()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(self.file_path(name)).map_err(|e| Self::not_found_or_io(name, e))?;
        debug!("file storage: deleted {name}");
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                files.push(name.to_string());
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let metadata = self
            .file_path(name)
            .metadata()
            .map_err(|e| Self::not_found_or_io(name, e))?;
        Ok(metadata.len())
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.file_path(from), self.file_path(to))
            .map_err(|e| Self::not_found_or_io(from, e))?;
        debug!("file storage: renamed {from} -> {to}");
        Ok(())
    }

    fn sync(&self, names: &[String]) -> Result<()> {
        for name in names {
            let file = File::open(self.file_path(name)).map_err(|e| Self::not_found_or_io(name, e))?;
            file.sync_all()?;
        }
        Ok(())
    }

    fn obtain_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        // Locks held through another handle in this process must conflict too,
        // whatever the platform's file-lock semantics are.
        if !self.held_locks.lock().insert(name.to_string()) {
            return Err(StorageError::LockHeld(name.to_string()).into());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.file_path(name));

        let file = match file {
            Ok(file) => file,
            Err(e) => {
                self.held_locks.lock().remove(name);
                return Err(e.into());
            }
        };

        if file.try_lock_exclusive().is_err() {
            self.held_locks.lock().remove(name);
            return Err(StorageError::LockHeld(name.to_string()).into());
        }

        debug!("file storage: obtained lock {name}");
        Ok(Box::new(FileLock {
            name: name.to_string(),
            file: Some(file),
            held_locks: Arc::clone(&self.held_locks),
        }))
    }
}

/// A buffered, append-only file writer.
#[derive(Debug)]
pub struct FileOutput {
    name: String,
    writer: Option<BufWriter<File>>,
    sync_on_close: bool,
    position: u64,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("Output is closed"))?;
        let written = writer.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl StorageOutput for FileOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn close(&mut self) -> Result<()> {
        // Taking the writer first means the handle is dropped even if the
        // flush below fails.
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            if self.sync_on_close {
                file.sync_all()?;
            }
        }
        Ok(())
    }
}

impl Drop for FileOutput {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("file storage: failed to close {}: {e}", self.name);
        }
    }
}

/// An exclusive lock on a file in a [`FileStorage`].
#[derive(Debug)]
struct FileLock {
    name: String,
    file: Option<File>,
    held_locks: Arc<Mutex<HashSet<String>>>,
}

impl StorageLock for FileLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            self.held_locks.lock().remove(&self.name);
            FileExt::unlock(&file)?;
            debug!("file storage: released lock {}", self.name);
        }
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("file storage: failed to release lock {}: {e}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> FileStorage {
        FileStorage::new(FileStorageConfig::new(dir.path())).unwrap()
    }

    #[test]
    fn test_create_and_read_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);

        let mut output = storage.create_output("test.bin").unwrap();
        output.write_all(b"Hello, World!").unwrap();
        output.close().unwrap();

        assert!(storage.file_exists("test.bin"));
        assert_eq!(storage.file_size("test.bin").unwrap(), 13);

        let mut input = storage.open_input("test.bin").unwrap();
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer).unwrap();
        assert_eq!(buffer, b"Hello, World!");
    }

    #[test]
    fn test_heap_inputs_and_empty_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = FileStorageConfig::new(temp_dir.path());
        config.use_mmap = false;
        let storage = FileStorage::new(config).unwrap();

        storage.create_output("empty.bin").unwrap().close().unwrap();
        let input = storage.open_input("empty.bin").unwrap();
        assert_eq!(input.length(), 0);
    }

    #[test]
    fn test_no_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);

        storage.create_output("a.bin").unwrap().close().unwrap();
        let err = storage.create_output("a.bin").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_rename_delete_list() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);

        for name in ["b.bin", "a.bin"] {
            let mut output = storage.create_output(name).unwrap();
            output.write_all(name.as_bytes()).unwrap();
            output.close().unwrap();
        }
        assert_eq!(storage.list_files().unwrap(), vec!["a.bin", "b.bin"]);

        storage.rename_file("a.bin", "c.bin").unwrap();
        storage.delete_file("b.bin").unwrap();
        assert_eq!(storage.list_files().unwrap(), vec!["c.bin"]);
        storage.sync(&["c.bin".to_string()]).unwrap();

        assert!(storage.delete_file("missing.bin").is_err());
        assert!(storage.open_input("missing.bin").is_err());
    }

    #[test]
    fn test_lock_is_exclusive_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let first = storage(&temp_dir);
        let second = storage(&temp_dir);

        let lock = first.obtain_lock("write.lock").unwrap();
        let err = first.obtain_lock("write.lock").unwrap_err();
        assert!(matches!(err, TesseraError::LockHeld(_)));
        let err = second.obtain_lock("write.lock").unwrap_err();
        assert!(matches!(err, TesseraError::LockHeld(_)));

        drop(lock);
        let mut lock = second.obtain_lock("write.lock").unwrap();
        lock.release().unwrap();
        assert!(!lock.is_valid());
    }

    #[test]
    fn test_dropped_output_leaves_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);

        {
            let mut output = storage.create_output("partial.bin").unwrap();
            output.write_all(b"half").unwrap();
        }

        assert_eq!(storage.file_size("partial.bin").unwrap(), 4);
    }
}
