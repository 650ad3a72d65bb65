//! Commit points: the `segments_{gen}` files listing the live segments.
//!
//! Each commit writes a new generation. The file is first written as
//! `pending_segments_{gen}`, synced, and then renamed, so a reader never sees
//! a partially written commit under its final name. Generations are rendered
//! in base 36, like segment names.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::storage::Storage;
use crate::storage::checksum::{ChecksumInput, ChecksumOutput, SegmentId, random_id};

/// Prefix of committed segments files.
pub const SEGMENTS_PREFIX: &str = "segments";

/// Prefix of commits still being written.
pub const PENDING_SEGMENTS_PREFIX: &str = "pending_segments";

const COMMIT_CODEC: &str = "TesseraSegments";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = VERSION_START;

/// Render a number in lowercase base 36.
pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Parse a lowercase base 36 number.
pub fn from_base36(text: &str) -> Option<u64> {
    if text.is_empty() || text.bytes().any(|b| b.is_ascii_uppercase()) {
        return None;
    }
    u64::from_str_radix(text, 36).ok()
}

/// Name of a segment from its ordinal: `_0`, `_1`, ... `_a`, ...
pub fn segment_name(counter: u64) -> String {
    format!("_{}", to_base36(counter))
}

/// What a commit records about one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCommitInfo {
    pub name: String,
    pub id: SegmentId,
    pub codec: String,
    pub max_doc: u32,
}

/// The set of segments visible at one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPoint {
    /// Zero until the first commit is written.
    pub generation: u64,
    pub id: SegmentId,
    /// Ordinal of the next segment to be named.
    pub counter: u64,
    pub segments: Vec<SegmentCommitInfo>,
    pub user_data: BTreeMap<String, String>,
}

impl Default for CommitPoint {
    fn default() -> Self {
        CommitPoint {
            generation: 0,
            id: [0u8; 16],
            counter: 0,
            segments: Vec::new(),
            user_data: BTreeMap::new(),
        }
    }
}

impl CommitPoint {
    /// Name of the segments file of a generation.
    pub fn file_name(generation: u64) -> String {
        format!("{SEGMENTS_PREFIX}_{}", to_base36(generation))
    }

    fn pending_file_name(generation: u64) -> String {
        format!("{PENDING_SEGMENTS_PREFIX}_{}", to_base36(generation))
    }

    /// The generation of a committed segments file name.
    pub fn generation_of(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(SEGMENTS_PREFIX)?
            .strip_prefix('_')
            .and_then(from_base36)
    }

    /// Highest committed generation in a storage.
    pub fn latest_generation(storage: &dyn Storage) -> Result<Option<u64>> {
        Ok(storage
            .list_files()?
            .iter()
            .filter_map(|name| Self::generation_of(name))
            .max())
    }

    /// Read the commit of the latest generation, or `None` if nothing has
    /// been committed.
    ///
    /// # Errors
    ///
    /// [`TesseraError::CorruptIndex`] if the latest segments file fails
    /// verification. Older generations are not consulted.
    pub fn read_latest(storage: &dyn Storage) -> Result<Option<Self>> {
        match Self::latest_generation(storage)? {
            Some(generation) => Self::read(storage, generation).map(Some),
            None => Ok(None),
        }
    }

    /// Read and verify the commit of one generation.
    pub fn read(storage: &dyn Storage, generation: u64) -> Result<Self> {
        let name = Self::file_name(generation);
        let mut input = ChecksumInput::new(storage.open_input(&name)?);
        let (_, id) = input.read_header(COMMIT_CODEC, VERSION_START, VERSION_CURRENT, "")?;

        let stored_generation = input.read_vlong()?;
        if stored_generation != generation {
            return Err(input.corrupt(format!(
                "generation mismatch: file name says {generation}, content says {stored_generation}"
            )));
        }
        let counter = input.read_vlong()?;
        let count = input.read_vint()?;
        let mut segments = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let segment = input.read_string()?;
            let mut segment_id = [0u8; 16];
            segment_id.copy_from_slice(&input.read_raw(16)?);
            let codec = input.read_string()?;
            let max_doc = input.read_vint()?;
            segments.push(SegmentCommitInfo {
                name: segment,
                id: segment_id,
                codec,
                max_doc,
            });
        }
        let user_data = input.read_string_map()?;
        input.check_footer()?;

        debug!(
            "read commit {name}: {} segments, counter {counter}",
            segments.len()
        );
        Ok(CommitPoint {
            generation,
            id,
            counter,
            segments,
            user_data,
        })
    }

    /// Assign the next segment name.
    pub fn next_segment_name(&mut self) -> String {
        let name = segment_name(self.counter);
        self.counter += 1;
        name
    }

    /// Total documents over all segments.
    pub fn max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.max_doc as u64).sum()
    }

    /// Write this commit as the next generation and return its file name.
    ///
    /// On failure the generation is left unchanged and the pending file is
    /// removed on a best-effort basis.
    pub fn write(&mut self, storage: &dyn Storage) -> Result<String> {
        let generation = self.generation + 1;
        let id = random_id();
        let pending = Self::pending_file_name(generation);
        let name = Self::file_name(generation);

        if let Err(e) = self.write_pending(storage, &pending, generation, &id) {
            if storage.file_exists(&pending)
                && let Err(cleanup) = storage.delete_file(&pending)
            {
                warn!("failed to remove {pending}: {cleanup}");
            }
            return Err(e);
        }
        storage.rename_file(&pending, &name)?;
        storage.sync(std::slice::from_ref(&name))?;

        self.generation = generation;
        self.id = id;
        info!(
            "committed {name}: {} segments, {} docs",
            self.segments.len(),
            self.max_doc()
        );
        Ok(name)
    }

    fn write_pending(
        &self,
        storage: &dyn Storage,
        pending: &str,
        generation: u64,
        id: &SegmentId,
    ) -> Result<()> {
        let mut out = ChecksumOutput::new(storage.create_output(pending)?);
        out.write_header(COMMIT_CODEC, VERSION_CURRENT, id, "")?;
        out.write_vlong(generation)?;
        out.write_vlong(self.counter)?;
        out.write_vint(self.segments.len() as u32)?;
        for segment in &self.segments {
            out.write_string(&segment.name)?;
            out.write_raw(&segment.id)?;
            out.write_string(&segment.codec)?;
            out.write_vint(segment.max_doc)?;
        }
        out.write_string_map(&self.user_data)?;
        out.write_footer()?;
        out.close()?;
        storage.sync(&[pending.to_string()])
    }

    /// Delete segments files of generations older than this one, and any
    /// leftover pending files.
    pub fn prune_older(&self, storage: &dyn Storage) -> Result<usize> {
        let mut deleted = 0;
        for file in storage.list_files()? {
            let stale = match Self::generation_of(&file) {
                Some(generation) => generation < self.generation,
                None => file.starts_with(PENDING_SEGMENTS_PREFIX),
            };
            if stale {
                storage.delete_file(&file)?;
                debug!("deleted old commit file {file}");
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

/// Reject a commit whose segments repeat a name.
pub(crate) fn validate_segments(commit: &CommitPoint) -> Result<()> {
    let mut names: Vec<&str> = commit.segments.iter().map(|s| s.name.as_str()).collect();
    names.sort_unstable();
    if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
        return Err(TesseraError::corrupt(
            CommitPoint::file_name(commit.generation),
            format!("segment {} listed twice", pair[0]),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn segment(name: &str, max_doc: u32) -> SegmentCommitInfo {
        SegmentCommitInfo {
            name: name.to_string(),
            id: [1u8; 16],
            codec: "Tessera10".to_string(),
            max_doc,
        }
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(from_base36("10"), Some(36));
        assert_eq!(from_base36("Z"), None);
        assert_eq!(from_base36(""), None);
        assert_eq!(segment_name(37), "_11");
    }

    #[test]
    fn test_generation_of() {
        assert_eq!(CommitPoint::generation_of("segments_a"), Some(10));
        assert_eq!(CommitPoint::generation_of("segments"), None);
        assert_eq!(CommitPoint::generation_of("pending_segments_1"), None);
        assert_eq!(CommitPoint::generation_of("_0.si"), None);
    }

    #[test]
    fn test_write_and_read_latest() {
        let storage = MemoryStorage::new_default();
        assert!(CommitPoint::read_latest(&storage).unwrap().is_none());

        let mut commit = CommitPoint::default();
        let name = commit.next_segment_name();
        commit.segments.push(segment(&name, 3));
        assert_eq!(commit.write(&storage).unwrap(), "segments_1");

        let name = commit.next_segment_name();
        commit.segments.push(segment(&name, 4));
        commit.user_data.insert("source".to_string(), "test".to_string());
        assert_eq!(commit.write(&storage).unwrap(), "segments_2");
        assert!(!storage.file_exists("pending_segments_2"));

        let latest = CommitPoint::read_latest(&storage).unwrap().unwrap();
        assert_eq!(latest, commit);
        assert_eq!(latest.max_doc(), 7);
        assert_eq!(latest.counter, 2);

        assert_eq!(commit.prune_older(&storage).unwrap(), 1);
        assert!(!storage.file_exists("segments_1"));
        assert!(storage.file_exists("segments_2"));
    }

    #[test]
    fn test_corrupt_commit_is_reported() {
        let storage = MemoryStorage::new_default();
        let mut commit = CommitPoint::default();
        commit.segments.push(segment("_0", 1));
        let name = commit.write(&storage).unwrap();

        let mut bytes = storage.read_contents(&name).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x40;
        storage.replace_contents(&name, bytes).unwrap();

        let err = CommitPoint::read_latest(&storage).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_duplicate_segment_names() {
        let mut commit = CommitPoint::default();
        commit.segments.push(segment("_0", 1));
        commit.segments.push(segment("_0", 2));
        assert!(validate_segments(&commit).unwrap_err().is_corruption());
    }
}
