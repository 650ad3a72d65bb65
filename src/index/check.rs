//! Offline integrity checking of an index.
//!
//! Verifies the latest commit file, then every file of every segment it
//! lists, and finally opens each segment with its codec so the producers run
//! their own structural checks. Problems are collected per segment instead
//! of aborting the whole run.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::codec::registry::CodecRegistry;
use crate::codec::simple_text::{DOC_VALUES_EXTENSION, NORMS_EXTENSION, POSTINGS_EXTENSION};
use crate::error::Result;
use crate::index::commit::{CommitPoint, SegmentCommitInfo, validate_segments};
use crate::index::reader::SegmentReader;
use crate::storage::Storage;
use crate::storage::checksum::verify_file;
use crate::storage::text::verify_text_file;

/// Outcome of checking one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentStatus {
    pub name: String,
    pub codec: String,
    pub max_doc: u32,
    /// Files the segment metadata lists, with their checksums when verified.
    pub files: Vec<FileStatus>,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub name: String,
    pub checksum: Option<u64>,
    pub error: Option<String>,
}

/// Outcome of [`check_index`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    /// Latest commit generation, `None` for an empty index.
    pub generation: Option<u64>,
    pub commit_file: Option<String>,
    /// Set if the commit file itself could not be read.
    pub commit_error: Option<String>,
    pub segments: Vec<SegmentStatus>,
    pub total_docs: u64,
}

impl CheckReport {
    /// True if the commit and every segment checked clean.
    pub fn is_clean(&self) -> bool {
        self.commit_error.is_none() && self.segments.iter().all(|s| s.ok)
    }

    pub fn broken_segments(&self) -> impl Iterator<Item = &SegmentStatus> {
        self.segments.iter().filter(|s| !s.ok)
    }
}

fn is_text_file(name: &str) -> bool {
    matches!(
        Path::new(name).extension().and_then(|e| e.to_str()),
        Some(POSTINGS_EXTENSION | DOC_VALUES_EXTENSION | NORMS_EXTENSION)
    )
}

fn verify_any(storage: &dyn Storage, name: &str) -> Result<u64> {
    if is_text_file(name) {
        verify_text_file(storage, name)
    } else {
        verify_file(storage, name)
    }
}

/// Check the latest commit of an index.
///
/// Only failures to list the storage are returned as errors; everything
/// else ends up in the report.
pub fn check_index(storage: Arc<dyn Storage>, registry: &CodecRegistry) -> Result<CheckReport> {
    let mut report = CheckReport::default();
    let Some(generation) = CommitPoint::latest_generation(storage.as_ref())? else {
        info!("no commit found; index is empty");
        return Ok(report);
    };
    let commit_file = CommitPoint::file_name(generation);
    report.generation = Some(generation);
    report.commit_file = Some(commit_file.clone());

    let commit = match CommitPoint::read(storage.as_ref(), generation)
        .and_then(|commit| validate_segments(&commit).map(|_| commit))
    {
        Ok(commit) => commit,
        Err(e) => {
            warn!("{commit_file}: {e}");
            report.commit_error = Some(e.to_string());
            return Ok(report);
        }
    };

    for segment in &commit.segments {
        let status = check_segment(&storage, segment, registry);
        if status.ok {
            report.total_docs += status.max_doc as u64;
        } else {
            warn!(
                "segment {} is broken: {}",
                status.name,
                status.error.as_deref().unwrap_or("unknown error")
            );
        }
        report.segments.push(status);
    }

    info!(
        "checked {commit_file}: {} segments, {} broken",
        report.segments.len(),
        report.broken_segments().count()
    );
    Ok(report)
}

fn check_segment(
    storage: &Arc<dyn Storage>,
    segment: &SegmentCommitInfo,
    registry: &CodecRegistry,
) -> SegmentStatus {
    let mut status = SegmentStatus {
        name: segment.name.clone(),
        codec: segment.codec.clone(),
        max_doc: segment.max_doc,
        files: Vec::new(),
        ok: false,
        error: None,
    };

    let reader = match SegmentReader::open(Arc::clone(storage), segment, registry) {
        Ok(reader) => reader,
        Err(e) => {
            status.error = Some(e.to_string());
            return status;
        }
    };

    let mut first_error = None;
    for name in &reader.segment_info().files {
        let file = match verify_any(storage.as_ref(), name) {
            Ok(checksum) => {
                debug!("{name}: checksum {checksum:08x}");
                FileStatus {
                    name: name.clone(),
                    checksum: Some(checksum),
                    error: None,
                }
            }
            Err(e) => {
                let message = if storage.file_exists(name) {
                    e.to_string()
                } else {
                    "file is missing".to_string()
                };
                first_error.get_or_insert_with(|| format!("{name}: {message}"));
                FileStatus {
                    name: name.clone(),
                    checksum: None,
                    error: Some(message),
                }
            }
        };
        status.files.push(file);
    }

    if first_error.is_none()
        && let Err(e) = reader.check_integrity()
    {
        first_error = Some(e.to_string());
    }

    status.ok = first_error.is_none();
    status.error = first_error;
    status
}
