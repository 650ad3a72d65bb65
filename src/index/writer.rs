//! The segment writer.
//!
//! Documents are buffered in memory: postings per field and term, doc values
//! and token counts per field and document. [`SegmentWriter::commit`] writes
//! the buffer as one segment through the configured codec and publishes a
//! new commit point containing it.
//!
//! Only one writer may be open on a storage. The writer holds the
//! [`WRITE_LOCK_NAME`] lock from `open` until it is closed or dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::codec::per_field::{FORMAT_ATTRIBUTE, PerFieldDocValuesFormat};
use crate::codec::postings::{BufferedPosting, BufferedTerm};
use crate::codec::registry::{CodecRegistry, TESSERA10};
use crate::codec::segment::{
    DocValuesType, FIELD_INFOS_EXTENSION, FieldInfo, FieldInfos, IndexOptions, SegmentInfo,
    SegmentWriteState, segment_file_name,
};
use crate::error::{Result, TesseraError};
use crate::index::commit::{CommitPoint, SegmentCommitInfo};
use crate::index::document::{Document, FieldValue};
use crate::search::DocId;
use crate::storage::checksum::random_id;
use crate::storage::{Storage, StorageLock, WRITE_LOCK_NAME};

/// Smallest page size accepted for packed doc values and norms.
pub const MIN_PACKED_PAGE_SIZE: usize = 64;

/// Largest page size accepted for packed doc values and norms.
pub const MAX_PACKED_PAGE_SIZE: usize = 1 << 20;

/// Segment writer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentWriterConfig {
    /// Codec for new segments. Must be registered and writable.
    pub codec: String,

    /// Values per page of packed doc values and norms. A power of two in
    /// `[MIN_PACKED_PAGE_SIZE, MAX_PACKED_PAGE_SIZE]`.
    pub packed_page_size: usize,

    /// Terms with at most this many documents are stored inline with the
    /// term dictionary, for codecs that support it.
    pub inline_cutoff: u32,

    /// Doc values format per field, for codecs with per-field doc values.
    /// Fields not listed use the codec's default format.
    pub doc_values_formats: BTreeMap<String, String>,
}

impl Default for SegmentWriterConfig {
    fn default() -> Self {
        SegmentWriterConfig {
            codec: TESSERA10.to_string(),
            packed_page_size: 1024,
            inline_cutoff: 1,
            doc_values_formats: BTreeMap::new(),
        }
    }
}

impl SegmentWriterConfig {
    /// Check the configuration on its own, without a registry.
    pub fn validate(&self) -> Result<()> {
        let size = self.packed_page_size;
        if !size.is_power_of_two() || !(MIN_PACKED_PAGE_SIZE..=MAX_PACKED_PAGE_SIZE).contains(&size)
        {
            return Err(TesseraError::invalid_argument(format!(
                "packed page size must be a power of two in [{MIN_PACKED_PAGE_SIZE}, {MAX_PACKED_PAGE_SIZE}], got {size}"
            )));
        }
        if self.codec.is_empty() {
            return Err(TesseraError::invalid_argument("codec name is empty"));
        }
        Ok(())
    }
}

/// Statistics about the writing process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterStats {
    /// Documents added since the writer was opened.
    pub docs_added: u64,
    /// Segments flushed since the writer was opened.
    pub segments_flushed: u64,
    /// Documents discarded by `rollback`.
    pub docs_rolled_back: u64,
}

/// Buffered data of one field.
#[derive(Debug)]
enum FieldBuffer {
    Indexed {
        value_kind: &'static str,
        index_options: IndexOptions,
        terms: BTreeMap<Vec<u8>, Vec<BufferedPosting>>,
        /// Token count per document, for fields with norms.
        norms: Option<Vec<(DocId, i64)>>,
    },
    Numeric(Vec<(DocId, i64)>),
    Binary(Vec<(DocId, Vec<u8>)>),
    Sorted(Vec<(DocId, Vec<u8>)>),
}

impl FieldBuffer {
    fn for_value(value: &FieldValue) -> Self {
        match value {
            FieldValue::Text(_) | FieldValue::Keyword(_) => FieldBuffer::Indexed {
                value_kind: value.kind(),
                index_options: value.index_options(),
                terms: BTreeMap::new(),
                norms: value.has_norms().then(Vec::new),
            },
            FieldValue::Numeric(_) => FieldBuffer::Numeric(Vec::new()),
            FieldValue::Binary(_) => FieldBuffer::Binary(Vec::new()),
            FieldValue::Sorted(_) => FieldBuffer::Sorted(Vec::new()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FieldBuffer::Indexed { value_kind, .. } => *value_kind,
            FieldBuffer::Numeric(_) => "numeric",
            FieldBuffer::Binary(_) => "binary",
            FieldBuffer::Sorted(_) => "sorted",
        }
    }

    fn add(&mut self, doc: DocId, value: &FieldValue) {
        match (self, value) {
            (FieldBuffer::Indexed { terms, norms, .. }, FieldValue::Text(tokens)) => {
                for (position, token) in tokens.iter().enumerate() {
                    let postings = terms.entry(token.as_bytes().to_vec()).or_default();
                    match postings.last_mut() {
                        Some(last) if last.doc == doc => {
                            last.freq += 1;
                            last.positions.push(position as u32);
                        }
                        _ => postings.push(BufferedPosting {
                            doc,
                            freq: 1,
                            positions: vec![position as u32],
                        }),
                    }
                }
                if let Some(norms) = norms {
                    norms.push((doc, tokens.len() as i64));
                }
            }
            (FieldBuffer::Indexed { terms, .. }, FieldValue::Keyword(keyword)) => {
                terms
                    .entry(keyword.as_bytes().to_vec())
                    .or_default()
                    .push(BufferedPosting {
                        doc,
                        freq: 1,
                        positions: Vec::new(),
                    });
            }
            (FieldBuffer::Numeric(values), FieldValue::Numeric(value)) => {
                values.push((doc, *value));
            }
            (FieldBuffer::Binary(values), FieldValue::Binary(value))
            | (FieldBuffer::Sorted(values), FieldValue::Sorted(value)) => {
                values.push((doc, value.clone()));
            }
            // Kinds are checked before anything is buffered.
            _ => {}
        }
    }
}

/// Spread sparse per-document values over `0..max_doc`.
fn dense<T: Clone>(values: &[(DocId, T)], max_doc: u32) -> Vec<Option<T>> {
    let mut out = vec![None; max_doc as usize];
    for (doc, value) in values {
        out[*doc as usize] = Some(value.clone());
    }
    out
}

/// Writes buffered documents as segments and commits them.
#[derive(Debug)]
pub struct SegmentWriter {
    storage: Arc<dyn Storage>,
    registry: Arc<CodecRegistry>,
    codec: Codec,
    config: SegmentWriterConfig,
    lock: Option<Box<dyn StorageLock>>,
    commit: CommitPoint,
    fields: BTreeMap<String, FieldBuffer>,
    buffered_docs: u32,
    stats: WriterStats,
}

impl SegmentWriter {
    /// Open a writer, taking the storage's write lock.
    ///
    /// # Errors
    ///
    /// [`TesseraError::LockHeld`] if another writer is open,
    /// [`TesseraError::InvalidArgument`] for a bad configuration, and the
    /// registry's errors if the codec cannot be used for writing.
    pub fn open(
        storage: Arc<dyn Storage>,
        registry: Arc<CodecRegistry>,
        config: SegmentWriterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let codec = registry.for_write(&config.codec)?;
        Self::open_with_codec(storage, registry, codec, config)
    }

    /// Open a writer that writes through an explicit codec instead of one
    /// resolved by name. Used to produce segments of read-only codecs in
    /// compatibility tests.
    pub fn open_with_codec(
        storage: Arc<dyn Storage>,
        registry: Arc<CodecRegistry>,
        codec: Codec,
        mut config: SegmentWriterConfig,
    ) -> Result<Self> {
        config.codec = codec.name().to_string();
        config.validate()?;
        for (field, format) in &config.doc_values_formats {
            registry.formats().doc_values_format(format).map_err(|_| {
                TesseraError::invalid_argument(format!(
                    "field {field}: doc values format {format} is not registered"
                ))
            })?;
        }

        let lock = storage.obtain_lock(WRITE_LOCK_NAME)?;
        let commit = CommitPoint::read_latest(storage.as_ref())?.unwrap_or_default();
        info!(
            "opened segment writer with codec {} at generation {}",
            codec.name(),
            commit.generation
        );

        Ok(SegmentWriter {
            storage,
            registry,
            codec,
            config,
            lock: Some(lock),
            commit,
            fields: BTreeMap::new(),
            buffered_docs: 0,
            stats: WriterStats::default(),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.lock.is_none() {
            return Err(TesseraError::invalid_operation("segment writer is closed"));
        }
        Ok(())
    }

    /// Buffer a document and return its id within the next segment.
    ///
    /// # Errors
    ///
    /// [`TesseraError::InvalidArgument`] if a field's kind differs from the
    /// kind it had earlier in the buffer. Nothing is buffered in that case.
    pub fn add_document(&mut self, doc: Document) -> Result<DocId> {
        self.ensure_open()?;
        if self.buffered_docs >= i32::MAX as u32 - 1 {
            return Err(TesseraError::invalid_operation(
                "segment is full: too many documents",
            ));
        }
        for (name, value) in doc.fields() {
            if let Some(buffer) = self.fields.get(name)
                && buffer.kind() != value.kind()
            {
                return Err(TesseraError::invalid_argument(format!(
                    "field {name} was {} but is now {}",
                    buffer.kind(),
                    value.kind()
                )));
            }
        }

        let doc_id = self.buffered_docs as DocId;
        for (name, value) in doc.fields() {
            self.fields
                .entry(name.to_string())
                .or_insert_with(|| FieldBuffer::for_value(value))
                .add(doc_id, value);
        }
        self.buffered_docs += 1;
        self.stats.docs_added += 1;
        Ok(doc_id)
    }

    /// Documents buffered since the last commit.
    pub fn pending_docs(&self) -> u32 {
        self.buffered_docs
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// The last published commit. Its counter may be ahead of the stored
    /// one after a failed commit.
    pub fn commit_point(&self) -> &CommitPoint {
        &self.commit
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Flush buffered documents as a new segment and publish a commit.
    ///
    /// Returns the new segment, or `None` if nothing was buffered.
    pub fn commit(&mut self) -> Result<Option<SegmentCommitInfo>> {
        self.ensure_open()?;
        if self.buffered_docs == 0 {
            return Ok(None);
        }

        // The counter advances even if this commit fails, so a retry never
        // collides with leftovers of the failed attempt.
        let name = self.commit.next_segment_name();
        let (info, files) = self.flush(&name)?;
        let mut next = self.commit.clone();
        next.segments.push(info.clone());
        if let Err(e) = next.write(self.storage.as_ref()) {
            self.delete_files(files);
            return Err(e);
        }
        self.commit = next;
        if let Err(e) = self.commit.prune_older(self.storage.as_ref()) {
            warn!("failed to delete old commits: {e}");
        }

        self.reset();
        self.stats.segments_flushed += 1;
        Ok(Some(info))
    }

    /// Discard buffered documents.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.stats.docs_rolled_back += self.buffered_docs as u64;
        debug!("rolled back {} buffered documents", self.buffered_docs);
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.fields.clear();
        self.buffered_docs = 0;
    }

    /// Write the buffer as segment `name`, returning it with its files.
    ///
    /// On failure every file of the segment written so far is deleted.
    fn flush(&self, name: &str) -> Result<(SegmentCommitInfo, Vec<String>)> {
        let id = random_id();
        let mut state =
            SegmentWriteState::new(Arc::clone(&self.storage), name, id, self.buffered_docs);
        state.packed_page_size = self.config.packed_page_size;
        state.inline_cutoff = self.config.inline_cutoff;

        match self.write_segment(&state) {
            Ok(result) => Ok(result),
            Err(e) => {
                let mut files = state.files();
                files.insert(segment_file_name(name, "", FIELD_INFOS_EXTENSION));
                files.insert(SegmentInfo::file_name(name));
                self.delete_files(files.into_iter().collect());
                Err(e)
            }
        }
    }

    /// Delete segment files, logging what cannot be removed.
    fn delete_files(&self, files: Vec<String>) {
        for file in files {
            if !self.storage.file_exists(&file) {
                continue;
            }
            match self.storage.delete_file(&file) {
                Ok(()) => debug!("deleted {file} of failed commit"),
                Err(e) => warn!("failed to remove {file}: {e}"),
            }
        }
    }

    fn write_segment(&self, state: &SegmentWriteState) -> Result<(SegmentCommitInfo, Vec<String>)> {
        let name = state.segment.as_str();
        let id = state.id;
        let max_doc = state.max_doc;

        let per_field = self.codec.doc_values_format().name() == PerFieldDocValuesFormat::NAME;
        let mut infos: Vec<FieldInfo> = Vec::with_capacity(self.fields.len());
        for (number, (field_name, buffer)) in self.fields.iter().enumerate() {
            let mut info = FieldInfo::new(field_name.as_str(), number as u32);
            match buffer {
                FieldBuffer::Indexed {
                    index_options,
                    norms,
                    ..
                } => {
                    info.index_options = *index_options;
                    info.has_norms = norms.is_some();
                }
                FieldBuffer::Numeric(_) => info.doc_values_type = DocValuesType::Numeric,
                FieldBuffer::Binary(_) => info.doc_values_type = DocValuesType::Binary,
                FieldBuffer::Sorted(_) => info.doc_values_type = DocValuesType::Sorted,
            }
            if per_field
                && info.has_doc_values()
                && let Some(format) = self.config.doc_values_formats.get(field_name)
            {
                info.put_attribute(FORMAT_ATTRIBUTE, format.as_str());
            }
            infos.push(info);
        }

        self.write_postings(state, &infos)?;
        self.write_doc_values(state, &mut infos)?;
        self.write_norms(state, &infos)?;

        let field_infos = FieldInfos::new(infos)?;
        let fnm = field_infos.write(self.storage.as_ref(), name, &id)?;

        let mut segment_info = SegmentInfo::new(name, id, max_doc, self.codec.name());
        segment_info.files = state.files();
        segment_info.files.insert(fnm);
        segment_info.write(self.storage.as_ref())?;

        let files: Vec<String> = segment_info.files.iter().cloned().collect();
        self.storage.sync(&files)?;
        info!(
            "flushed segment {name}: {max_doc} docs, {} fields, {} files, codec {}",
            field_infos.len(),
            files.len(),
            self.codec.name()
        );

        let info = SegmentCommitInfo {
            name: name.to_string(),
            id,
            codec: self.codec.name().to_string(),
            max_doc,
        };
        Ok((info, files))
    }

    fn write_postings(&self, state: &SegmentWriteState, infos: &[FieldInfo]) -> Result<()> {
        if !infos.iter().any(|f| f.index_options.is_indexed()) {
            return Ok(());
        }
        let mut consumer = self.codec.postings_format().fields_consumer(state)?;
        for info in infos.iter().filter(|f| f.index_options.is_indexed()) {
            let Some(FieldBuffer::Indexed { terms, .. }) = self.fields.get(&info.name) else {
                continue;
            };
            let terms: Vec<BufferedTerm> = terms
                .iter()
                .map(|(term, postings)| BufferedTerm {
                    term: term.clone(),
                    postings: postings.clone(),
                })
                .collect();
            consumer.write_field(info, &terms)?;
        }
        consumer.finish()
    }

    fn write_doc_values(&self, state: &SegmentWriteState, infos: &mut [FieldInfo]) -> Result<()> {
        if !infos.iter().any(FieldInfo::has_doc_values) {
            return Ok(());
        }
        let max_doc = state.max_doc;
        let mut consumer = self.codec.doc_values_format().doc_values_consumer(state)?;
        for info in infos.iter_mut().filter(|f| f.has_doc_values()) {
            match self.fields.get(&info.name) {
                Some(FieldBuffer::Numeric(values)) => {
                    consumer.add_numeric_field(info, &dense(values, max_doc))?;
                }
                Some(FieldBuffer::Binary(values)) => {
                    consumer.add_binary_field(info, &dense(values, max_doc))?;
                }
                Some(FieldBuffer::Sorted(values)) => {
                    consumer.add_sorted_field(info, &dense(values, max_doc))?;
                }
                _ => {}
            }
        }
        consumer.finish()
    }

    fn write_norms(&self, state: &SegmentWriteState, infos: &[FieldInfo]) -> Result<()> {
        if !infos.iter().any(|f| f.has_norms) {
            return Ok(());
        }
        let mut consumer = self.codec.norms_format().norms_consumer(state)?;
        for info in infos.iter().filter(|f| f.has_norms) {
            let Some(FieldBuffer::Indexed {
                norms: Some(norms), ..
            }) = self.fields.get(&info.name)
            else {
                continue;
            };
            let values: Vec<i64> = dense(norms, state.max_doc)
                .into_iter()
                .map(|norm| norm.unwrap_or(0))
                .collect();
            consumer.add_norms_field(info, &values)?;
        }
        consumer.finish()
    }

    /// The registry this writer resolves formats against.
    pub fn registry(&self) -> &Arc<CodecRegistry> {
        &self.registry
    }

    /// Release the write lock. Buffered documents that were not committed
    /// are discarded.
    pub fn close(&mut self) -> Result<()> {
        if self.buffered_docs > 0 {
            warn!(
                "closing segment writer with {} uncommitted documents",
                self.buffered_docs
            );
            self.reset();
        }
        if let Some(mut lock) = self.lock.take() {
            lock.release()?;
            info!("closed segment writer");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock.is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::codec::registry::{SIMPLE_TEXT, TESSERA09};
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn open(storage: &Arc<MemoryStorage>, config: SegmentWriterConfig) -> Result<SegmentWriter> {
        SegmentWriter::open(
            storage.clone(),
            Arc::new(CodecRegistry::default()),
            config,
        )
    }

    fn doc(body: &str, price: i64) -> Document {
        Document::builder()
            .add_whitespace_text("body", body)
            .add_numeric("price", price)
            .build()
    }

    #[test]
    fn test_config_validation() {
        assert!(SegmentWriterConfig::default().validate().is_ok());
        for size in [0, 32, 100, 1 << 21] {
            let config = SegmentWriterConfig {
                packed_page_size: size,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(TesseraError::InvalidArgument(_))
            ));
        }
        let storage = Arc::new(MemoryStorage::new_default());
        let config = SegmentWriterConfig {
            codec: TESSERA09.to_string(),
            ..Default::default()
        };
        assert!(matches!(
            open(&storage, config),
            Err(TesseraError::InvalidOperation(_))
        ));
        let config = SegmentWriterConfig {
            doc_values_formats: BTreeMap::from([("price".to_string(), "Fancy".to_string())]),
            ..Default::default()
        };
        assert!(matches!(
            open(&storage, config),
            Err(TesseraError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_write_lock_is_exclusive() {
        let storage = Arc::new(MemoryStorage::new_default());
        let mut writer = open(&storage, SegmentWriterConfig::default()).unwrap();
        assert!(matches!(
            open(&storage, SegmentWriterConfig::default()),
            Err(TesseraError::LockHeld(_))
        ));
        writer.close().unwrap();
        assert!(writer.is_closed());
        assert!(writer.add_document(doc("a", 1)).is_err());

        let second = open(&storage, SegmentWriterConfig::default()).unwrap();
        drop(second);
        assert!(open(&storage, SegmentWriterConfig::default()).is_ok());
    }

    #[test]
    fn test_commit_writes_segment_files() {
        let storage = Arc::new(MemoryStorage::new_default());
        let mut writer = open(&storage, SegmentWriterConfig::default()).unwrap();
        assert!(writer.commit().unwrap().is_none());

        assert_eq!(writer.add_document(doc("red fox", 5)).unwrap(), 0);
        assert_eq!(writer.add_document(doc("blue fox", 7)).unwrap(), 1);
        assert_eq!(writer.pending_docs(), 2);
        let info = writer.commit().unwrap().unwrap();
        assert_eq!(info.name, "_0");
        assert_eq!(info.max_doc, 2);
        assert_eq!(info.codec, "Tessera10");
        assert_eq!(writer.pending_docs(), 0);

        for file in ["_0.si", "_0.fnm", "_0.inl", "_0.tim", "_0.doc", "_0.nvm", "_0.nvd"] {
            assert!(storage.file_exists(file), "missing {file}");
        }
        assert!(storage.file_exists("_0_Packed10_0.dvm"));
        assert!(storage.file_exists("segments_1"));

        writer.add_document(doc("green", 1)).unwrap();
        let second = writer.commit().unwrap().unwrap();
        assert_eq!(second.name, "_1");
        assert!(storage.file_exists("segments_2"));
        assert!(!storage.file_exists("segments_1"));
        assert_eq!(writer.commit_point().segments.len(), 2);
        assert_eq!(writer.stats().segments_flushed, 2);
    }

    #[test]
    fn test_failed_commit_cleans_up_and_can_be_retried() {
        let storage = Arc::new(MemoryStorage::new(MemoryStorageConfig {
            max_bytes: Some(100_000),
        }));
        let mut ballast = storage.create_output("ballast.bin").unwrap();
        ballast.write_all(&vec![0u8; 99_900]).unwrap();
        ballast.close().unwrap();

        let mut writer = open(&storage, SegmentWriterConfig::default()).unwrap();
        for i in 0..20 {
            writer
                .add_document(doc("some words for every document", i))
                .unwrap();
        }

        let err = writer.commit().unwrap_err();
        assert!(matches!(err, TesseraError::Io(_)), "{err}");
        assert_eq!(storage.list_files().unwrap(), vec!["ballast.bin"]);
        assert_eq!(writer.pending_docs(), 20);
        assert_eq!(writer.commit_point().generation, 0);

        storage.delete_file("ballast.bin").unwrap();
        let info = writer.commit().unwrap().unwrap();
        assert_eq!(info.name, "_1");
        assert_eq!(info.max_doc, 20);
        assert_eq!(writer.pending_docs(), 0);

        let commit = CommitPoint::read_latest(storage.as_ref()).unwrap().unwrap();
        assert_eq!(commit.segments.len(), 1);
        assert_eq!(commit.segments[0].name, "_1");
        assert!(
            storage
                .list_files()
                .unwrap()
                .iter()
                .all(|file| !file.starts_with("_0"))
        );
        writer.close().unwrap();
    }

    #[test]
    fn test_field_kind_conflict() {
        let storage = Arc::new(MemoryStorage::new_default());
        let mut writer = open(&storage, SegmentWriterConfig::default()).unwrap();
        writer.add_document(doc("a", 1)).unwrap();
        let conflicting = Document::builder().add_keyword("price", "cheap").build();
        assert!(matches!(
            writer.add_document(conflicting),
            Err(TesseraError::InvalidArgument(_))
        ));
        assert_eq!(writer.pending_docs(), 1);

        writer.rollback().unwrap();
        assert_eq!(writer.pending_docs(), 0);
        assert_eq!(writer.stats().docs_rolled_back, 1);
        writer
            .add_document(Document::builder().add_keyword("price", "cheap").build())
            .unwrap();
    }

    #[test]
    fn test_field_infos_and_attributes() {
        let storage = Arc::new(MemoryStorage::new_default());
        let config = SegmentWriterConfig {
            doc_values_formats: BTreeMap::from([(
                "color".to_string(),
                SIMPLE_TEXT.to_string(),
            )]),
            ..Default::default()
        };
        let mut writer = open(&storage, config).unwrap();
        writer
            .add_document(
                Document::builder()
                    .add_whitespace_text("body", "x y")
                    .add_keyword("id", "1")
                    .add_sorted("color", "red")
                    .add_numeric("price", 3)
                    .build(),
            )
            .unwrap();
        let info = writer.commit().unwrap().unwrap();

        let infos = FieldInfos::read(storage.as_ref(), &info.name, &info.id).unwrap();
        let body = infos.field("body").unwrap();
        assert_eq!(body.index_options, IndexOptions::DocsAndFreqsAndPositions);
        assert!(body.has_norms);
        let id = infos.field("id").unwrap();
        assert_eq!(id.index_options, IndexOptions::Docs);
        assert!(!id.has_norms);
        let color = infos.field("color").unwrap();
        assert_eq!(color.doc_values_type, DocValuesType::Sorted);
        assert_eq!(color.attribute(FORMAT_ATTRIBUTE), Some("SimpleText"));
        assert_eq!(
            infos.field("price").unwrap().attribute(FORMAT_ATTRIBUTE),
            Some("Packed10")
        );
        assert!(storage.file_exists("_0_SimpleText_0.dvt"));
    }
}
