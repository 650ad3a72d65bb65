//! Reading committed segments.
//!
//! A [`SegmentReader`] resolves the codec recorded for its segment and opens
//! each format's producer the first time it is needed. Readers are immutable
//! after that and can be shared across threads.

use std::sync::{Arc, OnceLock};

use log::{debug, info};

use crate::codec::Codec;
use crate::codec::doc_values::{
    BinaryDocValues, DocValuesProducer, NormsProducer, NumericDocValues, SortedDocValues,
};
use crate::codec::postings::{FieldsProducer, Terms};
use crate::codec::registry::CodecRegistry;
use crate::codec::segment::{
    DocValuesType, FieldInfo, FieldInfos, SegmentInfo, SegmentReadState,
};
use crate::error::{Result, TesseraError};
use crate::index::commit::{CommitPoint, SegmentCommitInfo, validate_segments};
use crate::search::evaluator::Evaluator;
use crate::search::{DocId, NO_MORE_DOCS};
use crate::storage::Storage;

/// Open `value` once; concurrent first calls may both open, one result wins.
fn get_or_open<T, F>(cell: &OnceLock<T>, open: F) -> Result<&T>
where
    F: FnOnce() -> Result<T>,
{
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = open()?;
    Ok(cell.get_or_init(|| value))
}

/// Read access to one segment.
#[derive(Debug)]
pub struct SegmentReader {
    info: SegmentInfo,
    codec: Codec,
    state: SegmentReadState,
    postings: OnceLock<Option<Arc<dyn FieldsProducer>>>,
    doc_values: OnceLock<Option<Arc<dyn DocValuesProducer>>>,
    norms: OnceLock<Option<Arc<dyn NormsProducer>>>,
}

impl SegmentReader {
    /// Open a committed segment.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedCodec`] if the segment's codec is not
    /// registered, and [`TesseraError::CorruptIndex`] if its metadata fails
    /// verification or disagrees with the commit.
    pub fn open(
        storage: Arc<dyn Storage>,
        commit_info: &SegmentCommitInfo,
        registry: &CodecRegistry,
    ) -> Result<Self> {
        let codec = registry.for_name(&commit_info.codec)?;
        let info = SegmentInfo::read(storage.as_ref(), &commit_info.name, &commit_info.id)?;
        let si_file = SegmentInfo::file_name(&info.name);
        if info.codec != commit_info.codec {
            return Err(TesseraError::corrupt(
                si_file,
                format!(
                    "codec {} does not match the commit's {}",
                    info.codec, commit_info.codec
                ),
            ));
        }
        if info.max_doc != commit_info.max_doc {
            return Err(TesseraError::corrupt(
                si_file,
                format!(
                    "max doc {} does not match the commit's {}",
                    info.max_doc, commit_info.max_doc
                ),
            ));
        }

        let field_infos = FieldInfos::read(storage.as_ref(), &info.name, &info.id)?;
        let state = SegmentReadState::new(storage, &info, Arc::new(field_infos));
        debug!(
            "opened segment {}: {} docs, codec {}",
            info.name,
            info.max_doc,
            codec.name()
        );

        Ok(SegmentReader {
            info,
            codec,
            state,
            postings: OnceLock::new(),
            doc_values: OnceLock::new(),
            norms: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn max_doc(&self) -> u32 {
        self.info.max_doc
    }

    pub fn segment_info(&self) -> &SegmentInfo {
        &self.info
    }

    pub fn field_infos(&self) -> &FieldInfos {
        &self.state.field_infos
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    fn fields_producer(&self) -> Result<Option<&Arc<dyn FieldsProducer>>> {
        get_or_open(&self.postings, || {
            if !self.state.field_infos.has_postings() {
                return Ok(None);
            }
            self.codec
                .postings_format()
                .fields_producer(&self.state)
                .map(|p| Some(Arc::from(p)))
        })
        .map(Option::as_ref)
    }

    fn doc_values_producer(&self) -> Result<Option<&Arc<dyn DocValuesProducer>>> {
        get_or_open(&self.doc_values, || {
            if !self.state.field_infos.has_doc_values() {
                return Ok(None);
            }
            self.codec
                .doc_values_format()
                .doc_values_producer(&self.state)
                .map(|p| Some(Arc::from(p)))
        })
        .map(Option::as_ref)
    }

    fn norms_producer(&self) -> Result<Option<&Arc<dyn NormsProducer>>> {
        get_or_open(&self.norms, || {
            if !self.state.field_infos.has_norms() {
                return Ok(None);
            }
            self.codec
                .norms_format()
                .norms_producer(&self.state)
                .map(|p| Some(Arc::from(p)))
        })
        .map(Option::as_ref)
    }

    /// The terms of a field, or `None` if the field has no postings here.
    pub fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        match self.field_infos().field(field) {
            Some(info) if info.index_options.is_indexed() => {}
            _ => return Ok(None),
        }
        match self.fields_producer()? {
            Some(producer) => producer.terms(field),
            None => Ok(None),
        }
    }

    /// Field info of a doc values field, checking its type.
    fn doc_values_field(&self, field: &str, expected: DocValuesType) -> Result<Option<&FieldInfo>> {
        let Some(info) = self.field_infos().field(field) else {
            return Ok(None);
        };
        match info.doc_values_type {
            DocValuesType::None => Ok(None),
            actual if actual == expected => Ok(Some(info)),
            actual => Err(TesseraError::invalid_argument(format!(
                "field {field} has {actual:?} doc values, not {expected:?}"
            ))),
        }
    }

    /// Numeric doc values of a field, or `None` if it has none.
    ///
    /// # Errors
    ///
    /// [`TesseraError::InvalidArgument`] if the field has doc values of
    /// another type.
    pub fn numeric_doc_values(&self, field: &str) -> Result<Option<Arc<dyn NumericDocValues>>> {
        let Some(info) = self.doc_values_field(field, DocValuesType::Numeric)? else {
            return Ok(None);
        };
        match self.doc_values_producer()? {
            Some(producer) => producer.numeric(info).map(Some),
            None => Ok(None),
        }
    }

    pub fn binary_doc_values(&self, field: &str) -> Result<Option<Arc<dyn BinaryDocValues>>> {
        let Some(info) = self.doc_values_field(field, DocValuesType::Binary)? else {
            return Ok(None);
        };
        match self.doc_values_producer()? {
            Some(producer) => producer.binary(info).map(Some),
            None => Ok(None),
        }
    }

    pub fn sorted_doc_values(&self, field: &str) -> Result<Option<Arc<dyn SortedDocValues>>> {
        let Some(info) = self.doc_values_field(field, DocValuesType::Sorted)? else {
            return Ok(None);
        };
        match self.doc_values_producer()? {
            Some(producer) => producer.sorted(info).map(Some),
            None => Ok(None),
        }
    }

    /// Length norms of a field, or `None` if the field has none.
    pub fn norms(&self, field: &str) -> Result<Option<Arc<dyn NumericDocValues>>> {
        let Some(info) = self.field_infos().field(field).filter(|f| f.has_norms) else {
            return Ok(None);
        };
        match self.norms_producer()? {
            Some(producer) => producer.norms(info).map(Some),
            None => Ok(None),
        }
    }

    /// Open every producer and verify the checksums of its files.
    pub fn check_integrity(&self) -> Result<()> {
        if let Some(producer) = self.fields_producer()? {
            producer.check_integrity()?;
        }
        if let Some(producer) = self.doc_values_producer()? {
            producer.check_integrity()?;
        }
        if let Some(producer) = self.norms_producer()? {
            producer.check_integrity()?;
        }
        Ok(())
    }

    /// Physical postings cursors allocated by this segment so far.
    pub fn allocated_cursors(&self) -> usize {
        self.postings
            .get()
            .and_then(Option::as_ref)
            .map_or(0, |p| p.allocated_cursors())
    }

    /// Evaluate a query against this segment and collect the matching
    /// documents.
    pub fn search(&self, evaluator: &dyn Evaluator) -> Result<Vec<DocId>> {
        evaluator.matcher(self)?.collect()
    }
}

/// A segment of an [`IndexReader`] and the number of documents before it.
#[derive(Debug)]
pub struct LeafReader {
    pub doc_base: u64,
    pub reader: SegmentReader,
}

/// Read access to every segment of one commit.
#[derive(Debug)]
pub struct IndexReader {
    commit: CommitPoint,
    leaves: Vec<LeafReader>,
}

impl IndexReader {
    /// Open the latest commit. An empty storage gives an empty reader.
    pub fn open(storage: Arc<dyn Storage>, registry: &CodecRegistry) -> Result<Self> {
        let commit = CommitPoint::read_latest(storage.as_ref())?.unwrap_or_default();
        Self::open_commit(storage, commit, registry)
    }

    /// Open the segments of a specific commit.
    pub fn open_commit(
        storage: Arc<dyn Storage>,
        commit: CommitPoint,
        registry: &CodecRegistry,
    ) -> Result<Self> {
        validate_segments(&commit)?;
        let mut leaves = Vec::with_capacity(commit.segments.len());
        let mut doc_base = 0u64;
        for segment in &commit.segments {
            let reader = SegmentReader::open(Arc::clone(&storage), segment, registry)?;
            let max_doc = reader.max_doc() as u64;
            leaves.push(LeafReader { doc_base, reader });
            doc_base += max_doc;
        }
        info!(
            "opened index reader at generation {}: {} segments, {doc_base} docs",
            commit.generation,
            leaves.len()
        );
        Ok(IndexReader { commit, leaves })
    }

    pub fn commit(&self) -> &CommitPoint {
        &self.commit
    }

    pub fn leaves(&self) -> &[LeafReader] {
        &self.leaves
    }

    pub fn max_doc(&self) -> u64 {
        self.leaves
            .iter()
            .map(|leaf| leaf.reader.max_doc() as u64)
            .sum()
    }

    /// Evaluate a query against every segment; returns index-wide document
    /// numbers in ascending order.
    pub fn search(&self, evaluator: &dyn Evaluator) -> Result<Vec<u64>> {
        let mut docs = Vec::new();
        for leaf in &self.leaves {
            for doc in leaf.reader.search(evaluator)? {
                debug_assert!(doc != NO_MORE_DOCS);
                docs.push(leaf.doc_base + doc as u64);
            }
        }
        Ok(docs)
    }
}
