//! Per-document column values and norms.
//!
//! Producers hand out immutable, random-access views that may be shared
//! across threads.

use std::fmt::Debug;
use std::sync::Arc;

use crate::codec::segment::FieldInfo;
use crate::error::Result;
use crate::search::DocId;

/// One optional `i64` per document.
pub trait NumericDocValues: Send + Sync + Debug {
    /// The value of `doc`, or `None` if the document has none.
    fn get(&self, doc: DocId) -> Option<i64>;

    /// Number of documents with a value.
    fn docs_with_value(&self) -> u32;
}

/// One optional byte string per document.
pub trait BinaryDocValues: Send + Sync + Debug {
    fn get(&self, doc: DocId) -> Option<&[u8]>;
}

/// One optional byte string per document, deduplicated into sorted
/// ordinals.
pub trait SortedDocValues: Send + Sync + Debug {
    /// Ordinal of the document's value.
    fn ord(&self, doc: DocId) -> Option<u32>;

    /// The value for an ordinal.
    ///
    /// # Panics
    ///
    /// If `ord >= value_count()`.
    fn lookup_ord(&self, ord: u32) -> &[u8];

    /// Number of distinct values.
    fn value_count(&self) -> u32;

    /// Ordinal of `value`, or the insertion point as `Err`.
    fn lookup_term(&self, value: &[u8]) -> std::result::Result<u32, u32> {
        let (mut low, mut high) = (0u32, self.value_count());
        while low < high {
            let mid = low + (high - low) / 2;
            match self.lookup_ord(mid).cmp(value) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Ok(mid),
            }
        }
        Err(low)
    }

    fn get(&self, doc: DocId) -> Option<&[u8]> {
        self.ord(doc).map(|ord| self.lookup_ord(ord))
    }
}

/// Reader side of a doc values format.
pub trait DocValuesProducer: Send + Sync + Debug {
    fn numeric(&self, field: &FieldInfo) -> Result<Arc<dyn NumericDocValues>>;

    fn binary(&self, field: &FieldInfo) -> Result<Arc<dyn BinaryDocValues>>;

    fn sorted(&self, field: &FieldInfo) -> Result<Arc<dyn SortedDocValues>>;

    /// Verify the checksums of every file this producer reads.
    fn check_integrity(&self) -> Result<()>;
}

/// Writer side of a doc values format.
///
/// Every slice holds one entry per document of the segment. A consumer may
/// record attributes on the field it writes; they are persisted with the
/// field infos.
pub trait DocValuesConsumer: Send {
    fn add_numeric_field(&mut self, field: &mut FieldInfo, values: &[Option<i64>]) -> Result<()>;

    fn add_binary_field(&mut self, field: &mut FieldInfo, values: &[Option<Vec<u8>>])
    -> Result<()>;

    fn add_sorted_field(&mut self, field: &mut FieldInfo, values: &[Option<Vec<u8>>])
    -> Result<()>;

    fn finish(self: Box<Self>) -> Result<()>;
}

/// Reader side of a norms format.
pub trait NormsProducer: Send + Sync + Debug {
    fn norms(&self, field: &FieldInfo) -> Result<Arc<dyn NumericDocValues>>;

    fn check_integrity(&self) -> Result<()>;
}

/// Writer side of a norms format. One value per document.
pub trait NormsConsumer: Send {
    fn add_norms_field(&mut self, field: &FieldInfo, values: &[i64]) -> Result<()>;

    fn finish(self: Box<Self>) -> Result<()>;
}

/// Doc values held in plain vectors; used by the text formats.
#[derive(Debug, Clone, Default)]
pub struct VecNumericDocValues {
    values: Vec<Option<i64>>,
}

impl VecNumericDocValues {
    pub fn new(values: Vec<Option<i64>>) -> Self {
        VecNumericDocValues { values }
    }
}

impl NumericDocValues for VecNumericDocValues {
    fn get(&self, doc: DocId) -> Option<i64> {
        usize::try_from(doc)
            .ok()
            .and_then(|d| self.values.get(d).copied().flatten())
    }

    fn docs_with_value(&self) -> u32 {
        self.values.iter().filter(|v| v.is_some()).count() as u32
    }
}

/// Binary doc values held in a vector.
#[derive(Debug, Clone, Default)]
pub struct VecBinaryDocValues {
    values: Vec<Option<Vec<u8>>>,
}

impl VecBinaryDocValues {
    pub fn new(values: Vec<Option<Vec<u8>>>) -> Self {
        VecBinaryDocValues { values }
    }
}

impl BinaryDocValues for VecBinaryDocValues {
    fn get(&self, doc: DocId) -> Option<&[u8]> {
        usize::try_from(doc)
            .ok()
            .and_then(|d| self.values.get(d))
            .and_then(|v| v.as_deref())
    }
}

/// Sorted doc values held in vectors.
#[derive(Debug, Clone, Default)]
pub struct VecSortedDocValues {
    terms: Vec<Vec<u8>>,
    ords: Vec<Option<u32>>,
}

impl VecSortedDocValues {
    /// Deduplicate and sort the per-document values into ordinals.
    pub fn from_values(values: &[Option<Vec<u8>>]) -> Self {
        let (terms, ords) = assign_ords(values);
        VecSortedDocValues { terms, ords }
    }
}

impl SortedDocValues for VecSortedDocValues {
    fn ord(&self, doc: DocId) -> Option<u32> {
        usize::try_from(doc)
            .ok()
            .and_then(|d| self.ords.get(d).copied().flatten())
    }

    fn lookup_ord(&self, ord: u32) -> &[u8] {
        &self.terms[ord as usize]
    }

    fn value_count(&self) -> u32 {
        self.terms.len() as u32
    }
}

/// Sorted unique values and the ordinal of each document's value.
pub fn assign_ords(values: &[Option<Vec<u8>>]) -> (Vec<Vec<u8>>, Vec<Option<u32>>) {
    let mut terms: Vec<Vec<u8>> = values.iter().flatten().cloned().collect();
    terms.sort();
    terms.dedup();

    let ords = values
        .iter()
        .map(|v| {
            v.as_ref()
                .and_then(|v| terms.binary_search(v).ok())
                .map(|ord| ord as u32)
        })
        .collect();
    (terms, ords)
}
