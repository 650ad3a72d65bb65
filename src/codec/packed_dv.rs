//! `Packed10` doc values and norms.
//!
//! Both formats write a metadata file listing one entry per field and a data
//! file holding one blob per field:
//!
//! ```text
//! meta  header { 1, field number, kind, blob offset, blob length }* 0 footer
//! data  header { blob }* footer
//! ```
//!
//! | Kind    | Blob                                                         |
//! |---------|--------------------------------------------------------------|
//! | numeric | docs-with-value bitset, packed values (0 when missing)       |
//! | binary  | docs-with-value bitset, packed end offsets, value bytes      |
//! | sorted  | sorted unique values, packed `ord + 1` per doc (0 = missing) |
//! | norms   | packed values                                                |
//!
//! Field blobs are decoded on first access and cached.

use std::sync::Arc;

use ahash::AHashMap;
use bit_vec::BitVec;
use log::debug;
use parking_lot::Mutex;

use crate::codec::doc_values::{
    BinaryDocValues, DocValuesConsumer, DocValuesProducer, NormsConsumer, NormsProducer,
    NumericDocValues, SortedDocValues, assign_ords,
};
use crate::codec::segment::{FieldInfo, SegmentReadState, SegmentWriteState};
use crate::codec::{DocValuesFormat, NormsFormat};
use crate::error::{Result, TesseraError};
use crate::search::DocId;
use crate::storage::checksum::{
    ChecksumInput, ChecksumOutput, FOOTER_LENGTH, retrieve_checksum, verify_file,
};
use crate::storage::{Storage, StorageInput, StorageOutput};
use crate::util::packed::{PackedAppendBuffer, PackedValues};

pub const DOC_VALUES_META_EXTENSION: &str = "dvm";
pub const DOC_VALUES_DATA_EXTENSION: &str = "dvd";
pub const NORMS_META_EXTENSION: &str = "nvm";
pub const NORMS_DATA_EXTENSION: &str = "nvd";

const DOC_VALUES_META_CODEC: &str = "Packed10DocValuesMeta";
const DOC_VALUES_DATA_CODEC: &str = "Packed10DocValuesData";
const NORMS_META_CODEC: &str = "Packed10NormsMeta";
const NORMS_DATA_CODEC: &str = "Packed10NormsData";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = VERSION_START;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlobKind {
    Numeric = 1,
    Binary = 2,
    Sorted = 3,
    Norms = 4,
}

impl BlobKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(BlobKind::Numeric),
            2 => Some(BlobKind::Binary),
            3 => Some(BlobKind::Sorted),
            4 => Some(BlobKind::Norms),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BlobEntry {
    kind: BlobKind,
    offset: u64,
    length: u64,
}

/// File names and codec names of one meta/data pair.
#[derive(Debug, Clone, Copy)]
struct FilePair {
    meta_ext: &'static str,
    data_ext: &'static str,
    meta_codec: &'static str,
    data_codec: &'static str,
}

const DOC_VALUES_FILES: FilePair = FilePair {
    meta_ext: DOC_VALUES_META_EXTENSION,
    data_ext: DOC_VALUES_DATA_EXTENSION,
    meta_codec: DOC_VALUES_META_CODEC,
    data_codec: DOC_VALUES_DATA_CODEC,
};

const NORMS_FILES: FilePair = FilePair {
    meta_ext: NORMS_META_EXTENSION,
    data_ext: NORMS_DATA_EXTENSION,
    meta_codec: NORMS_META_CODEC,
    data_codec: NORMS_DATA_CODEC,
};

/// The `Packed10` doc values format.
#[derive(Debug, Default)]
pub struct Packed10DocValuesFormat;

impl Packed10DocValuesFormat {
    pub const NAME: &'static str = "Packed10";

    pub fn new() -> Self {
        Packed10DocValuesFormat
    }
}

impl DocValuesFormat for Packed10DocValuesFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn doc_values_consumer(
        &self,
        state: &SegmentWriteState,
    ) -> Result<Box<dyn DocValuesConsumer>> {
        Ok(Box::new(PackedWriter::create(state, DOC_VALUES_FILES)?))
    }

    fn doc_values_producer(&self, state: &SegmentReadState) -> Result<Box<dyn DocValuesProducer>> {
        Ok(Box::new(PackedDocValuesProducer {
            reader: PackedReader::open(state, DOC_VALUES_FILES)?,
            numeric: Mutex::new(AHashMap::new()),
            binary: Mutex::new(AHashMap::new()),
            sorted: Mutex::new(AHashMap::new()),
        }))
    }
}

/// The `Packed10` norms format.
#[derive(Debug, Default)]
pub struct Packed10NormsFormat;

impl Packed10NormsFormat {
    pub const NAME: &'static str = "Packed10";

    pub fn new() -> Self {
        Packed10NormsFormat
    }
}

impl NormsFormat for Packed10NormsFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn norms_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn NormsConsumer>> {
        Ok(Box::new(PackedWriter::create(state, NORMS_FILES)?))
    }

    fn norms_producer(&self, state: &SegmentReadState) -> Result<Box<dyn NormsProducer>> {
        Ok(Box::new(PackedNormsProducer {
            reader: PackedReader::open(state, NORMS_FILES)?,
            norms: Mutex::new(AHashMap::new()),
        }))
    }
}

/// Writes field blobs to the data file and their entries to the meta file.
struct PackedWriter {
    meta: ChecksumOutput<Box<dyn StorageOutput>>,
    data: ChecksumOutput<Box<dyn StorageOutput>>,
    max_doc: u32,
    page_size: usize,
}

impl PackedWriter {
    fn create(state: &SegmentWriteState, files: FilePair) -> Result<Self> {
        let mut meta = ChecksumOutput::new(state.create_output(files.meta_ext)?);
        meta.write_header(files.meta_codec, VERSION_CURRENT, &state.id, &state.suffix)?;
        let mut data = ChecksumOutput::new(state.create_output(files.data_ext)?);
        data.write_header(files.data_codec, VERSION_CURRENT, &state.id, &state.suffix)?;

        Ok(PackedWriter {
            meta,
            data,
            max_doc: state.max_doc,
            page_size: state.packed_page_size,
        })
    }

    fn check_len(&self, field: &FieldInfo, len: usize) -> Result<()> {
        if len != self.max_doc as usize {
            return Err(TesseraError::invalid_argument(format!(
                "field {} has {len} values for {} documents",
                field.name, self.max_doc
            )));
        }
        Ok(())
    }

    fn write_blob<F>(&mut self, field: &FieldInfo, kind: BlobKind, write: F) -> Result<()>
    where
        F: FnOnce(&mut ChecksumOutput<Box<dyn StorageOutput>>, usize) -> Result<()>,
    {
        let offset = self.data.position();
        write(&mut self.data, self.page_size)?;
        let length = self.data.position() - offset;

        self.meta.write_u8(1)?;
        self.meta.write_vint(field.number)?;
        self.meta.write_u8(kind as u8)?;
        self.meta.write_vlong(offset)?;
        self.meta.write_vlong(length)?;
        debug!("field {}: {:?} blob of {length} bytes", field.name, kind);
        Ok(())
    }

    fn finish_files(self) -> Result<()> {
        let PackedWriter {
            mut meta, mut data, ..
        } = self;
        meta.write_u8(0)?;
        meta.write_footer()?;
        data.write_footer()?;
        meta.close()?;
        data.close()
    }
}

fn docs_with_value<T>(values: &[Option<T>]) -> BitVec {
    let mut bits = BitVec::from_elem(values.len(), false);
    for (doc, value) in values.iter().enumerate() {
        if value.is_some() {
            bits.set(doc, true);
        }
    }
    bits
}

impl DocValuesConsumer for PackedWriter {
    fn add_numeric_field(&mut self, field: &mut FieldInfo, values: &[Option<i64>]) -> Result<()> {
        self.check_len(field, values.len())?;
        self.write_blob(field, BlobKind::Numeric, |out, page_size| {
            out.write_bytes(&docs_with_value(values).to_bytes())?;
            let mut packed = PackedAppendBuffer::new(page_size);
            for value in values {
                packed.add(value.unwrap_or(0));
            }
            packed.freeze().write_to(out)
        })
    }

    fn add_binary_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> Result<()> {
        self.check_len(field, values.len())?;
        self.write_blob(field, BlobKind::Binary, |out, page_size| {
            out.write_bytes(&docs_with_value(values).to_bytes())?;
            let mut ends = PackedAppendBuffer::new(page_size);
            let mut bytes = Vec::new();
            for value in values {
                if let Some(value) = value {
                    bytes.extend_from_slice(value);
                }
                ends.add(bytes.len() as i64);
            }
            ends.freeze().write_to(out)?;
            out.write_bytes(&bytes)
        })
    }

    fn add_sorted_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> Result<()> {
        self.check_len(field, values.len())?;
        let (terms, ords) = assign_ords(values);
        self.write_blob(field, BlobKind::Sorted, |out, page_size| {
            out.write_vint(terms.len() as u32)?;
            for term in &terms {
                out.write_bytes(term)?;
            }
            let mut packed = PackedAppendBuffer::new(page_size);
            for ord in &ords {
                packed.add(ord.map_or(0, |ord| ord as i64 + 1));
            }
            packed.freeze().write_to(out)
        })
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.finish_files()
    }
}

impl NormsConsumer for PackedWriter {
    fn add_norms_field(&mut self, field: &FieldInfo, values: &[i64]) -> Result<()> {
        self.check_len(field, values.len())?;
        self.write_blob(field, BlobKind::Norms, |out, page_size| {
            PackedValues::from_values(page_size, values).write_to(out)
        })
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.finish_files()
    }
}

/// Field entries of a meta file and the data file they point into.
#[derive(Debug)]
struct PackedReader {
    storage: Arc<dyn Storage>,
    meta_file: String,
    data_file: String,
    max_doc: u32,
    entries: AHashMap<u32, BlobEntry>,
    data: Mutex<Box<dyn StorageInput>>,
}

impl PackedReader {
    fn open(state: &SegmentReadState, files: FilePair) -> Result<Self> {
        let mut meta = ChecksumInput::new(state.open_input(files.meta_ext)?);
        meta.check_header(
            files.meta_codec,
            VERSION_START,
            VERSION_CURRENT,
            Some(&state.id),
            &state.suffix,
        )?;
        let mut entries = AHashMap::new();
        while meta.read_u8()? == 1 {
            let number = meta.read_vint()?;
            let kind = meta.read_u8()?;
            let kind = BlobKind::from_u8(kind)
                .ok_or_else(|| meta.corrupt(format!("invalid blob kind {kind}")))?;
            let entry = BlobEntry {
                kind,
                offset: meta.read_vlong()?,
                length: meta.read_vlong()?,
            };
            if entries.insert(number, entry).is_some() {
                return Err(meta.corrupt(format!("duplicate entry for field number {number}")));
            }
        }
        meta.check_footer()?;

        let mut data = ChecksumInput::new(state.open_input(files.data_ext)?);
        data.check_header(
            files.data_codec,
            VERSION_START,
            VERSION_CURRENT,
            Some(&state.id),
            &state.suffix,
        )?;
        let mut data = data.into_inner();
        retrieve_checksum(data.as_mut())?;
        let limit = data.length() - FOOTER_LENGTH;
        if let Some((number, entry)) = entries.iter().find(|(_, e)| {
            e.offset
                .checked_add(e.length)
                .is_none_or(|end| end > limit)
        }) {
            return Err(TesseraError::corrupt(
                state.file_name(files.data_ext),
                format!(
                    "blob of field {number} at [{}, +{}) runs into the footer",
                    entry.offset, entry.length
                ),
            ));
        }

        Ok(PackedReader {
            storage: Arc::clone(&state.storage),
            meta_file: state.file_name(files.meta_ext),
            data_file: state.file_name(files.data_ext),
            max_doc: state.max_doc,
            entries,
            data: Mutex::new(data),
        })
    }

    fn blob(&self, field: &FieldInfo, kind: BlobKind) -> Result<ChecksumInput<Box<dyn StorageInput>>> {
        let entry = match self.entries.get(&field.number) {
            Some(entry) if entry.kind == kind => entry,
            Some(entry) => {
                return Err(TesseraError::invalid_argument(format!(
                    "field {} has {:?} values, not {:?}",
                    field.name, entry.kind, kind
                )));
            }
            None => {
                return Err(TesseraError::invalid_argument(format!(
                    "field {} has no {:?} values in {}",
                    field.name, kind, self.data_file
                )));
            }
        };
        let slice = self
            .data
            .lock()
            .slice(&field.name, entry.offset, entry.length)?;
        Ok(ChecksumInput::new(slice))
    }

    fn read_bits(&self, input: &mut ChecksumInput<Box<dyn StorageInput>>) -> Result<BitVec> {
        let bytes = input.read_bytes()?;
        let max_doc = self.max_doc as usize;
        if bytes.len() != max_doc.div_ceil(8) {
            return Err(input.corrupt(format!(
                "bitset of {} bytes for {max_doc} documents",
                bytes.len()
            )));
        }
        let mut bits = BitVec::from_bytes(&bytes);
        bits.truncate(max_doc);
        Ok(bits)
    }

    fn read_values(
        &self,
        input: &mut ChecksumInput<Box<dyn StorageInput>>,
    ) -> Result<PackedValues> {
        let values = PackedValues::read_from(input)?;
        if values.len() != self.max_doc as usize {
            return Err(input.corrupt(format!(
                "{} packed values for {} documents",
                values.len(),
                self.max_doc
            )));
        }
        Ok(values)
    }

    fn read_numeric(&self, field: &FieldInfo) -> Result<PackedNumericDocValues> {
        let mut input = self.blob(field, BlobKind::Numeric)?;
        let docs_with_value = self.read_bits(&mut input)?;
        let values = self.read_values(&mut input)?;
        let count = docs_with_value.iter().filter(|&b| b).count() as u32;
        Ok(PackedNumericDocValues {
            docs_with_value,
            values,
            count,
        })
    }

    fn read_binary(&self, field: &FieldInfo) -> Result<PackedBinaryDocValues> {
        let mut input = self.blob(field, BlobKind::Binary)?;
        let docs_with_value = self.read_bits(&mut input)?;
        let ends = self.read_values(&mut input)?;
        let bytes = input.read_bytes()?;

        let mut last = 0;
        for end in ends.iter() {
            if end < last || end as u64 > bytes.len() as u64 {
                return Err(input.corrupt(format!("invalid binary value end offset {end}")));
            }
            last = end;
        }
        Ok(PackedBinaryDocValues {
            docs_with_value,
            ends,
            bytes,
        })
    }

    fn read_sorted(&self, field: &FieldInfo) -> Result<PackedSortedDocValues> {
        let mut input = self.blob(field, BlobKind::Sorted)?;
        let value_count = input.read_vint()?;
        let mut terms: Vec<Vec<u8>> = Vec::with_capacity(value_count.min(1 << 16) as usize);
        for _ in 0..value_count {
            let term = input.read_bytes()?;
            if terms.last().is_some_and(|prev| *prev >= term) {
                return Err(input.corrupt("sorted values out of order"));
            }
            terms.push(term);
        }
        let ords = self.read_values(&mut input)?;
        if let Some(bad) = ords.iter().find(|&o| o < 0 || o > value_count as i64) {
            return Err(input.corrupt(format!("ordinal {} out of range", bad - 1)));
        }
        Ok(PackedSortedDocValues { terms, ords })
    }

    fn check_integrity(&self) -> Result<()> {
        verify_file(self.storage.as_ref(), &self.meta_file)?;
        verify_file(self.storage.as_ref(), &self.data_file)?;
        Ok(())
    }
}

/// Return the cached value for `field`, or load and cache it.
fn cached<T: ?Sized, F>(
    cache: &Mutex<AHashMap<u32, Arc<T>>>,
    field: &FieldInfo,
    load: F,
) -> Result<Arc<T>>
where
    F: FnOnce() -> Result<Arc<T>>,
{
    if let Some(values) = cache.lock().get(&field.number) {
        return Ok(Arc::clone(values));
    }
    let values = load()?;
    cache.lock().insert(field.number, Arc::clone(&values));
    Ok(values)
}

#[derive(Debug)]
struct PackedDocValuesProducer {
    reader: PackedReader,
    numeric: Mutex<AHashMap<u32, Arc<dyn NumericDocValues>>>,
    binary: Mutex<AHashMap<u32, Arc<dyn BinaryDocValues>>>,
    sorted: Mutex<AHashMap<u32, Arc<dyn SortedDocValues>>>,
}

impl DocValuesProducer for PackedDocValuesProducer {
    fn numeric(&self, field: &FieldInfo) -> Result<Arc<dyn NumericDocValues>> {
        cached(&self.numeric, field, || {
            Ok(Arc::new(self.reader.read_numeric(field)?) as Arc<dyn NumericDocValues>)
        })
    }

    fn binary(&self, field: &FieldInfo) -> Result<Arc<dyn BinaryDocValues>> {
        cached(&self.binary, field, || {
            Ok(Arc::new(self.reader.read_binary(field)?) as Arc<dyn BinaryDocValues>)
        })
    }

    fn sorted(&self, field: &FieldInfo) -> Result<Arc<dyn SortedDocValues>> {
        cached(&self.sorted, field, || {
            Ok(Arc::new(self.reader.read_sorted(field)?) as Arc<dyn SortedDocValues>)
        })
    }

    fn check_integrity(&self) -> Result<()> {
        self.reader.check_integrity()
    }
}

#[derive(Debug)]
struct PackedNormsProducer {
    reader: PackedReader,
    norms: Mutex<AHashMap<u32, Arc<dyn NumericDocValues>>>,
}

impl NormsProducer for PackedNormsProducer {
    fn norms(&self, field: &FieldInfo) -> Result<Arc<dyn NumericDocValues>> {
        cached(&self.norms, field, || {
            let mut input = self.reader.blob(field, BlobKind::Norms)?;
            let values = self.reader.read_values(&mut input)?;
            Ok(Arc::new(PackedNorms { values }) as Arc<dyn NumericDocValues>)
        })
    }

    fn check_integrity(&self) -> Result<()> {
        self.reader.check_integrity()
    }
}

fn doc_index(doc: DocId, len: usize) -> Option<usize> {
    usize::try_from(doc).ok().filter(|&d| d < len)
}

#[derive(Debug)]
struct PackedNumericDocValues {
    docs_with_value: BitVec,
    values: PackedValues,
    count: u32,
}

impl NumericDocValues for PackedNumericDocValues {
    fn get(&self, doc: DocId) -> Option<i64> {
        doc_index(doc, self.values.len())
            .filter(|&d| self.docs_with_value.get(d) == Some(true))
            .map(|d| self.values.get(d))
    }

    fn docs_with_value(&self) -> u32 {
        self.count
    }
}

#[derive(Debug)]
struct PackedBinaryDocValues {
    docs_with_value: BitVec,
    ends: PackedValues,
    bytes: Vec<u8>,
}

impl BinaryDocValues for PackedBinaryDocValues {
    fn get(&self, doc: DocId) -> Option<&[u8]> {
        let d = doc_index(doc, self.ends.len())
            .filter(|&d| self.docs_with_value.get(d) == Some(true))?;
        let start = if d == 0 { 0 } else { self.ends.get(d - 1) as usize };
        let end = self.ends.get(d) as usize;
        Some(&self.bytes[start..end])
    }
}

#[derive(Debug)]
struct PackedSortedDocValues {
    terms: Vec<Vec<u8>>,
    ords: PackedValues,
}

impl SortedDocValues for PackedSortedDocValues {
    fn ord(&self, doc: DocId) -> Option<u32> {
        doc_index(doc, self.ords.len())
            .map(|d| self.ords.get(d))
            .filter(|&ord| ord > 0)
            .map(|ord| (ord - 1) as u32)
    }

    fn lookup_ord(&self, ord: u32) -> &[u8] {
        &self.terms[ord as usize]
    }

    fn value_count(&self) -> u32 {
        self.terms.len() as u32
    }
}

#[derive(Debug)]
struct PackedNorms {
    values: PackedValues,
}

impl NumericDocValues for PackedNorms {
    fn get(&self, doc: DocId) -> Option<i64> {
        doc_index(doc, self.values.len()).map(|d| self.values.get(d))
    }

    fn docs_with_value(&self) -> u32 {
        self.values.len() as u32
    }
}
