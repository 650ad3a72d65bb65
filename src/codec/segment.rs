//! Segment metadata: segment info, field infos and the per-segment state
//! handed to format consumers and producers.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::storage::checksum::{ChecksumInput, ChecksumOutput, SegmentId};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Extension of the segment info file.
pub const SEGMENT_INFO_EXTENSION: &str = "si";

/// Extension of the field infos file.
pub const FIELD_INFOS_EXTENSION: &str = "fnm";

const SEGMENT_INFO_CODEC: &str = "TesseraSegmentInfo";
const FIELD_INFOS_CODEC: &str = "TesseraFieldInfos";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = VERSION_START;

/// Build a segment file name: `{segment}[_{suffix}].{ext}`.
pub fn segment_file_name(segment: &str, suffix: &str, ext: &str) -> String {
    if suffix.is_empty() {
        format!("{segment}.{ext}")
    } else {
        format!("{segment}_{suffix}.{ext}")
    }
}

/// What the inverted index records for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexOptions {
    /// Not indexed.
    None,
    /// Document ids only.
    Docs,
    /// Document ids and term frequencies.
    DocsAndFreqs,
    /// Document ids, term frequencies and positions.
    DocsAndFreqsAndPositions,
}

impl IndexOptions {
    pub fn is_indexed(self) -> bool {
        self != IndexOptions::None
    }

    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    pub fn has_positions(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositions
    }

    fn to_u8(self) -> u8 {
        match self {
            IndexOptions::None => 0,
            IndexOptions::Docs => 1,
            IndexOptions::DocsAndFreqs => 2,
            IndexOptions::DocsAndFreqsAndPositions => 3,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IndexOptions::None),
            1 => Some(IndexOptions::Docs),
            2 => Some(IndexOptions::DocsAndFreqs),
            3 => Some(IndexOptions::DocsAndFreqsAndPositions),
            _ => None,
        }
    }
}

/// Kind of doc values stored for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocValuesType {
    None,
    /// One `i64` per document.
    Numeric,
    /// One byte string per document.
    Binary,
    /// One byte string per document, deduplicated and sorted into ordinals.
    Sorted,
}

impl DocValuesType {
    fn to_u8(self) -> u8 {
        match self {
            DocValuesType::None => 0,
            DocValuesType::Numeric => 1,
            DocValuesType::Binary => 2,
            DocValuesType::Sorted => 3,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DocValuesType::None),
            1 => Some(DocValuesType::Numeric),
            2 => Some(DocValuesType::Binary),
            3 => Some(DocValuesType::Sorted),
            _ => None,
        }
    }
}

/// Per-segment description of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub index_options: IndexOptions,
    pub has_norms: bool,
    pub doc_values_type: DocValuesType,
    pub attributes: BTreeMap<String, String>,
}

impl FieldInfo {
    /// A field with no postings, norms or doc values yet.
    pub fn new<S: Into<String>>(name: S, number: u32) -> Self {
        FieldInfo {
            name: name.into(),
            number,
            index_options: IndexOptions::None,
            has_norms: false,
            doc_values_type: DocValuesType::None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Set an attribute, returning the previous value.
    pub fn put_attribute<K: Into<String>, V: Into<String>>(
        &mut self,
        key: K,
        value: V,
    ) -> Option<String> {
        self.attributes.insert(key.into(), value.into())
    }

    pub fn has_doc_values(&self) -> bool {
        self.doc_values_type != DocValuesType::None
    }
}

/// The field table of a segment, addressable by name and number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldInfos {
    fields: Vec<FieldInfo>,
    by_name: HashMap<String, usize>,
}

impl FieldInfos {
    /// Build from a list of fields. Names and numbers must be unique.
    pub fn new(fields: Vec<FieldInfo>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(fields.len());
        let mut numbers = BTreeSet::new();
        for (i, field) in fields.iter().enumerate() {
            if by_name.insert(field.name.clone(), i).is_some() {
                return Err(TesseraError::invalid_argument(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }
            if !numbers.insert(field.number) {
                return Err(TesseraError::invalid_argument(format!(
                    "duplicate field number: {}",
                    field.number
                )));
            }
        }
        Ok(FieldInfos { fields, by_name })
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.number == number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_postings(&self) -> bool {
        self.fields.iter().any(|f| f.index_options.is_indexed())
    }

    pub fn has_norms(&self) -> bool {
        self.fields.iter().any(|f| f.has_norms)
    }

    pub fn has_doc_values(&self) -> bool {
        self.fields.iter().any(FieldInfo::has_doc_values)
    }

    /// Write the `.fnm` file; returns its name.
    pub fn write(&self, storage: &dyn Storage, segment: &str, id: &SegmentId) -> Result<String> {
        let name = segment_file_name(segment, "", FIELD_INFOS_EXTENSION);
        let mut out = ChecksumOutput::new(storage.create_output(&name)?);
        out.write_header(FIELD_INFOS_CODEC, VERSION_CURRENT, id, "")?;
        out.write_vint(self.fields.len() as u32)?;
        for field in &self.fields {
            out.write_string(&field.name)?;
            out.write_vint(field.number)?;
            out.write_u8(field.index_options.to_u8())?;
            out.write_u8(field.has_norms as u8)?;
            out.write_u8(field.doc_values_type.to_u8())?;
            out.write_string_map(&field.attributes)?;
        }
        out.write_footer()?;
        out.close()?;
        Ok(name)
    }

    /// Read and verify the `.fnm` file of a segment.
    pub fn read(storage: &dyn Storage, segment: &str, id: &SegmentId) -> Result<Self> {
        let name = segment_file_name(segment, "", FIELD_INFOS_EXTENSION);
        let mut input = ChecksumInput::new(storage.open_input(&name)?);
        input.check_header(FIELD_INFOS_CODEC, VERSION_START, VERSION_CURRENT, Some(id), "")?;

        let count = input.read_vint()?;
        let mut fields = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            let field_name = input.read_string()?;
            let number = input.read_vint()?;
            let options = input.read_u8()?;
            let index_options = IndexOptions::from_u8(options)
                .ok_or_else(|| input.corrupt(format!("invalid index options: {options}")))?;
            let has_norms = match input.read_u8()? {
                0 => false,
                1 => true,
                other => return Err(input.corrupt(format!("invalid norms flag: {other}"))),
            };
            let dv = input.read_u8()?;
            let doc_values_type = DocValuesType::from_u8(dv)
                .ok_or_else(|| input.corrupt(format!("invalid doc values type: {dv}")))?;
            let attributes = input.read_string_map()?;
            fields.push(FieldInfo {
                name: field_name,
                number,
                index_options,
                has_norms,
                doc_values_type,
                attributes,
            });
        }
        input.check_footer()?;

        FieldInfos::new(fields).map_err(|e| input.corrupt(e.to_string()))
    }
}

impl<'a> IntoIterator for &'a FieldInfos {
    type Item = &'a FieldInfo;
    type IntoIter = std::slice::Iter<'a, FieldInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Metadata of one segment, stored in its `.si` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub name: String,
    pub id: SegmentId,
    pub max_doc: u32,
    pub codec: String,
    /// Version of the library that wrote the segment.
    pub version: String,
    pub files: BTreeSet<String>,
    pub attributes: BTreeMap<String, String>,
}

impl SegmentInfo {
    pub fn new<N: Into<String>, C: Into<String>>(
        name: N,
        id: SegmentId,
        max_doc: u32,
        codec: C,
    ) -> Self {
        SegmentInfo {
            name: name.into(),
            id,
            max_doc,
            codec: codec.into(),
            version: crate::VERSION.to_string(),
            files: BTreeSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Name of the `.si` file of a segment.
    pub fn file_name(segment: &str) -> String {
        segment_file_name(segment, "", SEGMENT_INFO_EXTENSION)
    }

    /// Write the `.si` file. `files` must already list every other file of
    /// the segment; the `.si` file itself is added here.
    pub fn write(&mut self, storage: &dyn Storage) -> Result<()> {
        let name = Self::file_name(&self.name);
        self.files.insert(name.clone());

        let mut out = ChecksumOutput::new(storage.create_output(&name)?);
        out.write_header(SEGMENT_INFO_CODEC, VERSION_CURRENT, &self.id, "")?;
        out.write_string(&self.version)?;
        out.write_vint(self.max_doc)?;
        out.write_string(&self.codec)?;
        let files: Vec<String> = self.files.iter().cloned().collect();
        out.write_string_list(&files)?;
        out.write_string_map(&self.attributes)?;
        out.write_footer()?;
        out.close()?;

        debug!(
            "wrote segment info {name}: {} docs, codec {}, {} files",
            self.max_doc,
            self.codec,
            self.files.len()
        );
        Ok(())
    }

    /// Read and verify the `.si` file of a segment.
    pub fn read(storage: &dyn Storage, segment: &str, id: &SegmentId) -> Result<Self> {
        let name = Self::file_name(segment);
        let mut input = ChecksumInput::new(storage.open_input(&name)?);
        input.check_header(SEGMENT_INFO_CODEC, VERSION_START, VERSION_CURRENT, Some(id), "")?;
        let version = input.read_string()?;
        let max_doc = input.read_vint()?;
        if max_doc > i32::MAX as u32 - 1 {
            return Err(input.corrupt(format!("invalid max doc: {max_doc}")));
        }
        let codec = input.read_string()?;
        let files = input.read_string_list()?.into_iter().collect();
        let attributes = input.read_string_map()?;
        input.check_footer()?;

        Ok(SegmentInfo {
            name: segment.to_string(),
            id: *id,
            max_doc,
            codec,
            version,
            files,
            attributes,
        })
    }
}

/// Everything a format consumer needs to write its part of a segment.
#[derive(Clone)]
pub struct SegmentWriteState {
    pub storage: Arc<dyn Storage>,
    pub segment: String,
    pub id: SegmentId,
    pub max_doc: u32,
    /// Distinguishes files of several formats of the same kind.
    pub suffix: String,
    /// Page size used by packed doc values and norms.
    pub packed_page_size: usize,
    /// Terms with at most this many documents are inlined by `Inline10`.
    pub inline_cutoff: u32,
    files: Arc<Mutex<BTreeSet<String>>>,
}

impl SegmentWriteState {
    pub fn new<S: Into<String>>(
        storage: Arc<dyn Storage>,
        segment: S,
        id: SegmentId,
        max_doc: u32,
    ) -> Self {
        SegmentWriteState {
            storage,
            segment: segment.into(),
            id,
            max_doc,
            suffix: String::new(),
            packed_page_size: 1024,
            inline_cutoff: 1,
            files: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// The same state with another suffix. Created files are still tracked
    /// in the shared file set.
    pub fn with_suffix<S: Into<String>>(&self, suffix: S) -> Self {
        SegmentWriteState {
            suffix: suffix.into(),
            ..self.clone()
        }
    }

    pub fn file_name(&self, ext: &str) -> String {
        segment_file_name(&self.segment, &self.suffix, ext)
    }

    /// Create a segment file and record it.
    pub fn create_output(&self, ext: &str) -> Result<Box<dyn StorageOutput>> {
        let name = self.file_name(ext);
        let output = self.storage.create_output(&name)?;
        self.files.lock().insert(name);
        Ok(output)
    }

    /// All files created through this state and its suffixed copies.
    pub fn files(&self) -> BTreeSet<String> {
        self.files.lock().clone()
    }
}

impl fmt::Debug for SegmentWriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentWriteState")
            .field("segment", &self.segment)
            .field("max_doc", &self.max_doc)
            .field("suffix", &self.suffix)
            .finish()
    }
}

/// Everything a format producer needs to open its part of a segment.
#[derive(Clone)]
pub struct SegmentReadState {
    pub storage: Arc<dyn Storage>,
    pub segment: String,
    pub id: SegmentId,
    pub max_doc: u32,
    pub field_infos: Arc<FieldInfos>,
    pub suffix: String,
}

impl SegmentReadState {
    pub fn new(
        storage: Arc<dyn Storage>,
        info: &SegmentInfo,
        field_infos: Arc<FieldInfos>,
    ) -> Self {
        SegmentReadState {
            storage,
            segment: info.name.clone(),
            id: info.id,
            max_doc: info.max_doc,
            field_infos,
            suffix: String::new(),
        }
    }

    pub fn with_suffix<S: Into<String>>(&self, suffix: S) -> Self {
        SegmentReadState {
            suffix: suffix.into(),
            ..self.clone()
        }
    }

    pub fn file_name(&self, ext: &str) -> String {
        segment_file_name(&self.segment, &self.suffix, ext)
    }

    pub fn open_input(&self, ext: &str) -> Result<Box<dyn StorageInput>> {
        self.storage.open_input(&self.file_name(ext))
    }
}

impl fmt::Debug for SegmentReadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentReadState")
            .field("segment", &self.segment)
            .field("max_doc", &self.max_doc)
            .field("suffix", &self.suffix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    const ID: SegmentId = [9u8; 16];

    fn sample_fields() -> FieldInfos {
        let mut body = FieldInfo::new("body", 0);
        body.index_options = IndexOptions::DocsAndFreqsAndPositions;
        body.has_norms = true;
        let mut price = FieldInfo::new("price", 1);
        price.doc_values_type = DocValuesType::Numeric;
        price.put_attribute("PerFieldDocValuesFormat.format", "Packed10");
        FieldInfos::new(vec![body, price]).unwrap()
    }

    #[test]
    fn test_file_names() {
        assert_eq!(segment_file_name("_0", "", "si"), "_0.si");
        assert_eq!(segment_file_name("_a", "Packed10_0", "dvd"), "_a_Packed10_0.dvd");
    }

    #[test]
    fn test_index_options_order() {
        assert!(!IndexOptions::None.is_indexed());
        assert!(!IndexOptions::Docs.has_freqs());
        assert!(IndexOptions::DocsAndFreqs.has_freqs());
        assert!(!IndexOptions::DocsAndFreqs.has_positions());
        assert!(IndexOptions::DocsAndFreqsAndPositions.has_positions());
    }

    #[test]
    fn test_field_infos_write_read() {
        let storage = MemoryStorage::new_default();
        let infos = sample_fields();
        let name = infos.write(&storage, "_0", &ID).unwrap();
        assert_eq!(name, "_0.fnm");

        let read = FieldInfos::read(&storage, "_0", &ID).unwrap();
        assert_eq!(read, infos);
        assert!(read.has_postings());
        assert!(read.has_norms());
        assert!(read.has_doc_values());
        assert_eq!(
            read.field("price")
                .unwrap()
                .attribute("PerFieldDocValuesFormat.format"),
            Some("Packed10")
        );
        assert_eq!(read.field_by_number(0).unwrap().name, "body");
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let err = FieldInfos::new(vec![FieldInfo::new("a", 0), FieldInfo::new("a", 1)]).unwrap_err();
        assert!(matches!(err, TesseraError::InvalidArgument(_)));
        let err = FieldInfos::new(vec![FieldInfo::new("a", 0), FieldInfo::new("b", 0)]).unwrap_err();
        assert!(matches!(err, TesseraError::InvalidArgument(_)));
    }

    #[test]
    fn test_segment_info_write_read() {
        let storage = MemoryStorage::new_default();
        let mut info = SegmentInfo::new("_3", ID, 42, "Tessera10");
        info.files.insert("_3.fnm".to_string());
        info.write(&storage).unwrap();
        assert!(info.files.contains("_3.si"));

        let read = SegmentInfo::read(&storage, "_3", &ID).unwrap();
        assert_eq!(read, info);

        let err = SegmentInfo::read(&storage, "_3", &[0u8; 16]).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_write_state_tracks_files() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let state = SegmentWriteState::new(storage, "_1", ID, 3);
        state.create_output("tim").unwrap().close().unwrap();
        let suffixed = state.with_suffix("Packed10_0");
        suffixed.create_output("dvd").unwrap().close().unwrap();

        let files: Vec<String> = state.files().into_iter().collect();
        assert_eq!(files, vec!["_1.tim", "_1_Packed10_0.dvd"]);
    }
}
