//! `SimpleText`: every format as a human-readable record file.
//!
//! Intended for debugging and tests, not for speed: readers parse the whole
//! file at open and serve everything from memory. A postings file reads
//!
//! ```text
//! codec SimpleTextPostings
//! version 0
//! id 0a1b...
//! suffix
//! field body
//! options 3
//! term apple
//! doc 0
//! freq 1
//! pos 1
//! END
//! checksum 00000000001234567890
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::codec::doc_values::{
    BinaryDocValues, DocValuesConsumer, DocValuesProducer, NormsConsumer, NormsProducer,
    NumericDocValues, SortedDocValues, VecBinaryDocValues, VecNumericDocValues,
    VecSortedDocValues,
};
use crate::codec::postings::{
    BufferedPosting, BufferedTerm, FieldStats, FieldsConsumer, FieldsProducer, PostingsEnum,
    PostingsFlags, SeekStatus, TermCursor, Terms, TermsEnum, unpositioned,
};
use crate::codec::segment::{FieldInfo, IndexOptions, SegmentReadState, SegmentWriteState};
use crate::codec::{DocValuesFormat, NormsFormat, PostingsFormat};
use crate::error::{Result, TesseraError};
use crate::search::{DocId, DocIdSetIterator, NO_MORE_DOCS};
use crate::storage::text::{TextInput, TextOutput, verify_text_file};
use crate::storage::{Storage, StorageInput, StorageOutput};

pub const POSTINGS_EXTENSION: &str = "pst";
pub const DOC_VALUES_EXTENSION: &str = "dvt";
pub const NORMS_EXTENSION: &str = "nrm";

const POSTINGS_CODEC: &str = "SimpleTextPostings";
const DOC_VALUES_CODEC: &str = "SimpleTextDocValues";
const NORMS_CODEC: &str = "SimpleTextNorms";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = VERSION_START;

const FIELD: &str = "field ";
const OPTIONS: &str = "options ";
const TERM: &str = "term ";
const DOC: &str = "doc ";
const FREQ: &str = "freq ";
const POS: &str = "pos ";
const TYPE: &str = "type ";
const VALUE: &str = "value ";
const MISSING: &[u8] = b"missing";
const NORM: &str = "norm ";
const END: &[u8] = b"END";

type TextWriter = TextOutput<Box<dyn StorageOutput>>;
type TextReader = TextInput<Box<dyn StorageInput>>;

fn parse<T: FromStr>(input: &TextReader, label: &str, bytes: &[u8]) -> Result<T> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| {
            input.corrupt(format!(
                "cannot parse {label:?} value {:?}",
                String::from_utf8_lossy(bytes)
            ))
        })
}

fn next_line(input: &mut TextReader) -> Result<Vec<u8>> {
    match input.read_line()? {
        Some(line) => Ok(line),
        None => Err(input.corrupt("unexpected end of file, expected END")),
    }
}

fn field_name(input: &TextReader, line: &[u8]) -> Result<String> {
    let name = line.strip_prefix(FIELD.as_bytes()).ok_or_else(|| {
        input.corrupt(format!(
            "expected field record, got {:?}",
            String::from_utf8_lossy(line)
        ))
    })?;
    String::from_utf8(name.to_vec()).map_err(|e| input.corrupt(format!("invalid UTF-8: {e}")))
}

fn finish_text(mut out: TextWriter) -> Result<()> {
    out.write_escaped(END)?;
    out.write_newline()?;
    out.write_checksum()?;
    out.close()
}

/// Human-readable postings.
#[derive(Debug, Default)]
pub struct SimpleTextPostingsFormat;

impl SimpleTextPostingsFormat {
    pub const NAME: &'static str = "SimpleText";

    pub fn new() -> Self {
        SimpleTextPostingsFormat
    }
}

impl PostingsFormat for SimpleTextPostingsFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        let mut out = TextOutput::new(state.create_output(POSTINGS_EXTENSION)?);
        out.write_header(POSTINGS_CODEC, VERSION_CURRENT, &state.id, &state.suffix)?;
        Ok(Box::new(TextFieldsConsumer { out }))
    }

    fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>> {
        Ok(Box::new(TextFieldsProducer::open(state)?))
    }
}

struct TextFieldsConsumer {
    out: TextWriter,
}

impl FieldsConsumer for TextFieldsConsumer {
    fn write_field(&mut self, field: &FieldInfo, terms: &[BufferedTerm]) -> Result<()> {
        let options = field.index_options;
        self.out.write_field(FIELD, field.name.as_bytes())?;
        self.out
            .write_value(OPTIONS, crate::codec::block::index_options_to_u8(options))?;
        for term in terms {
            self.out.write_field(TERM, &term.term)?;
            for posting in &term.postings {
                self.out.write_value(DOC, posting.doc)?;
                if options.has_freqs() {
                    self.out.write_value(FREQ, posting.freq)?;
                }
                if options.has_positions() {
                    for &position in &posting.positions {
                        self.out.write_value(POS, position)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        finish_text(self.out)
    }
}

#[derive(Debug)]
struct TextField {
    index_options: IndexOptions,
    stats: FieldStats,
    terms: Vec<BufferedTerm>,
}

#[derive(Debug)]
struct TextShared {
    storage: Arc<dyn Storage>,
    file: String,
    allocated: AtomicUsize,
}

/// Parses a `.pst` file into memory.
#[derive(Debug)]
pub struct TextFieldsProducer {
    shared: Arc<TextShared>,
    fields: BTreeMap<String, Arc<TextTerms>>,
}

#[derive(Debug)]
struct TextTerms {
    shared: Arc<TextShared>,
    field: Arc<TextField>,
}

impl TextFieldsProducer {
    pub fn open(state: &SegmentReadState) -> Result<Self> {
        let file = state.file_name(POSTINGS_EXTENSION);
        let mut input = TextInput::new(state.open_input(POSTINGS_EXTENSION)?);
        input.check_header(
            POSTINGS_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            Some(&state.id),
            &state.suffix,
        )?;

        let shared = Arc::new(TextShared {
            storage: Arc::clone(&state.storage),
            file: file.clone(),
            allocated: AtomicUsize::new(0),
        });
        let mut fields = BTreeMap::new();

        let mut line = next_line(&mut input)?;
        while line != END {
            let name = field_name(&input, &line)?;
            let options: u8 = input.read_value(OPTIONS)?;
            let index_options = match options {
                1 => IndexOptions::Docs,
                2 => IndexOptions::DocsAndFreqs,
                3 => IndexOptions::DocsAndFreqsAndPositions,
                other => return Err(input.corrupt(format!("invalid index options {other}"))),
            };

            let mut terms: Vec<BufferedTerm> = Vec::new();
            line = next_line(&mut input)?;
            while let Some(term) = line.strip_prefix(TERM.as_bytes()) {
                if terms.last().is_some_and(|prev| prev.term.as_slice() >= term) {
                    return Err(input.corrupt("terms out of order"));
                }
                let mut term = BufferedTerm {
                    term: term.to_vec(),
                    postings: Vec::new(),
                };
                line = next_line(&mut input)?;
                while let Some(doc) = line.strip_prefix(DOC.as_bytes()) {
                    let doc: DocId = parse(&input, DOC, doc)?;
                    if doc < 0 || term.postings.last().is_some_and(|p| p.doc >= doc) {
                        return Err(input.corrupt(format!("document {doc} out of order")));
                    }
                    let freq = if index_options.has_freqs() {
                        input.read_value(FREQ)?
                    } else {
                        1
                    };
                    let mut positions = Vec::new();
                    if index_options.has_positions() {
                        for _ in 0..freq {
                            positions.push(input.read_value(POS)?);
                        }
                    }
                    term.postings.push(BufferedPosting {
                        doc,
                        freq,
                        positions,
                    });
                    line = next_line(&mut input)?;
                }
                terms.push(term);
            }

            let field = Arc::new(TextField {
                index_options,
                stats: FieldStats::compute(&terms),
                terms,
            });
            fields.insert(
                name,
                Arc::new(TextTerms {
                    shared: Arc::clone(&shared),
                    field,
                }),
            );
        }
        input.check_footer()?;

        debug!("parsed {file}: {} fields", fields.len());
        Ok(TextFieldsProducer { shared, fields })
    }
}

impl FieldsProducer for TextFieldsProducer {
    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        Ok(self
            .fields
            .get(field)
            .map(|terms| Arc::clone(terms) as Arc<dyn Terms>))
    }

    fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn check_integrity(&self) -> Result<()> {
        verify_text_file(self.shared.storage.as_ref(), &self.shared.file).map(|_| ())
    }

    fn allocated_cursors(&self) -> usize {
        self.shared.allocated.load(Ordering::Relaxed)
    }
}

impl Terms for TextTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(TextTermsEnum {
            shared: Arc::clone(&self.shared),
            field: Arc::clone(&self.field),
            cursor: TermCursor::default(),
        }))
    }

    fn size(&self) -> u64 {
        self.field.stats.term_count
    }

    fn sum_doc_freq(&self) -> u64 {
        self.field.stats.sum_doc_freq
    }

    fn sum_total_term_freq(&self) -> u64 {
        self.field.stats.sum_total_term_freq
    }

    fn doc_count(&self) -> u32 {
        self.field.stats.doc_count
    }

    fn index_options(&self) -> IndexOptions {
        self.field.index_options
    }
}

#[derive(Debug)]
struct TextTermsEnum {
    shared: Arc<TextShared>,
    field: Arc<TextField>,
    cursor: TermCursor,
}

impl TextTermsEnum {
    fn current(&self) -> Result<&BufferedTerm> {
        self.cursor
            .current()
            .map(|i| &self.field.terms[i])
            .ok_or_else(unpositioned)
    }

    fn search(&self, term: &[u8]) -> std::result::Result<usize, usize> {
        self.field
            .terms
            .binary_search_by(|t| t.term.as_slice().cmp(term))
    }
}

impl TermsEnum for TextTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        Ok(self
            .cursor
            .advance(self.field.terms.len())
            .map(|i| self.field.terms[i].term.as_slice()))
    }

    fn seek_exact(&mut self, term: &[u8]) -> Result<bool> {
        let search = self.search(term);
        Ok(self.cursor.seek_exact(search))
    }

    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus> {
        let search = self.search(term);
        Ok(self.cursor.seek_ceil(search, self.field.terms.len()))
    }

    fn term(&self) -> Option<&[u8]> {
        self.cursor
            .current()
            .map(|i| self.field.terms[i].term.as_slice())
    }

    fn doc_freq(&self) -> Result<u32> {
        Ok(self.current()?.doc_freq())
    }

    fn total_term_freq(&self) -> Result<u64> {
        Ok(self.current()?.total_term_freq())
    }

    fn index_options(&self) -> IndexOptions {
        self.field.index_options
    }

    fn postings(
        &mut self,
        reuse: Option<Box<dyn PostingsEnum>>,
        flags: PostingsFlags,
    ) -> Result<Box<dyn PostingsEnum>> {
        let term = self.cursor.current().ok_or_else(unpositioned)?;
        let fresh = TextPostingsEnum {
            shared: Arc::clone(&self.shared),
            field: Arc::clone(&self.field),
            term,
            flags,
            next: 0,
            doc: -1,
            positions_read: 0,
        };

        let recycled = reuse
            .filter(|r| {
                r.as_any()
                    .downcast_ref::<TextPostingsEnum>()
                    .is_some_and(|r| Arc::ptr_eq(&r.shared, &self.shared))
            })
            .and_then(|r| r.into_any().downcast::<TextPostingsEnum>().ok());
        match recycled {
            Some(mut postings) => {
                *postings = fresh;
                Ok(postings)
            }
            None => {
                self.shared.allocated.fetch_add(1, Ordering::Relaxed);
                Ok(Box::new(fresh))
            }
        }
    }
}

#[derive(Debug)]
struct TextPostingsEnum {
    shared: Arc<TextShared>,
    field: Arc<TextField>,
    term: usize,
    flags: PostingsFlags,
    /// Index of the next posting to return.
    next: usize,
    doc: DocId,
    positions_read: usize,
}

impl TextPostingsEnum {
    fn postings(&self) -> &[BufferedPosting] {
        &self.field.terms[self.term].postings
    }

    fn current(&self) -> Option<&BufferedPosting> {
        if self.doc == -1 || self.doc == NO_MORE_DOCS {
            return None;
        }
        self.postings().get(self.next - 1)
    }
}

impl DocIdSetIterator for TextPostingsEnum {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.doc = match self.postings().get(self.next) {
            Some(posting) => posting.doc,
            None => NO_MORE_DOCS,
        };
        if self.doc != NO_MORE_DOCS {
            self.next += 1;
        }
        self.positions_read = 0;
        Ok(self.doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        while self.doc < target {
            self.next_doc()?;
        }
        Ok(self.doc)
    }

    fn cost(&self) -> u64 {
        self.postings().len() as u64
    }
}

impl PostingsEnum for TextPostingsEnum {
    fn freq(&self) -> u32 {
        match self.current() {
            Some(posting) if self.field.index_options.has_freqs() => posting.freq,
            _ => 1,
        }
    }

    fn next_position(&mut self) -> Result<u32> {
        if !self.flags.contains(PostingsFlags::POSITIONS)
            || !self.field.index_options.has_positions()
        {
            return Err(TesseraError::invalid_operation(
                "positions were not requested or are not indexed",
            ));
        }
        let position = self
            .current()
            .and_then(|p| p.positions.get(self.positions_read))
            .copied()
            .ok_or_else(|| {
                TesseraError::invalid_operation("no positions left for the current document")
            })?;
        self.positions_read += 1;
        Ok(position)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Human-readable doc values.
#[derive(Debug, Default)]
pub struct SimpleTextDocValuesFormat;

impl SimpleTextDocValuesFormat {
    pub const NAME: &'static str = "SimpleText";

    pub fn new() -> Self {
        SimpleTextDocValuesFormat
    }
}

impl DocValuesFormat for SimpleTextDocValuesFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn doc_values_consumer(
        &self,
        state: &SegmentWriteState,
    ) -> Result<Box<dyn DocValuesConsumer>> {
        let mut out = TextOutput::new(state.create_output(DOC_VALUES_EXTENSION)?);
        out.write_header(DOC_VALUES_CODEC, VERSION_CURRENT, &state.id, &state.suffix)?;
        Ok(Box::new(TextValuesConsumer {
            out,
            max_doc: state.max_doc,
        }))
    }

    fn doc_values_producer(&self, state: &SegmentReadState) -> Result<Box<dyn DocValuesProducer>> {
        Ok(Box::new(TextDocValuesProducer::open(state)?))
    }
}

struct TextValuesConsumer {
    out: TextWriter,
    max_doc: u32,
}

impl TextValuesConsumer {
    fn start_field(&mut self, field: &FieldInfo, kind: &str, len: usize) -> Result<()> {
        if len != self.max_doc as usize {
            return Err(TesseraError::invalid_argument(format!(
                "field {} has {len} values for {} documents",
                field.name, self.max_doc
            )));
        }
        self.out.write_field(FIELD, field.name.as_bytes())?;
        self.out.write_field(TYPE, kind.as_bytes())
    }

    fn write_bytes_values(&mut self, values: &[Option<Vec<u8>>]) -> Result<()> {
        for value in values {
            match value {
                Some(value) => self.out.write_field(VALUE, value)?,
                None => {
                    self.out.write_escaped(MISSING)?;
                    self.out.write_newline()?;
                }
            }
        }
        Ok(())
    }
}

impl DocValuesConsumer for TextValuesConsumer {
    fn add_numeric_field(&mut self, field: &mut FieldInfo, values: &[Option<i64>]) -> Result<()> {
        self.start_field(field, "numeric", values.len())?;
        for value in values {
            match value {
                Some(value) => self.out.write_value(VALUE, value)?,
                None => {
                    self.out.write_escaped(MISSING)?;
                    self.out.write_newline()?;
                }
            }
        }
        Ok(())
    }

    fn add_binary_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> Result<()> {
        self.start_field(field, "binary", values.len())?;
        self.write_bytes_values(values)
    }

    fn add_sorted_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> Result<()> {
        self.start_field(field, "sorted", values.len())?;
        self.write_bytes_values(values)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        finish_text(self.out)
    }
}

#[derive(Debug)]
enum TextValues {
    Numeric(Arc<VecNumericDocValues>),
    Binary(Arc<VecBinaryDocValues>),
    Sorted(Arc<VecSortedDocValues>),
}

#[derive(Debug)]
struct TextDocValuesProducer {
    storage: Arc<dyn Storage>,
    file: String,
    fields: BTreeMap<String, TextValues>,
}

impl TextDocValuesProducer {
    fn open(state: &SegmentReadState) -> Result<Self> {
        let mut input = TextInput::new(state.open_input(DOC_VALUES_EXTENSION)?);
        input.check_header(
            DOC_VALUES_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            Some(&state.id),
            &state.suffix,
        )?;

        let mut fields = BTreeMap::new();
        let mut line = next_line(&mut input)?;
        while line != END {
            let name = field_name(&input, &line)?;
            let kind = input.read_string(TYPE)?;

            let mut raw = Vec::with_capacity(state.max_doc as usize);
            for _ in 0..state.max_doc {
                let line = next_line(&mut input)?;
                if line == MISSING {
                    raw.push(None);
                } else if let Some(value) = line.strip_prefix(VALUE.as_bytes()) {
                    raw.push(Some(value.to_vec()));
                } else {
                    return Err(input.corrupt(format!(
                        "expected value record, got {:?}",
                        String::from_utf8_lossy(&line)
                    )));
                }
            }

            let values = match kind.as_str() {
                "numeric" => {
                    let numbers = raw
                        .iter()
                        .map(|v| v.as_deref().map(|v| parse(&input, VALUE, v)).transpose())
                        .collect::<Result<Vec<Option<i64>>>>()?;
                    TextValues::Numeric(Arc::new(VecNumericDocValues::new(numbers)))
                }
                "binary" => TextValues::Binary(Arc::new(VecBinaryDocValues::new(raw))),
                "sorted" => TextValues::Sorted(Arc::new(VecSortedDocValues::from_values(&raw))),
                other => return Err(input.corrupt(format!("unknown doc values type {other}"))),
            };
            fields.insert(name, values);
            line = next_line(&mut input)?;
        }
        input.check_footer()?;

        Ok(TextDocValuesProducer {
            storage: Arc::clone(&state.storage),
            file: state.file_name(DOC_VALUES_EXTENSION),
            fields,
        })
    }

    fn values(&self, field: &FieldInfo) -> Result<&TextValues> {
        self.fields.get(&field.name).ok_or_else(|| {
            TesseraError::invalid_argument(format!(
                "field {} has no doc values in {}",
                field.name, self.file
            ))
        })
    }

    fn wrong_type(field: &FieldInfo, expected: &str) -> TesseraError {
        TesseraError::invalid_argument(format!("field {} has no {expected} doc values", field.name))
    }
}

impl DocValuesProducer for TextDocValuesProducer {
    fn numeric(&self, field: &FieldInfo) -> Result<Arc<dyn NumericDocValues>> {
        match self.values(field)? {
            TextValues::Numeric(values) => Ok(Arc::clone(values) as Arc<dyn NumericDocValues>),
            _ => Err(Self::wrong_type(field, "numeric")),
        }
    }

    fn binary(&self, field: &FieldInfo) -> Result<Arc<dyn BinaryDocValues>> {
        match self.values(field)? {
            TextValues::Binary(values) => Ok(Arc::clone(values) as Arc<dyn BinaryDocValues>),
            _ => Err(Self::wrong_type(field, "binary")),
        }
    }

    fn sorted(&self, field: &FieldInfo) -> Result<Arc<dyn SortedDocValues>> {
        match self.values(field)? {
            TextValues::Sorted(values) => Ok(Arc::clone(values) as Arc<dyn SortedDocValues>),
            _ => Err(Self::wrong_type(field, "sorted")),
        }
    }

    fn check_integrity(&self) -> Result<()> {
        verify_text_file(self.storage.as_ref(), &self.file).map(|_| ())
    }
}

/// Human-readable norms.
#[derive(Debug, Default)]
pub struct SimpleTextNormsFormat;

impl SimpleTextNormsFormat {
    pub const NAME: &'static str = "SimpleText";

    pub fn new() -> Self {
        SimpleTextNormsFormat
    }
}

impl NormsFormat for SimpleTextNormsFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn norms_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn NormsConsumer>> {
        let mut out = TextOutput::new(state.create_output(NORMS_EXTENSION)?);
        out.write_header(NORMS_CODEC, VERSION_CURRENT, &state.id, &state.suffix)?;
        Ok(Box::new(TextNormsConsumer {
            out,
            max_doc: state.max_doc,
        }))
    }

    fn norms_producer(&self, state: &SegmentReadState) -> Result<Box<dyn NormsProducer>> {
        let mut input = TextInput::new(state.open_input(NORMS_EXTENSION)?);
        input.check_header(
            NORMS_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            Some(&state.id),
            &state.suffix,
        )?;

        let mut fields = BTreeMap::new();
        let mut line = next_line(&mut input)?;
        while line != END {
            let name = field_name(&input, &line)?;
            let mut norms = Vec::with_capacity(state.max_doc as usize);
            for _ in 0..state.max_doc {
                norms.push(Some(input.read_value::<i64>(NORM)?));
            }
            fields.insert(name, Arc::new(VecNumericDocValues::new(norms)));
            line = next_line(&mut input)?;
        }
        input.check_footer()?;

        Ok(Box::new(TextNormsProducer {
            storage: Arc::clone(&state.storage),
            file: state.file_name(NORMS_EXTENSION),
            fields,
        }))
    }
}

struct TextNormsConsumer {
    out: TextWriter,
    max_doc: u32,
}

impl NormsConsumer for TextNormsConsumer {
    fn add_norms_field(&mut self, field: &FieldInfo, values: &[i64]) -> Result<()> {
        if values.len() != self.max_doc as usize {
            return Err(TesseraError::invalid_argument(format!(
                "field {} has {} norms for {} documents",
                field.name,
                values.len(),
                self.max_doc
            )));
        }
        self.out.write_field(FIELD, field.name.as_bytes())?;
        for value in values {
            self.out.write_value(NORM, value)?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        finish_text(self.out)
    }
}

#[derive(Debug)]
struct TextNormsProducer {
    storage: Arc<dyn Storage>,
    file: String,
    fields: BTreeMap<String, Arc<VecNumericDocValues>>,
}

impl NormsProducer for TextNormsProducer {
    fn norms(&self, field: &FieldInfo) -> Result<Arc<dyn NumericDocValues>> {
        self.fields
            .get(&field.name)
            .map(|norms| Arc::clone(norms) as Arc<dyn NumericDocValues>)
            .ok_or_else(|| {
                TesseraError::invalid_argument(format!("field {} has no norms", field.name))
            })
    }

    fn check_integrity(&self) -> Result<()> {
        verify_text_file(self.storage.as_ref(), &self.file).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::segment::DocValuesType;
    use crate::codec::test_util::{read_state, sample_terms, text_field, write_state};
    use crate::search::collect_docs;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_postings_file_is_readable_text() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_state(storage.clone(), 8);
        let field = text_field("body", 0);
        let mut consumer = SimpleTextPostingsFormat.fields_consumer(&state).unwrap();
        consumer.write_field(&field, &sample_terms()).unwrap();
        consumer.finish().unwrap();

        let text = String::from_utf8(storage.read_contents("_0.pst").unwrap()).unwrap();
        assert!(text.starts_with("codec SimpleTextPostings\nversion 0\n"));
        assert!(text.contains("field body\noptions 3\nterm apple\ndoc 0\nfreq 1\npos 1\n"));
        assert!(text.contains("\nEND\nchecksum "));

        let read = read_state(storage.clone(), &state, vec![field]);
        let producer = SimpleTextPostingsFormat.fields_producer(&read).unwrap();
        producer.check_integrity().unwrap();
        let terms = producer.terms("body").unwrap().unwrap();
        assert_eq!(terms.size(), 3);
        assert_eq!(terms.sum_total_term_freq(), 7);

        let mut terms_enum = terms.iterator().unwrap();
        assert!(terms_enum.seek_exact(b"banana").unwrap());
        let mut postings = terms_enum.postings(None, PostingsFlags::POSITIONS).unwrap();
        assert_eq!(postings.next_doc().unwrap(), 1);
        assert_eq!(postings.freq(), 2);
        assert_eq!(postings.next_position().unwrap(), 0);
        assert_eq!(postings.next_position().unwrap(), 4);
        assert!(postings.next_position().is_err());

        assert_eq!(terms_enum.next().unwrap(), Some(&b"cherry"[..]));
        let mut postings = terms_enum.postings(Some(postings), PostingsFlags::NONE).unwrap();
        assert_eq!(collect_docs(&mut postings).unwrap(), vec![2]);
        assert_eq!(producer.allocated_cursors(), 1);
    }

    #[test]
    fn test_terms_with_newlines_round_trip() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_state(storage.clone(), 2);
        let field = text_field("body", 0);
        let terms = vec![BufferedTerm {
            term: b"line\none\\".to_vec(),
            postings: vec![crate::codec::test_util::posting(1, &[0])],
        }];
        let mut consumer = SimpleTextPostingsFormat.fields_consumer(&state).unwrap();
        consumer.write_field(&field, &terms).unwrap();
        consumer.finish().unwrap();

        let read = read_state(storage.clone(), &state, vec![field]);
        let producer = SimpleTextPostingsFormat.fields_producer(&read).unwrap();
        let mut terms_enum = producer.terms("body").unwrap().unwrap().iterator().unwrap();
        assert_eq!(terms_enum.next().unwrap(), Some(&b"line\none\\"[..]));
    }

    #[test]
    fn test_doc_values_and_norms() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_state(storage.clone(), 3);
        let mut price = FieldInfo::new("price", 0);
        price.doc_values_type = DocValuesType::Numeric;
        let mut tag = FieldInfo::new("tag", 1);
        tag.doc_values_type = DocValuesType::Sorted;
        let body = text_field("body", 2);

        let mut consumer = SimpleTextDocValuesFormat.doc_values_consumer(&state).unwrap();
        consumer.add_numeric_field(&mut price, &[Some(-3), None, Some(9)]).unwrap();
        consumer
            .add_sorted_field(&mut tag, &[None, Some(b"b".to_vec()), Some(b"a".to_vec())])
            .unwrap();
        consumer.finish().unwrap();
        let mut norms = SimpleTextNormsFormat.norms_consumer(&state).unwrap();
        norms.add_norms_field(&body, &[1, 2, 3]).unwrap();
        norms.finish().unwrap();

        let read = read_state(storage.clone(), &state, vec![price.clone(), tag.clone(), body.clone()]);
        let producer = SimpleTextDocValuesFormat.doc_values_producer(&read).unwrap();
        let numeric = producer.numeric(&price).unwrap();
        assert_eq!(numeric.get(0), Some(-3));
        assert_eq!(numeric.get(1), None);
        let sorted = producer.sorted(&tag).unwrap();
        assert_eq!(sorted.ord(1), Some(1));
        assert_eq!(sorted.ord(2), Some(0));
        assert!(producer.binary(&tag).is_err());

        let norms = SimpleTextNormsFormat.norms_producer(&read).unwrap();
        assert_eq!(norms.norms(&body).unwrap().get(2), Some(3));
        norms.check_integrity().unwrap();
    }

    #[test]
    fn test_edited_text_fails_checksum() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_state(storage.clone(), 3);
        let body = text_field("body", 0);
        let mut norms = SimpleTextNormsFormat.norms_consumer(&state).unwrap();
        norms.add_norms_field(&body, &[1, 2, 3]).unwrap();
        norms.finish().unwrap();

        let text = String::from_utf8(storage.read_contents("_0.nrm").unwrap()).unwrap();
        let edited = text.replace("norm 2\n", "norm 7\n");
        storage.replace_contents("_0.nrm", edited.into_bytes()).unwrap();

        let read = read_state(storage.clone(), &state, vec![body]);
        let err = SimpleTextNormsFormat.norms_producer(&read).unwrap_err();
        assert!(err.is_corruption());
    }
}
