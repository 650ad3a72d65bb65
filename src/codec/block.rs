//! `Block10` postings: a term dictionary file plus a postings file.
//!
//! ```text
//! .tim  header
//!       { 1, field number, index options, term count, sum doc freq,
//!         sum total term freq, doc count,
//!         { term, doc freq, total term freq, postings offset, postings length }* }*
//!       0
//!       footer
//! .doc  header { postings of one term }* footer
//! ```
//!
//! The postings of a term are a run of vints per document: the document
//! delta, then the frequency if indexed, then position deltas if indexed.
//! The term dictionary is loaded at open; postings are decoded lazily from
//! slices of the postings file.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::codec::PostingsFormat;
use crate::codec::postings::{
    BufferedTerm, FieldStats, FieldsConsumer, FieldsProducer, PostingsEnum, PostingsFlags,
    SeekStatus, TermCursor, Terms, TermsEnum, unpositioned,
};
use crate::codec::segment::{FieldInfo, IndexOptions, SegmentReadState, SegmentWriteState};
use crate::error::{Result, TesseraError};
use crate::search::{DocId, DocIdSetIterator, NO_MORE_DOCS};
use crate::storage::checksum::{
    ChecksumInput, ChecksumOutput, FOOTER_LENGTH, retrieve_checksum, verify_file,
};
use crate::storage::{Storage, StorageInput, StorageOutput};
use crate::util::varint;

pub const TERMS_EXTENSION: &str = "tim";
pub const POSTINGS_EXTENSION: &str = "doc";

const TERMS_CODEC: &str = "Block10Terms";
const POSTINGS_CODEC: &str = "Block10Postings";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = VERSION_START;

/// The `Block10` postings format.
#[derive(Debug, Default)]
pub struct Block10PostingsFormat;

impl Block10PostingsFormat {
    pub const NAME: &'static str = "Block10";

    pub fn new() -> Self {
        Block10PostingsFormat
    }
}

impl PostingsFormat for Block10PostingsFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        Ok(Box::new(BlockFieldsConsumer::new(state)?))
    }

    fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>> {
        Ok(Box::new(BlockFieldsProducer::open(state)?))
    }
}

/// Encode the postings of one term.
pub(crate) fn encode_postings(term: &BufferedTerm, options: IndexOptions, out: &mut Vec<u8>) {
    let mut last_doc = 0;
    for posting in &term.postings {
        varint::push_u64(out, (posting.doc - last_doc) as u64);
        last_doc = posting.doc;
        if options.has_freqs() {
            varint::push_u64(out, posting.freq as u64);
        }
        if options.has_positions() {
            let mut last_position = 0;
            for &position in &posting.positions {
                varint::push_u64(out, (position - last_position) as u64);
                last_position = position;
            }
        }
    }
}

pub(crate) fn index_options_to_u8(options: IndexOptions) -> u8 {
    match options {
        IndexOptions::None => 0,
        IndexOptions::Docs => 1,
        IndexOptions::DocsAndFreqs => 2,
        IndexOptions::DocsAndFreqsAndPositions => 3,
    }
}

pub(crate) fn index_options_from_u8<R: StorageInput>(
    input: &ChecksumInput<R>,
    value: u8,
) -> Result<IndexOptions> {
    match value {
        1 => Ok(IndexOptions::Docs),
        2 => Ok(IndexOptions::DocsAndFreqs),
        3 => Ok(IndexOptions::DocsAndFreqsAndPositions),
        other => Err(input.corrupt(format!("invalid index options for postings: {other}"))),
    }
}

/// Decodes the postings of one term from an input positioned at its first
/// byte.
#[derive(Debug)]
pub(crate) struct PostingsCursor {
    input: Box<dyn StorageInput>,
    options: IndexOptions,
    flags: PostingsFlags,
    doc_freq: u32,
    docs_read: u32,
    doc: DocId,
    freq: u32,
    positions_left: u32,
    position: u32,
}

impl PostingsCursor {
    pub(crate) fn new(
        input: Box<dyn StorageInput>,
        options: IndexOptions,
        flags: PostingsFlags,
        doc_freq: u32,
    ) -> Self {
        PostingsCursor {
            input,
            options,
            flags,
            doc_freq,
            docs_read: 0,
            doc: -1,
            freq: 0,
            positions_left: 0,
            position: 0,
        }
    }

    /// Point the cursor at another term's postings.
    pub(crate) fn reset(
        &mut self,
        input: Box<dyn StorageInput>,
        options: IndexOptions,
        flags: PostingsFlags,
        doc_freq: u32,
    ) {
        *self = PostingsCursor::new(input, options, flags, doc_freq);
    }

    fn read_vint(&mut self) -> Result<u64> {
        varint::read_u64(&mut self.input).map_err(|err| match err {
            TesseraError::Io(_) => {
                TesseraError::corrupt(self.input.description(), "postings end prematurely")
            }
            other => other,
        })
    }

    pub(crate) fn doc(&self) -> DocId {
        self.doc
    }

    pub(crate) fn next_doc(&mut self) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        while self.positions_left > 0 {
            self.read_vint()?;
            self.positions_left -= 1;
        }
        if self.docs_read == self.doc_freq {
            self.doc = NO_MORE_DOCS;
            return Ok(NO_MORE_DOCS);
        }

        let delta = self.read_vint()?;
        let base = if self.docs_read == 0 { 0 } else { self.doc as u64 };
        if self.docs_read > 0 && delta == 0 {
            return Err(TesseraError::corrupt(
                self.input.description(),
                format!("documents out of order after {}", self.doc),
            ));
        }
        let doc = base + delta;
        if doc >= NO_MORE_DOCS as u64 {
            return Err(TesseraError::corrupt(
                self.input.description(),
                format!("document id {doc} out of range"),
            ));
        }
        self.doc = doc as DocId;
        self.docs_read += 1;

        self.freq = if self.options.has_freqs() {
            let freq = self.read_vint()?;
            u32::try_from(freq)
                .ok()
                .filter(|&f| f > 0)
                .ok_or_else(|| {
                    TesseraError::corrupt(self.input.description(), format!("invalid freq {freq}"))
                })?
        } else {
            1
        };
        self.positions_left = if self.options.has_positions() {
            self.freq
        } else {
            0
        };
        self.position = 0;
        Ok(self.doc)
    }

    pub(crate) fn advance(&mut self, target: DocId) -> Result<DocId> {
        while self.doc < target {
            self.next_doc()?;
        }
        Ok(self.doc)
    }

    pub(crate) fn freq(&self) -> u32 {
        self.freq
    }

    pub(crate) fn next_position(&mut self) -> Result<u32> {
        if !self.flags.contains(PostingsFlags::POSITIONS) || !self.options.has_positions() {
            return Err(TesseraError::invalid_operation(
                "positions were not requested or are not indexed",
            ));
        }
        if self.doc == -1 || self.doc == NO_MORE_DOCS || self.positions_left == 0 {
            return Err(TesseraError::invalid_operation(
                "no positions left for the current document",
            ));
        }
        let delta = self.read_vint()?;
        self.position = u32::try_from(self.position as u64 + delta).map_err(|_| {
            TesseraError::corrupt(self.input.description(), "position out of range")
        })?;
        self.positions_left -= 1;
        Ok(self.position)
    }

    pub(crate) fn cost(&self) -> u64 {
        self.doc_freq as u64
    }
}

struct BlockFieldsConsumer {
    terms_out: ChecksumOutput<Box<dyn StorageOutput>>,
    postings_out: ChecksumOutput<Box<dyn StorageOutput>>,
    last_field: Option<u32>,
    scratch: Vec<u8>,
}

impl BlockFieldsConsumer {
    fn new(state: &SegmentWriteState) -> Result<Self> {
        let mut terms_out = ChecksumOutput::new(state.create_output(TERMS_EXTENSION)?);
        terms_out.write_header(TERMS_CODEC, VERSION_CURRENT, &state.id, &state.suffix)?;
        let mut postings_out = ChecksumOutput::new(state.create_output(POSTINGS_EXTENSION)?);
        postings_out.write_header(POSTINGS_CODEC, VERSION_CURRENT, &state.id, &state.suffix)?;

        Ok(BlockFieldsConsumer {
            terms_out,
            postings_out,
            last_field: None,
            scratch: Vec::new(),
        })
    }
}

impl FieldsConsumer for BlockFieldsConsumer {
    fn write_field(&mut self, field: &FieldInfo, terms: &[BufferedTerm]) -> Result<()> {
        if self.last_field.is_some_and(|last| last >= field.number) {
            return Err(TesseraError::invalid_argument(format!(
                "fields must arrive in ascending number order, got {} after {:?}",
                field.number, self.last_field
            )));
        }
        if !field.index_options.is_indexed() {
            return Err(TesseraError::invalid_argument(format!(
                "field {} is not indexed",
                field.name
            )));
        }
        self.last_field = Some(field.number);

        let stats = FieldStats::compute(terms);
        let out = &mut self.terms_out;
        out.write_u8(1)?;
        out.write_vint(field.number)?;
        out.write_u8(index_options_to_u8(field.index_options))?;
        out.write_vlong(stats.term_count)?;
        out.write_vlong(stats.sum_doc_freq)?;
        out.write_vlong(stats.sum_total_term_freq)?;
        out.write_vint(stats.doc_count)?;

        for term in terms {
            self.scratch.clear();
            encode_postings(term, field.index_options, &mut self.scratch);
            let offset = self.postings_out.position();
            self.postings_out.write_raw(&self.scratch)?;

            let out = &mut self.terms_out;
            out.write_bytes(&term.term)?;
            out.write_vint(term.doc_freq())?;
            out.write_vlong(term.total_term_freq())?;
            out.write_vlong(offset)?;
            out.write_vlong(self.scratch.len() as u64)?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.terms_out.write_u8(0)?;
        self.terms_out.write_footer()?;
        self.postings_out.write_footer()?;
        let BlockFieldsConsumer {
            terms_out,
            postings_out,
            ..
        } = *self;
        terms_out.close()?;
        postings_out.close()
    }
}

#[derive(Debug)]
struct TermEntry {
    term: Vec<u8>,
    doc_freq: u32,
    total_term_freq: u64,
    offset: u64,
    length: u64,
}

/// State shared by a producer and every enum it creates.
#[derive(Debug)]
struct BlockShared {
    storage: Arc<dyn Storage>,
    terms_file: String,
    postings_file: String,
    postings: Mutex<Box<dyn StorageInput>>,
    allocated: AtomicUsize,
}

impl BlockShared {
    fn slice(&self, entry: &TermEntry) -> Result<Box<dyn StorageInput>> {
        let postings = self.postings.lock();
        let limit = postings.length() - FOOTER_LENGTH;
        if entry
            .offset
            .checked_add(entry.length)
            .is_none_or(|end| end > limit)
        {
            return Err(TesseraError::corrupt(
                &self.postings_file,
                format!(
                    "postings [{}, +{}) run into the footer",
                    entry.offset, entry.length
                ),
            ));
        }
        postings.slice("term postings", entry.offset, entry.length)
    }
}

#[derive(Debug)]
struct FieldData {
    index_options: IndexOptions,
    stats: FieldStats,
    terms: Vec<TermEntry>,
}

#[derive(Debug)]
struct BlockTerms {
    shared: Arc<BlockShared>,
    field: Arc<FieldData>,
}

/// Reads a segment's `.tim` and `.doc` files.
#[derive(Debug)]
pub struct BlockFieldsProducer {
    shared: Arc<BlockShared>,
    fields: BTreeMap<String, Arc<BlockTerms>>,
}

impl BlockFieldsProducer {
    pub fn open(state: &SegmentReadState) -> Result<Self> {
        let terms_file = state.file_name(TERMS_EXTENSION);

        let mut postings = ChecksumInput::new(state.open_input(POSTINGS_EXTENSION)?);
        postings.check_header(
            POSTINGS_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            Some(&state.id),
            &state.suffix,
        )?;
        let mut postings = postings.into_inner();
        // Footer structure only; the full checksum is verified by
        // check_integrity.
        retrieve_checksum(postings.as_mut())?;

        let shared = Arc::new(BlockShared {
            storage: Arc::clone(&state.storage),
            terms_file: terms_file.clone(),
            postings_file: state.file_name(POSTINGS_EXTENSION),
            postings: Mutex::new(postings),
            allocated: AtomicUsize::new(0),
        });

        let mut input = ChecksumInput::new(state.open_input(TERMS_EXTENSION)?);
        input.check_header(
            TERMS_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            Some(&state.id),
            &state.suffix,
        )?;

        let mut fields = BTreeMap::new();
        while input.read_u8()? == 1 {
            let number = input.read_vint()?;
            let name = match state.field_infos.field_by_number(number) {
                Some(field) => field.name.clone(),
                None => return Err(input.corrupt(format!("unknown field number {number}"))),
            };
            let options = input.read_u8()?;
            let index_options = index_options_from_u8(&input, options)?;
            let stats = FieldStats {
                term_count: input.read_vlong()?,
                sum_doc_freq: input.read_vlong()?,
                sum_total_term_freq: input.read_vlong()?,
                doc_count: input.read_vint()?,
            };

            let mut terms: Vec<TermEntry> =
                Vec::with_capacity(stats.term_count.min(1 << 16) as usize);
            for _ in 0..stats.term_count {
                let entry = TermEntry {
                    term: input.read_bytes()?,
                    doc_freq: input.read_vint()?,
                    total_term_freq: input.read_vlong()?,
                    offset: input.read_vlong()?,
                    length: input.read_vlong()?,
                };
                if terms.last().is_some_and(|prev| prev.term >= entry.term) {
                    return Err(input.corrupt("terms out of order"));
                }
                terms.push(entry);
            }

            let field = Arc::new(FieldData {
                index_options,
                stats,
                terms,
            });
            fields.insert(
                name,
                Arc::new(BlockTerms {
                    shared: Arc::clone(&shared),
                    field,
                }),
            );
        }
        input.check_footer()?;

        debug!("opened {terms_file}: {} fields", fields.len());
        Ok(BlockFieldsProducer { shared, fields })
    }
}

impl FieldsProducer for BlockFieldsProducer {
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
        verify_file(self.shared.storage.as_ref(), &self.shared.terms_file)?;
        verify_file(self.shared.storage.as_ref(), &self.shared.postings_file)?;
        Ok(())
    }

    fn allocated_cursors(&self) -> usize {
        self.shared.allocated.load(Ordering::Relaxed)
    }
}

impl Terms for BlockTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(BlockTermsEnum {
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
struct BlockTermsEnum {
    shared: Arc<BlockShared>,
    field: Arc<FieldData>,
    cursor: TermCursor,
}

impl BlockTermsEnum {
    fn entry(&self) -> Result<&TermEntry> {
        self.cursor
            .current()
            .map(|i| &self.field.terms[i])
            .ok_or_else(unpositioned)
    }

    fn search(&self, term: &[u8]) -> std::result::Result<usize, usize> {
        self.field
            .terms
            .binary_search_by(|entry| entry.term.as_slice().cmp(term))
    }
}

impl TermsEnum for BlockTermsEnum {
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
        Ok(self.entry()?.doc_freq)
    }

    fn total_term_freq(&self) -> Result<u64> {
        Ok(self.entry()?.total_term_freq)
    }

    fn index_options(&self) -> IndexOptions {
        self.field.index_options
    }

    fn postings(
        &mut self,
        reuse: Option<Box<dyn PostingsEnum>>,
        flags: PostingsFlags,
    ) -> Result<Box<dyn PostingsEnum>> {
        let entry = self.entry()?;
        let input = self.shared.slice(entry)?;
        let options = self.field.index_options;
        let doc_freq = entry.doc_freq;

        let recycled = reuse
            .filter(|r| {
                r.as_any()
                    .downcast_ref::<BlockPostingsEnum>()
                    .is_some_and(|r| Arc::ptr_eq(&r.shared, &self.shared))
            })
            .and_then(|r| r.into_any().downcast::<BlockPostingsEnum>().ok());

        match recycled {
            Some(mut postings) => {
                postings.cursor.reset(input, options, flags, doc_freq);
                Ok(postings)
            }
            None => {
                self.shared.allocated.fetch_add(1, Ordering::Relaxed);
                Ok(Box::new(BlockPostingsEnum {
                    shared: Arc::clone(&self.shared),
                    cursor: PostingsCursor::new(input, options, flags, doc_freq),
                }))
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct BlockPostingsEnum {
    shared: Arc<BlockShared>,
    cursor: PostingsCursor,
}

impl DocIdSetIterator for BlockPostingsEnum {
    fn doc_id(&self) -> DocId {
        self.cursor.doc()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.cursor.next_doc()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.cursor.advance(target)
    }

    fn cost(&self) -> u64 {
        self.cursor.cost()
    }
}

impl PostingsEnum for BlockPostingsEnum {
    fn freq(&self) -> u32 {
        self.cursor.freq()
    }

    fn next_position(&mut self) -> Result<u32> {
        self.cursor.next_position()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_util::{read_state, sample_terms, text_field, write_state};
    use crate::search::collect_docs;
    use crate::storage::memory::MemoryStorage;

    fn write_sample(storage: &Arc<MemoryStorage>) -> SegmentReadState {
        let state = write_state(storage.clone(), 10);
        let field = text_field("body", 0);
        let mut consumer = Block10PostingsFormat.fields_consumer(&state).unwrap();
        consumer.write_field(&field, &sample_terms()).unwrap();
        consumer.finish().unwrap();
        read_state(storage.clone(), &state, vec![field])
    }

    #[test]
    fn test_terms_and_stats() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_sample(&storage);
        let producer = Block10PostingsFormat.fields_producer(&state).unwrap();
        assert_eq!(producer.fields(), vec!["body".to_string()]);
        assert!(producer.terms("title").unwrap().is_none());

        let terms = producer.terms("body").unwrap().unwrap();
        assert_eq!(terms.size(), 3);
        assert_eq!(terms.sum_doc_freq(), 6);
        assert!(terms.has_positions());

        let mut terms_enum = terms.iterator().unwrap();
        let mut seen = Vec::new();
        while let Some(term) = terms_enum.next().unwrap() {
            seen.push(term.to_vec());
        }
        assert_eq!(seen, vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]);
        assert!(terms_enum.term().is_none());
        assert!(terms_enum.doc_freq().is_err());
    }

    #[test]
    fn test_postings_and_positions() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_sample(&storage);
        let producer = Block10PostingsFormat.fields_producer(&state).unwrap();
        let terms = producer.terms("body").unwrap().unwrap();
        let mut terms_enum = terms.iterator().unwrap();

        assert!(terms_enum.seek_exact(b"banana").unwrap());
        assert_eq!(terms_enum.doc_freq().unwrap(), 3);
        let mut postings = terms_enum.postings(None, PostingsFlags::POSITIONS).unwrap();
        assert_eq!(postings.doc_id(), -1);
        assert_eq!(postings.next_doc().unwrap(), 1);
        assert_eq!(postings.freq(), 2);
        assert_eq!(postings.next_position().unwrap(), 0);
        assert_eq!(postings.next_position().unwrap(), 4);
        assert!(postings.next_position().is_err());
        assert_eq!(postings.advance(5).unwrap(), 7);
        assert_eq!(postings.next_position().unwrap(), 3);
        assert_eq!(postings.next_doc().unwrap(), NO_MORE_DOCS);

        let mut docs_only = terms_enum.postings(None, PostingsFlags::NONE).unwrap();
        assert_eq!(collect_docs(&mut docs_only).unwrap(), vec![1, 4, 7]);
        docs_only = terms_enum.postings(Some(docs_only), PostingsFlags::NONE).unwrap();
        docs_only.next_doc().unwrap();
        assert!(docs_only.next_position().is_err());
    }

    #[test]
    fn test_seek_ceil() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_sample(&storage);
        let producer = Block10PostingsFormat.fields_producer(&state).unwrap();
        let mut terms_enum = producer.terms("body").unwrap().unwrap().iterator().unwrap();

        assert_eq!(terms_enum.seek_ceil(b"b").unwrap(), SeekStatus::NotFound);
        assert_eq!(terms_enum.term(), Some(&b"banana"[..]));
        assert_eq!(terms_enum.next().unwrap(), Some(&b"cherry"[..]));
        assert_eq!(terms_enum.seek_ceil(b"cherry").unwrap(), SeekStatus::Found);
        assert_eq!(terms_enum.seek_ceil(b"zzz").unwrap(), SeekStatus::End);
        assert!(terms_enum.term().is_none());
        assert!(!terms_enum.seek_exact(b"blueberry").unwrap());
        assert_eq!(terms_enum.next().unwrap(), Some(&b"cherry"[..]));
    }

    #[test]
    fn test_reuse_counts_allocations() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_sample(&storage);
        let producer = Block10PostingsFormat.fields_producer(&state).unwrap();
        let mut terms_enum = producer.terms("body").unwrap().unwrap().iterator().unwrap();

        let mut reuse = None;
        while terms_enum.next().unwrap().is_some() {
            let mut postings = terms_enum.postings(reuse.take(), PostingsFlags::FREQS).unwrap();
            assert!(postings.next_doc().unwrap() != NO_MORE_DOCS);
            reuse = Some(postings);
        }
        assert_eq!(producer.allocated_cursors(), 1);

        // A cursor of another producer is not recycled.
        let other = Block10PostingsFormat.fields_producer(&state).unwrap();
        let mut other_enum = other.terms("body").unwrap().unwrap().iterator().unwrap();
        other_enum.next().unwrap();
        let foreign = other_enum.postings(None, PostingsFlags::NONE).unwrap();
        terms_enum.seek_exact(b"apple").unwrap();
        let mut postings = terms_enum.postings(Some(foreign), PostingsFlags::NONE).unwrap();
        assert_eq!(collect_docs(&mut postings).unwrap(), vec![0, 4]);
        assert_eq!(producer.allocated_cursors(), 2);
    }

    #[test]
    fn test_check_integrity_detects_corruption() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_sample(&storage);
        let producer = Block10PostingsFormat.fields_producer(&state).unwrap();
        producer.check_integrity().unwrap();

        let name = state.file_name(POSTINGS_EXTENSION);
        let mut bytes = storage.read_contents(&name).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x10;
        storage.replace_contents(&name, bytes).unwrap();
        assert!(producer.check_integrity().unwrap_err().is_corruption());
    }

    #[test]
    fn test_fields_out_of_order_rejected() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_state(storage, 10);
        let mut consumer = Block10PostingsFormat.fields_consumer(&state).unwrap();
        consumer
            .write_field(&text_field("b", 1), &sample_terms())
            .unwrap();
        assert!(
            consumer
                .write_field(&text_field("a", 0), &sample_terms())
                .is_err()
        );
    }
}
