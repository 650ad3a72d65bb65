//! `Inline10` postings: rare terms carry their postings inside the term
//! dictionary, every other term is delegated to a wrapped format.
//!
//! A term is inlined when its document frequency is at most the cutoff of
//! the [`SegmentWriteState`]. The `.inl` file holds the full dictionary of
//! each field, so term statistics never need the wrapped format:
//!
//! ```text
//! .inl  header cutoff delegate format name
//!       { 1, field number, index options, term count, sum doc freq,
//!         sum total term freq, doc count,
//!         { term, doc freq, total term freq, 1 postings | 0 }* }*
//!       0
//!       footer
//! ```
//!
//! The delegate is recorded by name. A format built with
//! [`Inline10PostingsFormat::with_formats`] resolves that name through the
//! [`FormatRegistry`] when a segment is opened, so segments written with
//! another delegate stay readable.
//!
//! An inlined cursor keeps hold of the last delegated cursor it was handed
//! as a reuse hint and gives it back to the wrapped format on the next
//! delegated term, so alternating between rare and frequent terms does not
//! allocate a new delegate each time.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::codec::PostingsFormat;
use crate::codec::block::{
    PostingsCursor, encode_postings, index_options_from_u8, index_options_to_u8,
};
use crate::codec::postings::{
    BufferedTerm, FieldStats, FieldsConsumer, FieldsProducer, PostingsEnum, PostingsFlags,
    SeekStatus, TermCursor, Terms, TermsEnum, unpositioned,
};
use crate::codec::registry::FormatRegistry;
use crate::codec::segment::{FieldInfo, IndexOptions, SegmentReadState, SegmentWriteState};
use crate::error::{Result, TesseraError};
use crate::search::{DocId, DocIdSetIterator};
use crate::storage::checksum::{ChecksumInput, ChecksumOutput, verify_file};
use crate::storage::shared::{ByteSource, SharedInput};
use crate::storage::{Storage, StorageOutput};

pub const INLINE_EXTENSION: &str = "inl";

const INLINE_CODEC: &str = "Inline10Terms";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = VERSION_START;

/// Wraps another postings format and inlines the postings of rare terms.
#[derive(Debug)]
pub struct Inline10PostingsFormat {
    inner: Arc<dyn PostingsFormat>,
    formats: Option<Arc<FormatRegistry>>,
}

impl Inline10PostingsFormat {
    pub const NAME: &'static str = "Inline10";

    /// Write through `inner`. Only segments delegating to a format of the
    /// same name can be read.
    pub fn new(inner: Arc<dyn PostingsFormat>) -> Self {
        Inline10PostingsFormat {
            inner,
            formats: None,
        }
    }

    /// Write through `inner`, and resolve the delegate recorded in a segment
    /// through `formats` when reading.
    pub fn with_formats(inner: Arc<dyn PostingsFormat>, formats: Arc<FormatRegistry>) -> Self {
        Inline10PostingsFormat {
            inner,
            formats: Some(formats),
        }
    }

    pub fn inner(&self) -> &Arc<dyn PostingsFormat> {
        &self.inner
    }

    /// The format that wrote the delegated terms of a segment.
    fn delegate(&self, name: &str) -> Result<Arc<dyn PostingsFormat>> {
        if name == Self::NAME {
            return Err(TesseraError::unknown_format(format!(
                "{} cannot delegate to itself",
                Self::NAME
            )));
        }
        match &self.formats {
            Some(formats) => formats.postings_format(name),
            None if name == self.inner.name() => Ok(Arc::clone(&self.inner)),
            None => Err(TesseraError::unknown_format(format!("postings format {name}"))),
        }
    }
}

impl PostingsFormat for Inline10PostingsFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        let mut out = ChecksumOutput::new(state.create_output(INLINE_EXTENSION)?);
        out.write_header(INLINE_CODEC, VERSION_CURRENT, &state.id, &state.suffix)?;
        out.write_vint(state.inline_cutoff)?;
        out.write_string(self.inner.name())?;

        Ok(Box::new(InlineFieldsConsumer {
            out,
            inner: self.inner.fields_consumer(state)?,
            cutoff: state.inline_cutoff,
            scratch: Vec::new(),
        }))
    }

    fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>> {
        let producer = InlineFieldsProducer::open(state, |name| {
            let delegate = self.delegate(name)?;
            debug!("{}: delegated terms read with {name}", state.segment);
            delegate.fields_producer(state)
        })?;
        Ok(Box::new(producer))
    }
}

struct InlineFieldsConsumer {
    out: ChecksumOutput<Box<dyn StorageOutput>>,
    inner: Box<dyn FieldsConsumer>,
    cutoff: u32,
    scratch: Vec<u8>,
}

impl FieldsConsumer for InlineFieldsConsumer {
    fn write_field(&mut self, field: &FieldInfo, terms: &[BufferedTerm]) -> Result<()> {
        let stats = FieldStats::compute(terms);
        self.out.write_u8(1)?;
        self.out.write_vint(field.number)?;
        self.out.write_u8(index_options_to_u8(field.index_options))?;
        self.out.write_vlong(stats.term_count)?;
        self.out.write_vlong(stats.sum_doc_freq)?;
        self.out.write_vlong(stats.sum_total_term_freq)?;
        self.out.write_vint(stats.doc_count)?;

        let mut delegated = Vec::new();
        for term in terms {
            self.out.write_bytes(&term.term)?;
            self.out.write_vint(term.doc_freq())?;
            self.out.write_vlong(term.total_term_freq())?;
            if term.doc_freq() <= self.cutoff {
                self.scratch.clear();
                encode_postings(term, field.index_options, &mut self.scratch);
                self.out.write_u8(1)?;
                self.out.write_bytes(&self.scratch)?;
            } else {
                self.out.write_u8(0)?;
                delegated.push(term.clone());
            }
        }

        debug!(
            "field {}: {} of {} terms delegated",
            field.name,
            delegated.len(),
            terms.len()
        );
        if !delegated.is_empty() {
            self.inner.write_field(field, &delegated)?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.out.write_u8(0)?;
        self.out.write_footer()?;
        let InlineFieldsConsumer { out, inner, .. } = *self;
        out.close()?;
        inner.finish()
    }
}

#[derive(Debug)]
struct InlineEntry {
    term: Vec<u8>,
    doc_freq: u32,
    total_term_freq: u64,
    /// Encoded postings of an inlined term.
    postings: Option<ByteSource>,
}

#[derive(Debug)]
struct InlineFieldData {
    index_options: IndexOptions,
    stats: FieldStats,
    terms: Vec<InlineEntry>,
}

#[derive(Debug)]
struct InlineShared {
    storage: Arc<dyn Storage>,
    file: String,
    allocated: AtomicUsize,
}

#[derive(Debug)]
struct InlineTerms {
    shared: Arc<InlineShared>,
    data: Arc<InlineFieldData>,
    inner: Option<Arc<dyn Terms>>,
}

/// Reads the `.inl` file and wraps the delegate's producer.
#[derive(Debug)]
pub struct InlineFieldsProducer {
    shared: Arc<InlineShared>,
    inner: Box<dyn FieldsProducer>,
    fields: BTreeMap<String, Arc<InlineTerms>>,
}

impl InlineFieldsProducer {
    /// Open the `.inl` file of a segment. `open_delegate` opens the producer
    /// of the delegate format named in the file.
    pub fn open<F>(state: &SegmentReadState, open_delegate: F) -> Result<Self>
    where
        F: FnOnce(&str) -> Result<Box<dyn FieldsProducer>>,
    {
        let shared = Arc::new(InlineShared {
            storage: Arc::clone(&state.storage),
            file: state.file_name(INLINE_EXTENSION),
            allocated: AtomicUsize::new(0),
        });

        let mut input = ChecksumInput::new(state.open_input(INLINE_EXTENSION)?);
        input.check_header(
            INLINE_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            Some(&state.id),
            &state.suffix,
        )?;
        let cutoff = input.read_vint()?;
        let delegate = input.read_string()?;
        let inner = open_delegate(&delegate)?;

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

            let mut terms: Vec<InlineEntry> =
                Vec::with_capacity(stats.term_count.min(1 << 16) as usize);
            let mut has_delegated = false;
            for _ in 0..stats.term_count {
                let term = input.read_bytes()?;
                let doc_freq = input.read_vint()?;
                let total_term_freq = input.read_vlong()?;
                let postings = match input.read_u8()? {
                    1 if doc_freq <= cutoff => {
                        Some(ByteSource::Heap(Arc::from(input.read_bytes()?)))
                    }
                    0 if doc_freq > cutoff => {
                        has_delegated = true;
                        None
                    }
                    marker => {
                        return Err(input.corrupt(format!(
                            "term with doc freq {doc_freq} has inline marker {marker} for cutoff {cutoff}"
                        )));
                    }
                };
                if terms.last().is_some_and(|prev| prev.term >= term) {
                    return Err(input.corrupt("terms out of order"));
                }
                terms.push(InlineEntry {
                    term,
                    doc_freq,
                    total_term_freq,
                    postings,
                });
            }

            let inner_terms = inner.terms(&name)?;
            if has_delegated && inner_terms.is_none() {
                return Err(input.corrupt(format!(
                    "field {name} delegates terms but the wrapped format has none"
                )));
            }
            fields.insert(
                name,
                Arc::new(InlineTerms {
                    shared: Arc::clone(&shared),
                    data: Arc::new(InlineFieldData {
                        index_options,
                        stats,
                        terms,
                    }),
                    inner: inner_terms,
                }),
            );
        }
        input.check_footer()?;

        Ok(InlineFieldsProducer {
            shared,
            inner,
            fields,
        })
    }
}

impl FieldsProducer for InlineFieldsProducer {
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
        verify_file(self.shared.storage.as_ref(), &self.shared.file)?;
        self.inner.check_integrity()
    }

    fn allocated_cursors(&self) -> usize {
        self.shared.allocated.load(Ordering::Relaxed) + self.inner.allocated_cursors()
    }
}

impl Terms for InlineTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(InlineTermsEnum {
            shared: Arc::clone(&self.shared),
            data: Arc::clone(&self.data),
            inner_terms: self.inner.clone(),
            inner_enum: None,
            cursor: TermCursor::default(),
        }))
    }

    fn size(&self) -> u64 {
        self.data.stats.term_count
    }

    fn sum_doc_freq(&self) -> u64 {
        self.data.stats.sum_doc_freq
    }

    fn sum_total_term_freq(&self) -> u64 {
        self.data.stats.sum_total_term_freq
    }

    fn doc_count(&self) -> u32 {
        self.data.stats.doc_count
    }

    fn index_options(&self) -> IndexOptions {
        self.data.index_options
    }
}

#[derive(Debug)]
struct InlineTermsEnum {
    shared: Arc<InlineShared>,
    data: Arc<InlineFieldData>,
    inner_terms: Option<Arc<dyn Terms>>,
    inner_enum: Option<Box<dyn TermsEnum>>,
    cursor: TermCursor,
}

impl InlineTermsEnum {
    fn entry(&self) -> Result<&InlineEntry> {
        self.cursor
            .current()
            .map(|i| &self.data.terms[i])
            .ok_or_else(unpositioned)
    }

    fn search(&self, term: &[u8]) -> std::result::Result<usize, usize> {
        self.data
            .terms
            .binary_search_by(|entry| entry.term.as_slice().cmp(term))
    }

    fn inlined_postings(
        &self,
        bytes: &ByteSource,
        doc_freq: u32,
        reuse: Option<Box<dyn PostingsEnum>>,
        flags: PostingsFlags,
    ) -> Result<Box<dyn PostingsEnum>> {
        let input = Box::new(SharedInput::new(
            format!("{} [inlined postings]", self.shared.file),
            bytes.clone(),
        ));
        let options = self.data.index_options;

        let reuse = match reuse {
            Some(r) if r.as_any().is::<InlinedPostingsEnum>() => {
                match r.into_any().downcast::<InlinedPostingsEnum>() {
                    Ok(mut inlined) if Arc::ptr_eq(&inlined.shared, &self.shared) => {
                        inlined.cursor.reset(input, options, flags, doc_freq);
                        return Ok(inlined);
                    }
                    Ok(mut foreign) => foreign.stash.take(),
                    Err(_) => None,
                }
            }
            other => other,
        };

        self.shared.allocated.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(InlinedPostingsEnum {
            shared: Arc::clone(&self.shared),
            cursor: PostingsCursor::new(input, options, flags, doc_freq),
            stash: reuse,
        }))
    }

    fn delegated_postings(
        &mut self,
        term: &[u8],
        reuse: Option<Box<dyn PostingsEnum>>,
        flags: PostingsFlags,
    ) -> Result<Box<dyn PostingsEnum>> {
        let inner_reuse = match reuse {
            Some(r) if r.as_any().is::<InlinedPostingsEnum>() => r
                .into_any()
                .downcast::<InlinedPostingsEnum>()
                .ok()
                .and_then(|mut inlined| inlined.stash.take()),
            other => other,
        };

        let inner_enum = match self.inner_enum.take() {
            Some(inner_enum) => inner_enum,
            None => match &self.inner_terms {
                Some(inner_terms) => inner_terms.iterator()?,
                None => {
                    return Err(TesseraError::corrupt(
                        &self.shared.file,
                        "delegated term without a wrapped terms dictionary",
                    ));
                }
            },
        };
        let inner_enum = self.inner_enum.insert(inner_enum);
        if !inner_enum.seek_exact(term)? {
            return Err(TesseraError::corrupt(
                &self.shared.file,
                format!(
                    "delegated term {:?} missing from the wrapped format",
                    String::from_utf8_lossy(term)
                ),
            ));
        }
        inner_enum.postings(inner_reuse, flags)
    }
}

impl TermsEnum for InlineTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        Ok(self
            .cursor
            .advance(self.data.terms.len())
            .map(|i| self.data.terms[i].term.as_slice()))
    }

    fn seek_exact(&mut self, term: &[u8]) -> Result<bool> {
        let search = self.search(term);
        Ok(self.cursor.seek_exact(search))
    }

    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus> {
        let search = self.search(term);
        Ok(self.cursor.seek_ceil(search, self.data.terms.len()))
    }

    fn term(&self) -> Option<&[u8]> {
        self.cursor
            .current()
            .map(|i| self.data.terms[i].term.as_slice())
    }

    fn doc_freq(&self) -> Result<u32> {
        Ok(self.entry()?.doc_freq)
    }

    fn total_term_freq(&self) -> Result<u64> {
        Ok(self.entry()?.total_term_freq)
    }

    fn index_options(&self) -> IndexOptions {
        self.data.index_options
    }

    fn postings(
        &mut self,
        reuse: Option<Box<dyn PostingsEnum>>,
        flags: PostingsFlags,
    ) -> Result<Box<dyn PostingsEnum>> {
        let data = Arc::clone(&self.data);
        let index = self.cursor.current().ok_or_else(unpositioned)?;
        let entry = &data.terms[index];
        match &entry.postings {
            Some(bytes) => self.inlined_postings(bytes, entry.doc_freq, reuse, flags),
            None => self.delegated_postings(&entry.term, reuse, flags),
        }
    }
}

/// Cursor over the postings of an inlined term.
#[derive(Debug)]
struct InlinedPostingsEnum {
    shared: Arc<InlineShared>,
    cursor: PostingsCursor,
    /// The last delegated cursor handed in as a reuse hint.
    stash: Option<Box<dyn PostingsEnum>>,
}

impl DocIdSetIterator for InlinedPostingsEnum {
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

impl PostingsEnum for InlinedPostingsEnum {
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
    use crate::codec::block::Block10PostingsFormat;
    use crate::codec::postings::BufferedTerm;
    use crate::codec::simple_text::SimpleTextPostingsFormat;
    use crate::codec::test_util::{posting, read_state, sample_terms, text_field, write_state};
    use crate::search::{NO_MORE_DOCS, collect_docs};
    use crate::storage::memory::MemoryStorage;

    fn format() -> Inline10PostingsFormat {
        Inline10PostingsFormat::new(Arc::new(Block10PostingsFormat::new()))
    }

    fn write_terms(
        storage: &Arc<MemoryStorage>,
        terms: &[BufferedTerm],
        cutoff: u32,
    ) -> SegmentReadState {
        let mut state = write_state(storage.clone(), 10);
        state.inline_cutoff = cutoff;
        let field = text_field("body", 0);
        let mut consumer = format().fields_consumer(&state).unwrap();
        consumer.write_field(&field, terms).unwrap();
        consumer.finish().unwrap();
        assert!(state.files().contains("_0.inl"));
        assert!(state.files().contains("_0.tim"));
        read_state(storage.clone(), &state, vec![field])
    }

    /// Alternating rare (one document) and frequent (two document) terms.
    fn alternating_terms() -> Vec<BufferedTerm> {
        let term = |name: &str, docs: &[DocId]| BufferedTerm {
            term: name.as_bytes().to_vec(),
            postings: docs.iter().map(|&d| posting(d, &[0])).collect(),
        };
        vec![
            term("a", &[0]),
            term("b", &[1, 2]),
            term("c", &[3]),
            term("d", &[4, 5]),
            term("e", &[6]),
        ]
    }

    #[test]
    fn test_inlined_and_delegated_postings() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_terms(&storage, &sample_terms(), 1);
        let producer = format().fields_producer(&state).unwrap();
        let terms = producer.terms("body").unwrap().unwrap();
        assert_eq!(terms.size(), 3);
        assert_eq!(terms.sum_doc_freq(), 6);
        assert_eq!(terms.doc_count(), 5);

        let mut terms_enum = terms.iterator().unwrap();
        assert!(terms_enum.seek_exact(b"cherry").unwrap());
        let mut postings = terms_enum.postings(None, PostingsFlags::POSITIONS).unwrap();
        assert_eq!(postings.next_doc().unwrap(), 2);
        assert_eq!(postings.next_position().unwrap(), 5);
        assert_eq!(postings.next_doc().unwrap(), NO_MORE_DOCS);

        assert!(terms_enum.seek_exact(b"banana").unwrap());
        let mut postings = terms_enum.postings(Some(postings), PostingsFlags::FREQS).unwrap();
        assert_eq!(collect_docs(&mut postings).unwrap(), vec![1, 4, 7]);
    }

    #[test]
    fn test_alternating_reuse_allocations() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_terms(&storage, &alternating_terms(), 1);
        let producer = format().fields_producer(&state).unwrap();
        let mut terms_enum = producer.terms("body").unwrap().unwrap().iterator().unwrap();

        let mut reuse = None;
        let mut all_docs = Vec::new();
        while terms_enum.next().unwrap().is_some() {
            let mut postings = terms_enum.postings(reuse.take(), PostingsFlags::FREQS).unwrap();
            all_docs.extend(collect_docs(&mut postings).unwrap());
            reuse = Some(postings);
        }
        assert_eq!(all_docs, vec![0, 1, 2, 3, 4, 5, 6]);
        // Three inlined cursors and a single delegated one.
        assert_eq!(producer.allocated_cursors(), 4);
    }

    #[test]
    fn test_cutoff_zero_delegates_everything() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_terms(&storage, &alternating_terms(), 0);
        let producer = format().fields_producer(&state).unwrap();
        let mut terms_enum = producer.terms("body").unwrap().unwrap().iterator().unwrap();

        let mut reuse = None;
        while terms_enum.next().unwrap().is_some() {
            let postings = terms_enum.postings(reuse.take(), PostingsFlags::NONE).unwrap();
            reuse = Some(postings);
        }
        assert_eq!(producer.allocated_cursors(), 1);
    }

    #[test]
    fn test_high_cutoff_writes_no_delegated_field() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_terms(&storage, &sample_terms(), 100);
        let producer = format().fields_producer(&state).unwrap();
        let mut terms_enum = producer.terms("body").unwrap().unwrap().iterator().unwrap();
        assert!(terms_enum.seek_exact(b"banana").unwrap());
        let mut postings = terms_enum.postings(None, PostingsFlags::NONE).unwrap();
        assert_eq!(collect_docs(&mut postings).unwrap(), vec![1, 4, 7]);
        producer.check_integrity().unwrap();
    }

    /// Write `sample_terms` with a cutoff of 1 through Inline10 over SimpleText.
    fn write_over_simple_text(storage: &Arc<MemoryStorage>) -> SegmentReadState {
        let state = write_state(storage.clone(), 10);
        let field = text_field("body", 0);
        let writer = Inline10PostingsFormat::new(Arc::new(SimpleTextPostingsFormat::new()));
        let mut consumer = writer.fields_consumer(&state).unwrap();
        consumer.write_field(&field, &sample_terms()).unwrap();
        consumer.finish().unwrap();
        assert!(state.files().contains("_0.pst"));
        read_state(storage.clone(), &state, vec![field])
    }

    #[test]
    fn test_delegate_resolved_by_recorded_name() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_over_simple_text(&storage);

        let reader = Inline10PostingsFormat::with_formats(
            Arc::new(Block10PostingsFormat::new()),
            Arc::new(FormatRegistry::with_defaults()),
        );
        let producer = reader.fields_producer(&state).unwrap();
        let mut terms_enum = producer.terms("body").unwrap().unwrap().iterator().unwrap();
        assert!(terms_enum.seek_exact(b"banana").unwrap());
        let mut postings = terms_enum.postings(None, PostingsFlags::FREQS).unwrap();
        assert_eq!(collect_docs(&mut postings).unwrap(), vec![1, 4, 7]);
        producer.check_integrity().unwrap();
    }

    #[test]
    fn test_unresolvable_delegate_fails_open() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_over_simple_text(&storage);

        let err = format().fields_producer(&state).unwrap_err();
        assert!(matches!(err, TesseraError::UnknownFormat(ref name) if name.contains("SimpleText")));

        let reader = Inline10PostingsFormat::with_formats(
            Arc::new(Block10PostingsFormat::new()),
            Arc::new(FormatRegistry::new()),
        );
        let err = reader.fields_producer(&state).unwrap_err();
        assert!(matches!(err, TesseraError::UnknownFormat(_)));
    }

    #[test]
    fn test_corrupt_inline_file_detected() {
        let storage = Arc::new(MemoryStorage::new_default());
        let state = write_terms(&storage, &sample_terms(), 1);
        let mut bytes = storage.read_contents("_0.inl").unwrap();
        let index = bytes.len() - 20;
        bytes[index] ^= 0x01;
        storage.replace_contents("_0.inl", bytes).unwrap();
        let err = format().fields_producer(&state).unwrap_err();
        assert!(err.is_corruption());
    }
}
