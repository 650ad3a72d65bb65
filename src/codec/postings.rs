//! Term dictionary enumeration and postings cursors.
//!
//! A [`Terms`] instance describes one field of one segment. Its
//! [`TermsEnum`] walks the field's distinct terms in byte order and, for the
//! term it is positioned on, hands out a [`PostingsEnum`] over the matching
//! documents.
//!
//! # Reuse
//!
//! [`TermsEnum::postings`] accepts a previously returned cursor as a reuse
//! hint. The hint is moved into the call: the caller gives up the old cursor
//! whether or not the implementation recycles its buffers, and must not
//! assume the returned cursor is the same object. Results are identical
//! either way.

use std::any::Any;
use std::fmt::Debug;
use std::ops::BitOr;
use std::sync::Arc;

use crate::codec::segment::{FieldInfo, IndexOptions};
use crate::error::{Result, TesseraError};
use crate::search::{DocId, DocIdSetIterator};

/// What a postings cursor must decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PostingsFlags(u8);

impl PostingsFlags {
    /// Document ids only.
    pub const NONE: PostingsFlags = PostingsFlags(0);
    /// Term frequencies.
    pub const FREQS: PostingsFlags = PostingsFlags(1);
    /// Positions; implies frequencies.
    pub const POSITIONS: PostingsFlags = PostingsFlags(1 | 2);

    pub fn contains(self, other: PostingsFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PostingsFlags {
    type Output = PostingsFlags;

    fn bitor(self, rhs: PostingsFlags) -> PostingsFlags {
        PostingsFlags(self.0 | rhs.0)
    }
}

/// Result of [`TermsEnum::seek_ceil`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// Positioned on the requested term.
    Found,
    /// Positioned on the smallest term greater than the requested one.
    NotFound,
    /// No term is greater than or equal to the requested one.
    End,
}

/// A cursor over the documents of one term.
pub trait PostingsEnum: DocIdSetIterator {
    /// Occurrences of the term in the current document.
    ///
    /// Returns 1 when frequencies are not indexed.
    fn freq(&self) -> u32;

    /// Next position of the term in the current document.
    ///
    /// May be called at most `freq()` times per document, and only on
    /// cursors obtained with [`PostingsFlags::POSITIONS`] on a field that
    /// indexes positions.
    fn next_position(&mut self) -> Result<u32>;

    /// For reuse checks.
    fn as_any(&self) -> &dyn Any;

    /// For reuse by downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Ordered walk over a field's distinct terms.
pub trait TermsEnum: Send + Debug {
    /// Advance to the next term in byte order.
    fn next(&mut self) -> Result<Option<&[u8]>>;

    /// Position on `term` if it exists. On a miss the enum is unpositioned.
    fn seek_exact(&mut self, term: &[u8]) -> Result<bool>;

    /// Position on the smallest term `>= term`.
    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus>;

    /// The current term, if positioned.
    fn term(&self) -> Option<&[u8]>;

    /// Number of documents containing the current term.
    fn doc_freq(&self) -> Result<u32>;

    /// Total occurrences of the current term.
    fn total_term_freq(&self) -> Result<u64>;

    /// What the field indexes.
    fn index_options(&self) -> IndexOptions;

    /// A cursor over the current term's documents.
    ///
    /// `reuse` is consumed; the returned cursor may or may not recycle it.
    fn postings(
        &mut self,
        reuse: Option<Box<dyn PostingsEnum>>,
        flags: PostingsFlags,
    ) -> Result<Box<dyn PostingsEnum>>;

    /// A cursor with positions, or `None` if the field does not index them.
    fn postings_with_positions(
        &mut self,
        reuse: Option<Box<dyn PostingsEnum>>,
    ) -> Result<Option<Box<dyn PostingsEnum>>> {
        if !self.index_options().has_positions() {
            return Ok(None);
        }
        self.postings(reuse, PostingsFlags::POSITIONS).map(Some)
    }
}

/// The terms of one field of one segment.
pub trait Terms: Send + Sync + Debug {
    /// A fresh, unpositioned enum.
    fn iterator(&self) -> Result<Box<dyn TermsEnum>>;

    /// Number of distinct terms.
    fn size(&self) -> u64;

    /// Sum of `doc_freq` over all terms.
    fn sum_doc_freq(&self) -> u64;

    /// Sum of `total_term_freq` over all terms.
    fn sum_total_term_freq(&self) -> u64;

    /// Number of documents with at least one term.
    fn doc_count(&self) -> u32;

    fn index_options(&self) -> IndexOptions;

    fn has_freqs(&self) -> bool {
        self.index_options().has_freqs()
    }

    fn has_positions(&self) -> bool {
        self.index_options().has_positions()
    }
}

/// Reader side of a postings format.
pub trait FieldsProducer: Send + Sync + Debug {
    /// Terms of a field, or `None` if the field has no postings.
    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>>;

    /// Names of the fields with postings.
    fn fields(&self) -> Vec<String>;

    /// Verify the checksums of every file this producer reads.
    fn check_integrity(&self) -> Result<()>;

    /// Physical postings cursors allocated so far.
    fn allocated_cursors(&self) -> usize;
}

/// Writer side of a postings format. Fields arrive in field-number order.
pub trait FieldsConsumer: Send {
    /// Write the terms of one field, sorted by bytes.
    fn write_field(&mut self, field: &FieldInfo, terms: &[BufferedTerm]) -> Result<()>;

    /// Write footers and close the files.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// One document of a buffered term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedPosting {
    pub doc: DocId,
    pub freq: u32,
    /// Ascending positions; empty when positions are not indexed.
    pub positions: Vec<u32>,
}

/// A term and its postings, buffered in memory until flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedTerm {
    pub term: Vec<u8>,
    /// Ascending by document.
    pub postings: Vec<BufferedPosting>,
}

impl BufferedTerm {
    pub fn doc_freq(&self) -> u32 {
        self.postings.len() as u32
    }

    pub fn total_term_freq(&self) -> u64 {
        self.postings.iter().map(|p| p.freq as u64).sum()
    }
}

/// Per-field statistics stored by the term dictionaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldStats {
    pub term_count: u64,
    pub sum_doc_freq: u64,
    pub sum_total_term_freq: u64,
    pub doc_count: u32,
}

impl FieldStats {
    /// Compute statistics for a field's terms.
    pub fn compute(terms: &[BufferedTerm]) -> Self {
        let mut docs: Vec<DocId> = terms
            .iter()
            .flat_map(|t| t.postings.iter().map(|p| p.doc))
            .collect();
        docs.sort_unstable();
        docs.dedup();

        FieldStats {
            term_count: terms.len() as u64,
            sum_doc_freq: terms.iter().map(|t| t.doc_freq() as u64).sum(),
            sum_total_term_freq: terms.iter().map(BufferedTerm::total_term_freq).sum(),
            doc_count: docs.len() as u32,
        }
    }
}

/// Positioning state of an enum over a sorted, in-memory term list.
///
/// The owner performs the binary search and reports the outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermCursor {
    current: Option<usize>,
    next: usize,
}

impl TermCursor {
    /// Index of the term the enum is positioned on.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Step to the next of `len` terms.
    pub fn advance(&mut self, len: usize) -> Option<usize> {
        if self.next < len {
            self.current = Some(self.next);
            self.next += 1;
        } else {
            self.current = None;
            self.next = len;
        }
        self.current
    }

    /// Apply the result of a binary search for an exact seek.
    pub fn seek_exact(&mut self, search: std::result::Result<usize, usize>) -> bool {
        match search {
            Ok(i) => {
                self.current = Some(i);
                self.next = i + 1;
                true
            }
            Err(i) => {
                self.current = None;
                self.next = i;
                false
            }
        }
    }

    /// Apply the result of a binary search for a ceiling seek over `len`
    /// terms.
    pub fn seek_ceil(&mut self, search: std::result::Result<usize, usize>, len: usize) -> SeekStatus {
        match search {
            Ok(i) => {
                self.current = Some(i);
                self.next = i + 1;
                SeekStatus::Found
            }
            Err(i) if i < len => {
                self.current = Some(i);
                self.next = i + 1;
                SeekStatus::NotFound
            }
            Err(_) => {
                self.current = None;
                self.next = len;
                SeekStatus::End
            }
        }
    }
}

/// Error for term-level calls on an unpositioned enum.
pub fn unpositioned() -> TesseraError {
    TesseraError::invalid_operation("terms enum is not positioned on a term")
}

/// Fetch a term's postings with a one-off enum.
pub fn term_postings(
    terms: &dyn Terms,
    term: &[u8],
    flags: PostingsFlags,
) -> Result<Option<Box<dyn PostingsEnum>>> {
    let mut terms_enum = terms.iterator()?;
    if !terms_enum.seek_exact(term)? {
        return Ok(None);
    }
    terms_enum.postings(None, flags).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        assert!(PostingsFlags::POSITIONS.contains(PostingsFlags::FREQS));
        assert!(!PostingsFlags::FREQS.contains(PostingsFlags::POSITIONS));
        assert!(PostingsFlags::NONE.contains(PostingsFlags::NONE));
        assert_eq!(PostingsFlags::NONE | PostingsFlags::FREQS, PostingsFlags::FREQS);
    }

    #[test]
    fn test_field_stats() {
        let posting = |doc, freq| BufferedPosting {
            doc,
            freq,
            positions: Vec::new(),
        };
        let terms = vec![
            BufferedTerm {
                term: b"a".to_vec(),
                postings: vec![posting(0, 2), posting(3, 1)],
            },
            BufferedTerm {
                term: b"b".to_vec(),
                postings: vec![posting(3, 4)],
            },
        ];
        let stats = FieldStats::compute(&terms);
        assert_eq!(stats.term_count, 2);
        assert_eq!(stats.sum_doc_freq, 3);
        assert_eq!(stats.sum_total_term_freq, 7);
        assert_eq!(stats.doc_count, 2);
    }
}
