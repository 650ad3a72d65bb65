//! # Tessera
//!
//! The storage and matching substrate of a segment-based full-text index.
//!
//! ## Features
//!
//! - Flat file storage with exclusive write locks, on disk or in memory
//! - CRC-32 checksummed files with versioned headers and footers
//! - Pluggable codecs for postings, doc values and norms, resolved by name
//! - Reusable term and postings enumeration
//! - Two-phase query evaluation: cheap approximation first, exact
//!   verification only for surviving candidates
//! - Segment flush and open, with atomic commit points

pub mod cli;
pub mod codec;
pub mod error;
pub mod index;
pub mod search;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::codec::registry::CodecRegistry;
    pub use crate::error::{Result, TesseraError};
    pub use crate::index::{Document, IndexReader, SegmentReader, SegmentWriter, SegmentWriterConfig};
    pub use crate::search::evaluator::{
        ConjunctionEvaluator, DisjunctionEvaluator, Evaluator, NumericRangeEvaluator,
        PhraseEvaluator, SortedRangeEvaluator, TermEvaluator,
    };
    pub use crate::search::{DocId, MatchIterator, NO_MORE_DOCS};
    pub use crate::storage::Storage;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
