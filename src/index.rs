//! Segment flush and open.
//!
//! A [`writer::SegmentWriter`] buffers documents in memory and flushes them
//! as one immutable segment through the configured codec, then publishes a
//! new commit point. A [`reader::SegmentReader`] opens a committed segment
//! with the codec recorded in its metadata.

pub mod check;
pub mod commit;
pub mod document;
pub mod reader;
pub mod writer;

pub use check::{CheckReport, SegmentStatus, check_index};
pub use commit::{CommitPoint, SegmentCommitInfo};
pub use document::{Document, DocumentBuilder, FieldValue};
pub use reader::{IndexReader, SegmentReader};
pub use writer::{SegmentWriter, SegmentWriterConfig};
