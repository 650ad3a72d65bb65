//! Codecs: named bundles of the formats used to read and write a segment.
//!
//! A [`Codec`] holds exactly one [`PostingsFormat`], one [`DocValuesFormat`]
//! and one [`NormsFormat`]. Each format is a factory for a consumer, invoked
//! once per segment at flush, and a producer that opens the segment's files
//! and exposes per-field readers.
//!
//! The codec name is recorded in the segment metadata; opening the segment
//! later resolves that exact name through a [`registry::CodecRegistry`].
//!
//! # Built-in codecs
//!
//! | Codec        | Postings               | Doc values                  | Norms         | Writable |
//! |--------------|------------------------|-----------------------------|---------------|----------|
//! | `Tessera10`  | `Inline10(Block10)`    | per-field, default Packed10 | `Packed10`    | yes      |
//! | `Tessera09`  | `Block10`              | `Packed10`                  | `Packed10`    | no       |
//! | `SimpleText` | `SimpleText`           | `SimpleText`                | `SimpleText`  | yes      |

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::error::Result;

pub mod block;
pub mod doc_values;
pub mod inline;
pub mod packed_dv;
pub mod per_field;
pub mod postings;
pub mod registry;
pub mod segment;
pub mod simple_text;

use doc_values::{DocValuesConsumer, DocValuesProducer, NormsConsumer, NormsProducer};
use postings::{FieldsConsumer, FieldsProducer};
use segment::{SegmentReadState, SegmentWriteState};

/// Encodes and decodes the inverted index of a segment.
pub trait PostingsFormat: Send + Sync + Debug {
    /// Name recorded in segment metadata.
    fn name(&self) -> &str;

    /// Open a writer for a new segment.
    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>>;

    /// Open the postings of an existing segment.
    fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>>;
}

/// Encodes and decodes per-document column values.
pub trait DocValuesFormat: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn doc_values_consumer(&self, state: &SegmentWriteState)
    -> Result<Box<dyn DocValuesConsumer>>;

    fn doc_values_producer(&self, state: &SegmentReadState) -> Result<Box<dyn DocValuesProducer>>;
}

/// Encodes and decodes per-field length normalization values.
pub trait NormsFormat: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn norms_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn NormsConsumer>>;

    fn norms_producer(&self, state: &SegmentReadState) -> Result<Box<dyn NormsProducer>>;
}

/// A named, immutable bundle of formats.
#[derive(Clone)]
pub struct Codec {
    name: String,
    postings: Arc<dyn PostingsFormat>,
    doc_values: Arc<dyn DocValuesFormat>,
    norms: Arc<dyn NormsFormat>,
    read_only: bool,
}

impl Codec {
    /// Create a writable codec.
    pub fn new<S: Into<String>>(
        name: S,
        postings: Arc<dyn PostingsFormat>,
        doc_values: Arc<dyn DocValuesFormat>,
        norms: Arc<dyn NormsFormat>,
    ) -> Self {
        Codec {
            name: name.into(),
            postings,
            doc_values,
            norms,
            read_only: false,
        }
    }

    /// Mark the codec as loadable for reads only.
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// A writable copy of a read-only codec, for producing legacy segments
    /// in compatibility tests.
    pub fn impersonate(&self) -> Self {
        Codec {
            read_only: false,
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn postings_format(&self) -> &Arc<dyn PostingsFormat> {
        &self.postings
    }

    pub fn doc_values_format(&self) -> &Arc<dyn DocValuesFormat> {
        &self.doc_values
    }

    pub fn norms_format(&self) -> &Arc<dyn NormsFormat> {
        &self.norms
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("name", &self.name)
            .field("postings", &self.postings.name())
            .field("doc_values", &self.doc_values.name())
            .field("norms", &self.norms.name())
            .field("read_only", &self.read_only)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use crate::codec::postings::{BufferedPosting, BufferedTerm};
    use crate::codec::segment::{
        FieldInfo, FieldInfos, IndexOptions, SegmentInfo, SegmentReadState, SegmentWriteState,
    };
    use crate::search::DocId;
    use crate::storage::Storage;

    pub const TEST_ID: [u8; 16] = [7u8; 16];

    pub fn write_state(storage: Arc<dyn Storage>, max_doc: u32) -> SegmentWriteState {
        SegmentWriteState::new(storage, "_0", TEST_ID, max_doc)
    }

    pub fn read_state(
        storage: Arc<dyn Storage>,
        state: &SegmentWriteState,
        fields: Vec<FieldInfo>,
    ) -> SegmentReadState {
        let info = SegmentInfo::new(&state.segment, state.id, state.max_doc, "Test");
        let field_infos = Arc::new(FieldInfos::new(fields).unwrap());
        SegmentReadState::new(storage, &info, field_infos).with_suffix(&state.suffix)
    }

    pub fn text_field(name: &str, number: u32) -> FieldInfo {
        let mut field = FieldInfo::new(name, number);
        field.index_options = IndexOptions::DocsAndFreqsAndPositions;
        field.has_norms = true;
        field
    }

    pub fn posting(doc: DocId, positions: &[u32]) -> BufferedPosting {
        BufferedPosting {
            doc,
            freq: positions.len() as u32,
            positions: positions.to_vec(),
        }
    }

    /// `apple` in 0 and 4, `banana` in 1, 4 and 7, `cherry` in 2.
    pub fn sample_terms() -> Vec<BufferedTerm> {
        vec![
            BufferedTerm {
                term: b"apple".to_vec(),
                postings: vec![posting(0, &[1]), posting(4, &[2])],
            },
            BufferedTerm {
                term: b"banana".to_vec(),
                postings: vec![posting(1, &[0, 4]), posting(4, &[0]), posting(7, &[3])],
            },
            BufferedTerm {
                term: b"cherry".to_vec(),
                postings: vec![posting(2, &[5])],
            },
        ]
    }
}
