//! Doc values where each field may use a different format.
//!
//! At write time a field uses the format named by its
//! [`FORMAT_ATTRIBUTE`] if the writer set one, and the default format
//! otherwise. Fields sharing a format share one consumer, writing files under
//! a suffix of the form `{format}_{n}`. Both the format name and the suffix
//! are recorded as field attributes, and reading resolves them through the
//! [`FormatRegistry`].

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::codec::DocValuesFormat;
use crate::codec::doc_values::{
    BinaryDocValues, DocValuesConsumer, DocValuesProducer, NumericDocValues, SortedDocValues,
};
use crate::codec::registry::FormatRegistry;
use crate::codec::segment::{
    FIELD_INFOS_EXTENSION, FieldInfo, SegmentReadState, SegmentWriteState, segment_file_name,
};
use crate::error::{Result, TesseraError};

/// Field attribute naming the field's doc values format.
pub const FORMAT_ATTRIBUTE: &str = "PerFieldDocValuesFormat.format";

/// Field attribute holding the file suffix of the field's doc values.
pub const SUFFIX_ATTRIBUTE: &str = "PerFieldDocValuesFormat.suffix";

/// Dispatches doc values to a format chosen per field.
#[derive(Debug)]
pub struct PerFieldDocValuesFormat {
    default: Arc<dyn DocValuesFormat>,
    formats: Arc<FormatRegistry>,
}

impl PerFieldDocValuesFormat {
    pub const NAME: &'static str = "PerField10";

    pub fn new(default: Arc<dyn DocValuesFormat>, formats: Arc<FormatRegistry>) -> Self {
        PerFieldDocValuesFormat { default, formats }
    }

    pub fn default_format(&self) -> &Arc<dyn DocValuesFormat> {
        &self.default
    }
}

impl DocValuesFormat for PerFieldDocValuesFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn doc_values_consumer(
        &self,
        state: &SegmentWriteState,
    ) -> Result<Box<dyn DocValuesConsumer>> {
        Ok(Box::new(PerFieldConsumer {
            state: state.clone(),
            default: Arc::clone(&self.default),
            formats: Arc::clone(&self.formats),
            consumers: BTreeMap::new(),
        }))
    }

    fn doc_values_producer(&self, state: &SegmentReadState) -> Result<Box<dyn DocValuesProducer>> {
        Ok(Box::new(PerFieldProducer::open(state, &self.formats)?))
    }
}

/// Build the suffix for the `n`th consumer of a format.
fn suffix_for(outer: &str, format: &str, n: usize) -> String {
    if outer.is_empty() {
        format!("{format}_{n}")
    } else {
        format!("{outer}_{format}_{n}")
    }
}

struct PerFieldConsumer {
    state: SegmentWriteState,
    default: Arc<dyn DocValuesFormat>,
    formats: Arc<FormatRegistry>,
    /// Format name to suffix and consumer.
    consumers: BTreeMap<String, (String, Box<dyn DocValuesConsumer>)>,
}

impl PerFieldConsumer {
    fn consumer_for(&mut self, field: &mut FieldInfo) -> Result<&mut Box<dyn DocValuesConsumer>> {
        let format = match field.attribute(FORMAT_ATTRIBUTE) {
            Some(name) if name != self.default.name() => self.formats.doc_values_format(name)?,
            _ => Arc::clone(&self.default),
        };
        let name = format.name().to_string();

        if !self.consumers.contains_key(&name) {
            let suffix = suffix_for(&self.state.suffix, &name, 0);
            let consumer = format.doc_values_consumer(&self.state.with_suffix(&suffix))?;
            debug!("doc values format {name} writes under suffix {suffix}");
            self.consumers.insert(name.clone(), (suffix, consumer));
        }
        let Some((suffix, consumer)) = self.consumers.get_mut(&name) else {
            return Err(TesseraError::invalid_operation(format!(
                "no consumer for doc values format {name}"
            )));
        };

        field.put_attribute(FORMAT_ATTRIBUTE, name.clone());
        field.put_attribute(SUFFIX_ATTRIBUTE, suffix.clone());
        Ok(consumer)
    }
}

impl DocValuesConsumer for PerFieldConsumer {
    fn add_numeric_field(&mut self, field: &mut FieldInfo, values: &[Option<i64>]) -> Result<()> {
        self.consumer_for(field)?.add_numeric_field(field, values)
    }

    fn add_binary_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> Result<()> {
        self.consumer_for(field)?.add_binary_field(field, values)
    }

    fn add_sorted_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> Result<()> {
        self.consumer_for(field)?.add_sorted_field(field, values)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        for (_, (_, consumer)) in self.consumers {
            consumer.finish()?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PerFieldProducer {
    /// Suffix to producer.
    producers: BTreeMap<String, Box<dyn DocValuesProducer>>,
    /// Field number to suffix.
    fields: AHashMap<u32, String>,
}

impl PerFieldProducer {
    fn open(state: &SegmentReadState, formats: &FormatRegistry) -> Result<Self> {
        let field_infos_file = segment_file_name(&state.segment, "", FIELD_INFOS_EXTENSION);
        let mut producers: BTreeMap<String, Box<dyn DocValuesProducer>> = BTreeMap::new();
        let mut fields = AHashMap::new();

        for field in state.field_infos.iter().filter(|f| f.has_doc_values()) {
            let missing = |key: &str| {
                TesseraError::corrupt(
                    &field_infos_file,
                    format!("field {} has doc values but no {key} attribute", field.name),
                )
            };
            let format_name = field
                .attribute(FORMAT_ATTRIBUTE)
                .ok_or_else(|| missing(FORMAT_ATTRIBUTE))?;
            let suffix = field
                .attribute(SUFFIX_ATTRIBUTE)
                .ok_or_else(|| missing(SUFFIX_ATTRIBUTE))?;

            if !producers.contains_key(suffix) {
                let format = formats.doc_values_format(format_name)?;
                let producer = format.doc_values_producer(&state.with_suffix(suffix))?;
                producers.insert(suffix.to_string(), producer);
            }
            fields.insert(field.number, suffix.to_string());
        }

        Ok(PerFieldProducer { producers, fields })
    }

    fn producer(&self, field: &FieldInfo) -> Result<&dyn DocValuesProducer> {
        self.fields
            .get(&field.number)
            .and_then(|suffix| self.producers.get(suffix))
            .map(|p| &**p)
            .ok_or_else(|| {
                TesseraError::invalid_argument(format!("field {} has no doc values", field.name))
            })
    }
}

impl DocValuesProducer for PerFieldProducer {
    fn numeric(&self, field: &FieldInfo) -> Result<Arc<dyn NumericDocValues>> {
        self.producer(field)?.numeric(field)
    }

    fn binary(&self, field: &FieldInfo) -> Result<Arc<dyn BinaryDocValues>> {
        self.producer(field)?.binary(field)
    }

    fn sorted(&self, field: &FieldInfo) -> Result<Arc<dyn SortedDocValues>> {
        self.producer(field)?.sorted(field)
    }

    fn check_integrity(&self) -> Result<()> {
        for producer in self.producers.values() {
            producer.check_integrity()?;
        }
        Ok(())
    }
}
