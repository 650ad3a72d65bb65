//! Documents as handed to the segment writer.
//!
//! Text arrives pre-tokenized: each token's position is its index in the
//! token list. Analysis is the caller's business.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::segment::{DocValuesType, IndexOptions};

/// The value of one field of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Tokens indexed with frequencies and positions, with norms.
    Text(Vec<String>),
    /// A single untokenized term, indexed as document ids only.
    Keyword(String),
    /// A numeric doc value.
    Numeric(i64),
    /// A binary doc value.
    Binary(Vec<u8>),
    /// A sorted doc value, deduplicated into ordinals per segment.
    Sorted(Vec<u8>),
}

impl FieldValue {
    /// What the inverted index records for a field of this kind.
    pub fn index_options(&self) -> IndexOptions {
        match self {
            FieldValue::Text(_) => IndexOptions::DocsAndFreqsAndPositions,
            FieldValue::Keyword(_) => IndexOptions::Docs,
            _ => IndexOptions::None,
        }
    }

    pub fn doc_values_type(&self) -> DocValuesType {
        match self {
            FieldValue::Numeric(_) => DocValuesType::Numeric,
            FieldValue::Binary(_) => DocValuesType::Binary,
            FieldValue::Sorted(_) => DocValuesType::Sorted,
            _ => DocValuesType::None,
        }
    }

    pub fn has_norms(&self) -> bool {
        matches!(self, FieldValue::Text(_))
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Keyword(_) => "keyword",
            FieldValue::Numeric(_) => "numeric",
            FieldValue::Binary(_) => "binary",
            FieldValue::Sorted(_) => "sorted",
        }
    }
}

/// A set of named field values. A field appears at most once.
///
/// Serializes as a JSON object keyed by field name, e.g.
/// `{"body": {"Text": ["quick", "fox"]}, "price": {"Numeric": 5}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field value, replacing any previous value of the field.
    pub fn add_field<S: Into<String>>(&mut self, name: S, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Create a builder for constructing documents.
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }
}

/// Fluent construction of a [`Document`].
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field from its tokens.
    pub fn add_text<S, I, T>(mut self, name: S, tokens: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tokens = tokens.into_iter().map(Into::into).collect();
        self.document.add_field(name, FieldValue::Text(tokens));
        self
    }

    /// Add a text field by splitting on whitespace.
    pub fn add_whitespace_text<S: Into<String>>(self, name: S, text: &str) -> Self {
        self.add_text(name, text.split_whitespace())
    }

    pub fn add_keyword<S: Into<String>, T: Into<String>>(mut self, name: S, value: T) -> Self {
        self.document
            .add_field(name, FieldValue::Keyword(value.into()));
        self
    }

    pub fn add_numeric<S: Into<String>>(mut self, name: S, value: i64) -> Self {
        self.document.add_field(name, FieldValue::Numeric(value));
        self
    }

    pub fn add_binary<S: Into<String>, B: Into<Vec<u8>>>(mut self, name: S, value: B) -> Self {
        self.document
            .add_field(name, FieldValue::Binary(value.into()));
        self
    }

    pub fn add_sorted<S: Into<String>, B: Into<Vec<u8>>>(mut self, name: S, value: B) -> Self {
        self.document
            .add_field(name, FieldValue::Sorted(value.into()));
        self
    }

    pub fn build(self) -> Document {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let doc = Document::builder()
            .add_whitespace_text("body", "the quick  fox")
            .add_keyword("id", "doc-1")
            .add_numeric("price", 12)
            .add_sorted("color", "red")
            .build();

        assert_eq!(doc.len(), 4);
        assert_eq!(
            doc.get_field("body"),
            Some(&FieldValue::Text(vec![
                "the".to_string(),
                "quick".to_string(),
                "fox".to_string()
            ]))
        );
        let names: Vec<&str> = doc.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["body", "color", "id", "price"]);
    }

    #[test]
    fn test_field_kinds() {
        let text = FieldValue::Text(vec!["a".to_string()]);
        assert_eq!(text.index_options(), IndexOptions::DocsAndFreqsAndPositions);
        assert!(text.has_norms());
        assert_eq!(text.doc_values_type(), DocValuesType::None);

        let keyword = FieldValue::Keyword("a".to_string());
        assert_eq!(keyword.index_options(), IndexOptions::Docs);
        assert!(!keyword.has_norms());

        assert_eq!(FieldValue::Numeric(1).index_options(), IndexOptions::None);

        let doc: Document =
            serde_json::from_str(r#"{"id": {"Keyword": "a"}, "price": {"Numeric": 5}}"#).unwrap();
        assert_eq!(doc.get_field("price"), Some(&FieldValue::Numeric(5)));
        assert_eq!(
            FieldValue::Sorted(b"x".to_vec()).doc_values_type(),
            DocValuesType::Sorted
        );
    }
}
