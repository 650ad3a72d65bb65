//! Query evaluators: turn a query description into a [`MatchIterator`] for
//! one segment.

use std::fmt::Debug;

use crate::codec::postings::{PostingsFlags, term_postings};
use crate::error::{Result, TesseraError};
use crate::index::reader::SegmentReader;
use crate::search::conjunction::intersect;
use crate::search::disjunction::union;
use crate::search::doc_values::{numeric_range, sorted_range};
use crate::search::phrase::{PhraseTerm, exact_phrase};
use crate::search::{DocId, MatchIterator};

/// Something that can match documents of a segment.
pub trait Evaluator: Send + Sync + Debug {
    /// Build the match iterator of this query over `reader`.
    fn matcher(&self, reader: &SegmentReader) -> Result<MatchIterator>;

    /// Human-readable form of the query.
    fn description(&self) -> String;
}

/// Documents containing a term.
#[derive(Debug, Clone)]
pub struct TermEvaluator {
    pub field: String,
    pub term: Vec<u8>,
}

impl TermEvaluator {
    pub fn new<F: Into<String>, T: Into<Vec<u8>>>(field: F, term: T) -> Self {
        TermEvaluator {
            field: field.into(),
            term: term.into(),
        }
    }
}

impl Evaluator for TermEvaluator {
    fn matcher(&self, reader: &SegmentReader) -> Result<MatchIterator> {
        let Some(terms) = reader.terms(&self.field)? else {
            return Ok(MatchIterator::empty());
        };
        Ok(
            match term_postings(terms.as_ref(), &self.term, PostingsFlags::NONE)? {
                Some(postings) => MatchIterator::Plain(Box::new(postings)),
                None => MatchIterator::empty(),
            },
        )
    }

    fn description(&self) -> String {
        format!("{}:{}", self.field, String::from_utf8_lossy(&self.term))
    }
}

/// Documents containing the terms at consecutive positions.
#[derive(Debug, Clone)]
pub struct PhraseEvaluator {
    pub field: String,
    pub terms: Vec<Vec<u8>>,
}

impl PhraseEvaluator {
    pub fn new<F, I, T>(field: F, terms: I) -> Self
    where
        F: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        PhraseEvaluator {
            field: field.into(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }
}

impl Evaluator for PhraseEvaluator {
    /// # Errors
    ///
    /// [`TesseraError::InvalidArgument`] if the field does not index
    /// positions.
    fn matcher(&self, reader: &SegmentReader) -> Result<MatchIterator> {
        let Some(terms) = reader.terms(&self.field)? else {
            return Ok(MatchIterator::empty());
        };
        let mut terms_enum = terms.iterator()?;
        let mut phrase = Vec::with_capacity(self.terms.len());
        for (offset, term) in self.terms.iter().enumerate() {
            if !terms_enum.seek_exact(term)? {
                return Ok(MatchIterator::empty());
            }
            let Some(postings) = terms_enum.postings_with_positions(None)? else {
                return Err(TesseraError::invalid_argument(format!(
                    "field {} was indexed without positions",
                    self.field
                )));
            };
            phrase.push(PhraseTerm::new(postings, offset as u32));
        }
        Ok(exact_phrase(phrase))
    }

    fn description(&self) -> String {
        let words: Vec<_> = self
            .terms
            .iter()
            .map(|term| String::from_utf8_lossy(term))
            .collect();
        format!("{}:\"{}\"", self.field, words.join(" "))
    }
}

/// Documents whose numeric doc value lies in an inclusive range.
#[derive(Debug, Clone)]
pub struct NumericRangeEvaluator {
    pub field: String,
    pub lower: i64,
    pub upper: i64,
}

impl NumericRangeEvaluator {
    pub fn new<F: Into<String>>(field: F, lower: i64, upper: i64) -> Self {
        NumericRangeEvaluator {
            field: field.into(),
            lower,
            upper,
        }
    }
}

impl Evaluator for NumericRangeEvaluator {
    fn matcher(&self, reader: &SegmentReader) -> Result<MatchIterator> {
        Ok(match reader.numeric_doc_values(&self.field)? {
            Some(values) => numeric_range(values, reader.max_doc(), self.lower, self.upper),
            None => MatchIterator::empty(),
        })
    }

    fn description(&self) -> String {
        format!("{}:[{} TO {}]", self.field, self.lower, self.upper)
    }
}

/// Documents whose sorted doc value lies between two inclusive bounds.
#[derive(Debug, Clone)]
pub struct SortedRangeEvaluator {
    pub field: String,
    pub lower: Option<Vec<u8>>,
    pub upper: Option<Vec<u8>>,
}

impl SortedRangeEvaluator {
    pub fn new<F: Into<String>>(field: F, lower: Option<Vec<u8>>, upper: Option<Vec<u8>>) -> Self {
        SortedRangeEvaluator {
            field: field.into(),
            lower,
            upper,
        }
    }
}

impl Evaluator for SortedRangeEvaluator {
    fn matcher(&self, reader: &SegmentReader) -> Result<MatchIterator> {
        Ok(match reader.sorted_doc_values(&self.field)? {
            Some(values) => sorted_range(
                values,
                reader.max_doc(),
                self.lower.as_deref(),
                self.upper.as_deref(),
            ),
            None => MatchIterator::empty(),
        })
    }

    fn description(&self) -> String {
        let bound = |b: &Option<Vec<u8>>| match b {
            Some(b) => String::from_utf8_lossy(b).into_owned(),
            None => "*".to_string(),
        };
        format!(
            "{}:[{} TO {}]",
            self.field,
            bound(&self.lower),
            bound(&self.upper)
        )
    }
}

/// Documents matching every clause.
#[derive(Debug)]
pub struct ConjunctionEvaluator {
    pub clauses: Vec<Box<dyn Evaluator>>,
}

impl ConjunctionEvaluator {
    pub fn new(clauses: Vec<Box<dyn Evaluator>>) -> Self {
        ConjunctionEvaluator { clauses }
    }
}

impl Evaluator for ConjunctionEvaluator {
    fn matcher(&self, reader: &SegmentReader) -> Result<MatchIterator> {
        let clauses = self
            .clauses
            .iter()
            .map(|clause| clause.matcher(reader))
            .collect::<Result<Vec<_>>>()?;
        Ok(intersect(clauses))
    }

    fn description(&self) -> String {
        describe_clauses(&self.clauses, " AND ")
    }
}

/// Documents matching at least one clause.
#[derive(Debug)]
pub struct DisjunctionEvaluator {
    pub clauses: Vec<Box<dyn Evaluator>>,
}

impl DisjunctionEvaluator {
    pub fn new(clauses: Vec<Box<dyn Evaluator>>) -> Self {
        DisjunctionEvaluator { clauses }
    }
}

impl Evaluator for DisjunctionEvaluator {
    fn matcher(&self, reader: &SegmentReader) -> Result<MatchIterator> {
        let clauses = self
            .clauses
            .iter()
            .map(|clause| clause.matcher(reader))
            .collect::<Result<Vec<_>>>()?;
        Ok(union(clauses))
    }

    fn description(&self) -> String {
        describe_clauses(&self.clauses, " OR ")
    }
}

fn describe_clauses(clauses: &[Box<dyn Evaluator>], separator: &str) -> String {
    let parts: Vec<String> = clauses.iter().map(|c| c.description()).collect();
    format!("({})", parts.join(separator))
}

/// Evaluate a query against a segment and collect the matching documents.
pub fn search(reader: &SegmentReader, evaluator: &dyn Evaluator) -> Result<Vec<DocId>> {
    evaluator.matcher(reader)?.collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codec::registry::CodecRegistry;
    use crate::index::document::Document;
    use crate::index::writer::{SegmentWriter, SegmentWriterConfig};
    use crate::storage::memory::MemoryStorage;

    fn segment(docs: &[(&str, &str, i64, &str)]) -> SegmentReader {
        let storage = Arc::new(MemoryStorage::new_default());
        let registry = Arc::new(CodecRegistry::default());
        let mut writer = SegmentWriter::open(
            storage.clone(),
            Arc::clone(&registry),
            SegmentWriterConfig::default(),
        )
        .unwrap();
        for (body, id, price, color) in docs {
            let doc = Document::builder()
                .add_whitespace_text("body", body)
                .add_keyword("id", *id)
                .add_numeric("price", *price)
                .add_sorted("color", *color)
                .build();
            writer.add_document(doc).unwrap();
        }
        let info = writer.commit().unwrap().unwrap();
        writer.close().unwrap();
        SegmentReader::open(storage, &info, &registry).unwrap()
    }

    fn sample() -> SegmentReader {
        segment(&[
            ("the quick brown fox", "a", 10, "red"),
            ("quick fox jumps over the lazy dog", "b", 25, "blue"),
            ("brown quick fox", "c", 40, "green"),
            ("the lazy brown dog", "d", 5, "red"),
        ])
    }

    #[test]
    fn test_term() {
        let reader = sample();
        assert_eq!(
            search(&reader, &TermEvaluator::new("body", "fox")).unwrap(),
            vec![0, 1, 2]
        );
        assert_eq!(
            search(&reader, &TermEvaluator::new("id", "d")).unwrap(),
            vec![3]
        );
        assert!(
            search(&reader, &TermEvaluator::new("body", "cat"))
                .unwrap()
                .is_empty()
        );
        assert!(
            search(&reader, &TermEvaluator::new("missing", "fox"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_phrase() {
        let reader = sample();
        let quick_fox = PhraseEvaluator::new("body", ["quick", "fox"]);
        assert_eq!(search(&reader, &quick_fox).unwrap(), vec![1, 2]);

        let brown_fox = PhraseEvaluator::new("body", ["brown", "fox"]);
        assert_eq!(search(&reader, &brown_fox).unwrap(), vec![0]);

        let absent = PhraseEvaluator::new("body", ["fox", "cat"]);
        assert!(search(&reader, &absent).unwrap().is_empty());
        assert_eq!(quick_fox.description(), "body:\"quick fox\"");
    }

    #[test]
    fn test_phrase_needs_positions() {
        let reader = sample();
        let err = search(&reader, &PhraseEvaluator::new("id", ["a", "b"])).unwrap_err();
        assert!(matches!(err, TesseraError::InvalidArgument(_)));
    }

    #[test]
    fn test_doc_values_ranges() {
        let reader = sample();
        assert_eq!(
            search(&reader, &NumericRangeEvaluator::new("price", 10, 30)).unwrap(),
            vec![0, 1]
        );
        assert_eq!(
            search(
                &reader,
                &SortedRangeEvaluator::new("color", Some(b"green".to_vec()), None)
            )
            .unwrap(),
            vec![0, 2, 3]
        );
        assert!(
            search(&reader, &NumericRangeEvaluator::new("weight", 0, 100))
                .unwrap()
                .is_empty()
        );
        let err = search(&reader, &NumericRangeEvaluator::new("color", 0, 1)).unwrap_err();
        assert!(matches!(err, TesseraError::InvalidArgument(_)));
    }

    #[test]
    fn test_boolean_composition() {
        let reader = sample();
        let query = ConjunctionEvaluator::new(vec![
            Box::new(PhraseEvaluator::new("body", ["quick", "fox"])),
            Box::new(DisjunctionEvaluator::new(vec![
                Box::new(NumericRangeEvaluator::new("price", 30, 50)),
                Box::new(TermEvaluator::new("body", "lazy")),
            ])),
        ]);
        assert_eq!(search(&reader, &query).unwrap(), vec![1, 2]);
        assert_eq!(
            query.description(),
            "(body:\"quick fox\" AND (price:[30 TO 50] OR body:lazy))"
        );

        let lazy_red = ConjunctionEvaluator::new(vec![
            Box::new(TermEvaluator::new("body", "lazy")),
            Box::new(SortedRangeEvaluator::new(
                "color",
                Some(b"red".to_vec()),
                Some(b"red".to_vec()),
            )),
        ]);
        assert_eq!(search(&reader, &lazy_red).unwrap(), vec![3]);
    }
}
