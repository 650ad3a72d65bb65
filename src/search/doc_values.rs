//! Range filters over doc values.
//!
//! Doc values have no inverted structure to approximate with, so these
//! iterate every document of the segment and check the value in `matches`.

use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::codec::doc_values::{NumericDocValues, SortedDocValues};
use crate::error::Result;
use crate::search::{AllDocsIterator, DocIdSetIterator, MatchIterator, TwoPhaseIterator};

/// Cost of one random-access doc values lookup.
const LOOKUP_COST: f32 = 1.0;

/// Documents whose numeric value lies in `lower..=upper`.
pub fn numeric_range(
    values: Arc<dyn NumericDocValues>,
    max_doc: u32,
    lower: i64,
    upper: i64,
) -> MatchIterator {
    if lower > upper || values.docs_with_value() == 0 {
        return MatchIterator::empty();
    }
    MatchIterator::TwoPhase(Box::new(NumericRangeIterator {
        approximation: AllDocsIterator::new(max_doc),
        values,
        range: lower..=upper,
    }))
}

/// Documents whose sorted value lies between `lower` and `upper`, both
/// inclusive. A missing bound is unbounded.
pub fn sorted_range(
    values: Arc<dyn SortedDocValues>,
    max_doc: u32,
    lower: Option<&[u8]>,
    upper: Option<&[u8]>,
) -> MatchIterator {
    let min_ord = match lower {
        None => 0,
        Some(lower) => values.lookup_term(lower).unwrap_or_else(|insert| insert),
    };
    let end_ord = match upper {
        None => values.value_count(),
        Some(upper) => match values.lookup_term(upper) {
            Ok(ord) => ord + 1,
            Err(insert) => insert,
        },
    };
    if min_ord >= end_ord {
        return MatchIterator::empty();
    }
    MatchIterator::TwoPhase(Box::new(SortedRangeIterator {
        approximation: AllDocsIterator::new(max_doc),
        values,
        ords: min_ord..=end_ord - 1,
    }))
}

#[derive(Debug)]
struct NumericRangeIterator {
    approximation: AllDocsIterator,
    values: Arc<dyn NumericDocValues>,
    range: RangeInclusive<i64>,
}

impl TwoPhaseIterator for NumericRangeIterator {
    fn approximation(&mut self) -> &mut dyn DocIdSetIterator {
        &mut self.approximation
    }

    fn approximation_ref(&self) -> &dyn DocIdSetIterator {
        &self.approximation
    }

    fn matches(&mut self) -> Result<bool> {
        let doc = self.approximation.doc_id();
        Ok(self
            .values
            .get(doc)
            .is_some_and(|value| self.range.contains(&value)))
    }

    fn match_cost(&self) -> f32 {
        LOOKUP_COST
    }
}

#[derive(Debug)]
struct SortedRangeIterator {
    approximation: AllDocsIterator,
    values: Arc<dyn SortedDocValues>,
    ords: RangeInclusive<u32>,
}

impl TwoPhaseIterator for SortedRangeIterator {
    fn approximation(&mut self) -> &mut dyn DocIdSetIterator {
        &mut self.approximation
    }

    fn approximation_ref(&self) -> &dyn DocIdSetIterator {
        &self.approximation
    }

    fn matches(&mut self) -> Result<bool> {
        let doc = self.approximation.doc_id();
        Ok(self
            .values
            .ord(doc)
            .is_some_and(|ord| self.ords.contains(&ord)))
    }

    fn match_cost(&self) -> f32 {
        LOOKUP_COST
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::doc_values::{VecNumericDocValues, VecSortedDocValues};

    fn prices() -> Arc<dyn NumericDocValues> {
        Arc::new(VecNumericDocValues::new(vec![
            Some(10),
            None,
            Some(-3),
            Some(25),
            Some(10),
        ]))
    }

    fn colors() -> Arc<dyn SortedDocValues> {
        let values: Vec<Option<Vec<u8>>> = ["red", "blue", "", "green", "blue"]
            .iter()
            .map(|v| (!v.is_empty()).then(|| v.as_bytes().to_vec()))
            .collect();
        Arc::new(VecSortedDocValues::from_values(&values))
    }

    #[test]
    fn test_numeric_range() {
        let range = numeric_range(prices(), 5, 0, 10);
        assert!(range.is_two_phase());
        assert_eq!(range.cost(), 5);
        assert_eq!(range.collect().unwrap(), vec![0, 4]);

        assert_eq!(
            numeric_range(prices(), 5, i64::MIN, i64::MAX)
                .collect()
                .unwrap(),
            vec![0, 2, 3, 4]
        );
        assert!(numeric_range(prices(), 5, 11, 10).collect().unwrap().is_empty());
    }

    #[test]
    fn test_sorted_range() {
        let range = sorted_range(colors(), 5, Some(b"blue".as_slice()), Some(b"green".as_slice()));
        assert_eq!(range.collect().unwrap(), vec![1, 3, 4]);

        let above = sorted_range(colors(), 5, Some(b"c".as_slice()), None);
        assert_eq!(above.collect().unwrap(), vec![0, 3]);

        let between = sorted_range(colors(), 5, Some(b"h".as_slice()), Some(b"p".as_slice()));
        assert!(between.collect().unwrap().is_empty());
    }
}
