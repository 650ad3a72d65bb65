//! Union of match iterators.
//!
//! Clause approximations are kept in a min-heap keyed by their current
//! document. The clauses positioned on the current document are moved out of
//! the heap into a `top` list, which is what `matches` inspects: a candidate
//! matches when any clause on it is plain, or when one of the two-phase
//! clauses on it verifies.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::binary_heap::PeekMut;
use std::mem;

use crate::error::Result;
use crate::search::{DocId, DocIdSetIterator, MatchIterator, NO_MORE_DOCS, TwoPhaseIterator};

/// Union clauses.
///
/// No clauses match nothing, and a single clause is returned unchanged.
pub fn union(mut clauses: Vec<MatchIterator>) -> MatchIterator {
    match clauses.len() {
        0 => return MatchIterator::empty(),
        1 => return clauses.remove(0),
        _ => {}
    }

    let match_cost: f32 = clauses.iter().map(MatchIterator::match_cost).sum();
    let two_phase = clauses.iter().any(MatchIterator::is_two_phase);
    let approximation = DisjunctionApproximation::new(clauses);
    if two_phase {
        MatchIterator::TwoPhase(Box::new(DisjunctionTwoPhase {
            approximation,
            match_cost,
        }))
    } else {
        MatchIterator::Plain(Box::new(approximation))
    }
}

#[derive(Debug)]
struct DisjunctionEntry {
    clause: MatchIterator,
    doc: DocId,
}

impl PartialEq for DisjunctionEntry {
    fn eq(&self, other: &Self) -> bool {
        self.doc == other.doc
    }
}

impl Eq for DisjunctionEntry {}

impl PartialOrd for DisjunctionEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DisjunctionEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: lower doc ids come first
        other.doc.cmp(&self.doc)
    }
}

#[derive(Debug)]
struct DisjunctionApproximation {
    heap: BinaryHeap<DisjunctionEntry>,
    /// Clauses on the current document.
    top: Vec<DisjunctionEntry>,
    doc: DocId,
    cost: u64,
}

impl DisjunctionApproximation {
    fn new(clauses: Vec<MatchIterator>) -> Self {
        let cost = clauses.iter().map(MatchIterator::cost).sum();
        // Every clause starts unpositioned, so all of them sit on doc -1.
        let top = clauses
            .into_iter()
            .map(|clause| DisjunctionEntry {
                doc: clause.doc_id(),
                clause,
            })
            .collect();
        DisjunctionApproximation {
            heap: BinaryHeap::new(),
            top,
            doc: -1,
            cost,
        }
    }

    /// Move the clauses on the smallest document from the heap into `top`.
    fn pull_top(&mut self) -> DocId {
        self.doc = self.heap.peek().map_or(NO_MORE_DOCS, |entry| entry.doc);
        if self.doc == NO_MORE_DOCS {
            return NO_MORE_DOCS;
        }
        while let Some(entry) = self.heap.peek_mut() {
            if entry.doc != self.doc {
                break;
            }
            self.top.push(PeekMut::pop(entry));
        }
        self.doc
    }
}

impl DocIdSetIterator for DisjunctionApproximation {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        for mut entry in mem::take(&mut self.top) {
            entry.doc = entry.clause.approximation().next_doc()?;
            self.heap.push(entry);
        }
        Ok(self.pull_top())
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        for mut entry in mem::take(&mut self.top) {
            entry.doc = entry.clause.approximation().advance(target)?;
            self.heap.push(entry);
        }
        while let Some(mut entry) = self.heap.peek_mut() {
            if entry.doc >= target {
                break;
            }
            entry.doc = entry.clause.approximation().advance(target)?;
        }
        Ok(self.pull_top())
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

#[derive(Debug)]
struct DisjunctionTwoPhase {
    approximation: DisjunctionApproximation,
    match_cost: f32,
}

impl TwoPhaseIterator for DisjunctionTwoPhase {
    fn approximation(&mut self) -> &mut dyn DocIdSetIterator {
        &mut self.approximation
    }

    fn approximation_ref(&self) -> &dyn DocIdSetIterator {
        &self.approximation
    }

    fn matches(&mut self) -> Result<bool> {
        let top = &mut self.approximation.top;
        if top.iter().any(|entry| !entry.clause.is_two_phase()) {
            return Ok(true);
        }
        top.sort_by(|a, b| {
            a.clause
                .match_cost()
                .partial_cmp(&b.clause.match_cost())
                .unwrap_or(Ordering::Equal)
        });
        for entry in top.iter_mut() {
            if entry.clause.matches()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn match_cost(&self) -> f32 {
        self.match_cost
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::search::test_util::{ListTwoPhase, plain};

    #[test]
    fn test_plain_union() {
        let result = union(vec![
            plain(vec![1, 5, 9]),
            plain(vec![2, 5, 10]),
            plain(vec![0, 9]),
        ]);
        assert!(!result.is_two_phase());
        assert_eq!(result.cost(), 8);
        assert_eq!(result.collect().unwrap(), vec![0, 1, 2, 5, 9, 10]);
    }

    #[test]
    fn test_advance() {
        let mut iter =
            union(vec![plain(vec![1, 4, 12]), plain(vec![3, 7, 20])]).into_doc_id_set_iterator();
        assert_eq!(iter.next_doc().unwrap(), 1);
        assert_eq!(iter.advance(5).unwrap(), 7);
        assert_eq!(iter.advance(13).unwrap(), 20);
        assert_eq!(iter.next_doc().unwrap(), NO_MORE_DOCS);
        assert_eq!(iter.doc_id(), NO_MORE_DOCS);
    }

    #[test]
    fn test_any_matching_clause_is_enough() {
        let result = union(vec![
            plain(vec![3]),
            ListTwoPhase::new(vec![1, 3, 5], vec![5]).boxed(),
            ListTwoPhase::new(vec![1, 6], vec![1]).boxed(),
        ]);
        assert!(result.is_two_phase());
        assert_eq!(result.collect().unwrap(), vec![1, 3, 5]);
    }

    #[test]
    fn test_plain_clause_skips_verification() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = union(vec![
            plain(vec![2]),
            ListTwoPhase::new(vec![2, 4], vec![])
                .logged("filter", &log)
                .boxed(),
        ]);
        assert_eq!(result.collect().unwrap(), vec![2]);
        assert_eq!(*log.lock(), vec![("filter", 4)]);
    }

    #[test]
    fn test_cheaper_clause_verified_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = union(vec![
            ListTwoPhase::new(vec![8], vec![8])
                .with_cost(5.0)
                .logged("expensive", &log)
                .boxed(),
            ListTwoPhase::new(vec![8], vec![8])
                .with_cost(0.5)
                .logged("cheap", &log)
                .boxed(),
        ]);
        assert_eq!(result.collect().unwrap(), vec![8]);
        assert_eq!(*log.lock(), vec![("cheap", 8)]);
    }
}
