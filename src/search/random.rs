//! Randomized approximations for validating two-phase consumers.
//!
//! [`RandomTwoPhaseIterator`] turns an exact iterator into a two-phase one
//! whose approximation lands on random documents between the target and the
//! next true match. Any consumer that treats approximation hits as matches
//! without calling `matches` returns extra documents and fails its tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::search::{DocId, DocIdSetIterator, MatchIterator, NO_MORE_DOCS, TwoPhaseIterator};

/// Approximation that may stop on any document up to the next true match.
#[derive(Debug)]
pub struct RandomApproximation {
    inner: Box<dyn DocIdSetIterator>,
    rng: StdRng,
    doc: DocId,
}

impl RandomApproximation {
    pub fn new(inner: Box<dyn DocIdSetIterator>, seed: u64) -> Self {
        RandomApproximation {
            inner,
            rng: StdRng::seed_from_u64(seed),
            doc: -1,
        }
    }

    /// The exact iterator's current document.
    pub fn true_doc_id(&self) -> DocId {
        self.inner.doc_id()
    }
}

impl DocIdSetIterator for RandomApproximation {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        self.advance(self.doc + 1)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.inner.doc_id() < target {
            self.inner.advance(target)?;
        }
        let next = self.inner.doc_id();
        self.doc = if next == NO_MORE_DOCS {
            NO_MORE_DOCS
        } else {
            self.rng.random_range(target..=next)
        };
        Ok(self.doc)
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}

/// Exact iterator disguised as a two-phase one.
#[derive(Debug)]
pub struct RandomTwoPhaseIterator {
    approximation: RandomApproximation,
}

impl RandomTwoPhaseIterator {
    pub fn new(inner: Box<dyn DocIdSetIterator>, seed: u64) -> Self {
        RandomTwoPhaseIterator {
            approximation: RandomApproximation::new(inner, seed),
        }
    }

    /// Wrap a plain match iterator; two-phase iterators are returned as is.
    pub fn wrap(iter: MatchIterator, seed: u64) -> MatchIterator {
        match iter {
            MatchIterator::Plain(inner) => {
                MatchIterator::TwoPhase(Box::new(RandomTwoPhaseIterator::new(inner, seed)))
            }
            two_phase => two_phase,
        }
    }
}

impl TwoPhaseIterator for RandomTwoPhaseIterator {
    fn approximation(&mut self) -> &mut dyn DocIdSetIterator {
        &mut self.approximation
    }

    fn approximation_ref(&self) -> &dyn DocIdSetIterator {
        &self.approximation
    }

    /// # Panics
    ///
    /// If the approximation is not positioned on a document.
    fn matches(&mut self) -> Result<bool> {
        let doc = self.approximation.doc_id();
        assert!(
            doc != -1 && doc != NO_MORE_DOCS,
            "matches() called while the approximation is on {doc}"
        );
        Ok(doc == self.approximation.true_doc_id())
    }

    fn match_cost(&self) -> f32 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::DocIdListIterator;
    use crate::search::conjunction::intersect;
    use crate::search::disjunction::union;
    use crate::search::test_util::plain;

    fn random(docs: Vec<DocId>, seed: u64) -> MatchIterator {
        RandomTwoPhaseIterator::wrap(plain(docs), seed)
    }

    #[test]
    fn test_approximation_never_skips_matches() {
        for seed in 0..50 {
            let mut approximation =
                RandomApproximation::new(Box::new(DocIdListIterator::new(vec![3, 9, 40])), seed);
            let mut previous = -1;
            loop {
                let doc = approximation.next_doc().unwrap();
                assert!(doc > previous);
                assert!(doc <= approximation.true_doc_id());
                if doc == NO_MORE_DOCS {
                    break;
                }
                previous = doc;
            }
        }
    }

    #[test]
    fn test_verified_docs_are_exact() {
        for seed in 0..50 {
            let docs = random(vec![0, 5, 6, 18, 33], seed).collect().unwrap();
            assert_eq!(docs, vec![0, 5, 6, 18, 33]);
        }
    }

    #[test]
    fn test_composites_verify_random_clauses() {
        for seed in 0..50 {
            let both = intersect(vec![
                random(vec![1, 4, 8, 12, 20], seed),
                random(vec![2, 4, 12, 13, 20], seed + 1000),
                plain((0..25).collect()),
            ]);
            assert_eq!(both.collect().unwrap(), vec![4, 12, 20]);

            let either = union(vec![
                random(vec![1, 7], seed),
                random(vec![3, 7, 11], seed + 1000),
            ]);
            assert_eq!(either.collect().unwrap(), vec![1, 3, 7, 11]);
        }
    }

    #[test]
    #[should_panic(expected = "matches() called")]
    fn test_matches_off_position_panics() {
        let mut two_phase =
            RandomTwoPhaseIterator::new(Box::new(DocIdListIterator::new(vec![1])), 7);
        let _ = two_phase.matches();
    }
}
