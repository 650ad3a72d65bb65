//! Intersection of match iterators.
//!
//! The approximations of all clauses are intersected with a leapfrog walk led
//! by the cheapest clause. When any clause is two-phase the intersection is
//! two-phase too: a candidate is verified against the two-phase clauses in
//! ascending `match_cost` order, stopping at the first one that rejects it.

use std::cmp::Ordering;

use crate::error::Result;
use crate::search::{DocId, DocIdSetIterator, MatchIterator, NO_MORE_DOCS, TwoPhaseIterator};

/// Move every item onto the same document, starting from `target`, the doc
/// the first item currently sits on.
///
/// Returns the common document, or [`NO_MORE_DOCS`] once any item runs out.
pub(crate) fn align<T>(
    items: &mut [T],
    mut target: DocId,
    iter: fn(&mut T) -> &mut dyn DocIdSetIterator,
) -> Result<DocId> {
    let Some((lead, others)) = items.split_first_mut() else {
        return Ok(NO_MORE_DOCS);
    };

    'align: while target != NO_MORE_DOCS {
        for other in others.iter_mut() {
            let other = iter(other);
            let mut doc = other.doc_id();
            if doc < target {
                doc = other.advance(target)?;
            }
            if doc > target {
                target = iter(lead).advance(doc)?;
                continue 'align;
            }
        }
        return Ok(target);
    }
    Ok(NO_MORE_DOCS)
}

/// Intersect clauses.
///
/// No clauses match nothing, and a single clause is returned unchanged.
pub fn intersect(mut clauses: Vec<MatchIterator>) -> MatchIterator {
    match clauses.len() {
        0 => return MatchIterator::empty(),
        1 => return clauses.remove(0),
        _ => {}
    }

    clauses.sort_by_key(MatchIterator::cost);
    let mut verify: Vec<usize> = clauses
        .iter()
        .enumerate()
        .filter(|(_, clause)| clause.is_two_phase())
        .map(|(i, _)| i)
        .collect();

    let approximation = ConjunctionApproximation { clauses };
    if verify.is_empty() {
        return MatchIterator::Plain(Box::new(approximation));
    }

    verify.sort_by(|&a, &b| {
        let a = approximation.clauses[a].match_cost();
        let b = approximation.clauses[b].match_cost();
        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    });
    let match_cost = verify
        .iter()
        .map(|&i| approximation.clauses[i].match_cost())
        .sum();

    MatchIterator::TwoPhase(Box::new(ConjunctionTwoPhase {
        approximation,
        verify,
        match_cost,
    }))
}

/// Leapfrog intersection of the clause approximations. Clauses are sorted by
/// ascending cost; the first one leads.
#[derive(Debug)]
struct ConjunctionApproximation {
    clauses: Vec<MatchIterator>,
}

impl ConjunctionApproximation {
    fn lead(&mut self) -> &mut dyn DocIdSetIterator {
        self.clauses[0].approximation()
    }
}

impl DocIdSetIterator for ConjunctionApproximation {
    fn doc_id(&self) -> DocId {
        self.clauses[0].doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let doc = self.lead().next_doc()?;
        align(&mut self.clauses, doc, MatchIterator::approximation)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let doc = self.lead().advance(target)?;
        align(&mut self.clauses, doc, MatchIterator::approximation)
    }

    fn cost(&self) -> u64 {
        self.clauses[0].cost()
    }
}

#[derive(Debug)]
struct ConjunctionTwoPhase {
    approximation: ConjunctionApproximation,
    /// Indexes of the two-phase clauses, cheapest verification first.
    verify: Vec<usize>,
    match_cost: f32,
}

impl TwoPhaseIterator for ConjunctionTwoPhase {
    fn approximation(&mut self) -> &mut dyn DocIdSetIterator {
        &mut self.approximation
    }

    fn approximation_ref(&self) -> &dyn DocIdSetIterator {
        &self.approximation
    }

    fn matches(&mut self) -> Result<bool> {
        for &i in &self.verify {
            if !self.approximation.clauses[i].matches()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn match_cost(&self) -> f32 {
        self.match_cost
    }
}
