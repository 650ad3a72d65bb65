//! Exact phrase matching.
//!
//! The approximation is the conjunction of the phrase terms' documents.
//! `matches` then reads the positions of every term on the candidate and
//! checks that some start position is shared once each term's offset within
//! the phrase is subtracted.

use crate::codec::postings::PostingsEnum;
use crate::error::Result;
use crate::search::conjunction::align;
use crate::search::{DocId, DocIdSetIterator, MatchIterator, TwoPhaseIterator};

/// Verification cost charged per phrase term.
const TERM_POSITIONS_COST: f32 = 4.0;

/// One term of a phrase and its position within the phrase.
#[derive(Debug)]
pub struct PhraseTerm {
    pub postings: Box<dyn PostingsEnum>,
    pub offset: u32,
}

impl PhraseTerm {
    /// `postings` must have been obtained with positions.
    pub fn new(postings: Box<dyn PostingsEnum>, offset: u32) -> Self {
        PhraseTerm { postings, offset }
    }
}

fn postings(term: &mut PhraseTerm) -> &mut dyn DocIdSetIterator {
    &mut term.postings
}

/// Match documents containing the terms at consecutive positions, as given
/// by their offsets.
///
/// No terms match nothing. A single term needs no position check.
pub fn exact_phrase(mut terms: Vec<PhraseTerm>) -> MatchIterator {
    match terms.len() {
        0 => MatchIterator::empty(),
        1 => MatchIterator::Plain(Box::new(terms.remove(0).postings)),
        _ => {
            terms.sort_by_key(|term| term.postings.cost());
            let match_cost = terms.len() as f32 * TERM_POSITIONS_COST;
            MatchIterator::TwoPhase(Box::new(ExactPhraseIterator {
                approximation: PhraseApproximation { terms },
                checked: None,
                match_cost,
            }))
        }
    }
}

#[derive(Debug)]
struct PhraseApproximation {
    terms: Vec<PhraseTerm>,
}

impl DocIdSetIterator for PhraseApproximation {
    fn doc_id(&self) -> DocId {
        self.terms[0].postings.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let doc = self.terms[0].postings.next_doc()?;
        align(&mut self.terms, doc, postings)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let doc = self.terms[0].postings.advance(target)?;
        align(&mut self.terms, doc, postings)
    }

    fn cost(&self) -> u64 {
        self.terms[0].postings.cost()
    }
}

#[derive(Debug)]
struct ExactPhraseIterator {
    approximation: PhraseApproximation,
    /// Positions can only be read once per document, so the answer for the
    /// last verified document is kept.
    checked: Option<(DocId, bool)>,
    match_cost: f32,
}

impl ExactPhraseIterator {
    fn verify(&mut self) -> Result<bool> {
        let mut starts: Option<Vec<u32>> = None;
        for term in &mut self.approximation.terms {
            let freq = term.postings.freq();
            let mut term_starts = Vec::with_capacity(freq as usize);
            for _ in 0..freq {
                let position = term.postings.next_position()?;
                if let Some(start) = position.checked_sub(term.offset) {
                    term_starts.push(start);
                }
            }
            starts = Some(match starts {
                None => term_starts,
                Some(previous) => intersect_sorted(&previous, &term_starts),
            });
            if starts.as_ref().is_some_and(Vec::is_empty) {
                return Ok(false);
            }
        }
        Ok(starts.is_some_and(|s| !s.is_empty()))
    }
}

impl TwoPhaseIterator for ExactPhraseIterator {
    fn approximation(&mut self) -> &mut dyn DocIdSetIterator {
        &mut self.approximation
    }

    fn approximation_ref(&self) -> &dyn DocIdSetIterator {
        &self.approximation
    }

    fn matches(&mut self) -> Result<bool> {
        let doc = self.approximation.doc_id();
        if let Some((checked_doc, matched)) = self.checked
            && checked_doc == doc
        {
            return Ok(matched);
        }
        let matched = self.verify()?;
        self.checked = Some((doc, matched));
        Ok(matched)
    }

    fn match_cost(&self) -> f32 {
        self.match_cost
    }
}

/// Values present in both ascending lists.
fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}
