//! Document-id iteration and the two-phase matching protocol.
//!
//! Every evaluator produces a [`MatchIterator`]: either a plain forward-only
//! [`DocIdSetIterator`], or a [`TwoPhaseIterator`] whose approximation may
//! return false positives that [`TwoPhaseIterator::matches`] weeds out.
//! Composite evaluators intersect or union the approximations of their
//! clauses first and only verify the candidates that survive.

use std::fmt::Debug;

use crate::error::Result;

pub mod conjunction;
pub mod disjunction;
pub mod doc_values;
pub mod evaluator;
pub mod phrase;
pub mod random;

/// A document number within one segment.
pub type DocId = i32;

/// Sentinel returned once an iterator is exhausted.
pub const NO_MORE_DOCS: DocId = i32::MAX;

/// A forward-only iterator over ascending document ids.
///
/// A fresh iterator is unpositioned (`doc_id() == -1`); an exhausted one sits
/// on [`NO_MORE_DOCS`].
pub trait DocIdSetIterator: Send + Debug {
    /// The current document, `-1` before the first call to `next_doc`.
    fn doc_id(&self) -> DocId;

    /// Advance to the next document.
    fn next_doc(&mut self) -> Result<DocId>;

    /// Advance to the first document `>= target`.
    ///
    /// `target` must be greater than the current document.
    fn advance(&mut self, target: DocId) -> Result<DocId>;

    /// Upper bound on the number of documents this iterator returns.
    fn cost(&self) -> u64;
}

impl<T: DocIdSetIterator + ?Sized> DocIdSetIterator for Box<T> {
    fn doc_id(&self) -> DocId {
        (**self).doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        (**self).next_doc()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        (**self).advance(target)
    }

    fn cost(&self) -> u64 {
        (**self).cost()
    }
}

/// Advance by repeated `next_doc` calls, for iterators that cannot skip.
pub fn slow_advance<I: DocIdSetIterator + ?Sized>(iter: &mut I, target: DocId) -> Result<DocId> {
    let mut doc = iter.doc_id();
    while doc < target {
        doc = iter.next_doc()?;
    }
    Ok(doc)
}

/// Collect every remaining document of an iterator.
pub fn collect_docs<I: DocIdSetIterator + ?Sized>(iter: &mut I) -> Result<Vec<DocId>> {
    let mut docs = Vec::new();
    loop {
        let doc = iter.next_doc()?;
        if doc == NO_MORE_DOCS {
            return Ok(docs);
        }
        docs.push(doc);
    }
}

/// A match iterator split into a cheap approximation and a verification step.
pub trait TwoPhaseIterator: Send + Debug {
    /// The approximation. Every true match appears in it.
    fn approximation(&mut self) -> &mut dyn DocIdSetIterator;

    /// Read-only access to the approximation.
    fn approximation_ref(&self) -> &dyn DocIdSetIterator;

    /// Whether the document the approximation sits on truly matches.
    ///
    /// Only defined while the approximation is positioned on a document.
    /// Calling it several times on the same document gives the same answer.
    fn matches(&mut self) -> Result<bool>;

    /// Estimated cost of one `matches` call, used to order verification.
    fn match_cost(&self) -> f32;
}

/// What an evaluator hands back for a segment.
#[derive(Debug)]
pub enum MatchIterator {
    /// Every returned document is a match.
    Plain(Box<dyn DocIdSetIterator>),
    /// Candidates must be verified with `matches`.
    TwoPhase(Box<dyn TwoPhaseIterator>),
}

impl MatchIterator {
    /// An iterator that matches nothing.
    pub fn empty() -> Self {
        MatchIterator::Plain(Box::new(DocIdListIterator::new(Vec::new())))
    }

    /// Cost of the (approximate) iteration.
    pub fn cost(&self) -> u64 {
        match self {
            MatchIterator::Plain(iter) => iter.cost(),
            MatchIterator::TwoPhase(two_phase) => two_phase.approximation_ref().cost(),
        }
    }

    /// Current document of the (approximate) iteration.
    pub fn doc_id(&self) -> DocId {
        match self {
            MatchIterator::Plain(iter) => iter.doc_id(),
            MatchIterator::TwoPhase(two_phase) => two_phase.approximation_ref().doc_id(),
        }
    }

    /// The iterator that drives iteration: the plain iterator itself, or the
    /// approximation of a two-phase one.
    pub fn approximation(&mut self) -> &mut dyn DocIdSetIterator {
        match self {
            MatchIterator::Plain(iter) => &mut **iter,
            MatchIterator::TwoPhase(two_phase) => two_phase.approximation(),
        }
    }

    pub fn approximation_ref(&self) -> &dyn DocIdSetIterator {
        match self {
            MatchIterator::Plain(iter) => &**iter,
            MatchIterator::TwoPhase(two_phase) => two_phase.approximation_ref(),
        }
    }

    /// Verify the current candidate. Plain iterators always match.
    pub fn matches(&mut self) -> Result<bool> {
        match self {
            MatchIterator::Plain(_) => Ok(true),
            MatchIterator::TwoPhase(two_phase) => two_phase.matches(),
        }
    }

    /// Cost of verifying one candidate, zero for plain iterators.
    pub fn match_cost(&self) -> f32 {
        match self {
            MatchIterator::Plain(_) => 0.0,
            MatchIterator::TwoPhase(two_phase) => two_phase.match_cost(),
        }
    }

    pub fn is_two_phase(&self) -> bool {
        matches!(self, MatchIterator::TwoPhase(_))
    }

    /// Turn into an iterator over verified matches only.
    pub fn into_doc_id_set_iterator(self) -> Box<dyn DocIdSetIterator> {
        match self {
            MatchIterator::Plain(iter) => iter,
            MatchIterator::TwoPhase(two_phase) => Box::new(VerifiedIterator::new(two_phase)),
        }
    }

    /// Collect all verified matches.
    pub fn collect(self) -> Result<Vec<DocId>> {
        collect_docs(self.into_doc_id_set_iterator().as_mut())
    }
}

/// Iterates the approximation of a [`TwoPhaseIterator`] and skips the
/// candidates that do not verify.
#[derive(Debug)]
pub struct VerifiedIterator {
    two_phase: Box<dyn TwoPhaseIterator>,
}

impl VerifiedIterator {
    pub fn new(two_phase: Box<dyn TwoPhaseIterator>) -> Self {
        VerifiedIterator { two_phase }
    }

    fn do_next(&mut self, mut doc: DocId) -> Result<DocId> {
        while doc != NO_MORE_DOCS {
            if self.two_phase.matches()? {
                return Ok(doc);
            }
            doc = self.two_phase.approximation().next_doc()?;
        }
        Ok(NO_MORE_DOCS)
    }
}

impl DocIdSetIterator for VerifiedIterator {
    fn doc_id(&self) -> DocId {
        self.two_phase.approximation_ref().doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let doc = self.two_phase.approximation().next_doc()?;
        self.do_next(doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let doc = self.two_phase.approximation().advance(target)?;
        self.do_next(doc)
    }

    fn cost(&self) -> u64 {
        self.two_phase.approximation_ref().cost()
    }
}

/// Iterates a sorted list of document ids.
#[derive(Debug, Clone)]
pub struct DocIdListIterator {
    docs: Vec<DocId>,
    index: usize,
    doc: DocId,
}

impl DocIdListIterator {
    /// `docs` must be strictly ascending and must not contain [`NO_MORE_DOCS`].
    pub fn new(docs: Vec<DocId>) -> Self {
        debug_assert!(docs.windows(2).all(|w| w[0] < w[1]));
        DocIdListIterator {
            docs,
            index: 0,
            doc: -1,
        }
    }
}

impl DocIdSetIterator for DocIdListIterator {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.doc = match self.docs.get(self.index) {
            Some(&doc) => {
                self.index += 1;
                doc
            }
            None => NO_MORE_DOCS,
        };
        Ok(self.doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let offset = self.docs[self.index..].partition_point(|&d| d < target);
        self.index += offset;
        self.next_doc()
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }
}

/// Iterates every document `0..max_doc`.
#[derive(Debug, Clone)]
pub struct AllDocsIterator {
    doc: DocId,
    max_doc: DocId,
}

impl AllDocsIterator {
    pub fn new(max_doc: u32) -> Self {
        AllDocsIterator {
            doc: -1,
            max_doc: max_doc.min(NO_MORE_DOCS as u32) as DocId,
        }
    }
}

impl DocIdSetIterator for AllDocsIterator {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        let target = self.doc + 1;
        self.advance(target)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.doc = if target >= self.max_doc {
            NO_MORE_DOCS
        } else {
            target
        };
        Ok(self.doc)
    }

    fn cost(&self) -> u64 {
        self.max_doc as u64
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::any::Any;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::codec::postings::{BufferedPosting, PostingsEnum};
    use crate::error::TesseraError;

    /// Approximates with a list of candidates and verifies against another.
    #[derive(Debug)]
    pub struct ListTwoPhase {
        pub approximation: DocIdListIterator,
        pub matching: Vec<DocId>,
        pub cost: f32,
        /// Receives `(name, doc)` for every `matches` call.
        pub log: Option<(&'static str, Arc<Mutex<Vec<(&'static str, DocId)>>>)>,
    }

    impl ListTwoPhase {
        pub fn new(candidates: Vec<DocId>, matching: Vec<DocId>) -> Self {
            ListTwoPhase {
                approximation: DocIdListIterator::new(candidates),
                matching,
                cost: 1.0,
                log: None,
            }
        }

        pub fn with_cost(mut self, cost: f32) -> Self {
            self.cost = cost;
            self
        }

        pub fn logged(
            mut self,
            name: &'static str,
            log: &Arc<Mutex<Vec<(&'static str, DocId)>>>,
        ) -> Self {
            self.log = Some((name, Arc::clone(log)));
            self
        }

        pub fn boxed(self) -> MatchIterator {
            MatchIterator::TwoPhase(Box::new(self))
        }
    }

    impl TwoPhaseIterator for ListTwoPhase {
        fn approximation(&mut self) -> &mut dyn DocIdSetIterator {
            &mut self.approximation
        }

        fn approximation_ref(&self) -> &dyn DocIdSetIterator {
            &self.approximation
        }

        fn matches(&mut self) -> Result<bool> {
            let doc = self.approximation.doc_id();
            if let Some((name, log)) = &self.log {
                log.lock().push((*name, doc));
            }
            Ok(self.matching.contains(&doc))
        }

        fn match_cost(&self) -> f32 {
            self.cost
        }
    }

    pub fn plain(docs: Vec<DocId>) -> MatchIterator {
        MatchIterator::Plain(Box::new(DocIdListIterator::new(docs)))
    }

    /// A postings cursor over in-memory postings.
    #[derive(Debug)]
    pub struct ListPostings {
        postings: Vec<BufferedPosting>,
        index: Option<usize>,
        doc: DocId,
        position: usize,
    }

    impl ListPostings {
        pub fn boxed(postings: Vec<BufferedPosting>) -> Box<dyn PostingsEnum> {
            Box::new(ListPostings {
                postings,
                index: None,
                doc: -1,
                position: 0,
            })
        }
    }

    impl DocIdSetIterator for ListPostings {
        fn doc_id(&self) -> DocId {
            self.doc
        }

        fn next_doc(&mut self) -> Result<DocId> {
            let next = self.index.map_or(0, |i| i + 1);
            self.index = Some(next);
            self.position = 0;
            self.doc = self.postings.get(next).map_or(NO_MORE_DOCS, |p| p.doc);
            Ok(self.doc)
        }

        fn advance(&mut self, target: DocId) -> Result<DocId> {
            slow_advance(self, target)
        }

        fn cost(&self) -> u64 {
            self.postings.len() as u64
        }
    }

    impl PostingsEnum for ListPostings {
        fn freq(&self) -> u32 {
            self.index
                .and_then(|i| self.postings.get(i))
                .map_or(0, |p| p.freq)
        }

        fn next_position(&mut self) -> Result<u32> {
            let posting = self
                .index
                .and_then(|i| self.postings.get(i))
                .ok_or_else(|| TesseraError::invalid_operation("not positioned"))?;
            let position = posting
                .positions
                .get(self.position)
                .copied()
                .ok_or_else(|| TesseraError::invalid_operation("no positions left"))?;
            self.position += 1;
            Ok(position)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any> {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::ListTwoPhase;
    use super::*;

    #[test]
    fn test_list_iterator() {
        let mut iter = DocIdListIterator::new(vec![1, 4, 7, 9]);
        assert_eq!(iter.doc_id(), -1);
        assert_eq!(iter.next_doc().unwrap(), 1);
        assert_eq!(iter.advance(5).unwrap(), 7);
        assert_eq!(iter.advance(8).unwrap(), 9);
        assert_eq!(iter.next_doc().unwrap(), NO_MORE_DOCS);
        assert_eq!(iter.cost(), 4);
    }

    #[test]
    fn test_all_docs_iterator() {
        let mut iter = AllDocsIterator::new(5);
        assert_eq!(iter.next_doc().unwrap(), 0);
        assert_eq!(iter.advance(3).unwrap(), 3);
        assert_eq!(iter.next_doc().unwrap(), 4);
        assert_eq!(iter.next_doc().unwrap(), NO_MORE_DOCS);

        let mut empty = AllDocsIterator::new(0);
        assert_eq!(empty.next_doc().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_verified_iterator_filters_candidates() {
        let two_phase = ListTwoPhase::new((0..10).collect(), vec![2, 3, 8]);
        let docs = MatchIterator::TwoPhase(Box::new(two_phase)).collect().unwrap();
        assert_eq!(docs, vec![2, 3, 8]);
    }

    #[test]
    fn test_verified_iterator_advance() {
        let two_phase = ListTwoPhase::new((0..10).collect(), vec![2, 3, 8]);
        let mut iter = MatchIterator::TwoPhase(Box::new(two_phase)).into_doc_id_set_iterator();
        assert_eq!(iter.advance(4).unwrap(), 8);
        assert_eq!(iter.doc_id(), 8);
        assert_eq!(iter.next_doc().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_slow_advance_and_empty() {
        let mut iter = DocIdListIterator::new(vec![3, 6]);
        assert_eq!(slow_advance(&mut iter, 4).unwrap(), 6);

        let empty = MatchIterator::empty();
        assert_eq!(empty.cost(), 0);
        assert!(empty.collect().unwrap().is_empty());
    }
}
