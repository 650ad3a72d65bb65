//! Composite matching over real segments, with clauses disguised as two-phase
//! iterators whose approximations stop on random non-matching documents.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tessera::codec::registry::CodecRegistry;
use tessera::index::{Document, SegmentReader, SegmentWriter, SegmentWriterConfig};
use tessera::search::conjunction::intersect;
use tessera::search::disjunction::union;
use tessera::search::evaluator::{Evaluator, PhraseEvaluator, TermEvaluator};
use tessera::search::random::RandomTwoPhaseIterator;
use tessera::search::{DocId, MatchIterator};
use tessera::storage::memory::MemoryStorage;

const WORDS: [&str; 6] = ["ant", "bee", "cat", "dog", "eel", "fox"];

fn random_segment(seed: u64, docs: usize) -> SegmentReader {
    let storage = Arc::new(MemoryStorage::new_default());
    let registry = Arc::new(CodecRegistry::default());
    let mut writer = SegmentWriter::open(
        storage.clone(),
        Arc::clone(&registry),
        SegmentWriterConfig::default(),
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..docs {
        let len = rng.random_range(1..8);
        let tokens: Vec<&str> = (0..len)
            .map(|_| WORDS[rng.random_range(0..WORDS.len())])
            .collect();
        writer
            .add_document(Document::builder().add_text("body", tokens).build())
            .unwrap();
    }
    let info = writer.commit().unwrap().unwrap();
    writer.close().unwrap();
    SegmentReader::open(storage, &info, &registry).unwrap()
}

fn matcher(reader: &SegmentReader, evaluator: &dyn Evaluator) -> MatchIterator {
    evaluator.matcher(reader).unwrap()
}

fn randomized(reader: &SegmentReader, evaluator: &dyn Evaluator, seed: u64) -> MatchIterator {
    RandomTwoPhaseIterator::wrap(matcher(reader, evaluator), seed)
}

fn sorted_intersection(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    a.iter().copied().filter(|doc| b.contains(doc)).collect()
}

fn sorted_union(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut docs: Vec<DocId> = a.iter().chain(b).copied().collect();
    docs.sort_unstable();
    docs.dedup();
    docs
}

#[test]
fn test_randomized_clauses_match_exact_results() {
    for seed in 0..10 {
        let reader = random_segment(seed, 150);
        let ant = TermEvaluator::new("body", "ant");
        let bee = TermEvaluator::new("body", "bee");
        let cat_dog = PhraseEvaluator::new("body", ["cat", "dog"]);

        let ant_docs = matcher(&reader, &ant).collect().unwrap();
        let bee_docs = matcher(&reader, &bee).collect().unwrap();
        let phrase_docs = matcher(&reader, &cat_dog).collect().unwrap();

        let both = intersect(vec![
            randomized(&reader, &ant, seed),
            randomized(&reader, &bee, seed + 100),
        ]);
        assert_eq!(
            both.collect().unwrap(),
            sorted_intersection(&ant_docs, &bee_docs)
        );

        let either = union(vec![
            randomized(&reader, &ant, seed),
            matcher(&reader, &cat_dog),
        ]);
        assert_eq!(either.collect().unwrap(), sorted_union(&ant_docs, &phrase_docs));

        let nested = intersect(vec![
            union(vec![
                randomized(&reader, &bee, seed + 200),
                matcher(&reader, &cat_dog),
            ]),
            randomized(&reader, &ant, seed + 300),
        ]);
        assert_eq!(
            nested.collect().unwrap(),
            sorted_intersection(&sorted_union(&bee_docs, &phrase_docs), &ant_docs)
        );
    }
}

#[test]
fn test_phrase_results_have_adjacent_terms() {
    let reader = random_segment(42, 200);
    let docs = matcher(&reader, &PhraseEvaluator::new("body", ["eel", "fox"]))
        .collect()
        .unwrap();
    let eel = matcher(&reader, &TermEvaluator::new("body", "eel"))
        .collect()
        .unwrap();
    let fox = matcher(&reader, &TermEvaluator::new("body", "fox"))
        .collect()
        .unwrap();
    assert!(docs.len() <= sorted_intersection(&eel, &fox).len());
    assert!(docs.iter().all(|doc| eel.contains(doc) && fox.contains(doc)));
}
