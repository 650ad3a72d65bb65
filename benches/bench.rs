//! Criterion benchmarks for Tessera.
//!
//! Covers the hot paths of the library:
//! - Packed integer buffering
//! - Segment flush through the default codec
//! - Term, phrase and conjunction matching over a flushed segment

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tessera::codec::registry::CodecRegistry;
use tessera::index::{Document, SegmentReader, SegmentWriter, SegmentWriterConfig};
use tessera::search::evaluator::{
    ConjunctionEvaluator, Evaluator, NumericRangeEvaluator, PhraseEvaluator, TermEvaluator,
};
use tessera::storage::memory::MemoryStorage;
use tessera::util::packed::PackedAppendBuffer;

/// Generate test documents for benchmarking.
fn generate_test_documents(count: usize) -> Vec<Document> {
    let words = [
        "search", "engine", "full", "text", "index", "query", "document", "field", "term",
        "phrase", "segment", "codec", "postings", "norms", "values", "storage",
    ];
    let mut rng = StdRng::seed_from_u64(7);
    (0..count)
        .map(|i| {
            let len = rng.random_range(5..30);
            let tokens: Vec<&str> = (0..len)
                .map(|_| words[rng.random_range(0..words.len())])
                .collect();
            Document::builder()
                .add_text("body", tokens)
                .add_numeric("rank", i as i64)
                .build()
        })
        .collect()
}

fn flush(docs: &[Document]) -> (Arc<MemoryStorage>, SegmentReader) {
    let storage = Arc::new(MemoryStorage::new_default());
    let registry = Arc::new(CodecRegistry::default());
    let mut writer = SegmentWriter::open(
        storage.clone(),
        Arc::clone(&registry),
        SegmentWriterConfig::default(),
    )
    .unwrap();
    for doc in docs {
        writer.add_document(doc.clone()).unwrap();
    }
    let info = writer.commit().unwrap().unwrap();
    writer.close().unwrap();
    let reader = SegmentReader::open(storage.clone(), &info, &registry).unwrap();
    (storage, reader)
}

fn bench_packed(c: &mut Criterion) {
    let mut group = c.benchmark_group("packed");
    let mut rng = StdRng::seed_from_u64(1);
    let values: Vec<i64> = (0..100_000).map(|_| rng.random_range(0..5_000)).collect();

    group.throughput(Throughput::Elements(values.len() as u64));
    group.bench_function("append_and_freeze", |b| {
        b.iter(|| {
            let mut buffer = PackedAppendBuffer::new(1024);
            for &value in &values {
                buffer.add(value);
            }
            black_box(buffer.freeze())
        })
    });

    let mut buffer = PackedAppendBuffer::new(1024);
    for &value in &values {
        buffer.add(value);
    }
    let frozen = buffer.freeze();
    group.bench_function("random_get", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            for i in (0..frozen.len()).step_by(97) {
                sum = sum.wrapping_add(frozen.get(black_box(i)));
            }
            black_box(sum)
        })
    });

    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");
    group.sample_size(20);
    let docs = generate_test_documents(1000);

    group.throughput(Throughput::Elements(docs.len() as u64));
    group.bench_function("flush_1000_documents", |b| {
        b.iter(|| black_box(flush(&docs)))
    });

    group.finish();
}

fn bench_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching");
    let docs = generate_test_documents(5000);
    let (_storage, reader) = flush(&docs);

    let queries: Vec<(&str, Box<dyn Evaluator>)> = vec![
        ("term", Box::new(TermEvaluator::new("body", "codec"))),
        (
            "phrase",
            Box::new(PhraseEvaluator::new("body", ["segment", "codec"])),
        ),
        (
            "phrase_and_range",
            Box::new(ConjunctionEvaluator::new(vec![
                Box::new(PhraseEvaluator::new("body", ["full", "text"])),
                Box::new(NumericRangeEvaluator::new("rank", 1000, 2000)),
            ])),
        ),
    ];

    for (name, query) in &queries {
        group.bench_function(*name, |b| {
            b.iter(|| black_box(reader.search(query.as_ref()).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_packed, bench_flush, bench_matching);
criterion_main!(benches);
