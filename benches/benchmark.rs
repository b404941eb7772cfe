// Benchmarks for vector algebra, ingestion and query construction
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use spacefold::prelude::*;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn generate_random_vector(dim: usize) -> Vector {
    let mut rng = rand::rng();
    let data: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..1.0f32)).collect();
    Vector::new(data)
}

fn generate_random_floats(dim: usize) -> Vec<f64> {
    let mut rng = rand::rng();
    (0..dim).map(|_| rng.random_range(-1.0f64..1.0f64)).collect()
}

fn benchmark_vector_algebra(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector");

    for dim in [128, 768].iter() {
        let parts = vec![generate_random_vector(*dim), generate_random_vector(*dim), Vector::zeros(*dim)];
        let lengths = vec![*dim; 3];
        let weights = vec![1.0, 0.5, 1.0];

        group.bench_with_input(BenchmarkId::new("concatenate_with_compensation", dim), dim, |b, _| {
            b.iter(|| Vector::concatenate_with_compensation(black_box(&parts), &lengths, &weights).unwrap());
        });

        let combined = Vector::concatenate_with_compensation(&parts, &lengths, &weights).unwrap();
        group.bench_with_input(BenchmarkId::new("split_denormalize", dim), dim, |b, _| {
            b.iter(|| {
                black_box(&combined)
                    .split(&lengths)
                    .unwrap()
                    .iter()
                    .map(Vector::denormalize)
                    .collect::<Vec<_>>()
            });
        });
    }

    group.finish();
}

fn index(dim: usize) -> Index {
    Index::builder("bench")
        .space(Space::text("text", "hashing", 64).bind("doc", "body"))
        .space(Space::custom("custom", dim).bind("doc", "embedding"))
        .schema(
            Schema::entity("doc")
                .field("body", FieldType::String)
                .field("embedding", FieldType::FloatList),
        )
        .build()
        .unwrap()
}

fn engine(dim: usize) -> Engine {
    let registry = EmbeddingRegistry::new().with_engine(Arc::new(HashingTextEngine::new(64)));
    let engine = Engine::new(Arc::new(InMemoryStore::new()), Arc::new(registry), EngineConfig::default()).unwrap();
    engine.add_index(index(dim)).unwrap();
    engine
}

fn records(n: usize, dim: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::new("doc", i.to_string())
                .with_field("body", FieldValue::String(format!("document number {}", i)))
                .with_field("embedding", FieldValue::FloatList(generate_random_floats(dim)))
        })
        .collect()
}

fn benchmark_ingest(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("ingest");

    for size in [10, 100, 1000].iter() {
        let batch = records(*size, 128);
        group.bench_with_input(BenchmarkId::new("batch", size), size, |b, _| {
            let engine = engine(128);
            b.iter(|| rt.block_on(engine.ingest("bench", black_box(&batch))).unwrap());
        });
    }

    group.finish();
}

fn benchmark_query(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = engine(128);
    rt.block_on(engine.ingest("bench", &records(1000, 128))).unwrap();

    let mut group = c.benchmark_group("query");
    let similar = Query::new("doc")
        .similar("text", FieldValue::String("document number 42".to_string()))
        .space_weight("custom", 0.5)
        .limit(10);
    group.bench_function("similar", |b| {
        b.iter(|| rt.block_on(engine.query("bench", black_box(&similar))).unwrap());
    });

    let looks_like = Query::new("doc").looks_like("42").limit(10);
    group.bench_function("looks_like", |b| {
        b.iter(|| rt.block_on(engine.query("bench", black_box(&looks_like))).unwrap());
    });

    group.finish();
}

criterion_group!(benches, benchmark_vector_algebra, benchmark_ingest, benchmark_query);
criterion_main!(benches);
