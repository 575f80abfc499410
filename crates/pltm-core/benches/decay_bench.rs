//! # Engine Benchmarks
//!
//! Performance benchmarks for pltm-core's hot paths: atom storage and
//! reconciliation, attention/MMR retrieval, decay passes, and canonical
//! export/checksum.
//!
//! Run with: `cargo bench -p pltm-core`

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pltm_core::clock::FixedClock;
use pltm_core::config::PltmConfig;
use pltm_core::engine::{PltmEngine, StoreAtomInput};
use pltm_core::store::{MemStore, RedbStore};
use pltm_core::types::{AtomType, Contexts, Metadata, Provenance};
use pltm_core::{CanonicalSnapshot, export_snapshot};

// =============================================================================
// HELPERS
// =============================================================================

fn store_input(subject: &str, predicate: &str, object: usize) -> StoreAtomInput {
    StoreAtomInput {
        subject: subject.to_string(),
        predicate: predicate.to_string(),
        object: format!("object_{object}"),
        atom_type: AtomType::Preference,
        provenance: Provenance::UserStated,
        confidence: Some(0.7),
        contexts: Contexts::new(),
        source_user: Some(subject.to_string()),
        metadata: Metadata::new(),
    }
}

fn populated_engine(size: usize) -> (PltmEngine, Arc<FixedClock>) {
    let store = Arc::new(MemStore::new());
    let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
    let engine = PltmEngine::new(store, clock.clone(), None, PltmConfig::default());
    for i in 0..size {
        let subject = format!("user_{}", i % 50);
        engine.store_atom(store_input(&subject, "likes", i)).expect("store");
    }
    (engine, clock)
}

// =============================================================================
// ATOM STORAGE / RECONCILIATION
// =============================================================================

fn bench_store_atom_distinct(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_atom_distinct_subjects");

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let store = Arc::new(MemStore::new());
                let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
                let engine = PltmEngine::new(store, clock, None, PltmConfig::default());
                for i in 0..size {
                    let _ = engine.store_atom(store_input(&format!("user_{i}"), "likes", i));
                }
                black_box(engine)
            });
        });
    }

    group.finish();
}

fn bench_store_atom_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_atom_reconciliation");

    // Repeated writes to a small set of (subject, predicate) slots, forcing
    // every insert through the similarity/conflict-detection path instead of
    // the identity-match fast path.
    for size in [100, 1_000, 5_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let store = Arc::new(MemStore::new());
                let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
                let engine = PltmEngine::new(store, clock, None, PltmConfig::default());
                for i in 0..size {
                    let subject = format!("user_{}", i % 10);
                    let _ = engine.store_atom(store_input(&subject, "likes", i % 20));
                }
                black_box(engine)
            });
        });
    }

    group.finish();
}

// =============================================================================
// RETRIEVAL
// =============================================================================

fn bench_attention_retrieve(c: &mut Criterion) {
    let mut group = c.benchmark_group("attention_retrieve");

    for size in [100, 1_000, 10_000].iter() {
        let (engine, _clock) = populated_engine(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &engine, |b, engine| {
            b.iter(|| black_box(engine.attention_retrieve("user_0", "object", None, 10, None)));
        });
    }

    group.finish();
}

fn bench_mmr_retrieve(c: &mut Criterion) {
    let mut group = c.benchmark_group("mmr_retrieve");

    for size in [100, 1_000, 10_000].iter() {
        let (engine, _clock) = populated_engine(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &engine, |b, engine| {
            b.iter(|| black_box(engine.mmr_retrieve("user_0", "object", None, 10, None, None)));
        });
    }

    group.finish();
}

fn bench_attention_multihead(c: &mut Criterion) {
    let mut group = c.benchmark_group("attention_multihead");

    for size in [100, 1_000].iter() {
        let (engine, _clock) = populated_engine(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &engine, |b, engine| {
            b.iter(|| black_box(engine.attention_multihead("user_0", "object", None, 10)));
        });
    }

    group.finish();
}

// =============================================================================
// DECAY
// =============================================================================

fn bench_decay_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("decay_run");

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let (engine, clock) = populated_engine(size);
                // Advance the clock far enough that every atom's stability has
                // dropped below the dissolve threshold, exercising the full
                // scan-and-mutate path rather than a no-op pass.
                clock.advance(chrono::Duration::days(400));
                black_box(engine.decay_run())
            });
        });
    }

    group.finish();
}

// =============================================================================
// CANONICAL EXPORT / CHECKSUM
// =============================================================================

fn bench_export_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_snapshot");

    for size in [100, 1_000, 10_000].iter() {
        let (engine, _clock) = populated_engine(*size);
        let snapshot = CanonicalSnapshot::from_store(engine.store()).expect("snapshot");

        group.bench_with_input(BenchmarkId::from_parameter(size), &snapshot, |b, snapshot| {
            b.iter(|| black_box(export_snapshot(snapshot)));
        });
    }

    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");

    for size in [100, 1_000, 10_000].iter() {
        let (engine, _clock) = populated_engine(*size);
        let snapshot = CanonicalSnapshot::from_store(engine.store()).expect("snapshot");

        group.bench_with_input(BenchmarkId::from_parameter(size), &snapshot, |b, snapshot| {
            b.iter(|| black_box(snapshot.checksum()));
        });
    }

    group.finish();
}

// =============================================================================
// REDB BACKEND
// =============================================================================

fn bench_redb_store_atom(c: &mut Criterion) {
    let mut group = c.benchmark_group("redb_store_atom");
    let sizes = [100, 1_000];

    for size in sizes.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let dir = tempfile::tempdir().expect("tmpdir");
                let store = Arc::new(RedbStore::open(dir.path().join("bench.redb")).expect("open"));
                let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
                let engine = PltmEngine::new(store, clock, None, PltmConfig::default());
                for i in 0..size {
                    let _ = engine.store_atom(store_input(&format!("user_{}", i % 50), "likes", i));
                }
                black_box(engine)
            });
        });
    }

    group.finish();
}

// =============================================================================
// CRITERION GROUPS
// =============================================================================

criterion_group!(
    benches,
    bench_store_atom_distinct,
    bench_store_atom_reconciliation,
    bench_attention_retrieve,
    bench_mmr_retrieve,
    bench_attention_multihead,
    bench_decay_run,
    bench_export_snapshot,
    bench_checksum,
    bench_redb_store_atom,
);

criterion_main!(benches);
