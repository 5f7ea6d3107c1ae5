//! Draw performance benchmarks
//!
//! - Weighted selection over pools of increasing size
//! - Full single-slot draw against the in-memory counter store
//!
//! Run with: `cargo bench`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use stockgate_core::Candidate;
use stockgate_runtime::{DrawEngine, StockCache, weighted};
use stockgate_testing::{InMemoryCounterStore, InMemoryDurableStore, ManualClock};

fn pool(size: u64) -> Vec<Candidate> {
    (0..size).map(|i| Candidate::new(i, 1 + i % 17)).collect()
}

fn bench_weighted_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_select");

    for size in [4_u64, 64, 1024] {
        let candidates = pool(size);
        let mut rng = StdRng::seed_from_u64(1);

        group.bench_with_input(BenchmarkId::from_parameter(size), &candidates, |b, pool| {
            b.iter(|| weighted::select(black_box(pool), &mut rng));
        });
    }

    group.finish();
}

fn bench_single_slot_draw(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let candidates = pool(16);

    let engine = runtime.block_on(async {
        let cache = StockCache::new(
            "bench",
            InMemoryCounterStore::new(),
            InMemoryDurableStore::new(),
            ManualClock::default(),
        );
        for candidate in &candidates {
            cache
                .seed(&candidate.item, i64::MAX / 2)
                .await
                .expect("seed");
        }
        DrawEngine::new(Arc::new(cache))
    });

    c.bench_function("draw_single_slot", |b| {
        b.to_async(&runtime).iter(|| async {
            engine
                .draw(black_box(&candidates), 1)
                .await
                .expect("draw")
        });
    });
}

criterion_group!(benches, bench_weighted_select, bench_single_slot_draw);
criterion_main!(benches);
