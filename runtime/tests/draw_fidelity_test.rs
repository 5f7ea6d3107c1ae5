//! Integration tests for weighted draw statistics
//!
//! Seeded RNGs keep these deterministic.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::Arc;
use stockgate_core::Candidate;
use stockgate_runtime::weighted;
use stockgate_runtime::{DrawEngine, StockCache};
use stockgate_testing::{InMemoryCounterStore, InMemoryDurableStore, ManualClock};

async fn engine(
    stock: &[(&str, i64)],
) -> DrawEngine<InMemoryCounterStore, InMemoryDurableStore, ManualClock> {
    let cache = StockCache::new(
        "prize-stock",
        InMemoryCounterStore::new(),
        InMemoryDurableStore::new(),
        ManualClock::default(),
    );
    for (item, quantity) in stock {
        cache.seed(&(*item).into(), *quantity).await.unwrap();
    }
    DrawEngine::new(Arc::new(cache))
}

#[tokio::test]
async fn test_selection_frequency_follows_weights() {
    let engine = engine(&[("a", 100_000), ("b", 100_000)]).await;
    let candidates = [Candidate::new("a", 1000), Candidate::new("b", 5)];
    let mut rng = StdRng::seed_from_u64(2024);

    let mut a_wins = 0_u32;
    for _ in 0..10_000 {
        let winners = engine.draw_with_rng(&candidates, 1, &mut rng).await.unwrap();
        if winners[0].item.as_str() == "a" {
            a_wins += 1;
        }
    }

    let share = f64::from(a_wins) / 10_000.0;
    assert!((share - 0.995).abs() <= 0.02, "share of a was {share}");
}

#[test]
fn test_theoretical_shares_match_weights() {
    let shares = weighted::probabilities(&[Candidate::new("a", 1000), Candidate::new("b", 5)]);
    assert!((shares[0].1 - 1000.0 / 1005.0).abs() < 1e-12);
    assert!((shares[1].1 - 5.0 / 1005.0).abs() < 1e-12);
}

#[test]
fn test_uniform_pool_is_roughly_uniform() {
    let pool: Vec<Candidate> = (0..4_u64).map(|i| Candidate::new(i, 1)).collect();
    let mut rng = StdRng::seed_from_u64(11);
    let mut counts = [0_u32; 4];

    for _ in 0..8_000 {
        counts[weighted::select(&pool, &mut rng).unwrap()] += 1;
    }

    for count in counts {
        assert!((1_700..=2_300).contains(&count), "{counts:?}");
    }
}

#[tokio::test]
async fn test_multi_slot_winners_are_always_distinct() {
    let engine = engine(&[("a", 1_000), ("b", 1_000), ("c", 1_000), ("d", 1_000), ("e", 1_000)]).await;
    let candidates = [
        Candidate::new("a", 50),
        Candidate::new("b", 20),
        Candidate::new("c", 10),
        Candidate::new("d", 5),
        Candidate::new("e", 1),
    ];
    let mut rng = StdRng::seed_from_u64(5);

    for _ in 0..200 {
        let winners = engine.draw_with_rng(&candidates, 3, &mut rng).await.unwrap();
        let distinct: HashSet<_> = winners.iter().map(|c| c.item.clone()).collect();
        assert_eq!(distinct.len(), 3);
    }
}
