//! Performance benchmarks for the candidate pipeline

use arena_matchmaker::matchmaker::entry::TicketEntry;
use arena_matchmaker::matchmaker::pipeline::{PipelineConfig, SkillBasedMatchmaker};
use arena_matchmaker::types::EntryPresence;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::HashMap;

fn synthetic_entry(rng: &mut StdRng, ticket: usize, user: usize) -> TicketEntry {
    let mut properties: HashMap<String, serde_json::Value> = HashMap::new();
    properties.insert("group_id".to_string(), json!("guild-1"));
    properties.insert("game_mode".to_string(), json!("arena_public"));
    properties.insert("max_rtt".to_string(), json!(200));
    properties.insert("rtt_us_east".to_string(), json!(rng.gen_range(20.0..150.0)));
    properties.insert("rtt_eu_west".to_string(), json!(rng.gen_range(20.0..150.0)));
    properties.insert(
        "rank_percentile".to_string(),
        json!(rng.gen_range(0.0..1.0)),
    );
    properties.insert("rating_mu".to_string(), json!(rng.gen_range(15.0..35.0)));
    properties.insert("rating_sigma".to_string(), json!(rng.gen_range(4.0..9.0)));

    TicketEntry {
        ticket: format!("ticket-{}", ticket),
        presence: EntryPresence {
            user_id: format!("user-{}", user),
            session_id: format!("session-{}", user),
            username: format!("user-{}", user),
        },
        properties,
    }
}

/// Candidate batches shaped like a busy tick: 8-player tuples drawn from a
/// shared player pool so selections overlap.
fn synthetic_candidates(count: usize, pool: usize) -> Vec<Vec<TicketEntry>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            (0..8)
                .map(|_| {
                    let user = rng.gen_range(0..pool);
                    synthetic_entry(&mut rng, user, user)
                })
                .collect()
        })
        .collect()
}

fn benchmark_match_candidates(c: &mut Criterion) {
    let matchmaker = SkillBasedMatchmaker::new(PipelineConfig::default());

    for count in [100, 1_000, 10_000] {
        let candidates = synthetic_candidates(count, count / 2 + 16);
        c.bench_function(&format!("match_candidates_{}", count), |b| {
            b.iter(|| {
                let outcome = matchmaker.match_candidates(black_box(candidates.clone()));
                black_box(outcome)
            })
        });
    }
}

fn benchmark_balance_and_predict(c: &mut Criterion) {
    let matchmaker = SkillBasedMatchmaker::new(PipelineConfig::default());
    let candidates = synthetic_candidates(1, 8);

    c.bench_function("balance_and_predict_single", |b| {
        b.iter(|| {
            let outcome = matchmaker.match_candidates(black_box(candidates.clone()));
            black_box(outcome)
        })
    });
}

criterion_group!(benches, benchmark_match_candidates, benchmark_balance_and_predict);
criterion_main!(benches);
