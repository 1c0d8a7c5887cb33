//! Chain Benchmarks
//!
//! Measures chain bookkeeping:
//! - Chain creation
//! - Step recording
//! - Listing active chains
//!
//! Each is run against the in-memory and the SQLite run store.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use agentry_core::agents::AgentDefinition;
use agentry_core::chain::{ChainManager, InMemoryRunStore, RunStore, SqliteRunStore, StepData};
use agentry_core::resolve::InMemoryDefinitions;

fn stores() -> Vec<(&'static str, Arc<dyn RunStore>)> {
    vec![
        ("memory", Arc::new(InMemoryRunStore::new())),
        ("sqlite", Arc::new(SqliteRunStore::in_memory().unwrap())),
    ]
}

fn manager(store: Arc<dyn RunStore>) -> ChainManager {
    let definitions =
        InMemoryDefinitions::new().with(AgentDefinition::new("bench", "Bench", "assistant"));
    ChainManager::new(store, Arc::new(definitions))
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_creation");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for (label, store) in stores() {
        let manager = manager(store);
        group.bench_function(label, |b| {
            b.iter(|| {
                rt.block_on(manager.create_chain("bench", json!({"task": "benchmark"})))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_recording");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for (label, store) in stores() {
        let manager = manager(store);
        group.bench_function(label, |b| {
            b.iter_with_setup(
                || rt.block_on(manager.create_chain("bench", json!({}))).unwrap(),
                |chain_id| {
                    for i in 0..10 {
                        let step = StepData::new(format!("step {}", i)).result(json!({"i": i}));
                        rt.block_on(manager.update_chain_step(black_box(&chain_id), step))
                            .unwrap();
                    }
                },
            )
        });
    }

    group.finish();
}

fn bench_list_active(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_active");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for (label, store) in stores() {
        let manager = manager(store);
        for _ in 0..100 {
            rt.block_on(manager.create_chain("bench", json!({}))).unwrap();
        }
        group.bench_function(label, |b| {
            b.iter(|| rt.block_on(manager.list_active_chains(None)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_create, bench_steps, bench_list_active);
criterion_main!(benches);
