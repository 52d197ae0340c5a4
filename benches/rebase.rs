//! Benchmarks for the rebase hot path.
//!
//! Run with: `cargo bench`
//!
//! Measures the cost of `Engine::rebase_now` as the pending mutation queue
//! grows, and the cost of merging a partial update into the snapshot — the
//! two operations a UI event loop calls on every server update and every
//! optimistic user action.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Map};
use sync_engine::{Draft, Engine, FieldDef, HandlerError, Init, MutateOptions, PartialUpdate, Schema};

fn todos_schema() -> Schema {
    Schema::builder()
        .collection(
            "todos",
            true,
            [
                ("title", FieldDef::regular()),
                ("done", FieldDef::regular()),
            ],
        )
        .with_mutation("toggleDone", |draft: &mut Draft<'_>, input: &serde_json::Value| {
            let id = input["id"].as_str().unwrap();
            if let Some(item) = draft.item_mut("todos", id) {
                let current = item["done"].as_bool().unwrap_or(false);
                item.insert("done".to_string(), json!(!current));
            }
            Ok::<(), HandlerError>(())
        })
        .build()
        .unwrap()
}

fn seed_update(n: usize) -> PartialUpdate {
    let items: Vec<Map<String, serde_json::Value>> = (0..n)
        .map(|i| {
            [
                ("id".to_string(), json!(format!("t{i}"))),
                ("$version".to_string(), json!(1)),
                ("title".to_string(), json!(format!("todo {i}"))),
                ("done".to_string(), json!(false)),
            ]
            .into_iter()
            .collect()
        })
        .collect();
    PartialUpdate::new().with_collection("todos", items)
}

fn bench_rebase_with_growing_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebase_with_pending_queue");
    for pending in [0usize, 10, 100] {
        group.bench_function(format!("pending_{pending}"), |b| {
            b.iter_batched(
                || {
                    let schema = todos_schema();
                    let mut engine = Engine::new(schema, Init::new()).unwrap();
                    engine.rebase(&seed_update(pending.max(1)), Default::default()).unwrap();
                    for i in 0..pending {
                        engine
                            .mutate(
                                "toggleDone",
                                json!({"id": format!("t{i}")}),
                                MutateOptions::default(),
                            )
                            .unwrap();
                    }
                    engine
                },
                |mut engine| {
                    black_box(engine.rebase_now().unwrap());
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_partial_update_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("partial_update_merge");
    for size in [10usize, 100, 1000] {
        group.bench_function(format!("items_{size}"), |b| {
            b.iter_batched(
                || (Engine::new(todos_schema(), Init::new()).unwrap(), seed_update(size)),
                |(mut engine, update)| {
                    black_box(engine.rebase(&update, Default::default()).unwrap());
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rebase_with_growing_queue, bench_partial_update_merge);
criterion_main!(benches);
