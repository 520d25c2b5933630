//! Store benchmarks.

use std::sync::Arc;

use allwatch_core::{EntityId, EntityInfo, MachineInfo, SharedInfo, Store};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn machine(id: usize, version: usize) -> SharedInfo {
    Arc::new(MachineInfo::new(id.to_string()).with_instance_id(format!("i-{}", version)))
}

fn populated(size: usize) -> Store {
    let mut store = Store::new();
    for id in 0..size {
        store.add(machine(id, 0));
    }
    store
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/update");

    for size in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut store = populated(size);
            let mut version = 0;
            b.iter(|| {
                version += 1;
                black_box(store.update(machine(version % size, version)));
            });
        });
    }

    group.finish();
}

fn bench_changes_since(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/changes_since");

    // Cost should track the number of changed entries, not the store size.
    for size in [1_000, 10_000, 100_000] {
        let mut store = populated(size);
        let checkpoint = store.latest_revno();
        for id in 0..100 {
            store.update(machine(id, 1));
        }

        group.bench_with_input(BenchmarkId::new("recent_100", size), &store, |b, store| {
            b.iter(|| black_box(store.changes_since(checkpoint)));
        });
    }

    let store = populated(10_000);
    group.bench_function("full_10000", |b| {
        b.iter(|| black_box(store.changes_since(0)));
    });

    group.finish();
}

fn bench_tombstone_cycle(c: &mut Criterion) {
    c.bench_function("store/tombstone_cycle", |b| {
        let mut store = populated(1_000);
        let mut next = 1_000;
        b.iter(|| {
            let info = machine(next, 0);
            let id: EntityId = info.entity_id();
            store.add(info);
            store.inc_ref(&id);
            store.mark_removed(&id);
            black_box(store.dec_ref(&id));
            next += 1;
        });
    });
}

criterion_group!(benches, bench_update, bench_changes_since, bench_tombstone_cycle);
criterion_main!(benches);
