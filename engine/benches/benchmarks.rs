//! Performance benchmarks for mirror-engine

use mirror_engine::{
    CaptureSpec, ColumnDef, ColumnType, LogSnapshot, MemoryChangeLog, MirrorStore, Origin, Row,
    TableDef, Write,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn contacts() -> TableDef {
    TableDef::new(
        "contacts",
        vec![
            ColumnDef::nullable("id", ColumnType::String { length: 100 }),
            ColumnDef::required("uid", ColumnType::String { length: 36 }),
            ColumnDef::nullable("name", ColumnType::Text),
            ColumnDef::nullable("email", ColumnType::Text),
            ColumnDef::nullable("age", ColumnType::Int),
            ColumnDef::nullable("lastActivityTime", ColumnType::Timestamp),
        ],
    )
}

fn tracked_store(rows: usize) -> MirrorStore {
    let mut store = MirrorStore::new();
    store.define_table(contacts()).unwrap();
    store.install_tracking(&contacts()).unwrap();
    for i in 0..rows {
        store
            .insert(
                "contacts",
                Row::new()
                    .with("uid", format!("u-{i}"))
                    .with("id", format!("R{i}"))
                    .with("name", format!("User {i}")),
            )
            .unwrap();
    }
    store
}

fn bench_store_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_writes");

    group.bench_function("install_tracking", |b| {
        b.iter(|| {
            let mut store = MirrorStore::new();
            store.define_table(contacts()).unwrap();
            store.install_tracking(black_box(&contacts()))
        })
    });

    group.bench_function("local_insert_assign_uid", |b| {
        let mut store = tracked_store(0);
        b.iter(|| store.insert("contacts", black_box(Row::new().with("name", "Test User"))))
    });

    group.bench_function("sync_applied_insert", |b| {
        let mut store = tracked_store(0);
        b.iter(|| {
            store.apply(black_box(
                Write::insert("contacts", Row::new().with("name", "Remote")).sync_applied(),
            ))
        })
    });

    group.bench_function("local_update", |b| {
        let mut store = tracked_store(1000);
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            store.update(
                "contacts",
                "u-500",
                black_box(Row::new().with("name", format!("Edit {n}"))),
            )
        })
    });

    for pending in [1_000usize, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("local_insert_with_pending", pending),
            &pending,
            |b, &pending| {
                let mut store = MirrorStore::new();
                store.define_table(contacts()).unwrap();
                store.install_tracking(&contacts()).unwrap();
                for i in 0..pending {
                    store
                        .insert("contacts", Row::new().with("name", format!("User {i}")))
                        .unwrap();
                }
                b.iter(|| store.insert("contacts", black_box(Row::new().with("name", "New"))))
            },
        );
    }

    group.finish();
}

fn bench_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture");
    let spec = CaptureSpec::for_table(&contacts());

    group.bench_function("on_update_all_columns", |b| {
        let old = Row::new().with("uid", "u-1").with("name", "A");
        let new = old
            .clone()
            .with("name", "B")
            .with("email", "b@example.com")
            .with("age", 30);
        b.iter(|| {
            let mut log = MemoryChangeLog::new();
            spec.on_update(&mut log, black_box(&old), black_box(&new), Origin::Local)
        })
    });

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("on_delete", size), size, |b, &size| {
            let store = tracked_store(size);
            let row = Row::new().with("uid", "u-new").with("id", "R-new");
            b.iter(|| {
                let mut log = store.log().clone();
                spec.on_delete(&mut log, black_box(&row), Origin::Local)
            })
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [100, 500, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("export", size), size, |b, &size| {
            let store = tracked_store(size);
            b.iter(|| store.export_log())
        });

        group.bench_with_input(BenchmarkId::new("import", size), size, |b, &size| {
            let snapshot = tracked_store(size).export_log();
            b.iter(|| MemoryChangeLog::import(black_box(snapshot.clone())))
        });

        group.bench_with_input(BenchmarkId::new("from_json", size), size, |b, &size| {
            let json = tracked_store(size).export_log().to_json().unwrap();
            b.iter(|| LogSnapshot::from_json(black_box(&json)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_store_writes, bench_capture, bench_snapshot);
criterion_main!(benches);
