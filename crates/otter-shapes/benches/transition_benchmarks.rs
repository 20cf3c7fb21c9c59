//! Shape Transition Benchmarks
//!
//! Measures transition cache hits, replayed removals and cached property reads.

use criterion::{Criterion, criterion_group, criterion_main};
use otter_shapes::{DynamicObject, PropertyCache, PropertyFlags, ShapeTree, Value};
use std::hint::black_box;
use std::sync::Arc;

const KEYS: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

fn populated(tree: &Arc<ShapeTree>) -> DynamicObject {
    let mut obj = DynamicObject::new(tree);
    for (i, key) in KEYS.iter().enumerate() {
        obj.put(*key, Value::Int(i as i32)).unwrap();
    }
    obj
}

/// Benchmark: Building the same object repeatedly (every add is a cache hit)
fn bench_cached_adds(c: &mut Criterion) {
    let tree = Arc::new(ShapeTree::new());
    populated(&tree);

    c.bench_function("shape_cached_adds_8", |b| {
        b.iter(|| black_box(populated(black_box(&tree))));
    });
}

/// Benchmark: Removing the first property, which replays every later add
fn bench_remove_replay(c: &mut Criterion) {
    c.bench_function("shape_remove_first_of_8_uncached", |b| {
        b.iter(|| {
            let tree = ShapeTree::new();
            let mut shape = tree.root();
            for (i, key) in KEYS.iter().enumerate() {
                shape = tree
                    .define_property(&shape, *key, &Value::Int(i as i32), PropertyFlags::NONE)
                    .unwrap();
            }
            let first = shape.property(&"a".into()).unwrap().clone();
            black_box(tree.remove_property(&shape, &first))
        });
    });

    let tree = Arc::new(ShapeTree::new());
    c.bench_function("shape_remove_first_of_8_cached", |b| {
        b.iter(|| {
            let mut obj = populated(&tree);
            obj.remove_key(black_box("a"));
            black_box(obj)
        });
    });
}

/// Benchmark: Monomorphic reads through a property cache
fn bench_cached_reads(c: &mut Criterion) {
    let tree = Arc::new(ShapeTree::new());
    let obj = populated(&tree);

    c.bench_function("shape_cached_read_1000", |b| {
        b.iter(|| {
            let mut cache = PropertyCache::new("h");
            let mut sum = 0i64;
            for _ in 0..1000 {
                if let Some(Value::Int(v)) = cache.get(black_box(&obj)) {
                    sum += i64::from(v);
                }
            }
            black_box(sum)
        });
    });

    c.bench_function("shape_uncached_read_1000", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            for _ in 0..1000 {
                if let Some(Value::Int(v)) = black_box(&obj).get("h") {
                    sum += i64::from(v);
                }
            }
            black_box(sum)
        });
    });
}

criterion_group!(
    benches,
    bench_cached_adds,
    bench_remove_replay,
    bench_cached_reads
);
criterion_main!(benches);
