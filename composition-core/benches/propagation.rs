//! Propagation benchmarks: ref writes fanning out to effects, and writes at
//! the base of computed chains.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use composition_core::reactive::{computed, use_ref, watch_effect, Computed};

fn ref_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("ref_fan_out");
    for effects in [1usize, 16, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(effects), &effects, |b, &n| {
            let source = use_ref(0u64);
            let handles: Vec<_> = (0..n)
                .map(|_| {
                    let s = source.clone();
                    watch_effect(move || {
                        black_box(s.get());
                    })
                })
                .collect();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(next);
            });

            for handle in handles {
                handle.stop();
            }
        });
    }
    group.finish();
}

fn computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");
    for depth in [1usize, 8, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let base = use_ref(0u64);
            let first = base.clone();
            let mut chain: Vec<Computed<u64>> = vec![computed(move || first.get() + 1)];
            for _ in 1..depth {
                let previous = chain[chain.len() - 1].clone();
                chain.push(computed(move || previous.get() + 1));
            }
            let tail = chain[chain.len() - 1].clone();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                base.set(next);
                black_box(tail.get())
            });
        });
    }
    group.finish();
}

fn same_value_writes(c: &mut Criterion) {
    let source = use_ref(String::from("unchanged"));
    let s = source.clone();
    let handle = watch_effect(move || {
        black_box(s.get());
    });

    c.bench_function("same_value_write", |b| {
        b.iter(|| source.set(String::from("unchanged")))
    });
    handle.stop();
}

criterion_group!(benches, ref_fan_out, computed_chain, same_value_writes);
criterion_main!(benches);
