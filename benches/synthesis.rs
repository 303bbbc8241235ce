//! Benchmarks for constraint-to-tree synthesis.
//!
//! The dominant cost of a synthesis run is the repeated deep-copy-and-verify
//! trial: each trial clones the working tree and re-checks the whole
//! constraint set. These benchmarks size that cost for the common input
//! shapes: a linear chain (no relaxation needed), a wide fan-out (heavy
//! sequence relaxation), and a cyclic graph (loop extraction plus
//! regeneration).

#![allow(unused)]
extern crate flowforge;

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use flowforge::{Constraint, Relation, Synthesizer};

/// t0 > t1 > ... > tn as pairwise adjacent constraints.
fn chain(n: usize) -> Vec<Constraint> {
    (0..n)
        .map(|i| Constraint::new(Relation::Before, &format!("t{i}"), &format!("t{}", i + 1)))
        .collect()
}

/// One root fanning out to n unordered tasks that all join at a sink.
fn fan(n: usize) -> Vec<Constraint> {
    let mut constraints = Vec::with_capacity(2 * n);
    for i in 0..n {
        constraints.push(Constraint::new(Relation::Before, "source", &format!("t{i}")));
        constraints.push(Constraint::new(Relation::Before, &format!("t{i}"), "sink"));
    }
    constraints
}

/// An n-task cycle with one non-loop successor.
fn cycle(n: usize) -> Vec<Constraint> {
    let mut constraints: Vec<Constraint> = (0..n)
        .map(|i| {
            Constraint::new(
                Relation::Before,
                &format!("t{i}"),
                &format!("t{}", (i + 1) % n),
            )
        })
        .collect();
    constraints.push(Constraint::new(
        Relation::Before,
        &format!("t{}", n - 1),
        "done",
    ));
    constraints
}

fn bench_linear_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    for size in [8, 16, 32] {
        let constraints = chain(size);
        group.bench_function(format!("{size}_tasks"), |b| {
            b.iter(|| {
                let tree = Synthesizer::default()
                    .synthesize(black_box(constraints.clone()), Vec::new())
                    .unwrap();
                black_box(tree)
            });
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for size in [4, 8, 12] {
        let constraints = fan(size);
        group.bench_function(format!("{size}_branches"), |b| {
            b.iter(|| {
                let tree = Synthesizer::default()
                    .synthesize(black_box(constraints.clone()), Vec::new())
                    .unwrap();
                black_box(tree)
            });
        });
    }
    group.finish();
}

fn bench_loop_synthesis(c: &mut Criterion) {
    let mut group = c.benchmark_group("loop");
    for size in [3, 6, 9] {
        let constraints = cycle(size);
        group.bench_function(format!("{size}_member_cycle"), |b| {
            b.iter(|| {
                let tree = Synthesizer::default()
                    .synthesize(black_box(constraints.clone()), Vec::new())
                    .unwrap();
                black_box(tree)
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_linear_chain,
    bench_fan_out,
    bench_loop_synthesis
);
criterion_main!(benches);
