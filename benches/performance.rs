// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use polyscad::{render, CsgTree, Interpreter, Program, Resolver};

const COMPLEX: &str = r#"
    $fn = 32;
    module post(h) { cylinder(h = h, r = 1); }
    difference() {
        cube([20, 20, 20]);
        translate([10, 10, 10]) sphere(r = 15);
        for (i = [0:3]) rotate([0, 0, i * 90]) translate([5, 0, 0]) post(30);
    }
"#;

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    let simple = "cube([10, 10, 10]);";
    group.bench_with_input(BenchmarkId::new("simple_cube", ""), &simple, |b, source| {
        b.iter(|| polyscad::parse_scad(black_box(source), None).unwrap());
    });

    group.bench_with_input(BenchmarkId::new("complex", ""), &COMPLEX, |b, source| {
        b.iter(|| polyscad::parse_scad(black_box(source), None).unwrap());
    });

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    group.bench_function("complex", |b| {
        b.iter(|| render(black_box(COMPLEX)).unwrap());
    });

    for n in [10usize, 50, 200] {
        let source = format!(
            "function sum(v, i = 0) = i >= len(v) ? 0 : v[i] + sum(v, i + 1);\n\
             echo(sum([for (i = [1:{}]) i]));",
            n
        );
        let program = Program::from_source(&source, None, &Resolver::default()).unwrap();
        group.bench_with_input(BenchmarkId::new("recursive_sum", n), &program, |b, program| {
            let interpreter = Interpreter::default();
            b.iter(|| {
                let mut tree = CsgTree::new();
                interpreter.evaluate(black_box(program), &mut tree).unwrap()
            });
        });
    }

    let grid = "for (x = [0:19], y = [0:19]) translate([x * 2, y * 2, 0]) cube(1);";
    group.bench_function("grid_400", |b| {
        b.iter(|| render(black_box(grid)).unwrap());
    });

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let programs: Vec<Program> = (0..32)
        .map(|i| {
            let source = format!("for (k = [0:{}]) translate([k, 0, 0]) sphere(1);", i);
            Program::from_source(&source, None, &Resolver::default()).unwrap()
        })
        .collect();
    let interpreter = Interpreter::default();

    c.bench_function("batch_32_programs", |b| {
        b.iter(|| interpreter.evaluate_batch(black_box(&programs)));
    });
}

criterion_group!(benches, bench_parse, bench_evaluate, bench_batch);
criterion_main!(benches);
