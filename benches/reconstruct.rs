extern crate formscope;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use formscope::prelude::*;
use std::hint::black_box;

/// A straight-line function of `steps` dependent adds, with a store every eighth step.
fn arithmetic_chain(name: &str, steps: usize) -> Function {
    let mut b = FunctionBuilder::new(name);
    b.mov(Register::T0, Register::A0);
    for i in 0..steps {
        b.set(Register::T0, ExprKind::Add, [Register::T0.into(), Operand::Int(i as i64 + 1)]);
        if i % 8 == 7 {
            b.store(Register::A1, (i as i64) * 4, Register::T0, 4, StoreKind::Integer);
        }
    }
    b.mov(Register::V0, Register::T0);
    b.finish().expect("chain builds")
}

/// A counting loop wrapped in a sequence.
fn counting_loop(name: &str) -> (Function, Region) {
    let mut b = FunctionBuilder::new(name);
    b.mov(Register::V0, Operand::Int(0))
        .label("top")
        .branch(ConditionKind::Zero, [Register::A0.into()], "done")
        .set(Register::V0, ExprKind::Add, [Register::V0.into(), Register::A0.into()])
        .set(Register::A0, ExprKind::Sub, [Register::A0.into(), Operand::Int(1)])
        .jump("top")
        .label("done");
    let function = b.finish().expect("loop builds");
    let region = Region::Sequence(vec![
        Region::block(0),
        Region::Loop(vec![Region::block(1), Region::block(2)]),
        Region::block(3),
    ]);
    (function, region)
}

/// Benchmark a single function at increasing lengths
fn bench_reconstruct_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct_chain");
    for steps in [16usize, 128, 1024] {
        let function = arithmetic_chain("chain", steps);
        let env = StaticTypeEnv::new(&function);
        let region = Region::linear(&function);

        group.throughput(Throughput::Elements(function.instructions.len() as u64));
        group.bench_function(format!("{steps}_steps"), |b| {
            b.iter(|| {
                let engine = Reconstructor::new(EngineConfig::default());
                let out = engine
                    .reconstruct(black_box(&function), &region, &env)
                    .unwrap();
                black_box(out)
            });
        });
    }
    group.finish();
}

/// Benchmark control-structure recognition and rendering
fn bench_reconstruct_loop(c: &mut Criterion) {
    let (function, region) = counting_loop("sum-down");
    let env = StaticTypeEnv::new(&function);

    c.bench_function("reconstruct_loop", |b| {
        b.iter(|| {
            let engine = Reconstructor::new(EngineConfig::default());
            let out = engine.reconstruct(black_box(&function), &region, &env).unwrap();
            black_box(out.render(&function, &env, &engine.config().operators))
        });
    });
}

/// Benchmark the parallel batch driver over many independent functions
fn bench_reconstruct_batch(c: &mut Criterion) {
    let jobs: Vec<FunctionJob> = (0..64)
        .map(|i| FunctionJob::linear(arithmetic_chain(&format!("chain-{i}"), 64)))
        .collect();

    let mut group = c.benchmark_group("reconstruct_batch");
    group.throughput(Throughput::Elements(jobs.len() as u64));
    group.bench_function("64_functions", |b| {
        b.iter(|| {
            let engine = Reconstructor::new(EngineConfig::default());
            let report = engine.reconstruct_batch(black_box(&jobs));
            black_box(report.len())
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_reconstruct_chain,
    bench_reconstruct_loop,
    bench_reconstruct_batch
);
criterion_main!(benches);
