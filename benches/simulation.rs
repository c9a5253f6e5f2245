//! Benchmarks for the Breakshot engine
//!
//! Measures performance of:
//! - Break shot simulation (with and without frame capture)
//! - Random mid-game shots
//! - AI shot search by difficulty

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use breakshot::{
    ai::choose_shot,
    game::{table::DEFAULT_SCALE, CaptureOptions, Engine, RawShot, ShotInput, Side},
};

fn break_input(engine: &Engine) -> ShotInput {
    let raw = RawShot {
        direction: [1.0, 0.0],
        power: 5000.0,
        ..RawShot::default()
    };
    ShotInput::from_raw(&raw, engine.table().max_power).unwrap()
}

/// Benchmark the break from a fresh rack
fn bench_break(c: &mut Criterion) {
    let mut group = c.benchmark_group("break_shot");
    let engine = Engine::new(42, DEFAULT_SCALE).unwrap();
    let input = break_input(&engine);

    group.bench_function("no_capture", |b| {
        b.iter(|| {
            let mut e = engine.clone();
            black_box(e.apply_shot(Side::P1, black_box(&input), None).unwrap())
        })
    });
    group.bench_function("capture", |b| {
        b.iter(|| {
            let mut e = engine.clone();
            black_box(
                e.apply_shot(Side::P1, black_box(&input), Some(CaptureOptions::default()))
                    .unwrap(),
            )
        })
    });
    group.finish();
}

/// Benchmark random shots on a broken table
fn bench_random_shots(c: &mut Criterion) {
    let mut engine = Engine::new(7, DEFAULT_SCALE).unwrap();
    let input = break_input(&engine);
    engine.apply_shot(Side::P1, &input, None).unwrap();

    let mut rng = StdRng::seed_from_u64(2024);
    let shots: Vec<ShotInput> = (0..32)
        .filter_map(|_| {
            let angle: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
            let raw = RawShot {
                direction: [angle.cos(), angle.sin()],
                power: rng.gen_range(500.0..6000.0),
                screw: rng.gen_range(-1.0..1.0),
                english: rng.gen_range(-1.0..1.0),
                cue_ball_position: None,
            };
            ShotInput::from_raw(&raw.rounded(), engine.table().max_power).ok()
        })
        .filter(|s| engine.validate_shot(engine.turn(), s, None).is_ok())
        .collect();

    c.bench_function("random_shots", |b| {
        b.iter(|| {
            for shot in &shots {
                let mut e = engine.clone();
                black_box(e.apply_shot(e.turn(), shot, None).ok());
            }
        })
    });
}

/// Benchmark AI search at several difficulties
fn bench_ai_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("ai_search");
    group.sample_size(10);
    let snapshot = Engine::new(11, DEFAULT_SCALE).unwrap().snapshot();

    for &difficulty in &[1u8, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(difficulty), &difficulty, |b, &d| {
            b.iter(|| black_box(choose_shot(&snapshot, Side::P1, d).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_break, bench_random_shots, bench_ai_search);
criterion_main!(benches);
