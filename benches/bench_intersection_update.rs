use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use signal_control::config::ControlConfig;
use signal_control::control_system::IntersectionController;

/// Builds a running intersection with `signals` signals, the first four on compass lanes.
fn build_intersection(signals: usize) -> IntersectionController {
    let mut intersection = IntersectionController::four_way(ControlConfig::default()).unwrap();
    for i in 4..signals {
        intersection
            .register_signal(&format!("signal_{}", i), None)
            .unwrap();
    }
    intersection.select_lane("north").unwrap();
    intersection.start();
    intersection
}

/// Benchmarks one 250 ms tick with a fresh reading on every signal.
fn bench_intersection_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("Intersection_Update_Benchmarks");
    for &signals in [4usize, 16, 64].iter() {
        let mut intersection = build_intersection(signals);
        let ids: Vec<String> = intersection.signal_ids().map(str::to_string).collect();
        let mut tick = 0i64;
        group.bench_with_input(BenchmarkId::new("update", signals), &signals, |b, _| {
            b.iter(|| {
                tick += 1;
                for id in &ids {
                    intersection.update_vehicle_count(id, tick % 40).unwrap();
                }
                black_box(intersection.update(Duration::from_millis(250)));
            });
        });
    }
    group.finish();
}

/// Benchmarks an emergency request, the tick that honours it, and the clear.
fn bench_emergency_round_trip(c: &mut Criterion) {
    let mut intersection = build_intersection(4);
    c.bench_function("emergency_round_trip", |b| {
        b.iter(|| {
            intersection
                .force_emergency(black_box("east"), "Ambulance detected")
                .unwrap();
            black_box(intersection.update(Duration::from_millis(250)));
            intersection.clear_emergency("east").unwrap();
        });
    });
}

criterion_group!(benches, bench_intersection_update, bench_emergency_round_trip);
criterion_main!(benches);
