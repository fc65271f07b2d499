use criterion::{
    black_box, criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion,
    PlotConfiguration,
};

use signal_control::config::TimingConfig;
use signal_control::flow_analyzer::TimingCalculator;

/// Deterministic count trace that sweeps every congestion level.
fn generate_count_trace(len: usize) -> Vec<i64> {
    (0..len).map(|i| ((i * 7) % 45) as i64).collect()
}

/// Benchmarks calculate() over traces of increasing length, with and without smoothing.
fn bench_calculate(c: &mut Criterion) {
    let trace_lengths = [100, 1_000, 10_000];

    let mut group = c.benchmark_group("Timing_Calculator_Benchmarks");
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &len in trace_lengths.iter() {
        let trace = generate_count_trace(len);

        for smoothing_enabled in [true, false] {
            let config = TimingConfig {
                smoothing_enabled,
                ..TimingConfig::default()
            };
            let name = if smoothing_enabled { "smoothed" } else { "raw" };
            group.bench_with_input(BenchmarkId::new(name, len), &trace, |b, trace| {
                b.iter(|| {
                    let mut calculator = TimingCalculator::new(config.clone()).unwrap();
                    for &count in trace {
                        black_box(calculator.calculate(black_box(count)).unwrap());
                    }
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_calculate);
criterion_main!(benches);
