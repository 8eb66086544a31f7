//! Throughput of the stretch kernels, tempo analysis and marker engine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use beatstretch::analysis::{analyze_key, KeyOptions};
use beatstretch::stretch::params::StretchMode;
use beatstretch::{analyze_bpm, AnalysisOptions, Marker, MarkerData, MarkerStretchEngine, TimeStretchProcessor};

const SR: u32 = 44_100;

fn sine(seconds: usize) -> Vec<f32> {
    (0..SR as usize * seconds)
        .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / SR as f32).sin() * 0.5)
        .collect()
}

fn clicks(seconds: usize) -> Vec<f32> {
    let mut samples = sine(seconds);
    samples.iter_mut().for_each(|s| *s *= 0.05);
    for pos in (1_000..samples.len()).step_by(22_050) {
        samples[pos] += 1.0;
    }
    samples
}

fn bench_stretch_modes(c: &mut Criterion) {
    let input = sine(5);
    let mut group = c.benchmark_group("stretch_5s");
    for mode in [StretchMode::PitchPreserving, StretchMode::SimpleInterpolation] {
        for factor in [0.8f32, 1.25] {
            let id = BenchmarkId::new(format!("{:?}", mode), factor);
            group.bench_with_input(id, &factor, |b, &factor| {
                let mut processor = TimeStretchProcessor::default();
                b.iter(|| processor.process_with_mode(black_box(&input), factor, mode));
            });
        }
    }
    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let samples = clicks(30);
    let options = AnalysisOptions::default();
    c.bench_function("analyze_bpm_30s", |b| {
        b.iter(|| analyze_bpm(black_box(&samples), SR, &options));
    });

    let tonal = sine(10);
    let key_options = KeyOptions::default();
    c.bench_function("analyze_key_10s", |b| {
        b.iter(|| analyze_key(black_box(&tonal), SR, &key_options));
    });
}

fn bench_marker_engine(c: &mut Criterion) {
    let audio = vec![sine(10), sine(10)];
    let markers: Vec<Marker> = vec![
        MarkerData::fixed(0, SR).into(),
        MarkerData::new(110_250, SR).with_position(120_000, SR).into(),
        MarkerData::new(220_500, SR).with_position(215_000, SR).into(),
        MarkerData::new(330_750, SR).with_position(340_000, SR).into(),
    ];
    let mut engine = MarkerStretchEngine::new();
    c.bench_function("marker_stretch_10s_stereo", |b| {
        b.iter(|| engine.apply_time_stretch(black_box(&audio), &markers, SR));
    });
}

criterion_group!(benches, bench_stretch_modes, bench_analysis, bench_marker_engine);
criterion_main!(benches);
