use criterion::{black_box, criterion_group, criterion_main, Criterion};
use inference_engine::ProbabilityBuffer;
use lane_departure::{FramePreprocessor, MaskBuilder, PixelFormat, RawFrame, Rotation};

fn bench_mask_scan(c: &mut Criterion) {
    let values: Vec<f32> = (0..80 * 160).map(|i| (i % 97) as f32 / 96.0).collect();
    let probs = ProbabilityBuffer::new(values, 80, 160).unwrap();
    let builder = MaskBuilder::new(0.7, 120);

    c.bench_function("mask_scan_80x160", |b| b.iter(|| builder.build(black_box(&probs))));
}

fn bench_prepare(c: &mut Criterion) {
    let len = RawFrame::expected_len(PixelFormat::Nv21, 640, 480);
    let frame = RawFrame::new(vec![128; len], 640, 480, PixelFormat::Nv21, Rotation::Deg90);
    let preprocessor = FramePreprocessor::new(80, 160);

    c.bench_function("prepare_nv21_640x480", |b| {
        b.iter(|| preprocessor.prepare(black_box(&frame)).unwrap())
    });
}

criterion_group!(benches, bench_mask_scan, bench_prepare);
criterion_main!(benches);
