use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gpufits::{transpose, CorrelatorContext, VisLayout, VisShape};
use tempfile::tempdir;

#[path = "../src/test_common.rs"]
mod test_common;
use test_common::{write_test_observation, TestObs};

/// 128 antennas, 128 fine channels
const SHAPE_128T: VisShape = VisShape {
    num_baselines: 8256,
    num_fine_chans: 128,
    num_visibility_pols: 4,
};

fn bench_transpose_128t(crt: &mut Criterion) {
    let src: Vec<f32> = (0..SHAPE_128T.num_floats()).map(|x| x as f32).collect();
    let mut dst = vec![0.0; SHAPE_128T.num_floats()];

    crt.bench_function("transpose - 128T by baseline to by frequency", |bch| {
        bch.iter(|| {
            transpose(
                black_box(&SHAPE_128T),
                black_box(&src),
                VisLayout::ByBaseline,
                black_box(&mut dst),
                VisLayout::ByFrequency,
            )
            .unwrap();
        });
    });
}

fn bench_read_128t(crt: &mut Criterion) {
    let tmp_dir = tempdir().unwrap();
    let obs = TestObs::mwax_128t();
    let (metafits, gpuboxes) = write_test_observation(tmp_dir.path(), &obs).unwrap();
    let context = CorrelatorContext::new(&metafits, &gpuboxes).unwrap();
    let mut buffer = vec![0.0; context.metadata().num_timestep_coarse_chan_floats];

    crt.bench_function("read_by_baseline_into_buffer - 128T native", |bch| {
        bch.iter(|| {
            context
                .read_by_baseline_into_buffer(black_box(0), black_box(0), &mut buffer)
                .unwrap();
        });
    });
    crt.bench_function("read_by_frequency_into_buffer - 128T transposed", |bch| {
        bch.iter(|| {
            context
                .read_by_frequency_into_buffer(black_box(0), black_box(0), &mut buffer)
                .unwrap();
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets =
        bench_transpose_128t,
        bench_read_128t,
);
criterion_main!(benches);
