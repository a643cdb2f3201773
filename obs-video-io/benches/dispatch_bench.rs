//! Benchmarks for obs-video-io
//!
//! Measures slot bookkeeping, end-to-end dispatch and software scaling.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use obs_video_io::cache::FrameCache;
use obs_video_io::{
    FrameBuffer, ScaleAlgorithm, SoftwareScaler, VideoData, VideoFormat, VideoOutput,
    VideoOutputInfo, VideoScaleInfo, VideoScaler,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const FRAME_TIME: u64 = 16_666_666;

fn info(width: u32, height: u32) -> VideoOutputInfo {
    VideoOutputInfo {
        name: "bench".to_string(),
        format: VideoFormat::NV12,
        fps_num: 60,
        fps_den: 1,
        width,
        height,
        cache_size: 16,
        ..Default::default()
    }
}

fn bench_cache_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_cycle");

    for repeat in [1u32, 4].iter() {
        let cache = FrameCache::new(&info(64, 64)).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(repeat), repeat, |b, &repeat| {
            let mut ts = 0u64;
            b.iter(|| {
                black_box(cache.acquire(repeat, ts));
                cache.commit();
                loop {
                    let pass = cache.next_pass();
                    if cache.release(&pass, FRAME_TIME).is_complete() {
                        break;
                    }
                }
                ts += FRAME_TIME;
            });
        });
    }

    group.finish();
}

fn bench_overrun_merge(c: &mut Criterion) {
    c.bench_function("overrun_merge", |b| {
        let cache = FrameCache::new(&info(64, 64)).unwrap();
        while cache.acquire(1, 0).is_some() {
            cache.commit();
        }

        // Every acquire now merges into the tail slot
        b.iter(|| black_box(cache.acquire(1, 0)));
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for consumers in [1usize, 4].iter() {
        let output = VideoOutput::open(info(1280, 720)).unwrap();
        let delivered = Arc::new(AtomicU64::new(0));

        for _ in 0..*consumers {
            let delivered = delivered.clone();
            output
                .connect(
                    None,
                    Arc::new(move |_: &VideoData<'_>| {
                        delivered.fetch_add(1, Ordering::Relaxed);
                    }),
                )
                .unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(consumers), consumers, |b, &consumers| {
            let mut ts = 0u64;
            b.iter(|| {
                let expected = delivered.load(Ordering::Relaxed) + consumers as u64;
                if output.lock_frame(1, ts).is_some() {
                    output.unlock_frame();
                    while delivered.load(Ordering::Relaxed) < expected {
                        std::hint::spin_loop();
                    }
                }
                ts += FRAME_TIME;
            });
        });
    }

    group.finish();
}

fn bench_software_scaler(c: &mut Criterion) {
    let mut group = c.benchmark_group("software_scaler");

    let cases = [
        ("nv12_1080p_to_720p_bilinear", VideoFormat::NV12, VideoFormat::NV12, (1280, 720), ScaleAlgorithm::Bilinear),
        ("nv12_1080p_to_720p_point", VideoFormat::NV12, VideoFormat::NV12, (1280, 720), ScaleAlgorithm::Point),
        ("nv12_to_i420_1080p", VideoFormat::NV12, VideoFormat::I420, (1920, 1080), ScaleAlgorithm::Default),
        ("uyvy_to_nv12_1080p", VideoFormat::UYVY, VideoFormat::NV12, (1920, 1080), ScaleAlgorithm::Default),
    ];

    for (name, from, to, (width, height), algorithm) in cases {
        let src_info = VideoScaleInfo::new(from, 1920, 1080);
        let dst_info = VideoScaleInfo::new(to, width, height);
        let mut scaler = SoftwareScaler::new(dst_info, src_info, algorithm).unwrap();

        let mut src = FrameBuffer::new(from, 1920, 1080).unwrap();
        for plane in 0..from.plane_count() {
            for (i, byte) in src.plane_mut(plane).iter_mut().enumerate() {
                *byte = (i % 251) as u8;
            }
        }
        let mut dst = FrameBuffer::new(to, width, height).unwrap();

        group.bench_function(name, |b| {
            b.iter(|| black_box(scaler.scale(&mut dst, &src.data(0))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cache_cycle,
    bench_overrun_merge,
    bench_dispatch,
    bench_software_scaler
);
criterion_main!(benches);
