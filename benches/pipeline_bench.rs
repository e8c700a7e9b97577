//! Benchmarks for the ingestion and telemetry paths
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use posebridge::ingest::IngestQueue;
use posebridge::media::{FrameDecoder, FrameEnvelope};
use posebridge::skeleton::{
    JointFilter, LatestSnapshots, SkeletonId, SkeletonKind, SnapshotBuilder, SyntheticTracker,
};
use posebridge::telemetry::{PublishFilters, TelemetryEnvelope};

fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");
    let decoder = FrameDecoder::new();

    for size in [16 * 1024, 64 * 1024, 256 * 1024] {
        let bytes = payload(size);
        let envelope = serde_json::to_string(&FrameEnvelope::rgb_image(&bytes, 1280, 720)).unwrap();
        let bare = FrameEnvelope::rgb_image(&bytes, 0, 0).data.unwrap();

        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("envelope_{}k", size / 1024), |b| {
            b.iter(|| decoder.decode(black_box(&envelope)).unwrap())
        });

        group.bench_function(format!("bare_{}k", size / 1024), |b| {
            b.iter(|| decoder.decode(black_box(&bare)).unwrap())
        });
    }

    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let tracker = SyntheticTracker::new();
    let builder = SnapshotBuilder::new(
        JointFilter::all(SkeletonKind::Hand),
        JointFilter::all(SkeletonKind::Body),
    );

    let mut latest = LatestSnapshots::default();
    for skeleton in [SkeletonId::LEFT_HAND, SkeletonId::RIGHT_HAND, SkeletonId::Body] {
        latest.set(builder.build(&tracker, skeleton));
    }

    let filters = PublishFilters::default();
    c.bench_function("telemetry_envelope", |b| {
        b.iter(|| {
            TelemetryEnvelope::from_snapshots(black_box(&latest), &filters)
                .to_json()
                .unwrap()
        })
    });
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_queue");
    let batch = 1000;
    group.throughput(Throughput::Elements(batch as u64));

    group.bench_function("enqueue_drain_1000", |b| {
        let (producer, mut queue) = IngestQueue::new(usize::MAX);
        b.iter(|| {
            for i in 0..batch {
                producer.enqueue(black_box(i));
            }
            queue.try_dequeue_all()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_envelope, bench_queue);
criterion_main!(benches);
