//! Benchmarks for frame validation and channel routing
//!
//! Every captured frame passes through the router, so the accept and the
//! reject paths both matter:
//! - Video frames carrying full-size RTP packets
//! - Frames for a foreign link that must be rejected cheaply
//!
//! Platform: Cross-platform (synthetic frames, CI-safe)

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use fpvlink::router::ChannelRouter;
use fpvlink::test_utils::{build_wfb_frame, rtp_wrap};
use fpvlink::{Channel, LinkConfig, LogicalChannelId};
use std::hint::black_box;

fn bench_route(c: &mut Criterion) {
    let config = LinkConfig::default();
    let router = ChannelRouter::from_config(&config);
    let packet = rtp_wrap(7, false, &[0x5A; 1400]);
    let video = build_wfb_frame(config.channel_id(Channel::Video), &packet);
    let telemetry = build_wfb_frame(config.channel_id(Channel::Telemetry), &[0x01; 64]);
    let foreign = build_wfb_frame(LogicalChannelId::new(1, 0), &packet);

    let mut group = c.benchmark_group("route");
    group.throughput(Throughput::Elements(1));

    group.bench_function("video", |b| b.iter(|| black_box(router.route(black_box(&video)))));
    group.bench_function("telemetry", |b| {
        b.iter(|| black_box(router.route(black_box(&telemetry))))
    });
    group.bench_function("foreign_link", |b| {
        b.iter(|| black_box(router.route(black_box(&foreign))))
    });

    group.finish();
}

criterion_group!(benches, bench_route);
criterion_main!(benches);
