//! Benchmarks for NAL unit reassembly
//!
//! Covers the per-packet hot path between the aggregator and the decoder:
//! - RTP header parsing
//! - FU-A/FU reassembly of keyframe-sized units
//! - Single-unit passthrough for small slices
//!
//! Platform: Cross-platform (synthetic streams, CI-safe)

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use fpvlink::CodecFamily;
use fpvlink::reassembler::Reassembler;
use fpvlink::rtp;
use fpvlink::test_utils::{H264_SLICE, fu_fragments_h264, fu_fragments_h265, rtp_wrap};
use std::hint::black_box;

/// Keyframe-sized unit with a valid header for `family`
fn keyframe(family: CodecFamily, len: usize) -> Vec<u8> {
    let mut unit = match family {
        CodecFamily::H264 => vec![0x65],
        CodecFamily::H265 => vec![0x26, 0x01],
    };
    unit.extend((0..len).map(|i| (i % 251) as u8));
    unit
}

fn bench_rtp_parse(c: &mut Criterion) {
    let packet = rtp_wrap(42, true, &[0xAB; 1400]);

    let mut group = c.benchmark_group("rtp");
    group.throughput(Throughput::Bytes(packet.len() as u64));
    group.bench_function("payload", |b| b.iter(|| black_box(rtp::payload(black_box(&packet)))));
    group.finish();
}

fn bench_fragmented_keyframes(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragmented_keyframe");

    for (name, family, fragments) in [
        ("h264_200k", CodecFamily::H264, fu_fragments_h264(&keyframe(CodecFamily::H264, 200_000), 1400)),
        ("h265_200k", CodecFamily::H265, fu_fragments_h265(&keyframe(CodecFamily::H265, 200_000), 1400)),
    ] {
        let total: usize = fragments.iter().map(Vec::len).sum();
        group.throughput(Throughput::Bytes(total as u64));
        group.bench_function(name, |b| {
            b.iter_batched(
                || Reassembler::new(family),
                |mut reassembler| {
                    let mut emitted = None;
                    for fragment in &fragments {
                        emitted = reassembler.on_fragment(black_box(fragment));
                    }
                    black_box(emitted)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_single_units(c: &mut Criterion) {
    let mut reassembler = Reassembler::new(CodecFamily::H264);

    c.bench_function("single_unit_slice", |b| {
        b.iter(|| black_box(reassembler.on_fragment(black_box(H264_SLICE))))
    });
}

criterion_group!(benches, bench_rtp_parse, bench_fragmented_keyframes, bench_single_units);
criterion_main!(benches);
