//! Output drain task

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{DecodedFrame, DecoderEvent, DecoderState, HardwareDecoder, OutputStatus, VideoRatio};
use crate::stats::StatisticsAggregator;
use crate::types::StatsSnapshot;

pub(super) struct DrainContext {
    pub codec: Arc<dyn HardwareDecoder>,
    pub stats: Arc<StatisticsAggregator>,
    pub state: Arc<watch::Sender<DecoderState>>,
    pub ratio: Arc<watch::Sender<VideoRatio>>,
    pub events: mpsc::Sender<DecoderEvent>,
    pub cancel: CancellationToken,
    pub epoch: Instant,
    pub output_timeout: Duration,
    pub stats_interval: Duration,
}

enum Exit {
    Cancelled,
    EndOfStream,
    Fault(i32),
}

impl DrainContext {
    /// Non-blocking handoff; a lagging consumer loses events
    fn emit(&self, event: DecoderEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => trace!("Event queue full, dropping event"),
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn stop(&self) {
        self.state.send_replace(DecoderState::Stopping);
        self.state.send_replace(DecoderState::Stopped);
        self.emit(DecoderEvent::Stopped);
    }
}

pub(super) async fn run(ctx: DrainContext) {
    info!("Drain task started");
    let mut ratio = VideoRatio::default();
    let mut frames = 0u64;

    let exit = loop {
        let status = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break Exit::Cancelled,
            status = ctx.codec.dequeue_output(ctx.output_timeout) => status,
        };

        match status {
            OutputStatus::Buffer(buffer) => {
                let now = Instant::now();
                if !buffer.data.is_empty() {
                    frames += 1;
                    ctx.emit(DecoderEvent::Frame(DecodedFrame { data: buffer.data, ratio }));
                }
                // Never hold a frame back
                ctx.codec.release_output(buffer.index, now);

                let submitted = ctx.epoch + Duration::from_micros(buffer.presentation_time_us);
                ctx.stats.record_decoded(now.saturating_duration_since(submitted));

                if buffer.end_of_stream {
                    break Exit::EndOfStream;
                }
            }
            OutputStatus::FormatChanged => {
                let format = ctx.codec.output_format();
                debug!("Output format changed to {}", format);
                if format.is_known() && format != ratio {
                    ratio = format;
                    ctx.ratio.send_replace(ratio);
                    ctx.emit(DecoderEvent::RatioChanged(ratio));
                }
            }
            OutputStatus::BuffersChanged => debug!("Output buffers changed"),
            OutputStatus::TryAgain => {}
            OutputStatus::Error(code) => break Exit::Fault(code),
        }

        if let Some(snapshot) = ctx.stats.maybe_recompute(Instant::now(), ctx.stats_interval) {
            log_latency(&snapshot);
            ctx.emit(DecoderEvent::InfoChanged(snapshot));
        }
    };

    match exit {
        Exit::Cancelled => info!("Drain task cancelled after {} frames", frames),
        _ if ctx.cancel.is_cancelled() => info!("Drain task ended during teardown"),
        Exit::EndOfStream => {
            info!("Decoder reached end of stream");
            ctx.stop();
        }
        Exit::Fault(code) => {
            warn!(code, "Decoder produced an unrecoverable status, stopping");
            ctx.stop();
        }
    }
    info!("Drain task ended ({} frames)", frames);
}

fn log_latency(snapshot: &StatsSnapshot) {
    debug!(
        parse_ms = snapshot.avg_parse_ms,
        wait_input_ms = snapshot.avg_wait_input_ms,
        decode_ms = snapshot.avg_decode_ms,
        total_ms = snapshot.total_latency_ms(),
        nalus = snapshot.nalus_observed,
        fed = snapshot.nalus_fed,
        decoded = snapshot.frames_decoded,
        fps = snapshot.fps,
        "Decoding latency averages"
    );
}
