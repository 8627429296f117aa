//! Link session controller
//!
//! A [`LinkSession`] is one capture loop bound to one radio channel. The
//! loop owns its capture source, the per-channel aggregators and the NAL
//! reassembler, and feeds completed units into the shared
//! [`DecoderDriver`]. Stopping is cooperative: [`LinkSession::stop`] trips a
//! cancellation token the loop checks before every read.
//!
//! [`LinkController`] layers the operator's channel selection on top and
//! implements the switch protocol (stop, join, start on the new channel)
//! without touching the decoder.

mod controller;

pub use controller::LinkController;

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::LinkConfig;
use crate::decoder::DecoderDriver;
use crate::reassembler::{Reassembler, ReassemblerStats};
use crate::router::ChannelRouter;
use crate::rtp;
use crate::transport::{Aggregator, AggregatorFactory, CaptureSource, Transport};
use crate::types::{CapturedFrame, Channel};
use crate::{LinkError, Result};

/// Everything a session needs, shared across channel switches
#[derive(Clone)]
pub struct LinkContext {
    pub config: Arc<LinkConfig>,
    pub router: ChannelRouter,
    pub transport: Arc<dyn Transport>,
    pub aggregators: Arc<dyn AggregatorFactory>,
    pub decoder: Arc<DecoderDriver>,
    /// Sink for opaque telemetry payloads
    pub telemetry: Option<mpsc::Sender<Bytes>>,
}

impl LinkContext {
    pub fn new(
        config: LinkConfig,
        transport: Arc<dyn Transport>,
        aggregators: Arc<dyn AggregatorFactory>,
        decoder: Arc<DecoderDriver>,
    ) -> Self {
        let router = ChannelRouter::from_config(&config);
        Self { config: Arc::new(config), router, transport, aggregators, decoder, telemetry: None }
    }

    pub fn with_telemetry(mut self, sink: mpsc::Sender<Bytes>) -> Self {
        self.telemetry = Some(sink);
        self
    }
}

/// Counters for one finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub radio_channel: u16,
    pub frames_seen: u64,
    /// Frames failing validation or carrying a foreign channel id
    pub frames_rejected: u64,
    pub video_packets: u64,
    pub telemetry_packets: u64,
    /// Plaintext video fragments out of the aggregator
    pub fragments: u64,
    /// Video fragments with an unparseable RTP header
    pub rtp_rejected: u64,
    pub nalus: u64,
    /// Telemetry payloads dropped because the sink was full or gone
    pub telemetry_dropped: u64,
    pub reassembly: ReassemblerStats,
}

/// A running capture loop on one radio channel
pub struct LinkSession {
    radio_channel: u16,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<SessionSummary>>>,
}

impl LinkSession {
    /// Claim the transport on `radio_channel` and spawn the capture loop.
    ///
    /// Transport and aggregator failures are returned here; nothing is
    /// retried.
    pub async fn start(ctx: &LinkContext, radio_channel: u16) -> Result<Self> {
        let video = ctx.aggregators.create(Channel::Video, ctx.router.channel_id(Channel::Video))?;
        let telemetry =
            ctx.aggregators.create(Channel::Telemetry, ctx.router.channel_id(Channel::Telemetry))?;

        let source = match ctx.transport.open(radio_channel).await {
            Ok(source) => source,
            Err(e) => {
                error!(radio_channel, "Failed to open transport: {}", e);
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let capture = CaptureLoop {
            ctx: ctx.clone(),
            source,
            video,
            telemetry,
            reassembler: Reassembler::with_max_size(ctx.config.codec, ctx.config.max_nal_size),
            summary: SessionSummary { radio_channel, ..Default::default() },
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(capture.run());

        info!(radio_channel, "Link session started");
        Ok(Self { radio_channel, cancel, task: Some(task) })
    }

    pub fn radio_channel(&self) -> u16 {
        self.radio_channel
    }

    /// Ask the capture loop to exit; does not wait
    pub fn stop(&self) {
        debug!(radio_channel = self.radio_channel, "Stopping link session");
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Wait for the capture loop to exit and release its transport
    pub async fn wait(mut self) -> Result<SessionSummary> {
        let Some(task) = self.task.take() else {
            return Err(LinkError::invalid_state("wait", "already joined"));
        };
        task.await.map_err(|e| {
            LinkError::transport_failed_with_source("capture loop panicked", Box::new(e))
        })?
    }
}

impl Drop for LinkSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct CaptureLoop {
    ctx: LinkContext,
    source: Box<dyn CaptureSource>,
    video: Box<dyn Aggregator>,
    telemetry: Box<dyn Aggregator>,
    reassembler: Reassembler,
    summary: SessionSummary,
    cancel: CancellationToken,
}

impl CaptureLoop {
    async fn run(mut self) -> Result<SessionSummary> {
        let radio_channel = self.summary.radio_channel;
        let result = loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(radio_channel, "Capture loop cancelled");
                    break Ok(());
                }
                frame = self.source.next_frame() => frame,
            };

            match frame {
                Ok(Some(frame)) => self.dispatch(frame).await,
                Ok(None) => {
                    info!(radio_channel, "Capture source ended");
                    break Ok(());
                }
                Err(e) => {
                    error!(radio_channel, "Capture failed: {}", e);
                    break Err(e);
                }
            }
        };

        self.source.close().await;
        self.summary.reassembly = self.reassembler.stats();
        info!(
            radio_channel,
            frames = self.summary.frames_seen,
            rejected = self.summary.frames_rejected,
            nalus = self.summary.nalus,
            "Link session ended"
        );
        result.map(|()| self.summary)
    }

    async fn dispatch(&mut self, frame: CapturedFrame) {
        self.summary.frames_seen += 1;
        let Some(packet) = self.ctx.router.route(&frame) else {
            self.summary.frames_rejected += 1;
            return;
        };

        match packet.channel {
            Channel::Video => {
                self.summary.video_packets += 1;
                for fragment in self.video.process_packet(&packet) {
                    self.on_video_fragment(&fragment).await;
                }
            }
            Channel::Telemetry => {
                self.summary.telemetry_packets += 1;
                for payload in self.telemetry.process_packet(&packet) {
                    self.forward_telemetry(payload);
                }
            }
        }
    }

    async fn on_video_fragment(&mut self, fragment: &[u8]) {
        self.summary.fragments += 1;
        let data = if self.ctx.config.rtp_framing {
            match rtp::payload(fragment) {
                Some(payload) => payload,
                None => {
                    trace!(len = fragment.len(), "Dropping malformed RTP packet");
                    self.summary.rtp_rejected += 1;
                    return;
                }
            }
        } else {
            fragment
        };

        let Some(nalu) = self.reassembler.on_fragment(data) else {
            return;
        };
        self.summary.nalus += 1;
        if let Err(e) = self.ctx.decoder.feed(nalu).await {
            warn!("Decoder bring-up failed, waiting for more parameter sets: {}", e);
        }
    }

    fn forward_telemetry(&mut self, payload: Bytes) {
        let Some(sink) = &self.ctx.telemetry else {
            return;
        };
        if sink.try_send(payload).is_err() {
            trace!("Telemetry sink unavailable, dropping payload");
            self.summary.telemetry_dropped += 1;
        }
    }
}
