//! Decoder driver: lifecycle, keyframe-gated bring-up and the feed path

use futures::Stream;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::drain::{self, DrainContext};
use super::{
    DecoderEvent, DecoderFactory, DecoderState, HardwareDecoder, InputStatus, VideoRatio,
    timestamp_us,
};
use crate::config::DecoderSettings;
use crate::keyframe::{CodecConfig, KeyframeGate};
use crate::stats::StatisticsAggregator;
use crate::types::{CodecFamily, Nalu, START_CODE, StatsSnapshot};
use crate::{LinkError, Result};

/// Receiving side of a driver's notifications
pub struct DecoderChannels {
    /// Frames, ratio changes and stats snapshots from the drain task
    pub events: mpsc::Receiver<DecoderEvent>,
    /// Latest decoder state
    pub state: watch::Receiver<DecoderState>,
    /// Latest published stats snapshot
    pub stats: watch::Receiver<Arc<StatsSnapshot>>,
    /// Latest known output dimensions, unaffected by event backpressure
    pub ratio: watch::Receiver<VideoRatio>,
}

/// What happened to a unit passed to [`DecoderDriver::feed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Submitted to a decoder input slot
    Queued,
    /// Completed the parameter sets and brought the decoder up
    Configured,
    /// Stored as a parameter set, not submitted
    Cached,
    /// Input slots stayed busy past the feed deadline
    TimedOut,
    /// Dropped: too short, wrong state, or rejected by the device
    Skipped,
}

struct ActiveDecoder {
    codec: Arc<dyn HardwareDecoder>,
    family: CodecFamily,
    drain: JoinHandle<()>,
    cancel: CancellationToken,
}

struct Inner {
    pipe_closed: bool,
    gate: KeyframeGate,
    active: Option<ActiveDecoder>,
}

/// Owns one hardware decoder session at a time.
///
/// `feed`, `init` and `deinit` serialize on a single lock covering the
/// pipe-closed flag, the parameter-set cache and the active device. The drain
/// task runs outside it and is always joined by `deinit` before the device
/// is released.
pub struct DecoderDriver {
    factory: Arc<dyn DecoderFactory>,
    settings: DecoderSettings,
    stats: Arc<StatisticsAggregator>,
    state: Arc<watch::Sender<DecoderState>>,
    ratio: Arc<watch::Sender<VideoRatio>>,
    events: mpsc::Sender<DecoderEvent>,
    epoch: Instant,
    inner: Mutex<Inner>,
}

impl DecoderDriver {
    pub fn new(
        factory: Arc<dyn DecoderFactory>,
        settings: DecoderSettings,
    ) -> (Self, DecoderChannels) {
        let (events_tx, events_rx) = mpsc::channel(settings.event_queue.max(1));
        let (state_tx, state_rx) = watch::channel(DecoderState::Uninitialized);
        let (ratio_tx, ratio_rx) = watch::channel(VideoRatio::default());
        let stats = Arc::new(StatisticsAggregator::new(settings.latency_window));
        let channels = DecoderChannels {
            events: events_rx,
            state: state_rx,
            stats: stats.subscribe(),
            ratio: ratio_rx,
        };

        let driver = Self {
            factory,
            settings,
            stats,
            state: Arc::new(state_tx),
            ratio: Arc::new(ratio_tx),
            events: events_tx,
            epoch: Instant::now(),
            inner: Mutex::new(Inner {
                pipe_closed: true,
                gate: KeyframeGate::new(),
                active: None,
            }),
        };
        (driver, channels)
    }

    pub fn state(&self) -> DecoderState {
        *self.state.borrow()
    }

    pub fn state_updates(&self) -> impl Stream<Item = DecoderState> + 'static {
        WatchStream::new(self.state.subscribe())
    }

    /// Live counters with the most recent derived rates
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_updates(&self) -> impl Stream<Item = Arc<StatsSnapshot>> + 'static {
        self.stats.updates()
    }

    /// Output dimensions of the running decoder; zero until the first format change
    pub fn ratio(&self) -> VideoRatio {
        *self.ratio.borrow()
    }

    pub fn ratio_updates(&self) -> impl Stream<Item = VideoRatio> + 'static {
        WatchStream::new(self.ratio.subscribe())
    }

    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    fn set_state(&self, state: DecoderState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Decoder state {} -> {}", previous, state);
        }
    }

    /// Open the input pipe and wait for parameter sets.
    ///
    /// A no-op when already awaiting configuration; any other state needs a
    /// `deinit` first.
    pub async fn init(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match self.state() {
            DecoderState::Uninitialized => {
                inner.pipe_closed = false;
                self.stats.reset();
                self.set_state(DecoderState::AwaitingConfig);
                info!("Decoder initialized, awaiting parameter sets");
                Ok(())
            }
            DecoderState::AwaitingConfig => Ok(()),
            state => Err(LinkError::invalid_state("init", state)),
        }
    }

    /// Hand one reassembled unit to the decoder.
    ///
    /// Only a decoder configuration failure is returned as an error; the
    /// driver stays in `AwaitingConfig` with its parameter sets cached.
    pub async fn feed(&self, nalu: Nalu) -> Result<FeedOutcome> {
        let mut inner = self.inner.lock().await;
        self.stats.record_observed();

        if nalu.len() <= START_CODE.len() {
            trace!("Dropping empty unit");
            return Ok(FeedOutcome::Skipped);
        }

        if inner.pipe_closed {
            return Ok(Self::cache_only(&mut inner.gate, &nalu));
        }

        match self.state() {
            DecoderState::AwaitingConfig => self.try_configure(&mut inner, &nalu),
            DecoderState::Running => {
                if nalu.is_parameter_set()
                    && inner.gate.parameter_set(nalu.kind()) != Some(nalu.data())
                {
                    inner.gate.observe(&nalu);
                    debug!(kind = ?nalu.kind(), "Parameter set changed mid-stream, decoder not reconfigured");
                }
                let Some(active) = inner.active.as_ref() else {
                    return Ok(FeedOutcome::Skipped);
                };
                if nalu.family() != active.family {
                    debug!(
                        unit = %nalu.family(),
                        decoder = %active.family,
                        "Dropping unit for a different codec family"
                    );
                    return Ok(FeedOutcome::Skipped);
                }
                Ok(self.submit(active.codec.as_ref(), &nalu).await)
            }
            _ => Ok(Self::cache_only(&mut inner.gate, &nalu)),
        }
    }

    fn cache_only(gate: &mut KeyframeGate, nalu: &Nalu) -> FeedOutcome {
        if gate.observe(nalu) { FeedOutcome::Cached } else { FeedOutcome::Skipped }
    }

    fn try_configure(&self, inner: &mut Inner, nalu: &Nalu) -> Result<FeedOutcome> {
        let cached = inner.gate.observe(nalu);
        let Some(config) = inner.gate.codec_config(&self.settings) else {
            return Ok(if cached { FeedOutcome::Cached } else { FeedOutcome::Skipped });
        };

        self.set_state(DecoderState::Configuring);
        info!(mime = config.mime, csd = config.csd.len(), "Configuring decoder");

        match self.start_codec(&config) {
            Ok(codec) => {
                self.set_state(DecoderState::Running);
                let cancel = CancellationToken::new();
                let drain = tokio::spawn(drain::run(DrainContext {
                    codec: codec.clone(),
                    stats: self.stats.clone(),
                    state: self.state.clone(),
                    ratio: self.ratio.clone(),
                    events: self.events.clone(),
                    cancel: cancel.clone(),
                    epoch: self.epoch,
                    output_timeout: self.settings.output_timeout(),
                    stats_interval: self.settings.stats_interval(),
                }));
                inner.active = Some(ActiveDecoder { codec, family: config.family, drain, cancel });
                info!(mime = config.mime, "Decoder running");
                Ok(FeedOutcome::Configured)
            }
            Err(e) => {
                warn!(mime = config.mime, "Decoder configuration failed: {}", e);
                self.set_state(DecoderState::AwaitingConfig);
                Err(e)
            }
        }
    }

    fn start_codec(&self, config: &CodecConfig) -> Result<Arc<dyn HardwareDecoder>> {
        let codec = self.factory.create(config.mime)?;
        if let Err(e) = codec.configure(config).and_then(|()| codec.start()) {
            codec.release();
            return Err(e);
        }
        Ok(codec)
    }

    /// Submit a unit, retrying on busy input slots until the feed deadline
    async fn submit(&self, codec: &dyn HardwareDecoder, nalu: &Nalu) -> FeedOutcome {
        let started = Instant::now();
        let parse = started.saturating_duration_since(nalu.created_at());

        loop {
            match codec.dequeue_input(self.settings.input_timeout()).await {
                InputStatus::Ready(slot) => {
                    let now = Instant::now();
                    let timestamp = timestamp_us(self.epoch, now);

                    if nalu.len() > slot.capacity {
                        debug!(len = nalu.len(), capacity = slot.capacity, "Unit larger than input slot");
                        // Hand the slot back empty
                        let _ = codec.queue_input(slot, &[], timestamp);
                        return FeedOutcome::Skipped;
                    }
                    if let Err(e) = codec.queue_input(slot, nalu.data(), timestamp) {
                        debug!("Input submission failed: {}", e);
                        return FeedOutcome::Skipped;
                    }

                    let waited = Instant::now().saturating_duration_since(started);
                    self.stats.record_fed(nalu.len(), waited, parse);
                    trace!(len = nalu.len(), kind = ?nalu.kind(), "Unit queued");
                    return FeedOutcome::Queued;
                }
                InputStatus::TryAgain => {
                    let elapsed = started.elapsed();
                    if elapsed > self.settings.feed_deadline() {
                        warn!(
                            len = nalu.len(),
                            "No decoder input slot for {:?}, dropping unit",
                            elapsed
                        );
                        return FeedOutcome::TimedOut;
                    }
                }
                InputStatus::Error(code) => {
                    debug!(code, "Input slot request failed, dropping unit");
                    return FeedOutcome::Skipped;
                }
            }
        }
    }

    /// Close the pipe, tear down the device and reset all state.
    ///
    /// The drain task has exited by the time this returns.
    pub async fn deinit(&self) {
        let mut inner = self.inner.lock().await;
        inner.pipe_closed = true;

        if let Some(active) = inner.active.take() {
            self.set_state(DecoderState::Stopping);
            active.cancel.cancel();
            if let Err(e) = active.codec.stop() {
                debug!("Decoder stop failed: {}", e);
            }
            if let Err(e) = active.drain.await {
                warn!("Drain task failed: {}", e);
            }
            active.codec.release();
        }

        inner.gate.reset();
        self.stats.reset();
        self.ratio.send_replace(VideoRatio::default());
        self.set_state(DecoderState::Uninitialized);
        info!("Decoder deinitialized");
    }
}

/// Without a `deinit`, the drain task is aborted rather than joined before
/// the device is stopped and released.
impl Drop for DecoderDriver {
    fn drop(&mut self) {
        if let Some(active) = self.inner.get_mut().active.take() {
            active.cancel.cancel();
            active.drain.abort();
            if let Err(e) = active.codec.stop() {
                debug!("Decoder stop failed: {}", e);
            }
            active.codec.release();
            debug!("Decoder released on drop");
        }
    }
}
