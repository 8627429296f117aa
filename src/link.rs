//! Assembled receive pipeline

use bytes::Bytes;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::LinkConfig;
use crate::decoder::{DecoderDriver, DecoderEvent, DecoderFactory, DecoderState, VideoRatio};
use crate::session::{LinkContext, LinkController, SessionSummary};
use crate::transport::{AggregatorFactory, Transport};
use crate::types::StatsSnapshot;
use crate::Result;

/// Depth of the telemetry forwarding queue
pub const TELEMETRY_QUEUE: usize = 64;

/// Entry point wiring transport, aggregators and decoder together.
///
/// # Example
///
/// ```rust,no_run
/// use fpvlink::decoder::DecoderFactory;
/// use fpvlink::transport::{PassthroughAggregatorFactory, PcapTransport};
/// use fpvlink::{FpvLink, LinkConfig};
/// use std::sync::Arc;
///
/// async fn replay(decoders: Arc<dyn DecoderFactory>) -> fpvlink::Result<()> {
///     let mut link = FpvLink::connect(
///         LinkConfig::load("link.yaml")?,
///         Arc::new(PcapTransport::new("flight.pcap")),
///         Arc::new(PassthroughAggregatorFactory),
///         decoders,
///     )
///     .await?;
///
///     if let Some(mut events) = link.take_events() {
///         while let Some(event) = events.recv().await {
///             println!("{:?}", event);
///         }
///     }
///     link.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct FpvLink;

impl FpvLink {
    /// Validate `config`, bring the decoder up and start capturing on the
    /// configured initial channel.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The transport cannot be opened on the initial channel
    /// - An aggregator cannot be created
    pub async fn connect(
        config: LinkConfig,
        transport: Arc<dyn Transport>,
        aggregators: Arc<dyn AggregatorFactory>,
        decoders: Arc<dyn DecoderFactory>,
    ) -> Result<LinkHandle> {
        config.validate()?;

        let (driver, channels) = DecoderDriver::new(decoders, config.decoder.clone());
        let decoder = Arc::new(driver);
        decoder.init().await?;

        let (telemetry_tx, telemetry_rx) = mpsc::channel(TELEMETRY_QUEUE);
        let ctx = LinkContext::new(config, transport, aggregators, decoder.clone())
            .with_telemetry(telemetry_tx);
        let mut controller = LinkController::new(ctx)?;

        if let Err(e) = controller.start().await {
            decoder.deinit().await;
            return Err(e);
        }
        info!(channel = controller.current_channel(), "FPV link connected");

        Ok(LinkHandle {
            controller,
            decoder,
            events: Some(channels.events),
            telemetry: Some(telemetry_rx),
        })
    }
}

/// A running link.
///
/// Dropping the handle cancels the capture loop and the drain task without
/// waiting for them; call [`LinkHandle::shutdown`] for an orderly stop.
pub struct LinkHandle {
    controller: LinkController,
    decoder: Arc<DecoderDriver>,
    events: Option<mpsc::Receiver<DecoderEvent>>,
    telemetry: Option<mpsc::Receiver<Bytes>>,
}

impl LinkHandle {
    /// Decoded frames, ratio changes and stats; can be taken once
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<DecoderEvent>> {
        self.events.take()
    }

    /// Opaque telemetry payloads; can be taken once
    pub fn take_telemetry(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.telemetry.take()
    }

    pub fn decoder(&self) -> &Arc<DecoderDriver> {
        &self.decoder
    }

    pub fn decoder_state(&self) -> DecoderState {
        self.decoder.state()
    }

    pub fn state_updates(&self) -> impl Stream<Item = DecoderState> + 'static {
        self.decoder.state_updates()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.decoder.stats()
    }

    pub fn stats_updates(&self) -> impl Stream<Item = Arc<StatsSnapshot>> + 'static {
        self.decoder.stats_updates()
    }

    pub fn ratio(&self) -> VideoRatio {
        self.decoder.ratio()
    }

    pub fn ratio_updates(&self) -> impl Stream<Item = VideoRatio> + 'static {
        self.decoder.ratio_updates()
    }

    pub fn current_channel(&self) -> u16 {
        self.controller.current_channel()
    }

    pub fn is_capturing(&self) -> bool {
        self.controller.is_running()
    }

    pub async fn next_channel(&mut self) -> Result<u16> {
        self.controller.next_channel().await
    }

    pub async fn previous_channel(&mut self) -> Result<u16> {
        self.controller.previous_channel().await
    }

    pub async fn select_channel(&mut self, index: usize) -> Result<u16> {
        self.controller.select_channel(index).await
    }

    /// Restart capture on the current channel, e.g. after a transport failure
    pub async fn restart(&mut self) -> Result<u16> {
        self.controller.start().await
    }

    /// Stop capturing, then tear the decoder down
    pub async fn shutdown(mut self) -> Result<Option<SessionSummary>> {
        let summary = self.controller.stop().await;
        if let Err(e) = &summary {
            warn!("Capture session ended with error: {}", e);
        }
        self.decoder.deinit().await;
        info!("FPV link shut down");
        summary
    }
}
