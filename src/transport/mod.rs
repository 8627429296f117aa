//! Capture transport and per-channel aggregator seams
//!
//! The radio adapter (USB claim, monitor mode, channel tuning) and the
//! decrypt/reorder stage of the link are both outside this crate. They plug
//! in through the traits here:
//!
//! - [`Transport`] tunes to a radio channel and hands back a [`CaptureSource`]
//! - [`AggregatorFactory`] builds one [`Aggregator`] per logical channel
//!
//! [`PcapTransport`] replays recorded captures through the same path.

mod replay;

pub use replay::{PcapReader, PcapTransport};

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;
use crate::router::RoutedPacket;
use crate::types::{CapturedFrame, Channel, LogicalChannelId};

/// A stream of captured frames from one tuned radio channel
#[async_trait]
pub trait CaptureSource: Send + 'static {
    /// Get the next captured frame
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - Frame captured
    /// - `Ok(None)` - Source exhausted (normal termination)
    /// - `Err(e)` - Capture failed; the session ends
    ///
    /// Must be cancel-safe: the session drops a pending call on stop.
    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;

    /// Release the underlying adapter or file
    async fn close(&mut self);
}

/// Radio capture layer
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Claim the adapter and tune it to `radio_channel`.
    ///
    /// Failures here are the only errors a session start reports.
    async fn open(&self, radio_channel: u16) -> Result<Box<dyn CaptureSource>>;
}

/// Decrypt/reorder stage for one logical channel
pub trait Aggregator: Send + 'static {
    /// Consume one routed packet, returning plaintext fragments in stream order
    fn process_packet(&mut self, packet: &RoutedPacket<'_>) -> Vec<Bytes>;
}

/// Builds an aggregator bound to a channel identifier
pub trait AggregatorFactory: Send + Sync + 'static {
    fn create(&self, channel: Channel, id: LogicalChannelId) -> Result<Box<dyn Aggregator>>;
}

/// Forwards payloads unchanged, for unencrypted links and recorded plaintext
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughAggregator;

impl Aggregator for PassthroughAggregator {
    fn process_packet(&mut self, packet: &RoutedPacket<'_>) -> Vec<Bytes> {
        vec![Bytes::copy_from_slice(packet.payload)]
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughAggregatorFactory;

impl AggregatorFactory for PassthroughAggregatorFactory {
    fn create(&self, _channel: Channel, _id: LogicalChannelId) -> Result<Box<dyn Aggregator>> {
        Ok(Box::new(PassthroughAggregator))
    }
}
