//! Statistics aggregator
//!
//! Counters and latency windows are written from both the feed path and the
//! drain task, so they sit behind a short-lived lock. Derived rates are only
//! recomputed on an interval tick; each tick publishes an immutable
//! [`StatsSnapshot`] through a `watch` channel, which is the only view other
//! tasks read.

use futures::Stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;

use crate::types::StatsSnapshot;

/// Fixed-capacity moving window of latency samples
#[derive(Debug, Clone)]
pub struct MovingAverage {
    samples: VecDeque<Duration>,
    capacity: usize,
    sum: Duration,
}

impl MovingAverage {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { samples: VecDeque::with_capacity(capacity), capacity, sum: Duration::ZERO }
    }

    pub fn add(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
        self.samples.push_back(sample);
        self.sum += sample;
    }

    /// Mean of the current window in milliseconds, 0 when empty
    pub fn avg_ms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        (self.sum.as_secs_f64() * 1000.0 / self.samples.len() as f64) as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.sum = Duration::ZERO;
    }
}

#[derive(Debug)]
struct Inner {
    nalus_observed: u64,
    nalus_fed: u64,
    bytes_fed: u64,
    frames_decoded: u64,
    parse: MovingAverage,
    wait_input: MovingAverage,
    decode: MovingAverage,
    last_tick: Instant,
    frames_at_tick: u64,
    bytes_at_tick: u64,
    fps: f32,
    kbps: f32,
}

impl Inner {
    fn new(window: usize) -> Self {
        Self {
            nalus_observed: 0,
            nalus_fed: 0,
            bytes_fed: 0,
            frames_decoded: 0,
            parse: MovingAverage::new(window),
            wait_input: MovingAverage::new(window),
            decode: MovingAverage::new(window),
            last_tick: Instant::now(),
            frames_at_tick: 0,
            bytes_at_tick: 0,
            fps: 0.0,
            kbps: 0.0,
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            nalus_observed: self.nalus_observed,
            nalus_fed: self.nalus_fed,
            bytes_fed: self.bytes_fed,
            frames_decoded: self.frames_decoded,
            fps: self.fps,
            kbps: self.kbps,
            avg_parse_ms: self.parse.avg_ms(),
            avg_wait_input_ms: self.wait_input.avg_ms(),
            avg_decode_ms: self.decode.avg_ms(),
        }
    }
}

/// Rolling link/decoder health statistics
#[derive(Debug)]
pub struct StatisticsAggregator {
    inner: Mutex<Inner>,
    window: usize,
    published: watch::Sender<Arc<StatsSnapshot>>,
}

impl StatisticsAggregator {
    pub fn new(window: usize) -> Self {
        let (published, _) = watch::channel(Arc::new(StatsSnapshot::default()));
        Self { inner: Mutex::new(Inner::new(window)), window, published }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A unit reached the decoder driver
    pub fn record_observed(&self) {
        self.lock().nalus_observed += 1;
    }

    /// A unit was submitted to a decoder input slot
    pub fn record_fed(&self, bytes: usize, wait_input: Duration, parse: Duration) {
        let mut inner = self.lock();
        inner.nalus_fed += 1;
        inner.bytes_fed += bytes as u64;
        inner.wait_input.add(wait_input);
        inner.parse.add(parse);
    }

    /// The decoder produced an output buffer
    pub fn record_decoded(&self, decode: Duration) {
        let mut inner = self.lock();
        inner.frames_decoded += 1;
        inner.decode.add(decode);
    }

    /// Recompute if at least `interval` has passed since the last tick
    pub fn maybe_recompute(&self, now: Instant, interval: Duration) -> Option<StatsSnapshot> {
        if now.saturating_duration_since(self.lock().last_tick) < interval {
            return None;
        }
        Some(self.recompute(now))
    }

    /// Derive rates over the time since the last tick and publish a snapshot
    pub fn recompute(&self, now: Instant) -> StatsSnapshot {
        let snapshot = {
            let mut inner = self.lock();
            let elapsed = now.saturating_duration_since(inner.last_tick).as_secs_f64();
            if elapsed > 0.0 {
                let frames = inner.frames_decoded - inner.frames_at_tick;
                let bytes = inner.bytes_fed - inner.bytes_at_tick;
                inner.fps = (frames as f64 / elapsed) as f32;
                inner.kbps = (bytes as f64 * 8.0 / 1000.0 / elapsed) as f32;
            }
            inner.last_tick = now;
            inner.frames_at_tick = inner.frames_decoded;
            inner.bytes_at_tick = inner.bytes_fed;
            inner.snapshot()
        };
        self.published.send_replace(Arc::new(snapshot));
        snapshot
    }

    /// Live counters with the rates from the last tick
    pub fn snapshot(&self) -> StatsSnapshot {
        self.lock().snapshot()
    }

    /// Zero everything and publish the empty snapshot
    pub fn reset(&self) {
        *self.lock() = Inner::new(self.window);
        self.published.send_replace(Arc::new(StatsSnapshot::default()));
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StatsSnapshot>> {
        self.published.subscribe()
    }

    /// Stream of published snapshots, starting with the current one
    pub fn updates(&self) -> impl Stream<Item = Arc<StatsSnapshot>> + 'static {
        WatchStream::new(self.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use proptest::prelude::*;

    #[test]
    fn moving_average_window() {
        let mut avg = MovingAverage::new(3);
        assert_eq!(avg.avg_ms(), 0.0);
        for ms in [10, 20, 30] {
            avg.add(Duration::from_millis(ms));
        }
        assert!((avg.avg_ms() - 20.0).abs() < 1e-3);

        avg.add(Duration::from_millis(60));
        assert_eq!(avg.len(), 3);
        assert!((avg.avg_ms() - 110.0 / 3.0).abs() < 1e-3);

        avg.reset();
        assert!(avg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rates_over_interval() {
        let stats = StatisticsAggregator::new(16);
        let start = Instant::now();

        for _ in 0..60 {
            stats.record_fed(1000, Duration::from_micros(200), Duration::from_millis(1));
            stats.record_decoded(Duration::from_millis(8));
        }

        assert!(stats.maybe_recompute(start + Duration::from_secs(1), Duration::from_secs(2)).is_none());

        let snapshot = stats
            .maybe_recompute(start + Duration::from_secs(2), Duration::from_secs(2))
            .unwrap();
        assert!((snapshot.fps - 30.0).abs() < 1e-3);
        assert!((snapshot.kbps - 240.0).abs() < 1e-3);
        assert!((snapshot.avg_decode_ms - 8.0).abs() < 1e-3);
        assert!((snapshot.avg_parse_ms - 1.0).abs() < 1e-3);
        assert!((snapshot.avg_wait_input_ms - 0.2).abs() < 1e-3);
        assert_eq!(snapshot.frames_decoded, 60);

        // No new frames in the next interval
        let snapshot = stats.recompute(start + Duration::from_secs(4));
        assert_eq!(snapshot.fps, 0.0);
        assert_eq!(snapshot.frames_decoded, 60);
    }

    #[tokio::test]
    async fn reset_publishes_zeros() {
        let stats = StatisticsAggregator::new(8);
        let mut rx = stats.subscribe();
        stats.record_observed();
        stats.record_decoded(Duration::from_millis(5));
        stats.recompute(Instant::now() + Duration::from_secs(1));
        assert_eq!(rx.borrow_and_update().frames_decoded, 1);

        stats.reset();
        assert!(rx.has_changed().unwrap());
        assert_eq!(**rx.borrow(), StatsSnapshot::default());
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[tokio::test]
    async fn updates_stream_yields_current_value() {
        let stats = StatisticsAggregator::new(8);
        stats.record_observed();
        stats.recompute(Instant::now());
        let mut updates = Box::pin(stats.updates());
        let first = updates.next().await.unwrap();
        assert_eq!(first.nalus_observed, 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Observed,
        Fed(u16),
        Decoded,
        Tick,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Observed),
            any::<u16>().prop_map(Op::Fed),
            Just(Op::Decoded),
            Just(Op::Tick),
        ]
    }

    proptest! {
        #[test]
        fn counters_are_monotonic(ops in prop::collection::vec(op(), 0..200)) {
            let stats = StatisticsAggregator::new(4);
            let mut previous = stats.snapshot();
            for op in ops {
                match op {
                    Op::Observed => stats.record_observed(),
                    Op::Fed(bytes) => stats.record_fed(bytes as usize, Duration::ZERO, Duration::ZERO),
                    Op::Decoded => stats.record_decoded(Duration::from_millis(1)),
                    Op::Tick => { stats.recompute(Instant::now()); }
                }
                let current = stats.snapshot();
                prop_assert!(current.nalus_observed >= previous.nalus_observed);
                prop_assert!(current.nalus_fed >= previous.nalus_fed);
                prop_assert!(current.bytes_fed >= previous.bytes_fed);
                prop_assert!(current.frames_decoded >= previous.frames_decoded);
                prop_assert!(current.fps >= 0.0 && current.kbps >= 0.0);
                previous = current;
            }
            stats.reset();
            prop_assert_eq!(stats.snapshot(), StatsSnapshot::default());
        }
    }
}
