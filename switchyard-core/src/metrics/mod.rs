//! Instrumentation hooks attached to target descriptors.
//!
//! Descriptors only carry handles. Whatever backs them (a metrics library,
//! a test double, nothing at all) is decided by whoever builds the target.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::MetricsError;
use crate::url::Url;

mod registry;

pub use registry::{Metric, Registry};

/// A monotonically increasing counter, e.g. bytes transferred.
pub trait Counter: Debug + Send + Sync {
    /// Add `delta` to the counter.
    fn increment(&self, delta: u64);
}

/// A latency distribution.
pub trait Histogram: Debug + Send + Sync {
    /// Record one observed duration.
    fn record(&self, duration: Duration);
}

/// Shared counter handle.
pub type SharedCounter = Arc<dyn Counter>;

/// Shared histogram handle.
pub type SharedHistogram = Arc<dyn Histogram>;

/// Counter that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopCounter;

impl Counter for NopCounter {
    fn increment(&self, _delta: u64) {}
}

/// Histogram that discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopHistogram;

impl Histogram for NopHistogram {
    fn record(&self, _duration: Duration) {}
}

/// Lock-free running total.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current total.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Counter for AtomicCounter {
    fn increment(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }
}

/// Minimal latency summary: observation count, total and peak.
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    count: AtomicU64,
    sum_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl LatencyHistogram {
    /// Create an empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded observations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of all recorded durations.
    pub fn sum(&self) -> Duration {
        Duration::from_nanos(self.sum_nanos.load(Ordering::Relaxed))
    }

    /// Largest recorded duration.
    pub fn max(&self) -> Duration {
        Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed))
    }

    /// Mean duration, or zero when nothing was recorded.
    pub fn mean(&self) -> Duration {
        match self.count() {
            0 => Duration::ZERO,
            n => {
                let mean = self.sum_nanos.load(Ordering::Relaxed) as u128 / n as u128;
                Duration::from_nanos(mean as u64)
            }
        }
    }
}

impl Histogram for LatencyHistogram {
    fn record(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }
}

/// The per-target handles: request latency plus received and sent bytes.
#[derive(Debug, Clone)]
pub struct Instruments {
    /// Latency of requests served by the target.
    pub timer: SharedHistogram,
    /// Bytes received from the target.
    pub rx: SharedCounter,
    /// Bytes sent to the target.
    pub tx: SharedCounter,
}

impl Instruments {
    /// Handles that record nothing.
    pub fn noop() -> Self {
        Self {
            timer: Arc::new(NopHistogram),
            rx: Arc::new(NopCounter),
            tx: Arc::new(NopCounter),
        }
    }

    /// Get or create `<prefix>.timer`, `<prefix>.rx` and `<prefix>.tx` in `registry`.
    pub fn register(registry: &Registry, prefix: &str) -> Result<Self, MetricsError> {
        Ok(Self {
            timer: registry.timer(&format!("{prefix}.timer"))?,
            rx: registry.counter(&format!("{prefix}.rx"))?,
            tx: registry.counter(&format!("{prefix}.tx"))?,
        })
    }
}

impl Default for Instruments {
    fn default() -> Self {
        Self::noop()
    }
}

/// Metric name prefix for a target: `service.host_port`.
///
/// Dots and colons in the endpoint host are replaced so the host stays a
/// single name segment.
pub fn metric_prefix(service: &str, endpoint: &Url) -> String {
    let host: String = endpoint
        .host
        .chars()
        .map(|c| if c == '.' || c == ':' { '_' } else { c })
        .collect();
    format!("{service}.{host}")
}
