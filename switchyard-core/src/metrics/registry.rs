//! Named metric registry.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{AtomicCounter, LatencyHistogram, SharedCounter, SharedHistogram};
use crate::error::MetricsError;

/// A registered metric handle.
#[derive(Debug, Clone)]
pub enum Metric {
    /// A counter handle.
    Counter(SharedCounter),
    /// A histogram handle.
    Histogram(SharedHistogram),
}

impl Metric {
    fn kind(&self) -> &'static str {
        match self {
            Metric::Counter(_) => "counter",
            Metric::Histogram(_) => "histogram",
        }
    }
}

/// Concurrent name -> metric map.
///
/// Lookups and inserts go through `DashMap` shards, so `get_or_register`
/// never constructs a metric that loses an insert race.
#[derive(Debug, Default)]
pub struct Registry {
    metrics: DashMap<String, Metric>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The metric registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.get(name).map(|m| m.value().clone())
    }

    /// Return the metric under `name`, constructing it with `init` if absent.
    pub fn get_or_register<F>(&self, name: &str, init: F) -> Metric
    where
        F: FnOnce() -> Metric,
    {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        self.metrics
            .entry(name.to_owned())
            .or_insert_with(|| {
                debug!(metric = %name, "registering metric");
                init()
            })
            .value()
            .clone()
    }

    /// Register `metric` under `name`, failing if the name is taken.
    pub fn register(&self, name: &str, metric: Metric) -> Result<(), MetricsError> {
        match self.metrics.entry(name.to_owned()) {
            Entry::Occupied(_) => Err(MetricsError::Duplicate(name.to_owned())),
            Entry::Vacant(slot) => {
                slot.insert(metric);
                Ok(())
            }
        }
    }

    /// Remove the metric under `name`.
    pub fn unregister(&self, name: &str) {
        self.metrics.remove(name);
    }

    /// Remove every metric.
    pub fn unregister_all(&self) {
        self.metrics.clear();
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.iter().map(|m| m.key().clone()).collect();
        names.sort();
        names
    }

    /// Call `f` for every registered metric, in name order.
    ///
    /// Works on a snapshot, so `f` may itself touch the registry.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Metric),
    {
        let mut snapshot: Vec<(String, Metric)> = self
            .metrics
            .iter()
            .map(|m| (m.key().clone(), m.value().clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, metric) in &snapshot {
            f(name, metric);
        }
    }

    /// Get or create the counter `name`.
    pub fn counter(&self, name: &str) -> Result<SharedCounter, MetricsError> {
        match self.get_or_register(name, || Metric::Counter(Arc::new(AtomicCounter::new()))) {
            Metric::Counter(counter) => Ok(counter),
            other => Err(kind_mismatch(name, "counter", &other)),
        }
    }

    /// Get or create the latency histogram `name`.
    pub fn timer(&self, name: &str) -> Result<SharedHistogram, MetricsError> {
        match self.get_or_register(name, || {
            Metric::Histogram(Arc::new(LatencyHistogram::new()))
        }) {
            Metric::Histogram(timer) => Ok(timer),
            other => Err(kind_mismatch(name, "histogram", &other)),
        }
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

fn kind_mismatch(name: &str, expected: &'static str, found: &Metric) -> MetricsError {
    debug!(metric = %name, expected, found = found.kind(), "metric kind mismatch");
    MetricsError::KindMismatch {
        name: name.to_owned(),
        expected,
    }
}
