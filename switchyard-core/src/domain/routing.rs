//! Table of registered targets.

use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

use crate::domain::target::SharedTarget;

/// A lock-free table of the currently registered targets.
///
/// Uses `ArcSwap` so registration, deregistration and hot reloads never take
/// a read lock on the request path. Choosing among the targets belongs to
/// the route table's selector, not to this type.
#[derive(Debug)]
pub struct TargetTable {
    targets: ArcSwap<Vec<SharedTarget>>,
}

impl TargetTable {
    /// Create a table with the initial set of targets.
    pub fn new(initial_targets: Vec<SharedTarget>) -> Self {
        Self {
            targets: ArcSwap::from_pointee(initial_targets),
        }
    }

    /// Atomically replace every target (e.g., during config hot-reload).
    pub fn update_targets(&self, new_targets: Vec<SharedTarget>) {
        info!(count = new_targets.len(), "replacing target table");
        self.targets.store(Arc::new(new_targets));
    }

    /// Add a target when its backend instance comes up.
    pub fn register(&self, target: SharedTarget) {
        info!(service = %target.service, url = %target.url(), "registering target");
        self.targets.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&target));
            next
        });
    }

    /// Remove every target of `service` whose endpoint renders as `endpoint`.
    ///
    /// Returns whether anything was removed.
    pub fn deregister(&self, service: &str, endpoint: &str) -> bool {
        let matches = |t: &SharedTarget| t.service == service && t.url().to_string() == endpoint;
        let previous = self.targets.rcu(|current| {
            current
                .iter()
                .filter(|t| !matches(*t))
                .cloned()
                .collect::<Vec<_>>()
        });
        let removed = previous.iter().any(|t| matches(t));
        if removed {
            info!(%service, %endpoint, "deregistered target");
        }
        removed
    }

    /// Targets registered for `service`.
    pub fn by_service(&self, service: &str) -> Vec<SharedTarget> {
        self.targets
            .load()
            .iter()
            .filter(|t| t.service == service)
            .cloned()
            .collect()
    }

    /// The first registered target, if any.
    pub fn first(&self) -> Option<SharedTarget> {
        self.targets.load().first().cloned()
    }

    /// Retrieve a snapshot of all current targets.
    pub fn snapshot(&self) -> Arc<Vec<SharedTarget>> {
        self.targets.load_full()
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.targets.load().len()
    }

    /// Whether no target is registered.
    pub fn is_empty(&self) -> bool {
        self.targets.load().is_empty()
    }
}

impl Default for TargetTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// A shared reference to the lock-free target table.
pub type SharedTargetTable = Arc<TargetTable>;
