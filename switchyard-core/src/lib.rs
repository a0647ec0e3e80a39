//! Switchyard Core functionality.
//!
//! This crate contains the target descriptors, request rewriting and
//! instrumentation hooks that sit between a route table and the HTTP layer
//! of the Switchyard reverse proxy. It decides *how* a chosen target
//! transforms a request, never *which* target is chosen.

pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod rewrite;
pub mod url;

pub use domain::routing::{SharedTargetTable, TargetTable};
pub use domain::target::{HostPolicy, SharedTarget, Target, TargetBuilder};
pub use error::{ConfigError, MetricsError, TargetError, UrlError};
pub use rewrite::{ForwardPath, Redirect};
pub use url::Url;
