//! Error types for switchyard-core.
//!
//! Rewriting never fails; everything here is raised while parsing
//! configuration or constructing descriptors, before a target is routable.

use thiserror::Error;

/// Failure to parse an endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    /// The input has no `scheme://` prefix.
    #[error("missing scheme in {0:?}")]
    MissingScheme(String),

    /// The authority component is empty.
    #[error("missing host in {0:?}")]
    MissingHost(String),

    /// The path does not percent-decode to valid UTF-8.
    #[error("invalid percent-encoding in path {0:?}")]
    InvalidEncoding(String),
}

/// Rejection of a target descriptor at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TargetError {
    /// No endpoint was configured.
    #[error("target {service:?} has no endpoint")]
    MissingEndpoint {
        /// Service the descriptor was built for.
        service: String,
    },

    /// The descriptor has an empty service name.
    #[error("target for {endpoint:?} has an empty service name")]
    EmptyService {
        /// Endpoint the descriptor was built for.
        endpoint: String,
    },

    /// The endpoint could not be parsed.
    #[error("invalid endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        /// The rejected endpoint string.
        endpoint: String,
        /// Underlying parse failure.
        source: UrlError,
    },

    /// A non-zero redirect code outside the 3xx range.
    #[error("invalid redirect code {0}, expected 0 or 300-399")]
    InvalidRedirectCode(u16),

    /// A fixed weight that is negative, NaN or infinite.
    #[error("invalid fixed weight {0}")]
    InvalidWeight(f64),
}

/// Failure to register or look up an instrumentation handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    /// A metric with this name is already registered.
    #[error("duplicate metric: {0}")]
    Duplicate(String),

    /// The name is bound to a metric of a different kind.
    #[error("metric {name} is not a {expected}")]
    KindMismatch {
        /// Name that was looked up.
        name: String,
        /// Kind the caller asked for.
        expected: &'static str,
    },
}

/// Failure to load target configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid TOML for the target schema.
    #[error("invalid target configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// An option value could not be interpreted.
    #[error("invalid value {value:?} for option {key:?}")]
    InvalidOption {
        /// Option key.
        key: String,
        /// Rejected value.
        value: String,
    },

    /// The descriptor built from the configuration was rejected.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// Instruments for the target could not be registered.
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}
