//! Target descriptor: one backend instance and its routing policy.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::TargetError;
use crate::metrics::{Instruments, SharedCounter, SharedHistogram};
use crate::rewrite::{self, ForwardPath, Redirect};
use crate::url::Url;

/// Opaque connection transport owned by the HTTP layer.
pub type Transport = Arc<dyn Any + Send + Sync>;

/// Opaque per-target access metadata, keyed by rule kind.
pub type AccessRules = HashMap<String, Vec<String>>;

/// How the outgoing `Host` header is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostPolicy {
    /// Forward the Host header of the incoming request.
    #[default]
    Unset,
    /// Use the host of the target endpoint.
    Destination,
}

/// One configured backend instance.
///
/// Shared read-only between request handlers. The only field that changes
/// after construction is the effective weight, which the route table owns.
pub struct Target {
    /// Logical service name.
    pub service: String,
    /// Labels for the route table's selector.
    pub tags: BTreeSet<String>,
    /// Raw configuration options, passed through untouched.
    pub opts: HashMap<String, String>,
    /// Prefix removed from the outgoing request path.
    pub strip_path: String,
    /// Prefix added to the outgoing request path after stripping.
    pub prepend_path: String,
    /// Disable certificate validation for upstream TLS connections.
    pub tls_skip_verify: bool,
    /// Outgoing Host header policy.
    pub host_policy: HostPolicy,
    /// HTTP status for redirects; `0` means the target forwards.
    pub redirect_code: u16,
    /// Explicit weight; `0.0` means the selector computes one.
    pub fixed_weight: f64,
    /// Name of the auth handler guarding this target.
    pub auth_scheme: String,
    /// Speak the PROXY protocol on upstream connections.
    pub proxy_proto: bool,
    /// Request latency.
    pub timer: SharedHistogram,
    /// Bytes received from the target.
    pub rx_counter: SharedCounter,
    /// Bytes sent to the target.
    pub tx_counter: SharedCounter,
    url: Url,
    weight: AtomicU64,
    access_rules: AccessRules,
    transport: Option<Transport>,
}

impl Target {
    /// The endpoint this instance listens on.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Effective weight in percent, as last stored by the selector.
    pub fn weight(&self) -> f64 {
        f64::from_bits(self.weight.load(Ordering::Acquire))
    }

    /// Store the effective weight computed by the selector.
    pub fn set_weight(&self, weight: f64) {
        self.weight.store(weight.to_bits(), Ordering::Release);
    }

    /// Whether the selector should compute this target's weight.
    pub fn is_dynamic_weight(&self) -> bool {
        self.fixed_weight == 0.0
    }

    /// Whether requests are answered with a redirect instead of forwarded.
    pub fn is_redirect(&self) -> bool {
        self.redirect_code > 0
    }

    /// Access metadata for the auth layer.
    pub fn access_rules(&self) -> &AccessRules {
        &self.access_rules
    }

    /// The transport handle, if one of type `T` was attached.
    pub fn transport<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.transport.as_ref()?.downcast_ref::<T>()
    }

    /// Host header value for the outgoing request.
    pub fn outgoing_host<'a>(&'a self, request_host: &'a str) -> &'a str {
        match self.host_policy {
            HostPolicy::Unset => request_host,
            HostPolicy::Destination => &self.url.host,
        }
    }

    /// Redirect for `request`, or `None` when the target forwards.
    pub fn redirect(&self, request: &Url) -> Option<Redirect> {
        self.is_redirect().then(|| Redirect {
            code: self.redirect_code,
            location: rewrite::build_redirect_url(self, request),
        })
    }

    /// Stripped and prepended path for forwarding `request`.
    pub fn forward_path(&self, request: &Url) -> ForwardPath {
        rewrite::forward_path(self, request)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("service", &self.service)
            .field("url", &self.url.to_string())
            .field("tags", &self.tags)
            .field("strip_path", &self.strip_path)
            .field("prepend_path", &self.prepend_path)
            .field("host_policy", &self.host_policy)
            .field("redirect_code", &self.redirect_code)
            .field("fixed_weight", &self.fixed_weight)
            .field("weight", &self.weight())
            .finish_non_exhaustive()
    }
}

/// A thread-safe reference to a Target.
pub type SharedTarget = Arc<Target>;

/// Builder for [`Target`]; validation happens in [`TargetBuilder::build`].
#[derive(Debug, Default)]
pub struct TargetBuilder {
    service: String,
    endpoint: String,
    tags: BTreeSet<String>,
    opts: HashMap<String, String>,
    strip_path: String,
    prepend_path: String,
    tls_skip_verify: bool,
    host_policy: HostPolicy,
    redirect_code: u16,
    fixed_weight: f64,
    auth_scheme: String,
    proxy_proto: bool,
    instruments: Option<Instruments>,
    access_rules: AccessRules,
    transport: Option<TransportSlot>,
}

struct TransportSlot(Transport);

impl fmt::Debug for TransportSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transport")
    }
}

impl TargetBuilder {
    /// Start a descriptor for `service` listening on `endpoint`.
    pub fn new(service: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Add a selector tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Replace the selector tags.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the raw options map.
    pub fn opts(mut self, opts: HashMap<String, String>) -> Self {
        self.opts = opts;
        self
    }

    /// Prefix to remove from the request path.
    pub fn strip_path(mut self, prefix: impl Into<String>) -> Self {
        self.strip_path = prefix.into();
        self
    }

    /// Prefix to add to the request path.
    pub fn prepend_path(mut self, prefix: impl Into<String>) -> Self {
        self.prepend_path = prefix.into();
        self
    }

    /// Skip upstream certificate validation.
    pub fn tls_skip_verify(mut self, skip: bool) -> Self {
        self.tls_skip_verify = skip;
        self
    }

    /// Outgoing Host header policy.
    pub fn host_policy(mut self, policy: HostPolicy) -> Self {
        self.host_policy = policy;
        self
    }

    /// Redirect status code; `0` keeps the target in forwarding mode.
    pub fn redirect_code(mut self, code: u16) -> Self {
        self.redirect_code = code;
        self
    }

    /// Fixed weight; `0.0` leaves the weight dynamic.
    pub fn fixed_weight(mut self, weight: f64) -> Self {
        self.fixed_weight = weight;
        self
    }

    /// Name of the auth handler.
    pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    /// Enable the PROXY protocol upstream.
    pub fn proxy_proto(mut self, enabled: bool) -> Self {
        self.proxy_proto = enabled;
        self
    }

    /// Attach instrumentation handles. Defaults to no-op handles.
    pub fn instruments(mut self, instruments: Instruments) -> Self {
        self.instruments = Some(instruments);
        self
    }

    /// Set the access metadata.
    pub fn access_rules(mut self, rules: AccessRules) -> Self {
        self.access_rules = rules;
        self
    }

    /// Attach the HTTP layer's transport handle.
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(TransportSlot(transport));
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<Target, TargetError> {
        if self.endpoint.trim().is_empty() {
            return Err(TargetError::MissingEndpoint {
                service: self.service,
            });
        }
        if self.service.is_empty() {
            return Err(TargetError::EmptyService {
                endpoint: self.endpoint,
            });
        }
        let url = Url::parse(&self.endpoint).map_err(|source| TargetError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        if self.redirect_code != 0 && !(300..=399).contains(&self.redirect_code) {
            return Err(TargetError::InvalidRedirectCode(self.redirect_code));
        }
        if !self.fixed_weight.is_finite() || self.fixed_weight < 0.0 {
            return Err(TargetError::InvalidWeight(self.fixed_weight));
        }

        let instruments = self.instruments.unwrap_or_default();
        Ok(Target {
            service: self.service,
            tags: self.tags,
            opts: self.opts,
            strip_path: self.strip_path,
            prepend_path: self.prepend_path,
            tls_skip_verify: self.tls_skip_verify,
            host_policy: self.host_policy,
            redirect_code: self.redirect_code,
            fixed_weight: self.fixed_weight,
            auth_scheme: self.auth_scheme,
            proxy_proto: self.proxy_proto,
            timer: instruments.timer,
            rx_counter: instruments.rx,
            tx_counter: instruments.tx,
            url,
            weight: AtomicU64::new(self.fixed_weight.to_bits()),
            access_rules: self.access_rules,
            transport: self.transport.map(|slot| slot.0),
        })
    }
}
