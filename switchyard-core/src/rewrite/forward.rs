//! Outgoing path for forwarding-mode targets.

use tracing::trace;

use super::strip_and_prepend;
use crate::domain::target::Target;
use crate::url::{self, Url};

/// Adjusted request path handed to the forwarding layer.
///
/// The forwarding layer appends it to the endpoint's own path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardPath {
    /// Decoded path.
    pub path: String,
    /// Wire-form path; empty when the request had no divergent raw path.
    pub raw_path: String,
}

impl ForwardPath {
    /// Wire form of the adjusted path.
    pub fn escaped_path(&self) -> String {
        url::escaped_path(&self.path, &self.raw_path)
    }
}

/// Strip `target.strip_path` from the request path if it is a prefix, then
/// add `target.prepend_path`.
///
/// The decoded and raw paths are adjusted independently, so they can drift
/// apart when the strip prefix only matches one of them. A request without a
/// raw path yields an adjusted path without one.
pub fn forward_path(target: &Target, request: &Url) -> ForwardPath {
    let path = strip_and_prepend(&request.path, &target.strip_path, &target.prepend_path);
    let raw_path = if request.raw_path.is_empty() {
        String::new()
    } else {
        strip_and_prepend(&request.raw_path, &target.strip_path, &target.prepend_path)
    };

    trace!(
        service = %target.service,
        original = %request.path,
        adjusted = %path,
        "adjusted forwarding path"
    );
    ForwardPath { path, raw_path }
}
