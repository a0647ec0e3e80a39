//! Per-request path rewriting for a chosen target.
//!
//! Both entry points are pure: they read the target and the request URL and
//! return a fresh value owned by the caller's request.

mod forward;
mod redirect;

pub use forward::{forward_path, ForwardPath};
pub use redirect::{build_redirect_url, Redirect};

/// Placeholder replaced by the request path in redirect endpoints.
pub const PATH_PLACEHOLDER: &str = "$path";

/// Placeholder replaced by the request host in redirect endpoints.
pub const HOST_PLACEHOLDER: &str = "$host";

/// Remove `strip` from the front of `value` if present, then prepend `prepend`.
fn strip_and_prepend(value: &str, strip: &str, prepend: &str) -> String {
    let stripped = value.strip_prefix(strip).unwrap_or(value);
    let mut out = String::with_capacity(prepend.len() + stripped.len());
    out.push_str(prepend);
    out.push_str(stripped);
    out
}
