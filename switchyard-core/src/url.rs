//! URL value shared by endpoints, incoming requests and redirect locations.
//!
//! The decoded `path` and the wire-form `raw_path` are tracked separately so
//! percent-encoded characters survive a rewrite. An empty `raw_path` means the
//! wire form is the canonical escaping of `path`.

use std::fmt;

use crate::error::UrlError;

/// A parsed URL split into the parts the rewrite engine operates on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    /// Scheme without the `://` separator, e.g. `http`.
    pub scheme: String,
    /// Authority (`host[:port]`), possibly holding a `$host` or `$path` placeholder.
    pub host: String,
    /// Percent-decoded path.
    pub path: String,
    /// Wire-form path when it differs from the canonical escaping of `path`.
    pub raw_path: String,
    /// Query string without the leading `?`.
    pub raw_query: String,
}

impl Url {
    /// Parse an absolute `scheme://authority[/path][?query][#fragment]` URL.
    ///
    /// The authority runs up to the first `/`, `?` or `#` and is taken
    /// verbatim, so `http://$host$path` yields host `$host$path` and an empty
    /// path. The fragment is dropped.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| UrlError::MissingScheme(input.to_owned()))?;
        if !is_valid_scheme(scheme) {
            return Err(UrlError::MissingScheme(input.to_owned()));
        }

        let rest = rest.split_once('#').map_or(rest, |(head, _)| head);
        let (rest, raw_query) = rest.split_once('?').unwrap_or((rest, ""));
        let (host, wire_path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        if host.is_empty() {
            return Err(UrlError::MissingHost(input.to_owned()));
        }

        let (path, raw_path) = split_path(wire_path)?;
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_owned(),
            path,
            raw_path,
            raw_query: raw_query.to_owned(),
        })
    }

    /// Build the URL of an incoming request from its Host and request target.
    ///
    /// Origin-form targets (`/a/b?q`) take the given host. Absolute-form
    /// targets (`http://h/a`) carry their own authority, which wins. A `://`
    /// later in an origin-form path or query is just data.
    pub fn from_request(host: &str, target: &str) -> Result<Self, UrlError> {
        if !target.starts_with('/') {
            if let Some((scheme, _)) = target.split_once("://") {
                if is_valid_scheme(scheme) {
                    return Self::parse(target);
                }
            }
        }

        let target = target.split_once('#').map_or(target, |(head, _)| head);
        let (wire_path, raw_query) = target.split_once('?').unwrap_or((target, ""));
        let (path, raw_path) = split_path(wire_path)?;
        Ok(Self {
            scheme: String::new(),
            host: host.to_owned(),
            path,
            raw_path,
            raw_query: raw_query.to_owned(),
        })
    }

    /// The wire form of the path.
    ///
    /// Uses `raw_path` when it is a valid encoding of `path`, otherwise escapes `path`.
    pub fn escaped_path(&self) -> String {
        escaped_path(&self.path, &self.raw_path)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheme.is_empty() {
            write!(f, "{}:", self.scheme)?;
        }
        if !self.scheme.is_empty() || !self.host.is_empty() {
            write!(f, "//{}", self.host)?;
        }
        let path = self.escaped_path();
        if !self.host.is_empty() && !path.is_empty() && !path.starts_with('/') {
            f.write_str("/")?;
        }
        f.write_str(&path)?;
        if !self.raw_query.is_empty() {
            write!(f, "?{}", self.raw_query)?;
        }
        Ok(())
    }
}

/// Wire form of a decoded `path`, preferring `raw_path` when it is a valid
/// encoding of it.
///
/// A `raw_path` holding a stray `%` or a character that must be escaped is
/// not a valid encoding, even if it happens to decode to `path`.
pub fn escaped_path(path: &str, raw_path: &str) -> String {
    if !raw_path.is_empty() && is_valid_encoding(raw_path) {
        if let Ok(decoded) = urlencoding::decode(raw_path) {
            if decoded == path {
                return raw_path.to_owned();
            }
        }
    }
    escape_path(path)
}

/// Canonical percent-escaping of a decoded path.
///
/// Unreserved characters, `/` and the sub-delimiters `$&+,:;=@` stay literal.
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~/$&+,:;=@".contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Whether every byte of `raw` is a literal allowed in a path or part of a
/// well-formed `%XX` escape.
fn is_valid_encoding(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let escape = bytes.get(i + 1..i + 3);
                if !matches!(escape, Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit()) {
                    return false;
                }
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || b"-._~/$&+,:;=@!'()*[]".contains(&b) => i += 1,
            _ => return false,
        }
    }
    true
}

fn split_path(wire: &str) -> Result<(String, String), UrlError> {
    let path = urlencoding::decode(wire)
        .map_err(|_| UrlError::InvalidEncoding(wire.to_owned()))?
        .into_owned();
    let raw_path = if escape_path(&path) == wire {
        String::new()
    } else {
        wire.to_owned()
    };
    Ok((path, raw_path))
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
