//! Declarative target configuration.
//!
//! Targets are listed as `[[target]]` tables in TOML. Routing behaviour is
//! driven by the raw `opts` map, which is also kept verbatim on the target:
//!
//! ```toml
//! [[target]]
//! service = "web"
//! url = "http://10.0.0.1:8080/"
//! tags = ["blue"]
//! opts = { strip = "/web", prepend = "/v2", host = "dst" }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::domain::routing::TargetTable;
use crate::domain::target::{AccessRules, HostPolicy, TargetBuilder};
use crate::error::ConfigError;
use crate::metrics::{metric_prefix, Instruments, Registry};
use crate::url::Url;

/// Option key for the strip prefix.
pub const OPT_STRIP: &str = "strip";
/// Option key for the prepend prefix.
pub const OPT_PREPEND: &str = "prepend";
/// Option key for the Host header policy.
pub const OPT_HOST: &str = "host";
/// Option key for the redirect status code.
pub const OPT_REDIRECT: &str = "redirect";
/// Option key for skipping upstream certificate validation.
pub const OPT_TLS_SKIP_VERIFY: &str = "tlsskipverify";
/// Option key for the PROXY protocol.
pub const OPT_PROXY_PROTO: &str = "proxyproto";
/// Option key for the auth handler name.
pub const OPT_AUTH: &str = "auth";

/// One `[[target]]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Service name.
    pub service: String,
    /// Endpoint URL.
    pub url: String,
    /// Selector tags.
    pub tags: BTreeSet<String>,
    /// Fixed weight; `0.0` for dynamic.
    pub weight: f64,
    /// Raw options.
    pub opts: HashMap<String, String>,
    /// Access metadata.
    pub access: AccessRules,
}

impl TargetConfig {
    /// Translate this entry into a builder, interpreting the known options.
    pub fn builder(&self) -> Result<TargetBuilder, ConfigError> {
        let mut builder = TargetBuilder::new(self.service.clone(), self.url.clone())
            .tags(self.tags.iter().cloned())
            .fixed_weight(self.weight)
            .opts(self.opts.clone())
            .access_rules(self.access.clone());

        if let Some(prefix) = self.opts.get(OPT_STRIP) {
            builder = builder.strip_path(prefix.clone());
        }
        if let Some(prefix) = self.opts.get(OPT_PREPEND) {
            builder = builder.prepend_path(prefix.clone());
        }
        if let Some(host) = self.opts.get(OPT_HOST) {
            builder = builder.host_policy(parse_host_policy(host));
        }
        if let Some(code) = self.opts.get(OPT_REDIRECT) {
            let code = code
                .trim()
                .parse::<u16>()
                .map_err(|_| invalid_option(OPT_REDIRECT, code))?;
            builder = builder.redirect_code(code);
        }
        if let Some(value) = self.opts.get(OPT_TLS_SKIP_VERIFY) {
            builder = builder.tls_skip_verify(parse_bool(OPT_TLS_SKIP_VERIFY, value)?);
        }
        if let Some(value) = self.opts.get(OPT_PROXY_PROTO) {
            builder = builder.proxy_proto(parse_bool(OPT_PROXY_PROTO, value)?);
        }
        if let Some(scheme) = self.opts.get(OPT_AUTH) {
            builder = builder.auth_scheme(scheme.clone());
        }
        Ok(builder)
    }
}

/// A whole configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Configured targets, in order.
    pub target: Vec<TargetConfig>,
}

impl TableConfig {
    /// Parse a TOML document.
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&input)
    }

    /// Build every target, registering its instruments in `registry`.
    ///
    /// `customize` runs on each builder last, e.g. to attach a transport.
    pub fn build<F>(&self, registry: &Registry, customize: F) -> Result<TargetTable, ConfigError>
    where
        F: Fn(TargetBuilder) -> TargetBuilder,
    {
        let mut targets = Vec::with_capacity(self.target.len());
        for entry in &self.target {
            let builder = entry.builder()?;
            // Instruments are keyed by endpoint host, so a bad URL is
            // reported by `build` below rather than here.
            let builder = match Url::parse(&entry.url) {
                Ok(url) => builder.instruments(Instruments::register(
                    registry,
                    &metric_prefix(&entry.service, &url),
                )?),
                Err(_) => builder,
            };
            let target = customize(builder).build()?;
            debug!(service = %target.service, url = %target.url(), "configured target");
            targets.push(Arc::new(target));
        }
        Ok(TargetTable::new(targets))
    }
}

fn parse_host_policy(value: &str) -> HostPolicy {
    if value.eq_ignore_ascii_case("dst") {
        HostPolicy::Destination
    } else {
        HostPolicy::Unset
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid_option(key, value)),
    }
}

fn invalid_option(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidOption {
        key: key.to_owned(),
        value: value.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TargetError;

    const SAMPLE: &str = r#"
        [[target]]
        service = "web"
        url = "http://10.0.0.1:8080/"
        tags = ["blue", "canary"]
        weight = 0.2
        opts = { strip = "/web", prepend = "/v2", host = "dst", tlsskipverify = "true", auth = "basic", custom = "kept" }
        access = { ip = ["10.0.0.0/8"] }

        [[target]]
        service = "legacy"
        url = "https://$host$path"
        opts = { redirect = "301", proxyproto = "false" }
    "#;

    #[test]
    fn builds_targets_from_options() {
        let registry = Registry::new();
        let table = TableConfig::from_toml(SAMPLE)
            .unwrap()
            .build(&registry, |b| b)
            .unwrap();
        assert_eq!(table.len(), 2);

        let web = &table.by_service("web")[0];
        assert_eq!(web.strip_path, "/web");
        assert_eq!(web.prepend_path, "/v2");
        assert_eq!(web.host_policy, HostPolicy::Destination);
        assert!(web.tls_skip_verify);
        assert_eq!(web.auth_scheme, "basic");
        assert_eq!(web.fixed_weight, 0.2);
        assert!(web.tags.contains("canary"));
        assert_eq!(web.opts.get("custom").map(String::as_str), Some("kept"));
        assert_eq!(web.access_rules()["ip"], vec!["10.0.0.0/8".to_owned()]);
        assert!(!web.is_redirect());

        let legacy = &table.by_service("legacy")[0];
        assert_eq!(legacy.redirect_code, 301);
        assert!(!legacy.proxy_proto);
        assert!(legacy.is_dynamic_weight());

        assert!(registry.get("web.10_0_0_1_8080.timer").is_some());
        assert!(registry.get("legacy.$host$path.rx").is_some());
    }

    #[test]
    fn invalid_option_values_are_rejected() {
        let config = TableConfig::from_toml(
            r#"
            [[target]]
            service = "web"
            url = "http://a/"
            opts = { redirect = "soon" }
            "#,
        )
        .unwrap();
        let err = config.build(&Registry::new(), |b| b).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { ref key, .. } if key == "redirect"));
    }

    #[test]
    fn missing_endpoint_is_a_config_error() {
        let config = TableConfig::from_toml(
            r#"
            [[target]]
            service = "web"
            "#,
        )
        .unwrap();
        let err = config.build(&Registry::new(), |b| b).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Target(TargetError::MissingEndpoint { .. })
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            TableConfig::from_toml("[[target]\nservice = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
