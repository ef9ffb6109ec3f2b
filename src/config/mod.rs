//! Session configuration surface.
//!
//! Everything the proxy session core can be configured with: default
//! signing parameters, the upstream trust key, the X-Forwarded-Protocol
//! toggle, and the forwarded-chain rewrite rules for trusted and
//! untrusted sources. All fields are optional and default to
//! empty/false/no-op so a zero-value config is a valid passthrough
//! setup.
//!
//! # Example
//!
//! ```yaml
//! sig_iss: "proxy-1"
//! sig_key: "changeme"
//! upstream_key: "changeme"
//! use_x_forwarded_protocol: true
//! xff_untrusted:
//!   truncate: 0
//!   append: true
//! xff_trusted:
//!   truncate: -1
//!   append: true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::xff::XffPolicy;

/// Forwarded-chain rule as it appears in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XffRuleConfig {
    /// Maximum entries kept from the existing chain; -1 keeps all.
    #[serde(default = "default_truncate")]
    pub truncate: i64,
    /// Whether to append the connecting peer's address.
    #[serde(default)]
    pub append: bool,
}

fn default_truncate() -> i64 {
    -1
}

impl Default for XffRuleConfig {
    fn default() -> Self {
        Self {
            truncate: -1,
            append: false,
        }
    }
}

impl XffRuleConfig {
    /// Convert to the policy applied by the session.
    pub fn to_policy(&self) -> XffPolicy {
        XffPolicy::new(self.truncate, self.append)
    }
}

/// Top-level configuration for a proxy session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Default signing issuer for minted push-signature tokens. Used
    /// only when a route does not carry its own signing parameters.
    #[serde(default)]
    pub sig_iss: String,
    /// Default signing key, paired with `sig_iss`.
    #[serde(default)]
    pub sig_key: String,
    /// Key for recognizing requests arriving from a trusted upstream
    /// proxy. Empty disables upstream-trust detection.
    #[serde(default)]
    pub upstream_key: String,
    /// Whether to assert the inbound protocol via X-Forwarded-Protocol.
    #[serde(default)]
    pub use_x_forwarded_protocol: bool,
    /// Forwarded-chain rule for requests from untrusted sources.
    #[serde(default)]
    pub xff_untrusted: XffRuleConfig,
    /// Forwarded-chain rule for requests from trusted upstream proxies.
    #[serde(default)]
    pub xff_trusted: XffRuleConfig,
}

impl ProxyConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config_with_context(e.to_string(), format!("reading {}", path.display()))
        })?;
        let config: ProxyConfig = serde_yaml::from_str(&contents).map_err(|e| {
            GatewayError::config_with_context(e.to_string(), format!("parsing {}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// Signing parameters must be set as a pair; an issuer without a key
    /// (or the reverse) would mint unverifiable tokens.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.sig_iss.is_empty() != self.sig_key.is_empty() {
            return Err(GatewayError::config(
                "sig_iss and sig_key must be set together",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_valid_passthrough() {
        let config: ProxyConfig = serde_yaml::from_str("{}").expect("empty config should parse");

        assert!(config.sig_iss.is_empty());
        assert!(config.sig_key.is_empty());
        assert!(config.upstream_key.is_empty());
        assert!(!config.use_x_forwarded_protocol);
        assert_eq!(config.xff_untrusted.truncate, -1);
        assert!(!config.xff_untrusted.append);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config_deserializes() {
        let yaml = r#"
sig_iss: "proxy-1"
sig_key: "changeme"
upstream_key: "upstream-secret"
use_x_forwarded_protocol: true
xff_untrusted:
  truncate: 0
  append: true
xff_trusted:
  truncate: -1
  append: true
"#;
        let config: ProxyConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.sig_iss, "proxy-1");
        assert_eq!(config.sig_key, "changeme");
        assert_eq!(config.upstream_key, "upstream-secret");
        assert!(config.use_x_forwarded_protocol);
        assert_eq!(config.xff_untrusted.truncate, 0);
        assert!(config.xff_untrusted.append);
        assert_eq!(config.xff_trusted.truncate, -1);
        assert!(config.xff_trusted.append);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sig_iss_without_key_rejected() {
        let config: ProxyConfig = serde_yaml::from_str(r#"sig_iss: "proxy-1""#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sig_key_without_iss_rejected() {
        let config: ProxyConfig = serde_yaml::from_str(r#"sig_key: "changeme""#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_xff_rule_converts_to_policy() {
        let rule: XffRuleConfig = serde_yaml::from_str("truncate: 2\nappend: true").unwrap();
        let policy = rule.to_policy();

        assert_eq!(policy.truncate, 2);
        assert!(policy.append);
    }

    #[test]
    fn test_from_file_missing_path_is_config_error() {
        let err = ProxyConfig::from_file("/nonexistent/torii.yaml").unwrap_err();
        assert_eq!(err.to_http_status(), 500);
        assert!(err.to_string().contains("Configuration error"));
    }
}
