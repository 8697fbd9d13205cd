//! Relay configuration snapshot.
//!
//! [`RelayConfig`] is supplied by the hosting application (settings file,
//! CLI, UI).  It is immutable once handed to the supervisor: replacing it
//! triggers a supervised restart, and every connection keeps reading the
//! snapshot that was active when it was accepted.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default TCP port the relay listens on.
pub const DEFAULT_PORT: u16 = 31416;

/// Maximum number of allow-list entries (`allowed_addresses[0..4]`).
pub const MAX_ALLOWED_ADDRESSES: usize = 5;

/// Error type for configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at most {max} allowed addresses may be configured, got {count}")]
    TooManyAllowedAddresses { count: usize, max: usize },

    #[error("allowed address entry {0:?} contains characters that cannot appear in an IP address")]
    InvalidAllowedAddress(String),

    #[error("the relay is enabled but no shared secret is configured")]
    MissingSharedSecret,
}

/// Everything the relay needs to know to accept and authenticate sessions.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    /// When `false` the supervisor idles without binding a socket.
    pub enabled: bool,
    /// TCP port to listen on.  `0` lets the OS choose.
    pub port: u16,
    /// Selects the encrypted challenge instead of the nonce digest.
    pub encryption_enabled: bool,
    /// Secret both sides derive their proofs from.
    pub shared_secret: String,
    /// Address substrings a peer must match; empty means everyone.
    pub allowed_addresses: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_PORT,
            encryption_enabled: false,
            shared_secret: String::new(),
            allowed_addresses: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Normalises the allow-list and checks the result.
    ///
    /// Entries are trimmed, blank entries dropped and duplicates removed
    /// while keeping the first occurrence, so the list behaves as an ordered
    /// set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if more than [`MAX_ALLOWED_ADDRESSES`] entries
    /// remain, an entry contains characters other than hex digits, `.` and
    /// `:`, or the relay is enabled without a shared secret.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let mut entries: Vec<String> = Vec::with_capacity(self.allowed_addresses.len());
        for raw in &self.allowed_addresses {
            let entry = raw.trim();
            if entry.is_empty() || entries.iter().any(|e| e == entry) {
                continue;
            }
            if !entry
                .chars()
                .all(|c| c.is_ascii_hexdigit() || c == '.' || c == ':')
            {
                return Err(ConfigError::InvalidAllowedAddress(entry.to_string()));
            }
            entries.push(entry.to_string());
        }
        if entries.len() > MAX_ALLOWED_ADDRESSES {
            return Err(ConfigError::TooManyAllowedAddresses {
                count: entries.len(),
                max: MAX_ALLOWED_ADDRESSES,
            });
        }
        if self.enabled && self.shared_secret.is_empty() {
            return Err(ConfigError::MissingSharedSecret);
        }
        self.allowed_addresses = entries;
        Ok(self)
    }
}

// The secret must never reach a log line.
impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("enabled", &self.enabled)
            .field("port", &self.port)
            .field("encryption_enabled", &self.encryption_enabled)
            .field("shared_secret", &"<redacted>")
            .field("allowed_addresses", &self.allowed_addresses)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> RelayConfig {
        RelayConfig {
            enabled: true,
            shared_secret: "secret".to_string(),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn test_default_port_is_31416() {
        assert_eq!(RelayConfig::default().port, 31416);
    }

    #[test]
    fn test_default_is_disabled_with_open_allow_list() {
        let cfg = RelayConfig::default();
        assert!(!cfg.enabled);
        assert!(!cfg.encryption_enabled);
        assert!(cfg.allowed_addresses.is_empty());
    }

    #[test]
    fn test_validated_trims_and_deduplicates_entries() {
        // Arrange
        let cfg = RelayConfig {
            allowed_addresses: vec![
                " 192.168.10 ".to_string(),
                "".to_string(),
                "192.168.10".to_string(),
                "10.0.0.7".to_string(),
            ],
            ..enabled_config()
        };

        // Act
        let cfg = cfg.validated().unwrap();

        // Assert
        assert_eq!(cfg.allowed_addresses, vec!["192.168.10", "10.0.0.7"]);
    }

    #[test]
    fn test_validated_rejects_more_than_five_entries() {
        let cfg = RelayConfig {
            allowed_addresses: (1..=6).map(|i| format!("10.0.0.{i}")).collect(),
            ..enabled_config()
        };
        assert_eq!(
            cfg.validated(),
            Err(ConfigError::TooManyAllowedAddresses { count: 6, max: 5 })
        );
    }

    #[test]
    fn test_validated_rejects_hostname_entry() {
        let cfg = RelayConfig {
            allowed_addresses: vec!["my-laptop".to_string()],
            ..enabled_config()
        };
        assert_eq!(
            cfg.validated(),
            Err(ConfigError::InvalidAllowedAddress("my-laptop".to_string()))
        );
    }

    #[test]
    fn test_validated_accepts_ipv6_prefix() {
        let cfg = RelayConfig {
            allowed_addresses: vec!["fe80::".to_string()],
            ..enabled_config()
        };
        assert!(cfg.validated().is_ok());
    }

    #[test]
    fn test_validated_requires_secret_when_enabled() {
        let cfg = RelayConfig {
            enabled: true,
            ..RelayConfig::default()
        };
        assert_eq!(cfg.validated(), Err(ConfigError::MissingSharedSecret));
    }

    #[test]
    fn test_disabled_config_without_secret_is_valid() {
        assert!(RelayConfig::default().validated().is_ok());
    }

    #[test]
    fn test_debug_output_redacts_secret() {
        let rendered = format!("{:?}", enabled_config());
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_config_deserializes_with_missing_fields_defaulted() {
        // Arrange: only two fields present
        let cfg: RelayConfig = toml::from_str("enabled = true\nshared_secret = \"s\"\n").unwrap();

        // Assert
        assert!(cfg.enabled);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(cfg.allowed_addresses.is_empty());
    }
}
