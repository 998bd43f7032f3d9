//! Configuration loading and persistence.
//!
//! The server reads `config.json` from its configuration directory (or an
//! explicit path), then applies `PUSHNOTI_*` environment overrides. The
//! push credentials are immutable once the dispatch coordinator is built.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::constants::{DEFAULT_DELIVERY_TIMEOUT, DEFAULT_LISTEN_ADDR, DEFAULT_TTL_SECONDS};
use crate::server::vapid::VapidKeys;

/// VAPID credential triple (RFC 8292).
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct VapidCredentials {
    /// Contact URI sent as the JWT `sub` claim (`mailto:` or `https:`).
    pub subject: String,
    /// Uncompressed P-256 public key, base64url.
    pub public_key: String,
    /// Raw 32-byte P-256 private key scalar, base64url.
    pub private_key: String,
}

impl std::fmt::Debug for VapidCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidCredentials")
            .field("subject", &self.subject)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Credentials and delivery parameters shared by every push request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ServerPushConfig {
    /// API key for endpoints on the legacy GCM gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_api_key: Option<String>,
    /// How long the push service should hold an undelivered message.
    pub ttl_seconds: u32,
    /// VAPID credentials.
    pub vapid: VapidCredentials,
}

impl Default for ServerPushConfig {
    fn default() -> Self {
        Self {
            gateway_api_key: None,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            vapid: VapidCredentials::default(),
        }
    }
}

impl ServerPushConfig {
    /// Check that the VAPID triple is usable for signing.
    pub fn validate(&self) -> Result<()> {
        let subject = &self.vapid.subject;
        anyhow::ensure!(
            subject.starts_with("mailto:") || subject.starts_with("https://"),
            "VAPID subject must be a mailto: or https: URI, got {subject:?}"
        );
        VapidKeys::from_base64url(&self.vapid.public_key, &self.vapid.private_key)
            .context("Invalid VAPID key pair")?;
        anyhow::ensure!(self.ttl_seconds > 0, "TTL must be at least one second");
        Ok(())
    }

    /// Validate, and rewrite the keys as unpadded base64url for signing.
    pub fn validated(mut self) -> Result<Self> {
        self.validate()?;
        let keys = VapidKeys::from_base64url(&self.vapid.public_key, &self.vapid.private_key)?;
        self.vapid.public_key = keys.public_key_base64url().to_string();
        self.vapid.private_key = keys.private_key_base64url().to_string();
        Ok(self)
    }
}

/// Configuration for the pushnoti server.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: String,
    /// Upper bound in seconds for a single push service request.
    pub delivery_timeout_secs: u64,
    /// Push credentials.
    pub push: ServerPushConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            delivery_timeout_secs: DEFAULT_DELIVERY_TIMEOUT.as_secs(),
            push: ServerPushConfig::default(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `PUSHNOTI_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("PUSHNOTI_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("pushnoti")
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Path of `config.json` in the configuration directory.
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load from the default location, with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path` (defaults if it does not exist), with environment
    /// overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            log::info!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `PUSHNOTI_*` overrides looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("PUSHNOTI_LISTEN_ADDR") {
            self.listen_addr = addr;
        }

        if let Some(subject) = lookup("PUSHNOTI_VAPID_SUBJECT") {
            self.push.vapid.subject = subject;
        }

        if let Some(public_key) = lookup("PUSHNOTI_VAPID_PUBLIC_KEY") {
            self.push.vapid.public_key = public_key;
        }

        if let Some(private_key) = lookup("PUSHNOTI_VAPID_PRIVATE_KEY") {
            self.push.vapid.private_key = private_key;
        }

        if let Some(key) = lookup("PUSHNOTI_GATEWAY_API_KEY") {
            self.push.gateway_api_key = Some(key).filter(|k| !k.is_empty());
        }

        if let Some(ttl) = lookup("PUSHNOTI_TTL") {
            match ttl.parse::<u32>() {
                Ok(ttl) => self.push.ttl_seconds = ttl,
                Err(e) => log::warn!("Ignoring PUSHNOTI_TTL={ttl:?}: {e}"),
            }
        }

        if let Some(timeout) = lookup("PUSHNOTI_DELIVERY_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.delivery_timeout_secs = secs,
                Err(e) => log::warn!("Ignoring PUSHNOTI_DELIVERY_TIMEOUT={timeout:?}: {e}"),
            }
        }
    }

    /// Persist to `path`, readable by the owner only.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        // Private key lives in this file
        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Check the push credentials and the delivery timeout.
    pub fn validate(&self) -> Result<()> {
        self.push.validate()?;
        anyhow::ensure!(
            self.delivery_timeout_secs > 0,
            "Delivery timeout must be at least one second"
        );
        Ok(())
    }

    /// Per-delivery timeout.
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    /// Copy with secrets blanked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.push.vapid.private_key.is_empty() {
            copy.push.vapid.private_key = "<redacted>".to_string();
        }
        if copy.push.gateway_api_key.is_some() {
            copy.push.gateway_api_key = Some("<redacted>".to_string());
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_push_config() -> ServerPushConfig {
        let keys = VapidKeys::generate().expect("generate keys");
        ServerPushConfig {
            gateway_api_key: None,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            vapid: VapidCredentials {
                subject: "mailto:ops@example.com".to_string(),
                public_key: keys.public_key_base64url().to_string(),
                private_key: keys.private_key_base64url().to_string(),
            },
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.push.ttl_seconds, 2_419_200);
        assert_eq!(config.delivery_timeout(), DEFAULT_DELIVERY_TIMEOUT);
        assert!(config.push.gateway_api_key.is_none());
    }

    #[test]
    fn test_default_push_config_does_not_validate() {
        assert!(Config::default().push.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_generated_keys() {
        valid_push_config().validate().expect("valid config");
    }

    #[test]
    fn test_validated_strips_padding() {
        let mut push = valid_push_config();
        let unpadded = push.vapid.public_key.clone();
        push.vapid.public_key.push('=');

        let push = push.validated().expect("padded key is accepted");
        assert_eq!(push.vapid.public_key, unpadded);
    }

    #[test]
    fn test_validate_rejects_bad_subject() {
        let mut push = valid_push_config();
        push.vapid.subject = "ops@example.com".to_string();
        assert!(push.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_delivery_timeout() {
        let mut config = Config {
            push: valid_push_config(),
            ..Config::default()
        };
        config.validate().expect("valid config");

        config.delivery_timeout_secs = 0;
        assert!(config.validate().is_err());

        let vars: HashMap<&str, &str> = HashMap::from([("PUSHNOTI_DELIVERY_TIMEOUT", "0")]);
        config.delivery_timeout_secs = 5;
        config.apply_overrides(|k| vars.get(k).map(|v| (*v).to_string()));
        assert!(config.validate().is_err(), "env override is validated too");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PUSHNOTI_LISTEN_ADDR", "0.0.0.0:8080"),
            ("PUSHNOTI_VAPID_SUBJECT", "https://example.com"),
            ("PUSHNOTI_TTL", "60"),
            ("PUSHNOTI_DELIVERY_TIMEOUT", "not-a-number"),
            ("PUSHNOTI_GATEWAY_API_KEY", "gcm-key"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.push.vapid.subject, "https://example.com");
        assert_eq!(config.push.ttl_seconds, 60);
        assert_eq!(config.delivery_timeout(), DEFAULT_DELIVERY_TIMEOUT, "bad value ignored");
        assert_eq!(config.push.gateway_api_key.as_deref(), Some("gcm-key"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");

        let mut config = Config::default();
        config.push = valid_push_config();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.push.vapid, config.push.vapid);

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.push.ttl_seconds, DEFAULT_TTL_SECONDS);
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = Config::default();
        config.push = valid_push_config();
        config.push.gateway_api_key = Some("gcm-key".to_string());

        let json = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!json.contains(&config.push.vapid.private_key));
        assert!(!json.contains("gcm-key"));
        assert!(!format!("{:?}", config.push.vapid).contains(&config.push.vapid.private_key));
    }
}
