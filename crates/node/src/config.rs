//! Node configuration.
//!
//! TOML-based configuration covering the global session parameters and the
//! per-application identities. A configuration can equally be built
//! programmatically by an embedding; [`Config::validate`] applies in both
//! cases.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use peerwire_protocol::{IdentityKeyPair, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::NodeError;

/// Default grace window for session resumption, in milliseconds.
pub const DEFAULT_RESUMPTION_WAIT_MS: u64 = 30_000;

/// Default delay between outbound connect sweeps, in milliseconds.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 5_000;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("app_id must not be empty")]
    EmptyAppId,

    #[error("app_id must not contain '/': {0}")]
    InvalidAppId(String),

    #[error("duplicate app_id: {0}")]
    DuplicateAppId(String),

    #[error("app {0} has a client role but no trusted keys")]
    NoTrustedKeys(String),

    #[error("app {app_id} has invalid key material: {detail}")]
    InvalidKey {
        app_id: String,
        detail: String,
    },

    #[error("resumption_wait_ms must be greater than 0")]
    InvalidResumptionWait,

    #[error("retry_interval_ms must be greater than 0")]
    InvalidRetryInterval,
}

/// Main configuration structure for a peerwire node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long a session outlives its stream before being destroyed,
    /// in milliseconds.
    pub resumption_wait_ms: u64,

    /// Delay between outbound connect sweeps when every candidate failed,
    /// in milliseconds.
    pub retry_interval_ms: u64,

    /// Per-application identities.
    #[serde(rename = "app")]
    pub apps: Vec<AppConfig>,
}

/// Identity and role of one application on this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// The application identifier, as it appears in protocol paths.
    pub app_id: String,

    /// Whether to withhold this application from discovery advertisements.
    /// Hidden applications still accept inbound streams.
    #[serde(default)]
    pub hidden: bool,

    /// The role(s) this node plays for the application.
    #[serde(flatten)]
    pub role: Role,
}

/// The role an application is configured for.
///
/// Client and server material is kept separate on purpose: a client-only
/// application carries no signing key, so a compromised client node cannot
/// impersonate the server side.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    /// Dials out; authenticates servers against the trusted root keys.
    Client {
        /// Hex-encoded root public keys this client accepts.
        trusted_keys: Vec<String>,
    },
    /// Accepts inbound streams; proves its identity with the root keypair.
    Server {
        /// Hex-encoded root public key.
        signing_public_key: String,
        /// Hex-encoded root secret key.
        signing_secret_key: String,
    },
    /// Both of the above.
    Both {
        /// Hex-encoded root public keys this client accepts.
        trusted_keys: Vec<String>,
        /// Hex-encoded root public key.
        signing_public_key: String,
        /// Hex-encoded root secret key.
        signing_secret_key: String,
    },
}

impl std::fmt::Debug for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client { trusted_keys } => f
                .debug_struct("Client")
                .field("trusted_keys", &trusted_keys.len())
                .finish(),
            Role::Server { .. } => f
                .debug_struct("Server")
                .field("signing_secret_key", &"[REDACTED]")
                .finish_non_exhaustive(),
            Role::Both { trusted_keys, .. } => f
                .debug_struct("Both")
                .field("trusted_keys", &trusted_keys.len())
                .field("signing_secret_key", &"[REDACTED]")
                .finish_non_exhaustive(),
        }
    }
}

impl Config {
    /// Loads and validates a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        fs::write(path, contents)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resumption_wait_ms == 0 {
            return Err(ConfigError::InvalidResumptionWait);
        }
        if self.retry_interval_ms == 0 {
            return Err(ConfigError::InvalidRetryInterval);
        }

        let mut seen = std::collections::HashSet::new();
        for app in &self.apps {
            if app.app_id.is_empty() {
                return Err(ConfigError::EmptyAppId);
            }
            if app.app_id.contains('/') {
                return Err(ConfigError::InvalidAppId(app.app_id.clone()));
            }
            if !seen.insert(app.app_id.as_str()) {
                return Err(ConfigError::DuplicateAppId(app.app_id.clone()));
            }
            app.validate_keys()?;
        }
        Ok(())
    }

    /// Looks up an application by id.
    pub fn app(&self, app_id: &str) -> Option<&AppConfig> {
        self.apps.iter().find(|app| app.app_id == app_id)
    }

    /// The resumption grace window.
    pub fn resumption_wait(&self) -> Duration {
        Duration::from_millis(self.resumption_wait_ms)
    }

    /// The outbound connect retry interval.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl AppConfig {
    /// Whether this application accepts inbound streams.
    pub fn is_server(&self) -> bool {
        matches!(self.role, Role::Server { .. } | Role::Both { .. })
    }

    /// Whether this application can dial out.
    pub fn is_client(&self) -> bool {
        matches!(self.role, Role::Client { .. } | Role::Both { .. })
    }

    /// Builds the server's root signing identity.
    pub fn server_identity(&self) -> Result<IdentityKeyPair, NodeError> {
        let (public, secret) = match &self.role {
            Role::Server {
                signing_public_key,
                signing_secret_key,
            }
            | Role::Both {
                signing_public_key,
                signing_secret_key,
                ..
            } => (signing_public_key, signing_secret_key),
            Role::Client { .. } => return Err(NodeError::NotAServer(self.app_id.clone())),
        };
        Ok(IdentityKeyPair::from_hex(public, secret)?)
    }

    /// Builds the set of root keys this client trusts.
    pub fn trusted_roots(&self) -> Result<Vec<VerifyingKey>, NodeError> {
        let keys = match &self.role {
            Role::Client { trusted_keys } | Role::Both { trusted_keys, .. } => trusted_keys,
            Role::Server { .. } => return Err(NodeError::NotAClient(self.app_id.clone())),
        };
        keys.iter()
            .map(|key| VerifyingKey::from_hex(key).map_err(NodeError::from))
            .collect()
    }

    fn validate_keys(&self) -> Result<(), ConfigError> {
        let invalid = |detail: String| ConfigError::InvalidKey {
            app_id: self.app_id.clone(),
            detail,
        };

        match &self.role {
            Role::Client { trusted_keys } | Role::Both { trusted_keys, .. } => {
                if trusted_keys.is_empty() {
                    return Err(ConfigError::NoTrustedKeys(self.app_id.clone()));
                }
                for key in trusted_keys {
                    VerifyingKey::from_hex(key).map_err(|e| invalid(e.to_string()))?;
                }
            }
            Role::Server { .. } => {}
        }

        match &self.role {
            Role::Server {
                signing_public_key,
                signing_secret_key,
            }
            | Role::Both {
                signing_public_key,
                signing_secret_key,
                ..
            } => {
                VerifyingKey::from_hex(signing_public_key).map_err(|e| invalid(e.to_string()))?;
                SigningKey::from_hex(signing_secret_key).map_err(|e| invalid(e.to_string()))?;
            }
            Role::Client { .. } => {}
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resumption_wait_ms: DEFAULT_RESUMPTION_WAIT_MS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            apps: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_role() -> (Role, IdentityKeyPair) {
        let identity = IdentityKeyPair::generate();
        let role = Role::Server {
            signing_public_key: identity.verifying_key().to_hex(),
            signing_secret_key: identity.signing_key().to_hex(),
        };
        (role, identity)
    }

    fn client_role() -> Role {
        let root = IdentityKeyPair::generate();
        Role::Client {
            trusted_keys: vec![root.verifying_key().to_hex()],
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resumption_wait_ms, DEFAULT_RESUMPTION_WAIT_MS);
        assert_eq!(config.retry_interval_ms, DEFAULT_RETRY_INTERVAL_MS);
    }

    #[test]
    fn test_zero_resumption_wait_rejected() {
        let config = Config {
            resumption_wait_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidResumptionWait));
    }

    #[test]
    fn test_empty_app_id_rejected() {
        let mut config = Config::default();
        config.apps.push(AppConfig {
            app_id: String::new(),
            hidden: false,
            role: client_role(),
        });
        assert_eq!(config.validate(), Err(ConfigError::EmptyAppId));
    }

    #[test]
    fn test_slash_in_app_id_rejected() {
        let mut config = Config::default();
        config.apps.push(AppConfig {
            app_id: "a/b".to_string(),
            hidden: false,
            role: client_role(),
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAppId(_))
        ));
    }

    #[test]
    fn test_duplicate_app_id_rejected() {
        let mut config = Config::default();
        for _ in 0..2 {
            config.apps.push(AppConfig {
                app_id: "chat".to_string(),
                hidden: false,
                role: client_role(),
            });
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateAppId(_))
        ));
    }

    #[test]
    fn test_client_without_trusted_keys_rejected() {
        let mut config = Config::default();
        config.apps.push(AppConfig {
            app_id: "chat".to_string(),
            hidden: false,
            role: Role::Client {
                trusted_keys: vec![],
            },
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoTrustedKeys(_))
        ));
    }

    #[test]
    fn test_garbage_key_material_rejected() {
        let mut config = Config::default();
        config.apps.push(AppConfig {
            app_id: "chat".to_string(),
            hidden: false,
            role: Role::Client {
                trusted_keys: vec!["not-hex".to_string()],
            },
        });
        assert!(matches!(config.validate(), Err(ConfigError::InvalidKey { .. })));
    }

    #[test]
    fn test_server_identity_roundtrip() {
        let (role, identity) = server_role();
        let app = AppConfig {
            app_id: "chat".to_string(),
            hidden: false,
            role,
        };
        let restored = app.server_identity().unwrap();
        assert_eq!(restored.session_key(), identity.session_key());
        assert!(app.is_server());
        assert!(!app.is_client());
    }

    #[test]
    fn test_client_role_rejects_server_identity() {
        let app = AppConfig {
            app_id: "chat".to_string(),
            hidden: false,
            role: client_role(),
        };
        assert!(matches!(
            app.server_identity(),
            Err(NodeError::NotAServer(_))
        ));
        assert_eq!(app.trusted_roots().unwrap().len(), 1);
    }

    #[test]
    fn test_both_role_serves_and_dials() {
        let root = IdentityKeyPair::generate();
        let app = AppConfig {
            app_id: "chat".to_string(),
            hidden: false,
            role: Role::Both {
                trusted_keys: vec![root.verifying_key().to_hex()],
                signing_public_key: root.verifying_key().to_hex(),
                signing_secret_key: root.signing_key().to_hex(),
            },
        };
        assert!(app.is_server());
        assert!(app.is_client());
    }

    #[test]
    fn test_toml_roundtrip_via_file() {
        let (role, _) = server_role();
        let config = Config {
            resumption_wait_ms: 10_000,
            retry_interval_ms: 2_500,
            apps: vec![AppConfig {
                app_id: "chat".to_string(),
                hidden: true,
                role,
            }],
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded.resumption_wait_ms, 10_000);
        assert_eq!(loaded.retry_interval_ms, 2_500);
        assert_eq!(loaded.apps.len(), 1);
        assert!(loaded.apps[0].hidden);
        assert!(loaded.apps[0].is_server());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.resumption_wait_ms, DEFAULT_RESUMPTION_WAIT_MS);
        assert!(config.apps.is_empty());
    }

    #[test]
    fn test_parse_client_app_toml() {
        let root = IdentityKeyPair::generate();
        let text = format!(
            r#"
            [[app]]
            app_id = "chat"
            role = "client"
            trusted_keys = ["{}"]
            "#,
            root.verifying_key().to_hex()
        );
        let config: Config = toml::from_str(&text).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.app("chat").unwrap().is_client());
        assert!(!config.app("chat").unwrap().hidden);
    }

    #[test]
    fn test_debug_redacts_secret_key() {
        let (role, identity) = server_role();
        let debug = format!("{:?}", role);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&identity.signing_key().to_hex()));
    }
}
