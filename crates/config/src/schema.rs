/// Config schema types (server, database, vault, auth).
use std::time::Duration;

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodianConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub vault: VaultConfig,
    pub auth: AuthConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://custodian.db?mode=rwc".into(),
        }
    }
}

/// Vault settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Operator secret the root key is derived from. Never written back out.
    #[serde(
        serialize_with = "serialize_redacted",
        skip_serializing_if = "Option::is_none"
    )]
    pub root_secret: Option<Secret<String>>,
    /// Finish an interrupted rotation before serving requests.
    pub resume_rotation_on_start: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root_secret: None,
            resume_rotation_on_start: true,
        }
    }
}

/// Token verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Full URL of the issuing service's verify endpoint.
    pub verify_url: Option<String>,
    /// Upper bound for one verification round trip.
    pub timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            verify_url: None,
            timeout_ms: 3000,
        }
    }
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn serialize_redacted<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(_) => serializer.serialize_some("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn defaults() {
        let cfg = CustodianConfig::default();
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.server.port, 8200);
        assert!(cfg.vault.root_secret.is_none());
        assert!(cfg.vault.resume_rotation_on_start);
        assert_eq!(cfg.auth.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: CustodianConfig = toml::from_str(
            r#"
            [vault]
            root_secret = "s3cr3t-operator-value"

            [auth]
            verify_url = "http://auth.internal/verify"
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.vault.root_secret.as_ref().unwrap().expose_secret(),
            "s3cr3t-operator-value"
        );
        assert!(cfg.vault.resume_rotation_on_start);
        assert_eq!(cfg.auth.timeout_ms, 3000);
        assert_eq!(cfg.server.port, 8200);
    }

    #[test]
    fn root_secret_is_redacted_when_serialized() {
        let mut cfg = CustodianConfig::default();
        cfg.vault.root_secret = Some(Secret::new("do-not-print".into()));
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("do-not-print"));
        assert!(json.contains("[REDACTED]"));
    }
}
