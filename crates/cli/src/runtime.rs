//! Shared setup for commands that touch the vault.

use std::{path::Path, str::FromStr, sync::Arc};

use {
    anyhow::Context,
    secrecy::ExposeSecret,
    sqlx::sqlite::{SqliteConnectOptions, SqlitePool},
    tracing::debug,
};

use {
    custodian_auth::HttpAuthorizationGate,
    custodian_config::CustodianConfig,
    custodian_vault::{AuthorizationGate, RootKey, Subject, Vault, VaultError},
};

/// Load the file given with `--config`, or discover one. A config file that
/// exists but does not load is fatal.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<CustodianConfig> {
    match path {
        Some(path) => custodian_config::load_config(path),
        None => custodian_config::discover_and_load(),
    }
}

/// Connect to the configured database and apply pending migrations.
pub async fn open_pool(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database url: {url}"))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    custodian_vault::run_migrations(&pool).await?;
    debug!(url, "database ready");
    Ok(pool)
}

/// Build the vault from config. Requires a root secret; the verify URL is
/// only needed by commands that unwrap DEKs.
pub async fn open_vault(config: &CustodianConfig) -> anyhow::Result<Arc<Vault>> {
    let secret = config
        .vault
        .root_secret
        .as_ref()
        .map(|s| s.expose_secret().as_str())
        .filter(|s| !s.trim().is_empty())
        .context("no root secret configured (set vault.root_secret or CUSTODIAN_ROOT_SECRET)")?;
    let root = RootKey::derive(secret.as_bytes());

    let gate: Arc<dyn AuthorizationGate> = match config.auth.verify_url.as_deref() {
        Some(url) => Arc::new(HttpAuthorizationGate::new(url, config.auth.timeout())?),
        None => Arc::new(NoVerifier),
    };

    let pool = open_pool(&config.database.url).await?;
    Ok(Arc::new(Vault::new(pool, root, gate)))
}

/// Stand-in gate when no verify URL is configured: every unwrap fails as
/// unavailable.
struct NoVerifier;

#[async_trait::async_trait]
impl AuthorizationGate for NoVerifier {
    async fn verify(&self, _token: &str) -> Result<Subject, VaultError> {
        Err(VaultError::Unavailable(
            "no verification endpoint configured".into(),
        ))
    }
}
