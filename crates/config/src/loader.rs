use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::CustodianConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "custodian.toml",
    "custodian.yaml",
    "custodian.yml",
    "custodian.json",
];

/// Load config from the given path (any supported format) with env
/// substitution and env overrides applied.
pub fn load_config(path: &Path) -> anyhow::Result<CustodianConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let config = parse_config(&raw, path)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
    Ok(apply_env_overrides(config))
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./custodian.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/custodian/custodian.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to defaults plus env overrides only when no file exists. A file
/// that exists but fails to load is an error: running on defaults would open
/// a different database than the one configured.
pub fn discover_and_load() -> anyhow::Result<CustodianConfig> {
    load_discovered(find_config_file())
}

fn load_discovered(path: Option<PathBuf>) -> anyhow::Result<CustodianConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path)
        },
        None => {
            debug!("no config file found, using defaults");
            Ok(apply_env_overrides(CustodianConfig::default()))
        },
    }
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| {
            let dir = config_dir()?;
            CONFIG_FILENAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        })
}

/// Returns the user-global config directory (`~/.config/custodian/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "custodian").map(|d| d.config_dir().to_path_buf())
}

/// Apply `CUSTODIAN_*` environment overrides on top of file values.
pub fn apply_env_overrides(config: CustodianConfig) -> CustodianConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: CustodianConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> CustodianConfig {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(secret) = get("CUSTODIAN_ROOT_SECRET") {
        config.vault.root_secret = Some(Secret::new(secret));
    }
    if let Some(url) = get("CUSTODIAN_DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(url) = get("CUSTODIAN_VERIFY_URL") {
        config.auth.verify_url = Some(url);
    }
    if let Some(bind) = get("CUSTODIAN_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = get("CUSTODIAN_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid CUSTODIAN_PORT"),
        }
    }

    config
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> anyhow::Result<CustodianConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
