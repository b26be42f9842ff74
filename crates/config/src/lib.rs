//! Configuration loading, env substitution, env overrides, and validation.
//!
//! Config files: `custodian.toml`, `custodian.yaml`, or `custodian.json`
//! Searched in `./` then `~/.config/custodian/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values. The root secret
//! is normally supplied that way or through `CUSTODIAN_ROOT_SECRET`.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{AuthConfig, CustodianConfig, DatabaseConfig, ServerConfig, VaultConfig},
    validate::{Diagnostic, Severity, ValidationResult, check_config},
};
