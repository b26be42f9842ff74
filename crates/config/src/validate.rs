//! Configuration validation.
//!
//! Detects unknown/misspelled fields in TOML files and reports settings the
//! vault cannot start with (missing root secret, no verify endpoint) as well
//! as security warnings.

use std::{collections::HashMap, path::Path};

use secrecy::ExposeSecret;

use crate::{
    env_subst::substitute_env,
    loader::{apply_env_overrides, find_config_file, parse_config},
    schema::CustodianConfig,
};

/// Below this many characters the root secret is reported as weak.
const MIN_ROOT_SECRET_LEN: usize = 16;

/// Verification round trips longer than this stall request handling.
const MAX_VERIFY_TIMEOUT_MS: u64 = 30_000;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "missing",
    /// "security", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "auth.verify_url"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

/// Mirrors every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "server",
            Struct(HashMap::from([("bind", Leaf), ("port", Leaf)])),
        ),
        ("database", Struct(HashMap::from([("url", Leaf)]))),
        (
            "vault",
            Struct(HashMap::from([
                ("root_secret", Leaf),
                ("resume_rotation_on_start", Leaf),
            ])),
        ),
        (
            "auth",
            Struct(HashMap::from([("verify_url", Leaf), ("timeout_ms", Leaf)])),
        ),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
///
/// Semantic checks run against the effective config, i.e. after `${VAR}`
/// substitution and `CUSTODIAN_*` overrides.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(find_config_file);

    let Some(actual_path) = config_path else {
        let mut diagnostics = vec![Diagnostic::new(
            Severity::Info,
            "file-ref",
            "",
            "no config file found; using defaults",
        )];
        diagnostics.extend(check_config(&apply_env_overrides(
            CustodianConfig::default(),
        )));
        return ValidationResult {
            diagnostics,
            config_path: None,
        };
    };

    let content = match std::fs::read_to_string(&actual_path) {
        Ok(content) => substitute_env(&content),
        Err(e) => {
            return ValidationResult {
                diagnostics: vec![Diagnostic::new(
                    Severity::Error,
                    "syntax",
                    "",
                    format!("failed to read config file: {e}"),
                )],
                config_path: Some(actual_path),
            };
        },
    };

    let is_toml = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .is_none_or(|e| e == "toml");

    let (mut diagnostics, parsed) = if is_toml {
        check_structure(&content)
    } else {
        match parse_config(&content, &actual_path) {
            Ok(cfg) => (Vec::new(), Some(cfg)),
            Err(e) => (
                vec![Diagnostic::new(
                    Severity::Error,
                    "syntax",
                    "",
                    format!("failed to parse config: {e}"),
                )],
                None,
            ),
        }
    };

    if let Some(config) = parsed {
        diagnostics.extend(check_config(&apply_env_overrides(config)));
    }

    ValidationResult {
        diagnostics,
        config_path: Some(actual_path),
    }
}

/// Validate a TOML string without touching the file system or the process
/// environment.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let (mut diagnostics, parsed) = check_structure(toml_str);
    if let Some(config) = parsed {
        diagnostics.extend(check_config(&config));
    }
    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Syntax, unknown-field and type checks. Returns the parsed config when the
/// text deserializes.
fn check_structure(toml_str: &str) -> (Vec<Diagnostic>, Option<CustodianConfig>) {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("TOML syntax error: {e}"),
            ));
            return (diagnostics, None);
        },
    };

    check_unknown_fields(&toml_value, &build_schema_map(), "", &mut diagnostics);

    match toml::from_str::<CustodianConfig>(toml_str) {
        Ok(config) => (diagnostics, Some(config)),
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "type-error",
                "",
                format!("type error: {e}"),
            ));
            (diagnostics, None)
        },
    }
}

fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (toml::Value::Table(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };

    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }
        let level = if prefix.is_empty() {
            "at top level "
        } else {
            ""
        };
        let msg = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
            None => format!("unknown field {level}"),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            msg.trim(),
        ));
    }
}

/// Semantic checks on a parsed config.
///
/// Errors mean the vault cannot serve requests with this config.
#[must_use]
pub fn check_config(config: &CustodianConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    match config.vault.root_secret.as_ref().map(|s| s.expose_secret()) {
        None => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            "vault.root_secret",
            "no root secret configured (set vault.root_secret or CUSTODIAN_ROOT_SECRET)",
        )),
        Some(secret) if secret.trim().is_empty() => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            "vault.root_secret",
            "root secret is empty",
        )),
        Some(secret) if secret.chars().count() < MIN_ROOT_SECRET_LEN => {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "security",
                "vault.root_secret",
                format!("root secret is shorter than {MIN_ROOT_SECRET_LEN} characters"),
            ));
        },
        Some(_) => {},
    }

    match config.auth.verify_url.as_deref() {
        None => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            "auth.verify_url",
            "no token verification endpoint configured (set auth.verify_url or CUSTODIAN_VERIFY_URL)",
        )),
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "type-error",
                "auth.verify_url",
                format!("\"{url}\" is not an http(s) URL"),
            ));
        },
        Some(_) => {},
    }

    if config.auth.timeout_ms == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "auth.timeout_ms",
            "timeout must be greater than zero",
        ));
    } else if config.auth.timeout_ms > MAX_VERIFY_TIMEOUT_MS {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "auth.timeout_ms",
            format!(
                "verification timeout of {}ms holds requests open for a long time",
                config.auth.timeout_ms
            ),
        ));
    }

    let bind = config.server.bind.as_str();
    if !matches!(bind, "127.0.0.1" | "localhost" | "::1") {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "server.bind",
            format!("listening on {bind} exposes key unwrapping beyond this host"),
        ));
    }

    diagnostics
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        [vault]
        root_secret = "a-long-enough-operator-secret"

        [auth]
        verify_url = "http://127.0.0.1:3000/verify"
    "#;

    fn paths(result: &ValidationResult, severity: Severity) -> Vec<&str> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.path.as_str())
            .collect()
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("hello", "hello"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("bind", "bnd"), 1);
        assert_eq!(levenshtein("serer", "server"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn suggest_picks_closest() {
        assert_eq!(suggest("prot", &["port", "bind"], 3), Some("port"));
        assert_eq!(suggest("completely-off", &["port", "bind"], 3), None);
        assert_eq!(suggest("port", &["port"], 3), None);
    }

    #[test]
    fn valid_config_has_no_diagnostics() {
        let result = validate_toml_str(VALID);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn syntax_error_is_reported() {
        let result = validate_toml_str("[vault\nroot_secret = ");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn misspelled_field_gets_suggestion() {
        let result = validate_toml_str(&format!("{VALID}\n[server]\nbnd = \"127.0.0.1\"\n"));
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(diag.path, "server.bnd");
        assert!(diag.message.contains("did you mean \"bind\""));
    }

    #[test]
    fn unknown_top_level_section() {
        let result = validate_toml_str(&format!("{VALID}\n[vualt]\n"));
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(diag.path, "vualt");
        assert!(diag.message.contains("at top level"));
    }

    #[test]
    fn wrong_type_is_reported() {
        let result = validate_toml_str("[server]\nport = \"eighty\"\n");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "type-error")
        );
    }

    #[test]
    fn missing_secret_and_verify_url_are_errors() {
        let result = validate_toml_str("");
        let errors = paths(&result, Severity::Error);
        assert!(errors.contains(&"vault.root_secret"));
        assert!(errors.contains(&"auth.verify_url"));
        assert_eq!(result.count(Severity::Error), 2);
    }

    #[test]
    fn short_secret_is_a_warning() {
        let result = validate_toml_str(
            r#"
            [vault]
            root_secret = "short"
            [auth]
            verify_url = "https://auth.example.com/verify"
            "#,
        );
        assert!(!result.has_errors());
        assert_eq!(paths(&result, Severity::Warning), vec!["vault.root_secret"]);
    }

    #[test]
    fn non_http_verify_url_is_an_error() {
        let result = validate_toml_str(
            r#"
            [vault]
            root_secret = "a-long-enough-operator-secret"
            [auth]
            verify_url = "auth.internal:3000"
            "#,
        );
        assert_eq!(paths(&result, Severity::Error), vec!["auth.verify_url"]);
    }

    #[test]
    fn timeout_bounds() {
        let zero = validate_toml_str(&format!("{VALID}\ntimeout_ms = 0\n"));
        assert_eq!(paths(&zero, Severity::Error), vec!["auth.timeout_ms"]);

        let long = validate_toml_str(&format!("{VALID}\ntimeout_ms = 60000\n"));
        assert!(!long.has_errors());
        assert_eq!(paths(&long, Severity::Warning), vec!["auth.timeout_ms"]);
    }

    #[test]
    fn public_bind_is_a_warning() {
        let result = validate_toml_str(&format!("[server]\nbind = \"0.0.0.0\"\n{VALID}"));
        assert_eq!(paths(&result, Severity::Warning), vec!["server.bind"]);
    }

    #[test]
    fn validate_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custodian.yaml");
        std::fs::write(
            &path,
            "vault:\n  root_secret: a-long-enough-operator-secret\nauth:\n  verify_url: http://127.0.0.1:3000/verify\n",
        )
        .unwrap();
        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn validate_reports_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate(Some(&dir.path().join("missing.toml")));
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }
}
