//! Shared configuration for the confly CLI.
//!
//! TOML profiles, environment overrides, and translation to
//! `confly_api::ConnectionConfig` plus an optional access `Role`. The CLI
//! applies its own flag overrides on top.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use confly_api::{ComplianceOptions, ConnectionConfig, TlsMode};
use confly_core::{Permission, Role};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{0}' not found in config")]
    UnknownProfile(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_compliance")]
    pub compliance: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            compliance: default_compliance(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "json".into()
}
fn default_compliance() -> String {
    "strict".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named device profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// RESTCONF base URL (e.g., "https://10.0.0.1:8443/restconf").
    pub url: String,

    /// "strict" or "simplified"; falls back to `defaults.compliance`.
    pub compliance: Option<String>,

    /// Skip certificate verification.
    pub insecure: Option<bool>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Request timeout in seconds.
    pub timeout: Option<u64>,

    /// Local directory searched for schema modules before the device.
    pub schema_dir: Option<PathBuf>,

    /// Schema path → permission. When present, every operation runs under
    /// a role named after the profile.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub access: BTreeMap<String, Permission>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "confly", "confly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("confly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load defaults, then `path` (if it exists), then `CONFLY_*` variables.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CONFLY_").split("_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Profile resolution ──────────────────────────────────────────────

impl Config {
    /// The named profile, or the default one.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, p)| (k.as_str(), p))
            .ok_or_else(|| ConfigError::UnknownProfile(name.into()))
    }
}

/// Parse a compliance mode name.
pub fn parse_compliance(raw: &str) -> Result<ComplianceOptions, ConfigError> {
    raw.parse().map_err(|reason| ConfigError::Validation {
        field: "compliance".into(),
        reason,
    })
}

/// Build a `ConnectionConfig` from a profile, with no CLI overrides.
pub fn profile_to_connection(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<ConnectionConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let compliance =
        parse_compliance(profile.compliance.as_deref().unwrap_or(&defaults.compliance))?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    Ok(ConnectionConfig {
        url: url.to_string(),
        compliance,
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        schema_dir: profile.schema_dir.clone(),
    })
}

/// The profile's access table as a role, `None` when it has none.
pub fn profile_role(profile: &Profile, profile_name: &str) -> Option<Role> {
    if profile.access.is_empty() {
        return None;
    }
    let mut role = Role::new(profile_name);
    for (path, permissions) in &profile.access {
        role.grant(path, *permissions);
    }
    Some(role)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_profile_fields() {
        let profile = Profile {
            url: "http://dev:8080/restconf".into(),
            ..Profile::default()
        };
        let conn = profile_to_connection(&profile, &Defaults::default()).unwrap();
        assert_eq!(conn.compliance, ComplianceOptions::STRICT);
        assert_eq!(conn.tls, TlsMode::System);
        assert_eq!(conn.timeout, Duration::from_secs(30));
        assert!(profile_role(&profile, "default").is_none());
    }

    #[test]
    fn bad_values_are_validation_errors() {
        let bad_url = Profile {
            url: "not a url".into(),
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_connection(&bad_url, &Defaults::default()),
            Err(ConfigError::Validation { ref field, .. }) if field == "url"
        ));

        let bad_mode = Profile {
            url: "http://dev/restconf".into(),
            compliance: Some("loose".into()),
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_connection(&bad_mode, &Defaults::default()),
            Err(ConfigError::Validation { ref field, .. }) if field == "compliance"
        ));
    }
}
