//! CLI configuration: thin wrapper around `confly_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--url,
//! --compliance, --insecure, --timeout, --schema-dir).

use std::time::Duration;

use confly_api::{ConnectionConfig, TlsMode};
use confly_config::{Config, parse_compliance, profile_role, profile_to_connection};
use confly_core::Role;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Connection settings and the access role for this invocation.
///
/// Flags take priority over the profile. Without a profile, `--url` alone is
/// enough; no role applies then.
pub fn resolve(
    global: &GlobalOpts,
    config: &Config,
) -> Result<(ConnectionConfig, Option<Role>), CliError> {
    let name = active_profile_name(global, config);

    let (mut conn, role) = if let Some(profile) = config.profiles.get(&name) {
        (
            profile_to_connection(profile, &config.defaults)?,
            profile_role(profile, &name),
        )
    } else if global.url.is_some() {
        let mut conn = ConnectionConfig::new(String::new());
        conn.compliance = parse_compliance(&config.defaults.compliance)?;
        conn.timeout = Duration::from_secs(config.defaults.timeout);
        conn.tls = if config.defaults.insecure {
            TlsMode::DangerAcceptInvalid
        } else {
            TlsMode::System
        };
        (conn, None)
    } else if global.profile.is_some() {
        let mut available: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        return Err(CliError::ProfileNotFound {
            name,
            available: available.join(", "),
        });
    } else {
        return Err(CliError::NoConfig {
            path: confly_config::config_path().display().to_string(),
        });
    };

    if let Some(url) = &global.url {
        conn.url.clone_from(url);
    }
    if let Some(mode) = &global.compliance {
        conn.compliance = parse_compliance(mode)?;
    }
    if global.insecure {
        conn.tls = TlsMode::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        conn.timeout = Duration::from_secs(secs);
    }
    if let Some(dir) = &global.schema_dir {
        conn.schema_dir = Some(dir.clone());
    }
    Ok((conn, role))
}
