//! CLI error types with miette diagnostics.
//!
//! Maps library errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use confly_config::ConfigError;
use confly_core::NodeError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach device: {message}")]
    #[diagnostic(
        code(confly::connection_failed),
        help(
            "Check that the device is running and the URL is right.\n\
             Self-signed certificates need --insecure (-k) or ca_cert in the profile."
        )
    )]
    ConnectionFailed { message: String },

    // ── Access ───────────────────────────────────────────────────────

    #[error("Not allowed to {operation} {path}")]
    #[diagnostic(
        code(confly::unauthorized),
        help("The profile's access table does not grant this. Check [profiles.<name>.access].")
    )]
    Unauthorized { operation: String, path: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("'{path}' not found")]
    #[diagnostic(code(confly::not_found))]
    NotFound { path: String },

    #[error("{operation} is not supported on {path}")]
    #[diagnostic(code(confly::unsupported))]
    Unsupported { operation: String, path: String },

    // ── Device ───────────────────────────────────────────────────────

    #[error("Device returned {status}: {message}")]
    #[diagnostic(code(confly::device_error))]
    DeviceError { status: u16, message: String },

    #[error("Unexpected response: {message}")]
    #[diagnostic(
        code(confly::protocol),
        help("The device may expect a different wire format. Try --compliance simplified.")
    )]
    Protocol { message: String },

    #[error("Schema module '{module}' is unavailable: {reason}")]
    #[diagnostic(
        code(confly::schema),
        help("Point --schema-dir at a directory holding {module}.json.")
    )]
    Schema { module: String, reason: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(confly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(confly::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No device URL configured")]
    #[diagnostic(
        code(confly::no_config),
        help(
            "Pass --url, set CONFLY_URL, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(confly::config))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(confly::json), help("Check the JSON text and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Could not render output: {0}")]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unauthorized { .. } | Self::Unsupported { .. } => exit_code::PERMISSION,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Library error → CliError mapping ─────────────────────────────────

impl From<NodeError> for CliError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::NotFound { path } => Self::NotFound { path },
            NodeError::Unauthorized { operation, path } => Self::Unauthorized {
                operation: operation.into(),
                path,
            },
            NodeError::Unsupported { operation, path } => Self::Unsupported {
                operation: operation.into(),
                path,
            },
            NodeError::Transport {
                status: Some(status),
                message,
            } => Self::DeviceError { status, message },
            NodeError::Transport {
                status: None,
                message,
            } => Self::ConnectionFailed { message },
            NodeError::MalformedPayload(message) | NodeError::Protocol(message) => {
                Self::Protocol { message }
            }
            NodeError::InvalidPath { path, reason } => Self::Validation {
                field: format!("path '{path}'"),
                reason,
            },
        }
    }
}

impl From<confly_api::Error> for CliError {
    fn from(err: confly_api::Error) -> Self {
        match err {
            confly_api::Error::ModuleNotFound(module) => Self::Schema {
                module,
                reason: "no schema source has it".into(),
            },
            confly_api::Error::InvalidUrl(e) => Self::Validation {
                field: "url".into(),
                reason: e.to_string(),
            },
            other => NodeError::from(other).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_errors_keep_their_category() {
        let denied: CliError = NodeError::unauthorized("delete", "tire=fl").into();
        assert_eq!(denied.exit_code(), exit_code::PERMISSION);

        let down: CliError = NodeError::Transport {
            status: None,
            message: "connection refused".into(),
        }
        .into();
        assert_eq!(down.exit_code(), exit_code::CONNECTION);

        let missing: CliError = confly_api::Error::Http {
            status: 404,
            body: String::new(),
        }
        .into();
        assert!(matches!(missing, CliError::DeviceError { status: 404, .. }));
    }
}
