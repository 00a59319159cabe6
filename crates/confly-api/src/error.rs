use confly_core::NodeError;
use thiserror::Error;

/// Top-level error type for the `confly-api` crate.
///
/// Covers transport, RESTCONF envelope and schema loading failures. Tree
/// operations see these through `From<Error> for NodeError`.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── RESTCONF ────────────────────────────────────────────────────
    /// Non-success status, with the response body as the server sent it.
    #[error("({status}) {body}")]
    Http { status: u16, body: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Action response lacked the `<module>:output` wrapper.
    #[error("'{key}' missing in output wrapper")]
    MissingEnvelope { key: String },

    // ── Schema ──────────────────────────────────────────────────────
    /// No schema source could supply the module.
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// Module text was found but could not be turned into a definition.
    #[error("Schema error: {0}")]
    Schema(String),

    // ── Tree ────────────────────────────────────────────────────────
    #[error(transparent)]
    Node(#[from] NodeError),
}

impl Error {
    /// Returns `true` if the server answered 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Http { status: 404, .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Node(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// HTTP status code, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Node(e) => e.status(),
            _ => None,
        }
    }
}

impl From<Error> for NodeError {
    fn from(err: Error) -> Self {
        match err {
            Error::Transport(e) => NodeError::Transport {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            Error::InvalidUrl(_) | Error::Tls(_) => NodeError::Transport {
                status: None,
                message: err.to_string(),
            },
            Error::Http { status, body } => NodeError::Transport {
                status: Some(status),
                message: body,
            },
            Error::Deserialization { message, .. } => NodeError::MalformedPayload(message),
            Error::MissingEnvelope { .. } | Error::Schema(_) => {
                NodeError::Protocol(err.to_string())
            }
            Error::ModuleNotFound(name) => NodeError::NotFound { path: name },
            Error::Node(e) => e,
        }
    }
}
