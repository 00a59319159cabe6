use thiserror::Error;

/// Failure of a tree operation.
///
/// Every [`Node`](crate::Node) implementation reports through this type, so a
/// caller sees the same taxonomy whether the tree is local JSON, a remote
/// RESTCONF device, or either of those behind access control.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The addressed definition or data does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Access control denied a write, delete, action or subscription.
    #[error("unauthorized: {operation} on {path}")]
    Unauthorized {
        operation: &'static str,
        path: String,
    },

    /// The node does not implement this capability.
    #[error("{operation} is not supported on {path}")]
    Unsupported {
        operation: &'static str,
        path: String,
    },

    /// A response or stream event could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The peer broke an envelope contract (e.g. missing action output wrapper).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Network or HTTP failure, with the status code when one was received.
    #[error("{}", transport_message(.status, .message))]
    Transport { status: Option<u16>, message: String },

    /// A relative path did not resolve against the schema.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("({code}) {message}"),
        None => format!("transport error: {message}"),
    }
}

impl NodeError {
    pub fn unsupported(operation: &'static str, path: impl ToString) -> Self {
        Self::Unsupported {
            operation,
            path: path.to_string(),
        }
    }

    pub fn unauthorized(operation: &'static str, path: impl ToString) -> Self {
        Self::Unauthorized {
            operation,
            path: path.to_string(),
        }
    }

    /// Returns `true` if access control rejected the operation.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` for missing data, including an HTTP 404 from a peer.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Transport { status, .. } => *status == Some(404),
            _ => false,
        }
    }

    /// HTTP status carried by a transport failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_display_includes_status() {
        let err = NodeError::Transport {
            status: Some(500),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "(500) boom");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn http_404_counts_as_not_found() {
        let err = NodeError::Transport {
            status: Some(404),
            message: String::new(),
        };
        assert!(err.is_not_found());
        assert!(!NodeError::Protocol("x".into()).is_not_found());
    }
}
