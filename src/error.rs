//! Error types for the reconciliation core.
//!
//! Two layers. [`ClientError`] is what a backend reports: it classifies the
//! failure as absent, unreachable, rejected, or undecodable. [`ReconcileError`]
//! is what callers see, with the entity kind, identity and attempted action
//! attached.

use crate::types::{EntityKind, Operation};

/// Failure reported by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("not found (404): {0}")]
    NotFound(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected response: status={status}, body={body}")]
    Api { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Classify an HTTP status code and body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == 404 {
            ClientError::NotFound(body)
        } else {
            ClientError::Api { status, body }
        }
    }

    /// Classify a bare error message.
    ///
    /// For backends that only surface text: a message carrying a `404`
    /// marker is treated as absence, anything else as a transport failure.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("404") {
            ClientError::NotFound(message)
        } else {
            ClientError::Transport(message)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("{action} {kind} {id:?}: not found")]
    NotFound {
        kind: EntityKind,
        id: String,
        action: Operation,
    },

    #[error("{action} {kind} {id:?} failed: {source}")]
    Remote {
        kind: EntityKind,
        id: String,
        action: Operation,
        #[source]
        source: ClientError,
    },

    #[error("invalid deployment transition: {0:?}")]
    InvalidTransition(String),

    #[error("invalid desired state: {0}")]
    InvalidSpec(String),

    #[error("invalid tracked state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Attach operation context to a backend failure.
    ///
    /// Not-found keeps its own variant so callers can branch on absence
    /// without inspecting the source.
    pub fn remote(
        kind: EntityKind,
        id: impl Into<String>,
        action: Operation,
        source: ClientError,
    ) -> Self {
        let id = id.into();
        if source.is_not_found() {
            ReconcileError::NotFound { kind, id, action }
        } else {
            ReconcileError::Remote {
                kind,
                id,
                action,
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::NotFound { .. })
    }

    /// Whether re-running the same pass might succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ReconcileError::Remote { source, .. } => match source {
                ClientError::Transport(_) => true,
                ClientError::Api { status, .. } => *status >= 500 || *status == 429,
                ClientError::NotFound(_) | ClientError::Decode(_) => false,
            },
            _ => false,
        }
    }
}
