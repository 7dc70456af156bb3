//! Error taxonomy shared by the audit engine
//!
//! Every client trait returns [`AuditError`]. The variants decide how an
//! error travels: validation errors abort the call, permission errors fail
//! one scope, not-found is an empty result, transient errors are retried.

use thiserror::Error;

/// Transient backend conditions that are worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// Backend temporarily unavailable (HTTP 503)
    Unavailable,
    /// Backend internal error (HTTP 500)
    Internal,
    /// Backend gave up waiting (HTTP 504)
    DeadlineExceeded,
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransientKind::Unavailable => "service unavailable",
            TransientKind::Internal => "internal server error",
            TransientKind::DeadlineExceeded => "deadline exceeded",
        };
        f.write_str(name)
    }
}

/// Errors produced by the audit engine and its backend clients
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuditError {
    /// Malformed scope or identifier, raised before any network call
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{kind}: {message}")]
    Transient { kind: TransientKind, message: String },

    #[error("{0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, AuditError>;

impl AuditError {
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        AuditError::Transient {
            kind,
            message: message.into(),
        }
    }

    /// Map an HTTP status code and response body onto the taxonomy
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            403 => AuditError::PermissionDenied(message),
            404 => AuditError::NotFound(message),
            500 => AuditError::transient(TransientKind::Internal, message),
            503 => AuditError::transient(TransientKind::Unavailable, message),
            504 => AuditError::transient(TransientKind::DeadlineExceeded, message),
            other => AuditError::Unknown(format!("HTTP {}: {}", other, message)),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AuditError::Transient { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AuditError::PermissionDenied(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AuditError::NotFound(_))
    }

    /// Short label used for metric dimensions
    pub fn reason(&self) -> &'static str {
        match self {
            AuditError::Validation(_) => "validation",
            AuditError::PermissionDenied(_) => "permission_denied",
            AuditError::NotFound(_) => "not_found",
            AuditError::Transient { .. } => "transient",
            AuditError::Unknown(_) => "unknown",
        }
    }
}
