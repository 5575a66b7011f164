use serde::Serialize;

use crate::store::StoreError;

/// Error kinds surfaced to gateway clients.
///
/// The wire protocol keeps the human-readable reason alongside a machine
/// kind so clients can branch without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    InvalidPayload,
    Upstream,
}

/// A failure reported to the originating connection of an action.
///
/// Never broadcast to other participants; never terminates the
/// connection (connect-time auth is the one exception, handled in the
/// gateway server before a session exists).
#[derive(Debug, Clone, Serialize)]
pub struct EventError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EventError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unauthorized,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Forbidden,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidPayload,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Upstream,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<StoreError> for EventError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::not_found(format!("{what} not found")),
            StoreError::Backend(reason) => {
                tracing::error!(%reason, "store backend error");
                Self::upstream("A storage error occurred")
            }
        }
    }
}
