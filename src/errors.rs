use thiserror::Error;

/// Failure of a single `update_token` call.
///
/// Cloneable so the same error can resolve the caller's future and be
/// broadcast to `error` listeners.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token does not split into header.payload.signature
    #[error("Token is invalid or malformed: expected 3 segments, got {segments}")]
    Malformed { segments: usize },

    /// Payload segment is not base64url encoded JSON object
    #[error("Token payload is invalid: {reason}")]
    InvalidPayload { reason: String },

    /// Identity embedded in the grants/scope is not valid percent-encoded UTF-8
    #[error("Token identity is invalid: {reason}")]
    InvalidIdentity { reason: String },
}

impl TokenError {
    /// Short label used for metrics and structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::Malformed { .. } => "malformed",
            TokenError::InvalidPayload { .. } => "invalid_payload",
            TokenError::InvalidIdentity { .. } => "invalid_identity",
        }
    }
}
