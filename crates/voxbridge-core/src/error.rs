//! Errors raised at the backend gateway boundary.

/// Errors that can occur when talking to the backend state store.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No state exists under the requested id.
    #[error("State not found: {0}")]
    NotFound(String),

    /// The write was rejected or lost.
    #[error("Write failed for {id}: {reason}")]
    WriteFailed { id: String, reason: String },

    /// The backend itself is unreachable.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Whether the caller may treat the value as merely unknown
    /// (reads only; writes must surface the failure).
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Unavailable(_))
    }
}
