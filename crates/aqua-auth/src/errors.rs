//! Auth error types.

/// Errors from credential persistence.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Credential file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credential file serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The credential file watcher could not be installed.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Errors from the session renewal protocol.
///
/// Every variant is terminal for the session: the store has been cleared
/// and a login prompt signaled by the time the caller sees it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenewalError {
    /// Renewal was attempted with no renewal credential stored.
    #[error("no renewal credential stored")]
    NoRenewalCredential,

    /// The renewal endpoint refused the request or could not be reached.
    #[error("renewal rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code (0 if no response).
        status: u16,
        /// Error description.
        message: String,
    },

    /// The renewed credentials could not be persisted.
    #[error("failed to store renewed credentials: {0}")]
    Storage(String),
}

/// Errors returned to callers of the authenticated REST client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The call was rejected with 401 and one renewal did not fix it.
    #[error("unauthorized")]
    Unauthorized,

    /// The server answered with a non-success status other than 401.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The request could not be sent or the response could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
