//! Realtime error types.

/// Failure to open or keep a push socket.
///
/// Never surfaced to subscribers; the connection manager turns these into
/// state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The handshake was refused with 401 or 403.
    #[error("handshake rejected with HTTP {status}")]
    Rejected {
        /// HTTP status of the refused upgrade.
        status: u16,
    },

    /// The handshake failed with some other HTTP status.
    #[error("handshake failed with HTTP {status}")]
    Handshake {
        /// HTTP status of the failed upgrade.
        status: u16,
    },

    /// The handshake did not finish in time.
    #[error("handshake timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Network or protocol failure.
    #[error("transport failure: {0}")]
    Io(String),
}

impl TransportError {
    /// Build the error for a failed upgrade response.
    pub fn from_status(status: u16) -> Self {
        if matches!(status, 401 | 403) {
            Self::Rejected { status }
        } else {
            Self::Handshake { status }
        }
    }

    /// Whether the server refused the credential.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Inbound frame that could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Not JSON, or not an object with a string `type`.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// `type` was present but empty.
    #[error("frame has an empty type")]
    EmptyType,
}

/// Errors from the connection manager API.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// The configured push URL cannot be used.
    #[error("invalid push URL {url}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The manager task has exited.
    #[error("connection manager stopped")]
    ManagerStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_classifies_auth() {
        assert_eq!(TransportError::from_status(401), TransportError::Rejected { status: 401 });
        assert_eq!(TransportError::from_status(403), TransportError::Rejected { status: 403 });
        assert_eq!(TransportError::from_status(502), TransportError::Handshake { status: 502 });
        assert!(TransportError::from_status(403).is_auth_rejection());
        assert!(!TransportError::Timeout { timeout_ms: 10 }.is_auth_rejection());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            TransportError::Timeout { timeout_ms: 10_000 }.to_string(),
            "handshake timed out after 10000ms"
        );
        assert_eq!(RealtimeError::ManagerStopped.to_string(), "connection manager stopped");
    }
}
