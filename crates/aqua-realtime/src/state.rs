//! Connection states and close-code classification.

use std::fmt;

use serde::Serialize;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close frame that carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Policy violation, sent by the controller for a bad credential.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Application-defined "credential rejected".
pub const CLOSE_AUTH_REJECTED: u16 = 4003;

/// Where the push channel is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket and nothing scheduled.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Socket open, frames flowing.
    Open,
    /// Socket being closed by us.
    Closing,
    /// Waiting on the backoff timer.
    ReconnectScheduled,
    /// Renewing credentials before reconnecting.
    AuthRecovering,
}

impl ConnectionState {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::ReconnectScheduled => "reconnect_scheduled",
            Self::AuthRecovering => "auth_recovering",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable manager state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    /// Current state.
    pub state: ConnectionState,
    /// Consecutive failed connect attempts since the last open or renewal.
    pub attempt: u32,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            attempt: 0,
        }
    }
}

/// What a close code means for the reconnect loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Deliberate close; stay idle.
    Clean,
    /// Credential rejected; renew before reconnecting.
    AuthRejected,
    /// Anything else; reconnect with backoff.
    Reconnect,
}

/// Classify a close. `None` means the stream ended without a close frame.
///
/// A close frame without a status code arrives as [`CLOSE_NO_STATUS`] and
/// counts as clean, like a normal closure.
pub fn classify_close(code: Option<u16>) -> CloseDisposition {
    match code {
        Some(CLOSE_NORMAL | CLOSE_NO_STATUS) => CloseDisposition::Clean,
        Some(CLOSE_POLICY_VIOLATION | CLOSE_AUTH_REJECTED) => CloseDisposition::AuthRejected,
        _ => CloseDisposition::Reconnect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_codes() {
        assert_eq!(classify_close(Some(1000)), CloseDisposition::Clean);
        assert_eq!(classify_close(Some(1005)), CloseDisposition::Clean);
        assert_eq!(classify_close(Some(1008)), CloseDisposition::AuthRejected);
        assert_eq!(classify_close(Some(4003)), CloseDisposition::AuthRejected);
        assert_eq!(classify_close(Some(1006)), CloseDisposition::Reconnect);
        assert_eq!(classify_close(Some(1011)), CloseDisposition::Reconnect);
        assert_eq!(classify_close(None), CloseDisposition::Reconnect);
    }

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::AuthRecovering.to_string(), "auth_recovering");
        assert_eq!(
            serde_json::to_value(ConnectionState::ReconnectScheduled).unwrap(),
            "reconnect_scheduled"
        );
    }

    #[test]
    fn snapshot_starts_idle() {
        let snap = ConnectionSnapshot::default();
        assert_eq!(snap.state, ConnectionState::Idle);
        assert_eq!(snap.attempt, 0);
    }
}
