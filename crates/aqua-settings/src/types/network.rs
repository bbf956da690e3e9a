//! Endpoint, push channel, and REST client settings.

use std::time::Duration;

use aqua_core::BackoffPolicy;
use serde::{Deserialize, Serialize};

/// Controller endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointSettings {
    /// Base URL for REST calls (no trailing slash).
    pub rest_base_url: String,
    /// Push channel WebSocket URL.
    pub push_url: String,
    /// Path of the credential renewal endpoint, relative to `rest_base_url`.
    pub renew_path: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            rest_base_url: "http://localhost:8000/api".to_string(),
            push_url: "ws://localhost:8000/ws".to_string(),
            renew_path: "/auth/refresh".to_string(),
        }
    }
}

impl EndpointSettings {
    /// Full URL of the renewal endpoint.
    pub fn renew_url(&self) -> String {
        join_url(&self.rest_base_url, &self.renew_path)
    }
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Push channel reconnect settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Delay before the first reconnect attempt in ms.
    pub base_delay_ms: u64,
    /// Upper bound for a single reconnect delay in ms.
    pub max_delay_ms: u64,
    /// Stop reconnecting after this many consecutive failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Pause between a successful renewal and the next connect in ms.
    pub auth_retry_delay_ms: u64,
    /// Handshake timeout in ms.
    pub connect_timeout_ms: u64,
    /// Query parameter carrying the access credential.
    pub token_param: String,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: None,
            auth_retry_delay_ms: 500,
            connect_timeout_ms: 10_000,
            token_param: "token".to_string(),
        }
    }
}

impl RealtimeSettings {
    /// Backoff policy built from these settings.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            max_attempts: self.max_attempts,
        }
    }

    /// Pause between renewal and reconnect.
    pub fn auth_retry_delay(&self) -> Duration {
        Duration::from_millis(self.auth_retry_delay_ms)
    }

    /// Handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// REST client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSettings {
    /// Per-request timeout in ms.
    pub request_timeout_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
        }
    }
}

impl HttpSettings {
    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
