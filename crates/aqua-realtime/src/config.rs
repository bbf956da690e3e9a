//! Connection manager configuration.

use std::time::Duration;

use aqua_core::BackoffPolicy;
use aqua_settings::AquaSettings;
use reqwest::Url;

use crate::errors::RealtimeError;

/// Everything the connection manager needs besides its collaborators.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    push_url: Url,
    /// Query parameter carrying the access credential.
    pub token_param: String,
    /// Reconnect delays and attempt limit.
    pub backoff: BackoffPolicy,
    /// Pause between a successful renewal and the next connect.
    pub auth_retry_delay: Duration,
    /// Upper bound on one handshake.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Config for `push_url` with default timings.
    pub fn new(push_url: &str) -> Result<Self, RealtimeError> {
        let url = Url::parse(push_url).map_err(|e| RealtimeError::InvalidUrl {
            url: push_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(RealtimeError::InvalidUrl {
                url: push_url.to_string(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        Ok(Self {
            push_url: url,
            token_param: "token".to_string(),
            backoff: BackoffPolicy::default(),
            auth_retry_delay: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(10),
        })
    }

    /// Config from loaded settings.
    pub fn from_settings(settings: &AquaSettings) -> Result<Self, RealtimeError> {
        let realtime = &settings.realtime;
        Ok(Self {
            token_param: realtime.token_param.clone(),
            backoff: realtime.backoff(),
            auth_retry_delay: realtime.auth_retry_delay(),
            connect_timeout: realtime.connect_timeout(),
            ..Self::new(&settings.endpoints.push_url)?
        })
    }

    /// Replace the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the post-renewal delay.
    #[must_use]
    pub fn with_auth_retry_delay(mut self, delay: Duration) -> Self {
        self.auth_retry_delay = delay;
        self
    }

    /// Replace the handshake timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Push URL without credentials.
    pub fn push_url(&self) -> &Url {
        &self.push_url
    }

    /// Push URL carrying `access` as the token query parameter.
    pub fn socket_url(&self, access: &str) -> String {
        let mut url = self.push_url.clone();
        let _ = url.query_pairs_mut().append_pair(&self.token_param, access);
        url.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_appends_token() {
        let config = ConnectionConfig::new("ws://reef.local:8000/ws").unwrap();
        assert_eq!(config.socket_url("abc"), "ws://reef.local:8000/ws?token=abc");
    }

    #[test]
    fn socket_url_keeps_existing_query_and_encodes() {
        let config = ConnectionConfig::new("wss://reef.local/ws?tank=3").unwrap();
        assert_eq!(config.socket_url("a+b/c"), "wss://reef.local/ws?tank=3&token=a%2Bb%2Fc");
    }

    #[test]
    fn custom_token_param() {
        let mut config = ConnectionConfig::new("ws://h/ws").unwrap();
        config.token_param = "access".to_string();
        assert_eq!(config.socket_url("t"), "ws://h/ws?access=t");
    }

    #[test]
    fn rejects_non_websocket_url() {
        assert!(matches!(
            ConnectionConfig::new("http://h/ws"),
            Err(RealtimeError::InvalidUrl { .. })
        ));
        assert!(ConnectionConfig::new("not a url").is_err());
    }

    #[test]
    fn from_settings_copies_timings() {
        let mut settings = AquaSettings::default();
        settings.realtime.base_delay_ms = 250;
        settings.realtime.max_attempts = Some(3);
        settings.realtime.connect_timeout_ms = 2000;

        let config = ConnectionConfig::from_settings(&settings).unwrap();
        assert_eq!(config.backoff.base_delay_ms, 250);
        assert_eq!(config.backoff.max_attempts, Some(3));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.push_url().as_str(), "ws://localhost:8000/ws");
    }
}
