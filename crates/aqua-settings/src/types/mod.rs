//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format. Each section implements [`Default`] with production values and
//! is marked `#[serde(default)]`, so partial files are accepted.

mod credentials;
mod network;

pub use credentials::*;
pub use network::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "endpoints": { "pushUrl": "ws://reef.local:8000/ws" },
///   "realtime": { "baseDelayMs": 500 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AquaSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Controller REST and push endpoints.
    pub endpoints: EndpointSettings,
    /// Push channel reconnect behavior.
    pub realtime: RealtimeSettings,
    /// REST client behavior.
    pub http: HttpSettings,
    /// Credential persistence.
    pub credentials: CredentialSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for AquaSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "aqua".to_string(),
            endpoints: EndpointSettings::default(),
            realtime: RealtimeSettings::default(),
            http: HttpSettings::default(),
            credentials: CredentialSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AquaSettings {
    /// Reject values that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        let push = &self.endpoints.push_url;
        if !(push.starts_with("ws://") || push.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue(format!(
                "pushUrl must use ws:// or wss://, got {push}"
            )));
        }
        let rest = &self.endpoints.rest_base_url;
        if !(rest.starts_with("http://") || rest.starts_with("https://")) {
            return Err(SettingsError::InvalidValue(format!(
                "restBaseUrl must use http:// or https://, got {rest}"
            )));
        }
        if self.realtime.token_param.is_empty() {
            return Err(SettingsError::InvalidValue(
                "realtime.tokenParam must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level written to stderr.
    pub level: LogLevel,
}
