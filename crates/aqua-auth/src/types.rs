//! Credential types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which credential of the pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// Short-lived bearer credential for REST and push access.
    Access,
    /// Longer-lived credential used only to obtain a fresh pair.
    Renewal,
}

impl CredentialKind {
    /// Both kinds, in storage order.
    pub const ALL: [Self; 2] = [Self::Access, Self::Renewal];

    /// Key under which the credential is persisted.
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Access => "access_token",
            Self::Renewal => "refresh_token",
        }
    }

    /// Inverse of [`storage_key`](Self::storage_key).
    pub fn from_storage_key(key: &str) -> Option<Self> {
        match key {
            "access_token" => Some(Self::Access),
            "refresh_token" => Some(Self::Renewal),
            _ => None,
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// An access credential together with the renewal credential issued with it.
///
/// Always stored and replaced as a whole.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Access credential.
    pub access: String,
    /// Renewal credential.
    pub renewal: String,
}

impl CredentialPair {
    /// Build a pair.
    pub fn new(access: impl Into<String>, renewal: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            renewal: renewal.into(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"<redacted>")
            .field("renewal", &"<redacted>")
            .finish()
    }
}

/// A persisted credential changed outside this process.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialChange {
    /// Which credential changed.
    pub kind: CredentialKind,
    /// The new value, `None` when it was removed.
    pub value: Option<String>,
}

impl fmt::Debug for CredentialChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialChange")
            .field("kind", &self.kind)
            .field("present", &self.value.is_some())
            .finish()
    }
}

/// Session-level notifications for the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionSignal {
    /// The session is gone; credentials were cleared and the user must log in again.
    LoginRequired {
        /// Why the session ended.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_roundtrip() {
        for kind in CredentialKind::ALL {
            assert_eq!(CredentialKind::from_storage_key(kind.storage_key()), Some(kind));
        }
        assert_eq!(CredentialKind::from_storage_key("theme"), None);
    }

    #[test]
    fn pair_debug_redacts_values() {
        let pair = CredentialPair::new("secret-access", "secret-renewal");
        let debug = format!("{pair:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn change_debug_hides_value() {
        let change = CredentialChange {
            kind: CredentialKind::Access,
            value: Some("tok-123".to_string()),
        };
        let debug = format!("{change:?}");
        assert!(!debug.contains("tok-123"));
        assert!(debug.contains("present: true"));
    }
}
