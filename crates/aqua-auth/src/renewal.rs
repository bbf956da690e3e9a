//! Session renewal protocol.
//!
//! Exchanges the stored renewal credential for a fresh credential pair by
//! POSTing to the renewal endpoint with `Authorization: Bearer <renewal>`.
//! A successful exchange replaces both stored credentials at once. Any
//! failure ends the session: the store is cleared and
//! [`SessionSignal::LoginRequired`] is sent, so callers never do logout
//! handling themselves.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{Mutex, broadcast};

use crate::errors::RenewalError;
use crate::store::CredentialStore;
use crate::types::{CredentialKind, CredentialPair, SessionSignal};

/// Body of a successful renewal response.
#[derive(Deserialize)]
struct RenewalResponse {
    #[serde(alias = "access", alias = "accessToken")]
    access_token: String,
    #[serde(alias = "refresh", alias = "refreshToken")]
    refresh_token: String,
}

/// Anything that can hand out a fresh credential pair.
///
/// The interceptor and the connection manager depend on this rather than on
/// [`SessionRenewal`] so tests can script renewal outcomes.
#[async_trait]
pub trait Renewer: Send + Sync {
    /// Renew because `observed_access` was rejected.
    ///
    /// If the stored access credential no longer equals `observed_access`,
    /// someone else already renewed and the stored pair is returned as-is.
    async fn renew_stale(
        &self,
        observed_access: Option<&str>,
    ) -> Result<CredentialPair, RenewalError>;
}

/// Renewal client bound to one endpoint and one credential store.
pub struct SessionRenewal {
    http: reqwest::Client,
    endpoint: String,
    store: CredentialStore,
    /// Serializes renewals within the process.
    latch: Mutex<()>,
    signals: broadcast::Sender<SessionSignal>,
}

impl SessionRenewal {
    /// Create a renewal client with a default HTTP client.
    pub fn new(endpoint: impl Into<String>, store: CredentialStore) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint, store)
    }

    /// Create a renewal client sharing an existing HTTP client.
    pub fn with_client(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        store: CredentialStore,
    ) -> Self {
        let (signals, _) = broadcast::channel(8);
        Self {
            http,
            endpoint: endpoint.into(),
            store,
            latch: Mutex::new(()),
            signals,
        }
    }

    /// Renewal endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Receive session-level signals (login required).
    pub fn signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    /// Perform one renewal exchange.
    ///
    /// Not deduplicated: every call hits the endpoint. Use
    /// [`Renewer::renew_stale`] when reacting to a rejected credential.
    #[tracing::instrument(skip_all)]
    pub async fn renew(&self) -> Result<CredentialPair, RenewalError> {
        let stored = self.exchange().await.and_then(|pair| {
            self.store
                .set_pair(&pair)
                .map(|()| pair)
                .map_err(|e| RenewalError::Storage(e.to_string()))
        });
        match stored {
            Ok(pair) => {
                tracing::info!("session renewed");
                Ok(pair)
            }
            Err(e) => {
                self.end_session(&e);
                Err(e)
            }
        }
    }

    async fn exchange(&self) -> Result<CredentialPair, RenewalError> {
        let renewal = self
            .store
            .get(CredentialKind::Renewal)
            .ok_or(RenewalError::NoRenewalCredential)?;

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(renewal)
            .send()
            .await
            .map_err(|e| RenewalError::Rejected {
                status: 0,
                message: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RenewalError::Rejected {
                status,
                message: text,
            });
        }

        let body = resp.text().await.map_err(|e| RenewalError::Rejected {
            status,
            message: e.to_string(),
        })?;
        let data: RenewalResponse =
            serde_json::from_str(&body).map_err(|e| RenewalError::Rejected {
                status,
                message: format!("malformed renewal response: {e}"),
            })?;

        Ok(CredentialPair::new(data.access_token, data.refresh_token))
    }

    fn end_session(&self, err: &RenewalError) {
        tracing::warn!(error = %err, "session renewal failed, clearing credentials");
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear credential store");
        }
        let _ = self.signals.send(SessionSignal::LoginRequired {
            reason: err.to_string(),
        });
    }
}

#[async_trait]
impl Renewer for SessionRenewal {
    async fn renew_stale(
        &self,
        observed_access: Option<&str>,
    ) -> Result<CredentialPair, RenewalError> {
        let _guard = self.latch.lock().await;
        if let Some(pair) = self.store.pair() {
            if observed_access != Some(pair.access.as_str()) {
                tracing::debug!("credentials already renewed, reusing stored pair");
                return Ok(pair);
            }
        }
        self.renew().await
    }
}

impl std::fmt::Debug for SessionRenewal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRenewal")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn seeded_store(access: &str, renewal: &str) -> CredentialStore {
        let store = CredentialStore::in_memory();
        store.set_pair(&CredentialPair::new(access, renewal)).unwrap();
        store
    }

    async fn mount_renewal(server: &MockServer, response: ResponseTemplate, times: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(response)
            .expect(times)
            .mount(server)
            .await;
    }

    // ── renew ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn renew_success_replaces_pair() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("authorization", "Bearer r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a2",
                "refresh_token": "r2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = seeded_store("a1", "r1");
        let renewal = SessionRenewal::new(format!("{}/auth/refresh", server.uri()), store.clone());

        let pair = renewal.renew().await.unwrap();
        assert_eq!(pair, CredentialPair::new("a2", "r2"));
        assert_eq!(store.pair(), Some(CredentialPair::new("a2", "r2")));
    }

    #[tokio::test]
    async fn renew_accepts_short_field_names() {
        let server = MockServer::start().await;
        mount_renewal(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access": "a2", "refresh": "r2"})),
            1,
        )
        .await;

        let store = seeded_store("a1", "r1");
        let renewal = SessionRenewal::new(format!("{}/auth/refresh", server.uri()), store);
        assert_eq!(renewal.renew().await.unwrap(), CredentialPair::new("a2", "r2"));
    }

    #[tokio::test]
    async fn renew_fails_when_new_pair_cannot_be_stored() {
        let server = MockServer::start().await;
        mount_renewal(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "a2", "refresh_token": "r2"})),
            1,
        )
        .await;

        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        let store = CredentialStore::open(nested.join("credentials.json"));
        store.set_pair(&CredentialPair::new("a1", "r1")).unwrap();
        std::fs::remove_dir_all(&nested).unwrap();
        std::fs::write(&nested, "").unwrap();

        let renewal = SessionRenewal::new(format!("{}/auth/refresh", server.uri()), store.clone());
        let mut signals = renewal.signals();

        let err = renewal.renew().await.unwrap_err();
        assert_matches!(err, RenewalError::Storage(_));
        assert_matches!(signals.try_recv(), Ok(SessionSignal::LoginRequired { .. }));
        assert_ne!(store.get(CredentialKind::Access).as_deref(), Some("a2"));
    }

    #[tokio::test]
    async fn renew_rejected_clears_store_and_signals() {
        let server = MockServer::start().await;
        mount_renewal(&server, ResponseTemplate::new(403).set_body_string("revoked"), 1).await;

        let store = seeded_store("a1", "r1");
        let renewal = SessionRenewal::new(format!("{}/auth/refresh", server.uri()), store.clone());
        let mut signals = renewal.signals();

        let err = renewal.renew().await.unwrap_err();
        assert_matches!(err, RenewalError::Rejected { status: 403, ref message } if message == "revoked");
        assert!(store.get(CredentialKind::Access).is_none());
        assert!(store.get(CredentialKind::Renewal).is_none());
        assert_matches!(signals.try_recv(), Ok(SessionSignal::LoginRequired { .. }));
    }

    #[tokio::test]
    async fn renew_malformed_body_is_rejection() {
        let server = MockServer::start().await;
        mount_renewal(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "x"})),
            1,
        )
        .await;

        let store = seeded_store("a1", "r1");
        let renewal = SessionRenewal::new(format!("{}/auth/refresh", server.uri()), store.clone());

        let err = renewal.renew().await.unwrap_err();
        assert_matches!(err, RenewalError::Rejected { status: 200, .. });
        assert!(store.pair().is_none());
    }

    #[tokio::test]
    async fn renew_without_renewal_credential_fails_fast() {
        let server = MockServer::start().await;
        mount_renewal(&server, ResponseTemplate::new(200), 0).await;

        let store = CredentialStore::in_memory();
        store.set(CredentialKind::Access, "a1").unwrap();
        let renewal = SessionRenewal::new(format!("{}/auth/refresh", server.uri()), store.clone());
        let mut signals = renewal.signals();

        assert_eq!(renewal.renew().await.unwrap_err(), RenewalError::NoRenewalCredential);
        assert!(store.get(CredentialKind::Access).is_none());
        assert_matches!(signals.try_recv(), Ok(SessionSignal::LoginRequired { .. }));
    }

    #[tokio::test]
    async fn renew_network_failure_has_status_zero() {
        let store = seeded_store("a1", "r1");
        let renewal = SessionRenewal::new("http://127.0.0.1:1/auth/refresh", store.clone());

        let err = renewal.renew().await.unwrap_err();
        assert_matches!(err, RenewalError::Rejected { status: 0, .. });
        assert!(store.pair().is_none());
    }

    // ── renew_stale ─────────────────────────────────────────────────

    #[tokio::test]
    async fn renew_stale_reuses_already_renewed_pair() {
        let server = MockServer::start().await;
        mount_renewal(&server, ResponseTemplate::new(200), 0).await;

        let store = seeded_store("a2", "r2");
        let renewal = SessionRenewal::new(format!("{}/auth/refresh", server.uri()), store);

        let pair = renewal.renew_stale(Some("a1")).await.unwrap();
        assert_eq!(pair, CredentialPair::new("a2", "r2"));
    }

    #[tokio::test]
    async fn concurrent_stale_renewals_hit_endpoint_once() {
        let server = MockServer::start().await;
        mount_renewal(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "a2", "refresh_token": "r2"}))
                .set_delay(Duration::from_millis(100)),
            1,
        )
        .await;

        let store = seeded_store("a1", "r1");
        let renewal = SessionRenewal::new(format!("{}/auth/refresh", server.uri()), store);

        let (first, second) =
            tokio::join!(renewal.renew_stale(Some("a1")), renewal.renew_stale(Some("a1")));
        assert_eq!(first.unwrap(), CredentialPair::new("a2", "r2"));
        assert_eq!(second.unwrap(), CredentialPair::new("a2", "r2"));
    }

    #[tokio::test]
    async fn renew_stale_with_current_credential_renews() {
        let server = MockServer::start().await;
        mount_renewal(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "a2", "refresh_token": "r2"})),
            1,
        )
        .await;

        let store = seeded_store("a1", "r1");
        let renewal = SessionRenewal::new(format!("{}/auth/refresh", server.uri()), store);
        assert_eq!(
            renewal.renew_stale(Some("a1")).await.unwrap(),
            CredentialPair::new("a2", "r2")
        );
    }
}
