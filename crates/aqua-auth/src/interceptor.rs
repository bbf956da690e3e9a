//! Authenticated REST calls.
//!
//! [`AuthenticatedClient`] attaches the stored access credential to every
//! call. A 401 triggers one renewal through the shared [`Renewer`] and one
//! re-issue of the call with the new credential. A second 401, or a failed
//! renewal, surfaces as [`ApiError::Unauthorized`]; by then the renewal
//! protocol has already cleared the session.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ApiError;
use crate::renewal::Renewer;
use crate::store::CredentialStore;
use crate::types::CredentialKind;

/// Description of one REST call, rebuilt into a request per attempt.
#[derive(Clone, Debug)]
pub struct ApiCall {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiCall {
    /// Call with an arbitrary method.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path` with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    /// `PUT path` with a JSON body.
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    /// `PATCH path` with a JSON body.
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    /// `DELETE path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the REST base URL.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// REST client that keeps calls authenticated.
#[derive(Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    base_url: String,
    store: CredentialStore,
    renewer: Arc<dyn Renewer>,
}

impl AuthenticatedClient {
    /// Create a client with a default HTTP client.
    pub fn new(
        base_url: impl Into<String>,
        store: CredentialStore,
        renewer: Arc<dyn Renewer>,
    ) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, store, renewer)
    }

    /// Create a client sharing an existing HTTP client.
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        store: CredentialStore,
        renewer: Arc<dyn Renewer>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            store,
            renewer,
        }
    }

    /// Send a call, renewing the session at most once on 401.
    #[tracing::instrument(skip_all, fields(method = %call.method, path = %call.path))]
    pub async fn send(&self, call: ApiCall) -> Result<reqwest::Response, ApiError> {
        let access = self.store.get(CredentialKind::Access);
        let resp = self.issue(&call, access.as_deref()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_status(resp).await;
        }

        tracing::debug!("call rejected with 401, renewing session");
        let pair = match self.renewer.renew_stale(access.as_deref()).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "renewal failed, giving up on call");
                return Err(ApiError::Unauthorized);
            }
        };

        let resp = self.issue(&call, Some(&pair.access)).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!("call rejected again after renewal");
            return Err(ApiError::Unauthorized);
        }
        check_status(resp).await
    }

    /// Send a call and decode the JSON response body.
    pub async fn send_json<T: DeserializeOwned>(&self, call: ApiCall) -> Result<T, ApiError> {
        let resp = self.send(call).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn issue(
        &self,
        call: &ApiCall,
        access: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = endpoint_url(&self.base_url, &call.path);
        let mut req = self.http.request(call.method.clone(), url);
        if !call.query.is_empty() {
            req = req.query(&call.query);
        }
        if let Some(body) = &call.body {
            req = req.json(body);
        }
        if let Some(token) = access {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?)
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}

/// Resolve `path` against `base`. Absolute URLs pass through.
fn endpoint_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
