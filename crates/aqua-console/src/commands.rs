//! Subcommand implementations.
//!
//! Each command writes its result to `out`; diagnostics go through
//! `tracing` to stderr.

use std::io::Write;

use anyhow::{Context, Result, bail};
use aqua_auth::{ApiCall, ApiError, CredentialKind, CredentialPair, SessionSignal};
use aqua_realtime::{AUTH_FAILED_EVENT, CONNECTED_EVENT, DISCONNECTED_EVENT, EventPayload};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::session::Session;

const STATUS_EVENTS: [&str; 3] = [CONNECTED_EVENT, DISCONNECTED_EVENT, AUTH_FAILED_EVENT];

/// Store a credential pair obtained out of band.
pub fn login(session: &Session, access: &str, renewal: &str, out: &mut dyn Write) -> Result<()> {
    session
        .store
        .set_pair(&CredentialPair::new(access, renewal))
        .context("Failed to store credentials")?;
    writeln!(out, "credentials stored")?;
    Ok(())
}

/// Forget both credentials.
pub fn logout(session: &Session, out: &mut dyn Write) -> Result<()> {
    session.store.clear().context("Failed to clear credentials")?;
    writeln!(out, "credentials cleared")?;
    Ok(())
}

/// Print what is stored and where the session points.
pub fn status(session: &Session, out: &mut dyn Write) -> Result<()> {
    let report = json!({
        "credentialsPath": session.store.path().map(|p| p.display().to_string()),
        "access": session.store.get(CredentialKind::Access).is_some(),
        "renewal": session.store.get(CredentialKind::Renewal).is_some(),
        "restBaseUrl": session.settings.endpoints.rest_base_url,
        "pushUrl": session.settings.endpoints.push_url,
    });
    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(())
}

/// Exchange the renewal credential for a fresh pair.
pub async fn renew(session: &Session, out: &mut dyn Write) -> Result<()> {
    let _ = session
        .renewal
        .renew()
        .await
        .context("Session renewal failed; log in again")?;
    writeln!(out, "session renewed")?;
    Ok(())
}

/// Issue one authenticated REST call and print the response.
pub async fn call(
    session: &Session,
    method: &str,
    path: &str,
    body: Option<&str>,
    out: &mut dyn Write,
) -> Result<()> {
    let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {method}"))?;
    let mut api_call = ApiCall::new(method, path);
    if let Some(body) = body {
        let json: Value = serde_json::from_str(body).context("Request body is not valid JSON")?;
        api_call = api_call.with_body(json);
    }

    let resp = match session.client.send(api_call).await {
        Ok(resp) => resp,
        Err(ApiError::Unauthorized) => bail!("Not authorized; log in again"),
        Err(e) => return Err(e).context("Request failed"),
    };
    let status = resp.status();
    let text = resp.text().await.context("Failed to read response body")?;
    writeln!(out, "HTTP {}", status.as_u16())?;
    if !text.is_empty() {
        writeln!(out, "{text}")?;
    }
    Ok(())
}

/// Open the push channel and print events as JSON lines until Ctrl-C.
pub async fn watch(session: &Session, events: &[String], out: &mut dyn Write) -> Result<()> {
    if session.settings.credentials.watch {
        session
            .store
            .watch()
            .context("Failed to watch credential file")?;
    }

    let manager = session.connection_manager()?;
    let consumer = manager.consumer();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let names = STATUS_EVENTS
        .iter()
        .map(|s| (*s).to_string())
        .chain(events.iter().cloned());
    for name in names {
        let tx = tx.clone();
        let label = name.clone();
        consumer.subscribe(name, move |payload| {
            let _ = tx.send(event_line(&label, payload));
        });
    }
    drop(tx);

    let mut signals = session.renewal.signals();
    manager.connect()?;
    tracing::info!("watching push channel, Ctrl-C to stop");

    loop {
        tokio::select! {
            line = rx.recv() => {
                let Some(line) = line else { break };
                writeln!(out, "{line}")?;
            }
            signal = signals.recv() => {
                if let Ok(SessionSignal::LoginRequired { reason }) = signal {
                    writeln!(out, "{}", json!({"event": "login_required", "payload": {"reason": reason}}))?;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(consumer);
    manager.shutdown().await;
    session.store.unwatch();
    Ok(())
}

/// One output line for a delivered event.
pub fn event_line(name: &str, payload: &EventPayload) -> String {
    let payload = payload.data().cloned().unwrap_or(Value::Null);
    json!({"event": name, "payload": payload}).to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use aqua_realtime::ConnectionStatus;
    use aqua_settings::AquaSettings;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_for(dir: &TempDir, rest_base_url: Option<String>) -> Session {
        let mut settings = AquaSettings::default();
        if let Some(url) = rest_base_url {
            settings.endpoints.rest_base_url = url;
        }
        Session::open(settings, dir.path()).unwrap()
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn login_status_logout() {
        let dir = TempDir::new().unwrap();
        let session = session_for(&dir, None);

        let mut out = Vec::new();
        login(&session, "a1", "r1", &mut out).unwrap();
        assert!(dir.path().join("credentials.json").exists());

        let mut out = Vec::new();
        status(&session, &mut out).unwrap();
        let report: Value = serde_json::from_str(&output(out)).unwrap();
        assert_eq!(report["access"], true);
        assert_eq!(report["renewal"], true);
        assert_eq!(report["pushUrl"], "ws://localhost:8000/ws");

        let mut out = Vec::new();
        logout(&session, &mut out).unwrap();
        assert_eq!(output(out), "credentials cleared\n");
        assert!(session.store.pair().is_none());
    }

    #[test]
    fn login_persists_across_sessions() {
        let dir = TempDir::new().unwrap();
        login(&session_for(&dir, None), "a1", "r1", &mut Vec::new()).unwrap();

        let reopened = session_for(&dir, None);
        assert_eq!(reopened.store.pair(), Some(CredentialPair::new("a1", "r1")));
    }

    #[tokio::test]
    async fn renew_replaces_stored_pair() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .and(header("authorization", "Bearer r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "a2",
                "refresh_token": "r2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let session = session_for(&dir, Some(format!("{}/api", server.uri())));
        login(&session, "a1", "r1", &mut Vec::new()).unwrap();

        let mut out = Vec::new();
        renew(&session, &mut out).await.unwrap();
        assert_eq!(output(out), "session renewed\n");
        assert_eq!(session.store.pair(), Some(CredentialPair::new("a2", "r2")));
    }

    #[tokio::test]
    async fn renew_without_credentials_fails() {
        let dir = TempDir::new().unwrap();
        let session = session_for(&dir, Some("http://127.0.0.1:1/api".to_string()));
        let err = renew(&session, &mut Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("log in again"));
    }

    #[tokio::test]
    async fn call_prints_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tanks/1/dose"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let session = session_for(&dir, Some(format!("{}/api", server.uri())));
        login(&session, "a1", "r1", &mut Vec::new()).unwrap();

        let mut out = Vec::new();
        call(&session, "post", "/tanks/1/dose", Some(r#"{"ml":5}"#), &mut out)
            .await
            .unwrap();
        assert_eq!(output(out), "HTTP 201\n{\"ok\":true}\n");
    }

    #[tokio::test]
    async fn call_reports_unauthorized_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tanks"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let session = session_for(&dir, Some(format!("{}/api", server.uri())));
        login(&session, "a1", "r1", &mut Vec::new()).unwrap();

        let err = call(&session, "GET", "/tanks", None, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Not authorized"));
        assert!(session.store.pair().is_none());
    }

    #[tokio::test]
    async fn call_rejects_invalid_body() {
        let dir = TempDir::new().unwrap();
        let session = session_for(&dir, None);
        let err = call(&session, "PUT", "/tanks/1", Some("{oops"), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn event_lines() {
        assert_eq!(
            event_line("temperature_update", &EventPayload::Data(json!({"temperature": 78.2}))),
            r#"{"event":"temperature_update","payload":{"temperature":78.2}}"#
        );
        assert_eq!(
            event_line("connected", &EventPayload::Status(ConnectionStatus::Connected)),
            r#"{"event":"connected","payload":null}"#
        );
    }
}
