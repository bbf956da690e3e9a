//! Wiring of the session components from loaded settings.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use aqua_auth::{AuthenticatedClient, CredentialStore, SessionRenewal};
use aqua_realtime::{ConnectionConfig, ConnectionManager, SubscriptionRegistry, WsConnector};
use aqua_settings::AquaSettings;

/// The explicitly constructed handles every command works with.
pub struct Session {
    pub settings: AquaSettings,
    pub store: CredentialStore,
    pub renewal: Arc<SessionRenewal>,
    pub client: AuthenticatedClient,
}

impl Session {
    /// Build the store, renewal client, and REST client. `home` anchors a
    /// relative credential path.
    pub fn open(settings: AquaSettings, home: &Path) -> Result<Self> {
        let path = settings.credentials.resolve_path(home);
        tracing::debug!(path = %path.display(), "opening credential store");
        let store = CredentialStore::open(path);

        let http = reqwest::Client::builder()
            .timeout(settings.http.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        let renewal = Arc::new(SessionRenewal::with_client(
            http.clone(),
            settings.endpoints.renew_url(),
            store.clone(),
        ));
        let client = AuthenticatedClient::with_client(
            http,
            settings.endpoints.rest_base_url.clone(),
            store.clone(),
            renewal.clone(),
        );

        Ok(Self {
            settings,
            store,
            renewal,
            client,
        })
    }

    /// Spawn a push channel manager bound to this session.
    pub fn connection_manager(&self) -> Result<ConnectionManager> {
        let config = ConnectionConfig::from_settings(&self.settings)
            .context("Invalid push channel configuration")?;
        let connector = Arc::new(WsConnector::new(config.connect_timeout));
        Ok(ConnectionManager::spawn(
            config,
            self.store.clone(),
            self.renewal.clone(),
            connector,
            SubscriptionRegistry::new(),
        ))
    }
}
