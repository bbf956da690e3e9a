//! Push channel connection manager.
//!
//! One actor task per process owns the socket and the state machine. It
//! waits on every stimulus at once (API commands, socket events, the
//! handshake result, the renewal result, the reconnect timer, and
//! credential changes from other processes) and handles them one at a time
//! to completion.
//!
//! Handshakes and renewals run in their own tasks and report back through
//! oneshot channels. Tearing down drops the receivers, so late results are
//! discarded; a socket opened by a discarded handshake is closed by the
//! task that opened it.

use std::sync::Arc;

use aqua_auth::{
    CredentialChange, CredentialKind, CredentialPair, CredentialStore, RenewalError, Renewer,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::errors::{RealtimeError, TransportError};
use crate::frame::{Frame, parse_frame};
use crate::registry::{ConnectionStatus, EventPayload, Subscriber, SubscriptionRegistry};
use crate::state::{CloseDisposition, ConnectionSnapshot, ConnectionState, classify_close};
use crate::transport::{Connector, PushSocket, SocketEvent};

type HandshakeResult = Result<Box<dyn PushSocket>, TransportError>;
type RenewalResult = Result<CredentialPair, RenewalError>;

/// Requests from the public handle.
#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Shutdown,
}

/// Everything the actor reacts to.
enum Stimulus {
    Command(Command),
    Socket(SocketEvent),
    Handshake(Option<HandshakeResult>),
    Renewal(Option<RenewalResult>),
    Timer,
    Credential(Result<CredentialChange, RecvError>),
}

/// Handle to the push channel actor.
///
/// Dropping the handle stops the actor the same way [`shutdown`](Self::shutdown) does.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ConnectionSnapshot>,
    registry: SubscriptionRegistry,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Start the actor. It stays idle until [`connect`](Self::connect).
    pub fn spawn(
        config: ConnectionConfig,
        store: CredentialStore,
        renewer: Arc<dyn Renewer>,
        connector: Arc<dyn Connector>,
        registry: SubscriptionRegistry,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(ConnectionSnapshot::default());
        let actor = Actor {
            config,
            store,
            renewer,
            connector,
            registry: registry.clone(),
            snapshot: snapshot_tx,
            state: ConnectionState::Idle,
            attempt: 0,
            access: None,
            socket: None,
            handshake: None,
            renewal: None,
            deadline: None,
        };
        let task = tokio::spawn(actor.run(command_rx));
        Self {
            commands,
            snapshot,
            registry,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    /// Open the push channel. Ignored unless idle.
    pub fn connect(&self) -> Result<(), RealtimeError> {
        self.send(Command::Connect)
    }

    /// Close the socket, cancel the timer, and discard pending results.
    pub fn disconnect(&self) -> Result<(), RealtimeError> {
        self.send(Command::Disconnect)
    }

    /// Disconnect and wait for the actor to exit.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "connection manager task failed");
            }
        }
    }

    /// Current state and attempt counter.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        *self.snapshot.borrow()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot.clone()
    }

    /// Registry the manager dispatches into.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// New consumer handle on the manager's registry.
    pub fn consumer(&self) -> Subscriber {
        self.registry.consumer()
    }

    fn send(&self, command: Command) -> Result<(), RealtimeError> {
        self.commands
            .send(command)
            .map_err(|_| RealtimeError::ManagerStopped)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

// ── Actor ───────────────────────────────────────────────────────────────────

struct Actor {
    config: ConnectionConfig,
    store: CredentialStore,
    renewer: Arc<dyn Renewer>,
    connector: Arc<dyn Connector>,
    registry: SubscriptionRegistry,
    snapshot: watch::Sender<ConnectionSnapshot>,
    state: ConnectionState,
    attempt: u32,
    /// Access credential behind the current socket or handshake.
    access: Option<String>,
    socket: Option<Box<dyn PushSocket>>,
    handshake: Option<oneshot::Receiver<HandshakeResult>>,
    renewal: Option<oneshot::Receiver<RenewalResult>>,
    /// Reconnect or post-renewal timer.
    deadline: Option<Instant>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut changes = Some(self.store.subscribe());
        loop {
            let stimulus = tokio::select! {
                cmd = commands.recv() => Stimulus::Command(cmd.unwrap_or(Command::Shutdown)),
                event = next_socket_event(&mut self.socket) => Stimulus::Socket(event),
                result = take_result(&mut self.handshake) => Stimulus::Handshake(result),
                result = take_result(&mut self.renewal) => Stimulus::Renewal(result),
                () = wait_deadline(self.deadline) => Stimulus::Timer,
                change = next_change(&mut changes) => Stimulus::Credential(change),
            };
            if !self.handle(stimulus).await {
                break;
            }
        }
        self.teardown().await;
        debug!("connection manager stopped");
    }

    /// Returns `false` when the actor should exit.
    async fn handle(&mut self, stimulus: Stimulus) -> bool {
        match stimulus {
            Stimulus::Command(Command::Connect) => self.on_connect(),
            Stimulus::Command(Command::Disconnect) => self.teardown().await,
            Stimulus::Command(Command::Shutdown) => return false,
            Stimulus::Socket(event) => self.on_socket_event(event).await,
            Stimulus::Handshake(result) => self.on_handshake(result),
            Stimulus::Renewal(result) => self.on_renewal(result),
            Stimulus::Timer => self.on_timer(),
            Stimulus::Credential(change) => self.on_credential_change(change).await,
        }
        true
    }

    fn on_connect(&mut self) {
        if self.state != ConnectionState::Idle {
            debug!(state = %self.state, "connect ignored, channel already active");
            return;
        }
        self.attempt = 0;
        self.start_connect();
    }

    fn start_connect(&mut self) {
        self.deadline = None;
        let Some(access) = self.store.get(CredentialKind::Access) else {
            info!("no access credential, renewing before connect");
            self.access = None;
            self.begin_auth_recovery();
            return;
        };

        let url = self.config.socket_url(&access);
        self.access = Some(access);
        let connector = Arc::clone(&self.connector);
        let (tx, rx) = oneshot::channel();
        drop(tokio::spawn(async move {
            let result = connector.connect(&url).await;
            if let Err(Ok(mut orphan)) = tx.send(result) {
                orphan.close().await;
            }
        }));
        self.handshake = Some(rx);
        self.set_state(ConnectionState::Connecting);
    }

    fn on_handshake(&mut self, result: Option<HandshakeResult>) {
        match result {
            Some(Ok(socket)) => {
                self.socket = Some(socket);
                self.attempt = 0;
                self.set_state(ConnectionState::Open);
                info!("push channel open");
                self.emit(ConnectionStatus::Connected);
            }
            Some(Err(e)) if e.is_auth_rejection() => {
                warn!(error = %e, "push handshake rejected");
                self.begin_auth_recovery();
            }
            Some(Err(e)) => {
                warn!(error = %e, "push handshake failed");
                self.schedule_reconnect();
            }
            None => {
                warn!("handshake task ended without a result");
                self.schedule_reconnect();
            }
        }
    }

    async fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Text(text) => self.on_frame(&text).await,
            SocketEvent::Closed { code, reason } => {
                self.socket = None;
                info!(code = ?code, reason = %reason, "push channel closed");
                self.emit(ConnectionStatus::Disconnected);
                match classify_close(code) {
                    CloseDisposition::Clean => self.set_state(ConnectionState::Idle),
                    CloseDisposition::AuthRejected => self.begin_auth_recovery(),
                    CloseDisposition::Reconnect => self.schedule_reconnect(),
                }
            }
            SocketEvent::Failed(error) => {
                self.socket = None;
                warn!(error = %error, "push channel failed");
                self.emit(ConnectionStatus::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    async fn on_frame(&mut self, text: &str) {
        match parse_frame(text) {
            Ok(Frame::AuthError { .. }) => {
                warn!("credential rejected on open push channel");
                self.close_socket().await;
                self.emit(ConnectionStatus::Disconnected);
                self.begin_auth_recovery();
            }
            Ok(Frame::Event { name, data, inner }) => {
                let delivered = self.registry.dispatch(&name, &EventPayload::Data(data));
                trace!(event = %name, delivered, "dispatched frame");
                if let Some(inner) = inner {
                    let delivered = self
                        .registry
                        .dispatch(&inner.name, &EventPayload::Data(inner.payload));
                    trace!(event = %inner.name, delivered, "dispatched envelope");
                }
            }
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    fn schedule_reconnect(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
        if self.config.backoff.exhausted(self.attempt) {
            warn!(attempt = self.attempt, "reconnect attempts exhausted, giving up");
            self.set_state(ConnectionState::Idle);
            return;
        }
        let delay = self.config.backoff.delay_for(self.attempt);
        info!(
            attempt = self.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        self.deadline = Some(Instant::now() + delay);
        self.set_state(ConnectionState::ReconnectScheduled);
    }

    fn begin_auth_recovery(&mut self) {
        self.deadline = None;
        self.set_state(ConnectionState::AuthRecovering);
        let observed = self.access.clone();
        let renewer = Arc::clone(&self.renewer);
        let (tx, rx) = oneshot::channel();
        drop(tokio::spawn(async move {
            let result = renewer.renew_stale(observed.as_deref()).await;
            let _ = tx.send(result);
        }));
        self.renewal = Some(rx);
    }

    fn on_renewal(&mut self, result: Option<RenewalResult>) {
        match result {
            Some(Ok(_)) => {
                self.attempt = 0;
                let delay = self.config.auth_retry_delay;
                info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "session renewed, reconnecting"
                );
                self.deadline = Some(Instant::now() + delay);
                self.publish();
            }
            Some(Err(e)) => {
                warn!(error = %e, "session renewal failed, push channel stays down");
                self.fail_auth();
            }
            None => {
                warn!("renewal task ended without a result");
                self.fail_auth();
            }
        }
    }

    fn fail_auth(&mut self) {
        self.access = None;
        self.set_state(ConnectionState::Idle);
        self.emit(ConnectionStatus::AuthFailed);
    }

    fn on_timer(&mut self) {
        self.deadline = None;
        if matches!(
            self.state,
            ConnectionState::ReconnectScheduled | ConnectionState::AuthRecovering
        ) {
            self.start_connect();
        }
    }

    async fn on_credential_change(&mut self, change: Result<CredentialChange, RecvError>) {
        let latest = match change {
            Ok(change) if change.kind == CredentialKind::Access => change.value,
            Ok(_) | Err(RecvError::Closed) => return,
            Err(RecvError::Lagged(_)) => self.store.get(CredentialKind::Access),
        };
        if latest == self.access {
            return;
        }

        match (self.state, latest) {
            (ConnectionState::Open | ConnectionState::Connecting, Some(_)) => {
                info!("access credential changed by another process, reconnecting");
                self.handshake = None;
                if self.socket.is_some() {
                    self.close_socket().await;
                    self.emit(ConnectionStatus::Disconnected);
                }
                self.attempt = 0;
                self.start_connect();
            }
            (
                ConnectionState::Open
                | ConnectionState::Connecting
                | ConnectionState::ReconnectScheduled,
                None,
            ) => {
                info!("credentials cleared by another process");
                self.teardown().await;
                self.emit(ConnectionStatus::AuthFailed);
            }
            _ => {}
        }
    }

    /// Return to idle, discarding everything in flight.
    async fn teardown(&mut self) {
        self.deadline = None;
        self.handshake = None;
        self.renewal = None;
        if self.socket.is_some() {
            self.close_socket().await;
            self.emit(ConnectionStatus::Disconnected);
        }
        if self.state != ConnectionState::Idle {
            info!(state = %self.state, "push channel disconnected");
        }
        self.access = None;
        self.attempt = 0;
        self.set_state(ConnectionState::Idle);
    }

    async fn close_socket(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            self.set_state(ConnectionState::Closing);
            socket.close().await;
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, attempt = self.attempt, "state transition");
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        let _ = self.snapshot.send_replace(ConnectionSnapshot {
            state: self.state,
            attempt: self.attempt,
        });
    }

    fn emit(&self, status: ConnectionStatus) {
        let _ = self
            .registry
            .dispatch(status.event_name(), &EventPayload::Status(status));
    }
}

// ── Stimulus sources ────────────────────────────────────────────────────────

async fn next_socket_event(socket: &mut Option<Box<dyn PushSocket>>) -> SocketEvent {
    match socket {
        Some(socket) => socket.next_event().await,
        None => std::future::pending().await,
    }
}

/// Resolve when the pending result arrives, clearing the slot.
async fn take_result<T>(slot: &mut Option<oneshot::Receiver<T>>) -> Option<T> {
    let Some(rx) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let result = rx.await.ok();
    *slot = None;
    result
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_change(
    changes: &mut Option<broadcast::Receiver<CredentialChange>>,
) -> Result<CredentialChange, RecvError> {
    let Some(rx) = changes.as_mut() else {
        return std::future::pending().await;
    };
    let result = rx.recv().await;
    if matches!(result, Err(RecvError::Closed)) {
        *changes = None;
    }
    result
}
