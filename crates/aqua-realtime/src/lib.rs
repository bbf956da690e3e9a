//! # aqua-realtime
//!
//! The controller push channel.
//!
//! - [`manager`]: the connection actor (connect, reconnect with backoff,
//!   recover from rejected credentials, follow credential changes made by
//!   other processes)
//! - [`registry`]: event-name to callback subscriptions per consumer
//! - [`frame`]: decoding of inbound `{type, data}` frames
//! - [`transport`]: the socket seam, with a `tokio-tungstenite` implementation
//!
//! Subscribers only ever see application events plus the three status
//! events `connected`, `disconnected`, and `auth_failed`.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod frame;
pub mod manager;
pub mod registry;
pub mod state;
pub mod transport;

pub use config::ConnectionConfig;
pub use errors::{FrameError, RealtimeError, TransportError};
pub use frame::{Frame, InnerEvent, parse_frame};
pub use manager::ConnectionManager;
pub use registry::{
    AUTH_FAILED_EVENT, CONNECTED_EVENT, Callback, ConnectionStatus, DISCONNECTED_EVENT,
    EventPayload, Subscriber, SubscriptionRegistry,
};
pub use state::{
    CLOSE_AUTH_REJECTED, CLOSE_NO_STATUS, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, CloseDisposition,
    ConnectionSnapshot, ConnectionState, classify_close,
};
pub use transport::{Connector, PushSocket, SocketEvent, WsConnector};
