//! Subscription registry.
//!
//! Maps event names to callbacks, grouped by consumer. Each consumer gets a
//! [`Subscriber`] handle; subscribing twice to the same event through the
//! same handle replaces the earlier callback in place, and dropping the
//! handle removes everything it registered.
//!
//! Connection status events (`connected`, `disconnected`, `auth_failed`)
//! flow through the same registry as application events.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Status event emitted when the socket opens.
pub const CONNECTED_EVENT: &str = "connected";
/// Status event emitted whenever an open socket is lost.
pub const DISCONNECTED_EVENT: &str = "disconnected";
/// Status event emitted when the session cannot be recovered.
pub const AUTH_FAILED_EVENT: &str = "auth_failed";

/// Connection lifecycle notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The socket opened.
    Connected,
    /// An open socket was lost or closed.
    Disconnected,
    /// Renewal failed and the user must log in again.
    AuthFailed,
}

impl ConnectionStatus {
    /// Event name this status is delivered under.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Connected => CONNECTED_EVENT,
            Self::Disconnected => DISCONNECTED_EVENT,
            Self::AuthFailed => AUTH_FAILED_EVENT,
        }
    }
}

/// What a callback receives.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// A connection lifecycle notification.
    Status(ConnectionStatus),
    /// The `data` of an inbound frame.
    Data(Value),
}

impl EventPayload {
    /// Frame data, if this is a data payload.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::Status(_) => None,
        }
    }

    /// Status, if this is a status payload.
    pub fn status(&self) -> Option<ConnectionStatus> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Data(_) => None,
        }
    }

    /// Decode frame data into `T`. `None` for status payloads or shape mismatch.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.data()?.clone()).ok()
    }
}

/// Subscription callback.
pub type Callback = Arc<dyn Fn(&EventPayload) + Send + Sync>;

type ConsumerId = u64;

struct Subscription {
    consumer: ConsumerId,
    callback: Callback,
}

#[derive(Default)]
struct RegistryInner {
    /// Callbacks per event name, in registration order.
    events: Mutex<HashMap<String, Vec<Subscription>>>,
    next_consumer: AtomicU64,
}

impl RegistryInner {
    fn remove_consumer(&self, consumer: ConsumerId) -> usize {
        let mut events = self.events.lock();
        let mut removed = 0;
        events.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| s.consumer != consumer);
            removed += before - subs.len();
            !subs.is_empty()
        });
        removed
    }
}

/// Shared registry of event callbacks.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for a new consumer.
    pub fn consumer(&self) -> Subscriber {
        let id = self.inner.next_consumer.fetch_add(1, Ordering::Relaxed);
        Subscriber {
            id,
            registry: self.clone(),
        }
    }

    /// Invoke every callback registered for `event`, in registration order.
    ///
    /// Callbacks run after the registry lock is released, so they may
    /// subscribe or unsubscribe. Returns how many callbacks ran.
    pub fn dispatch(&self, event: &str, payload: &EventPayload) -> usize {
        let callbacks: Vec<Callback> = {
            let events = self.inner.events.lock();
            match events.get(event) {
                Some(subs) => subs.iter().map(|s| Arc::clone(&s.callback)).collect(),
                None => return 0,
            }
        };
        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    /// Number of callbacks registered for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner.events.lock().get(event).map_or(0, Vec::len)
    }

    /// Names with at least one callback.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.events.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("events", &self.event_names())
            .finish()
    }
}

/// One consumer's view of the registry.
///
/// Dropping it removes all of its subscriptions.
pub struct Subscriber {
    id: ConsumerId,
    registry: SubscriptionRegistry,
}

impl Subscriber {
    /// Register `callback` for `event`, replacing this consumer's previous
    /// callback for the same event.
    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F)
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let event = event.into();
        let callback: Callback = Arc::new(callback);
        let mut events = self.registry.inner.events.lock();
        let subs = events.entry(event.clone()).or_default();
        if let Some(existing) = subs.iter_mut().find(|s| s.consumer == self.id) {
            existing.callback = callback;
            debug!(event = %event, consumer = self.id, "replaced subscription");
        } else {
            subs.push(Subscription {
                consumer: self.id,
                callback,
            });
            debug!(event = %event, consumer = self.id, "added subscription");
        }
    }

    /// Remove this consumer's callback for `event`. Returns whether one existed.
    pub fn unsubscribe(&self, event: &str) -> bool {
        let mut events = self.registry.inner.events.lock();
        let Some(subs) = events.get_mut(event) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.consumer != self.id);
        let removed = subs.len() < before;
        if subs.is_empty() {
            let _ = events.remove(event);
        }
        removed
    }

    /// Remove every callback of this consumer. Returns how many were removed.
    pub fn unsubscribe_all(&self) -> usize {
        self.registry.inner.remove_consumer(self.id)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        let _ = self.unsubscribe_all();
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Callback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for = {
            let log = log.clone();
            move |tag: &str| -> Callback {
                let log = log.clone();
                let tag = tag.to_string();
                Arc::new(move |_: &EventPayload| log.lock().push(tag.clone()))
            }
        };
        (log, log_for)
    }

    fn data(v: Value) -> EventPayload {
        EventPayload::Data(v)
    }

    // ── subscribe / dispatch ────────────────────────────────────────

    #[test]
    fn dispatch_without_subscribers() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(registry.dispatch("temperature_update", &data(json!(1))), 0);
    }

    #[test]
    fn dispatch_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let (log, cb) = recorder();
        let a = registry.consumer();
        let b = registry.consumer();
        let cb_a = cb("a");
        let cb_b = cb("b");
        b.subscribe("ph_update", move |p| cb_b(p));
        a.subscribe("ph_update", move |p| cb_a(p));

        assert_eq!(registry.dispatch("ph_update", &data(json!(8.1))), 2);
        assert_eq!(*log.lock(), vec!["b", "a"]);
    }

    #[test]
    fn resubscribe_replaces_in_place() {
        let registry = SubscriptionRegistry::new();
        let (log, cb) = recorder();
        let first = registry.consumer();
        let second = registry.consumer();
        let (old, new, other) = (cb("old"), cb("new"), cb("other"));
        first.subscribe("temperature_update", move |p| old(p));
        second.subscribe("temperature_update", move |p| other(p));
        first.subscribe("temperature_update", move |p| new(p));

        assert_eq!(registry.subscriber_count("temperature_update"), 2);
        let _ = registry.dispatch("temperature_update", &data(json!(78.2)));
        assert_eq!(*log.lock(), vec!["new", "other"]);
    }

    #[test]
    fn callback_receives_payload() {
        let registry = SubscriptionRegistry::new();
        let seen = Arc::new(Mutex::new(None));
        let consumer = registry.consumer();
        let sink = seen.clone();
        consumer.subscribe("temperature_update", move |p| {
            *sink.lock() = p.data().cloned();
        });

        let _ = registry.dispatch("temperature_update", &data(json!({"temperature": 78.2})));
        assert_eq!(*seen.lock(), Some(json!({"temperature": 78.2})));
    }

    // ── unsubscribe ─────────────────────────────────────────────────

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let consumer = registry.consumer();
        consumer.subscribe("x", |_| {});
        assert!(consumer.unsubscribe("x"));
        assert!(!consumer.unsubscribe("x"));
        assert!(!consumer.unsubscribe("never"));
        assert_eq!(registry.subscriber_count("x"), 0);
        assert!(registry.event_names().is_empty());
    }

    #[test]
    fn unsubscribe_leaves_other_consumers() {
        let registry = SubscriptionRegistry::new();
        let a = registry.consumer();
        let b = registry.consumer();
        a.subscribe("x", |_| {});
        b.subscribe("x", |_| {});
        assert!(a.unsubscribe("x"));
        assert_eq!(registry.subscriber_count("x"), 1);
    }

    #[test]
    fn unsubscribe_all_and_drop() {
        let registry = SubscriptionRegistry::new();
        let a = registry.consumer();
        a.subscribe("x", |_| {});
        a.subscribe("y", |_| {});
        assert_eq!(a.unsubscribe_all(), 2);

        {
            let b = registry.consumer();
            b.subscribe("z", |_| {});
            assert_eq!(registry.subscriber_count("z"), 1);
        }
        assert_eq!(registry.subscriber_count("z"), 0);
    }

    #[test]
    fn callback_may_unsubscribe_during_dispatch() {
        let registry = SubscriptionRegistry::new();
        let consumer = Arc::new(registry.consumer());
        let handle = Arc::downgrade(&consumer);
        consumer.subscribe("once", move |_| {
            if let Some(c) = handle.upgrade() {
                let _ = c.unsubscribe("once");
            }
        });

        assert_eq!(registry.dispatch("once", &data(Value::Null)), 1);
        assert_eq!(registry.dispatch("once", &data(Value::Null)), 0);
    }

    // ── payload ─────────────────────────────────────────────────────

    #[test]
    fn payload_accessors() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Reading {
            temperature: f64,
        }

        let payload = data(json!({"temperature": 78.2}));
        assert_eq!(payload.decode::<Reading>(), Some(Reading { temperature: 78.2 }));
        assert!(payload.status().is_none());

        let status = EventPayload::Status(ConnectionStatus::AuthFailed);
        assert_eq!(status.status(), Some(ConnectionStatus::AuthFailed));
        assert!(status.decode::<Reading>().is_none());
        assert_eq!(ConnectionStatus::AuthFailed.event_name(), "auth_failed");
    }
}
