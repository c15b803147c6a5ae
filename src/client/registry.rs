//! Subscription registry: maps subscription ids to topics and handlers
//! and routes inbound message bodies to them.
//!
//! The registry never talks to a transport itself; the client sends the
//! SUBSCRIBE / UNSUBSCRIBE frames and keeps the registry in step. Lookup
//! and parsing ([`SubscriptionRegistry::route`]) are split from handler
//! invocation ([`Delivery::deliver`]) so handlers run without any client
//! lock held.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Callback receiving the parsed JSON body of every frame on a topic.
pub type MessageHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Opaque subscription handle.
///
/// The empty id is the "not subscribed" sentinel returned when
/// subscribing without a connection; it is accepted everywhere and does
/// nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// The "not subscribed" sentinel.
    #[must_use]
    pub const fn none() -> Self {
        Self(String::new())
    }

    /// Returns `true` for the sentinel.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    /// Wire form, as used in the `id` / `subscription` headers.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

struct Subscription {
    topic: String,
    handler: MessageHandler,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Outcome of routing one inbound body.
pub enum Delivery {
    /// A handler was found and the body parsed.
    Deliver {
        /// Subscription the body belongs to.
        id: SubscriptionId,
        /// Handler to invoke.
        handler: MessageHandler,
        /// Parsed body.
        payload: serde_json::Value,
    },
    /// No live subscription with that id.
    Unknown(SubscriptionId),
    /// The body was not valid JSON.
    Malformed {
        /// Subscription the body was addressed to.
        id: SubscriptionId,
        /// Parse failure.
        error: serde_json::Error,
    },
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deliver { id, payload, .. } => f
                .debug_struct("Deliver")
                .field("id", id)
                .field("payload", payload)
                .finish_non_exhaustive(),
            Self::Unknown(id) => f.debug_tuple("Unknown").field(id).finish(),
            Self::Malformed { id, error } => f
                .debug_struct("Malformed")
                .field("id", id)
                .field("error", error)
                .finish(),
        }
    }
}

impl Delivery {
    /// Invokes the handler, or logs why the body was dropped. Returns
    /// `true` if a handler ran to completion.
    ///
    /// A panicking handler is contained here: the frame is dropped and the
    /// connection, like every other subscription, keeps running.
    pub fn deliver(self) -> bool {
        match self {
            Self::Deliver {
                id,
                handler,
                payload,
            } => match panic::catch_unwind(AssertUnwindSafe(move || handler(payload))) {
                Ok(()) => true,
                Err(cause) => {
                    tracing::error!(
                        subscription = %id,
                        panic = panic_message(cause.as_ref()),
                        "message handler panicked, dropping frame"
                    );
                    false
                }
            },
            Self::Unknown(id) => {
                tracing::debug!(subscription = %id, "dropping frame for unknown subscription");
                false
            }
            Self::Malformed { id, error } => {
                tracing::warn!(subscription = %id, error = %error, "dropping non-JSON message body");
                false
            }
        }
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Live subscriptions keyed by id.
///
/// Several subscriptions may share a topic; each gets its own id and its
/// own copy of every frame.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<SubscriptionId, Subscription>,
    next_id: u64,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a fresh id. Ids are never reused for the lifetime of the
    /// registry, so ids destroyed by a disconnect stay inert.
    pub fn allocate_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(format!("sub-{}", self.next_id));
        self.next_id += 1;
        id
    }

    /// Stores a subscription under `id`.
    pub fn insert(&mut self, id: SubscriptionId, topic: impl Into<String>, handler: MessageHandler) {
        self.entries.insert(
            id,
            Subscription {
                topic: topic.into(),
                handler,
            },
        );
    }

    /// Removes a subscription, returning its topic. Unknown and sentinel
    /// ids return `None`.
    pub fn remove(&mut self, id: &SubscriptionId) -> Option<String> {
        self.entries.remove(id).map(|s| s.topic)
    }

    /// Removes every subscription, returning their ids.
    pub fn drain(&mut self) -> Vec<SubscriptionId> {
        self.entries.drain().map(|(id, _)| id).collect()
    }

    /// Returns the topic of a live subscription.
    #[must_use]
    pub fn topic(&self, id: &SubscriptionId) -> Option<&str> {
        self.entries.get(id).map(|s| s.topic.as_str())
    }

    /// Iterates over `(id, topic)` for every live subscription.
    pub fn iter(&self) -> impl Iterator<Item = (&SubscriptionId, &str)> {
        self.entries.iter().map(|(id, s)| (id, s.topic.as_str()))
    }

    /// Looks up the handler for `id` and parses `raw_body`.
    #[must_use]
    pub fn route(&self, id: &SubscriptionId, raw_body: &str) -> Delivery {
        let Some(subscription) = self.entries.get(id) else {
            return Delivery::Unknown(id.clone());
        };
        match serde_json::from_str(raw_body) {
            Ok(payload) => Delivery::Deliver {
                id: id.clone(),
                handler: Arc::clone(&subscription.handler),
                payload,
            },
            Err(error) => Delivery::Malformed {
                id: id.clone(),
                error,
            },
        }
    }

    /// Routes and delivers in one step. Returns `true` if a handler ran.
    pub fn dispatch(&self, id: &SubscriptionId, raw_body: &str) -> bool {
        self.route(id, raw_body).deliver()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when there are no live subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    fn recorder() -> (MessageHandler, Arc<Mutex<Vec<serde_json::Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: MessageHandler = Arc::new(move |value| sink.lock().push(value));
        (handler, seen)
    }

    #[test]
    fn allocated_ids_are_unique_and_not_sentinel() {
        let mut registry = SubscriptionRegistry::new();
        let a = registry.allocate_id();
        let b = registry.allocate_id();
        assert_ne!(a, b);
        assert!(!a.is_none());
        assert_eq!(a.as_str(), "sub-0");
        assert_eq!(b.to_string(), "sub-1");
    }

    #[test]
    fn dispatch_parses_and_invokes_handler() {
        let mut registry = SubscriptionRegistry::new();
        let (handler, seen) = recorder();
        let id = registry.allocate_id();
        registry.insert(id.clone(), "/topic/activity", handler);

        assert!(registry.dispatch(&id, r#"{"id":"a1","userId":7}"#));
        assert_eq!(*seen.lock(), vec![json!({"id": "a1", "userId": 7})]);
    }

    #[test]
    fn same_topic_subscriptions_fan_out() {
        let mut registry = SubscriptionRegistry::new();
        let (h1, seen1) = recorder();
        let (h2, seen2) = recorder();
        let id1 = registry.allocate_id();
        let id2 = registry.allocate_id();
        registry.insert(id1.clone(), "/topic/document-status", h1);
        registry.insert(id2.clone(), "/topic/document-status", h2);

        assert!(registry.dispatch(&id1, "{}"));
        assert!(registry.dispatch(&id2, "{}"));
        assert_eq!(seen1.lock().len(), 1);
        assert_eq!(seen2.lock().len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unknown_subscription_is_dropped() {
        let registry = SubscriptionRegistry::new();
        let delivery = registry.route(&SubscriptionId::from("sub-42"), "{}");
        assert!(matches!(delivery, Delivery::Unknown(_)));
        assert!(!delivery.deliver());
    }

    #[test]
    fn malformed_body_is_dropped_and_subscription_survives() {
        let mut registry = SubscriptionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = registry.allocate_id();
        registry.insert(
            id.clone(),
            "/topic/activity",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(matches!(registry.route(&id, "not json"), Delivery::Malformed { .. }));
        assert!(!registry.dispatch(&id, "not json"));
        assert!(registry.dispatch(&id, "[]"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.topic(&id), Some("/topic/activity"));
    }

    fn faulty_handler(_: serde_json::Value) {
        panic!("handler bug");
    }

    #[test]
    fn panicking_handler_is_contained() {
        let mut registry = SubscriptionRegistry::new();
        let faulty = registry.allocate_id();
        registry.insert(faulty.clone(), "/topic/activity", Arc::new(faulty_handler));
        let (handler, seen) = recorder();
        let healthy = registry.allocate_id();
        registry.insert(healthy.clone(), "/topic/activity", handler);

        assert!(!registry.dispatch(&faulty, "{}"));
        assert!(registry.dispatch(&healthy, "{}"));
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_unknown_or_sentinel_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.remove(&SubscriptionId::none()).is_none());
        assert!(registry.remove(&SubscriptionId::from("sub-9")).is_none());
    }

    #[test]
    fn drain_empties_and_ids_are_not_reused() {
        let mut registry = SubscriptionRegistry::new();
        let (handler, _) = recorder();
        let old = registry.allocate_id();
        registry.insert(old.clone(), "/topic/activity", handler);

        assert_eq!(registry.drain(), vec![old.clone()]);
        assert!(registry.is_empty());
        assert!(!registry.dispatch(&old, "{}"));
        assert_ne!(registry.allocate_id(), old);
    }
}
