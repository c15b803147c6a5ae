//! Real-time client: one logical STOMP connection shared by many
//! independent subscribers.
//!
//! [`RealtimeClient`] is a cheap, cloneable handle. All clones drive the
//! same connection, registry and reconnect policy. Construct one in the
//! application's initialization routine, call
//! [`connect`](RealtimeClient::connect) with the user's credential, and
//! call [`disconnect`](RealtimeClient::disconnect) on shutdown.
//!
//! Handlers run one at a time on the connection's session task, never
//! concurrently with each other or with a state transition.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::RealtimeError;
use crate::stomp;
use crate::transport::{self, Transport};

mod connection;
pub mod reconnect;
pub mod registry;
pub mod state;

pub use reconnect::ReconnectPolicy;
pub use registry::{Delivery, MessageHandler, SubscriptionId, SubscriptionRegistry};
pub use state::{ConnectionState, ConnectionStatus};

/// Bearer token presented in the CONNECT frame.
///
/// The token is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a bearer token.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self::bearer(token)
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self(token)
    }
}

type PendingConnect = oneshot::Sender<Result<(), RealtimeError>>;

/// Mutable client state, guarded by one lock.
#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    /// Bumped by every attempt and by `disconnect`; callbacks carrying an
    /// older epoch are stale and ignored.
    epoch: u64,
    credential: Option<Credential>,
    policy: ReconnectPolicy,
    exhausted: bool,
    /// Present only while `Connected`.
    outbound: Option<mpsc::UnboundedSender<String>>,
    registry: SubscriptionRegistry,
    session: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
    pending: Option<PendingConnect>,
}

#[derive(Debug)]
struct Shared {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Shared {
    /// Applies a transition from the table in [`state`]. Same-state
    /// transitions are no-ops; anything else off the table is refused.
    fn transition(&self, inner: &mut Inner, next: ConnectionState) -> bool {
        if inner.state == next {
            return true;
        }
        if !inner.state.can_transition_to(next) {
            tracing::warn!(from = %inner.state, to = %next, "refusing invalid state transition");
            return false;
        }
        tracing::debug!(from = %inner.state, to = %next, "connection state changed");
        inner.state = next;
        self.state_tx.send_replace(next);
        true
    }
}

/// Handle to the real-time messaging client.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    shared: Arc<Shared>,
}

impl RealtimeClient {
    /// Creates a disconnected client that opens connections through
    /// `transport`.
    #[must_use]
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let policy = ReconnectPolicy::new(config.max_reconnect_attempts, config.base_delay);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let inner = Inner {
            state: ConnectionState::Disconnected,
            epoch: 0,
            credential: None,
            policy,
            exhausted: false,
            outbound: None,
            registry: SubscriptionRegistry::new(),
            session: None,
            retry_timer: None,
            pending: None,
        };
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                inner: Mutex::new(inner),
                state_tx,
            }),
        }
    }

    /// Creates a client using the transport selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if the configured transport is not
    /// available in this build.
    pub fn from_config(config: ClientConfig) -> Result<Self, RealtimeError> {
        let transport = transport::build(&config)?;
        Ok(Self::new(config, transport))
    }

    /// Returns the configuration the client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Returns `true` while the handshake is acknowledged.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns a snapshot of state, reconnect progress and subscriptions.
    ///
    /// This is the only place an exhausted reconnect budget is visible
    /// besides the log.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let inner = self.shared.inner.lock();
        ConnectionStatus {
            state: inner.state,
            attempt: inner.policy.attempt(),
            max_attempts: inner.policy.max_attempts(),
            exhausted: inner.exhausted,
            subscriptions: inner.registry.len(),
        }
    }

    /// Returns a receiver that observes every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribes `handler` to `topic`.
    ///
    /// Returns the sentinel [`SubscriptionId::none`] without touching the
    /// transport when the client is not connected. Subscribing twice to
    /// the same topic creates two independent subscriptions.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        self.subscribe_with(topic, Arc::new(handler))
    }

    /// Same as [`subscribe`](Self::subscribe) with a shared handler.
    pub fn subscribe_with(&self, topic: &str, handler: MessageHandler) -> SubscriptionId {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        let outbound = match (&inner.outbound, inner.state) {
            (Some(outbound), ConnectionState::Connected) => outbound,
            _ => {
                tracing::warn!(topic, state = %inner.state, "subscribe while not connected, ignoring");
                return SubscriptionId::none();
            }
        };

        let id = inner.registry.allocate_id();
        // A failed write means the transport is going down; the entry is
        // re-issued after the reconnect.
        let _ = outbound.send(stomp::subscribe_frame(id.as_str(), topic).encode());
        inner.registry.insert(id.clone(), topic, handler);
        tracing::debug!(topic, subscription = %id, "subscribed");
        id
    }

    /// Cancels a subscription. Unknown, sentinel and already-destroyed ids
    /// are ignored.
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        if id.is_none() {
            return;
        }
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        let Some(topic) = inner.registry.remove(id) else {
            tracing::debug!(subscription = %id, "unsubscribe for unknown id, ignoring");
            return;
        };
        if let (Some(outbound), ConnectionState::Connected) = (&inner.outbound, inner.state) {
            let _ = outbound.send(stomp::unsubscribe_frame(id.as_str()).encode());
        }
        tracing::debug!(topic, subscription = %id, "unsubscribed");
    }

    /// Publishes `body` as JSON to `destination`. Fire-and-forget: when
    /// not connected, or when `body` cannot be serialized, the message is
    /// logged and dropped.
    pub fn send<T>(&self, destination: &str, body: &T)
    where
        T: Serialize + ?Sized,
    {
        let inner = self.shared.inner.lock();
        let (Some(outbound), ConnectionState::Connected) = (inner.outbound.as_ref(), inner.state)
        else {
            tracing::warn!(destination, state = %inner.state, "send while not connected, dropping");
            return;
        };
        let json = match serde_json::to_string(body) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(destination, error = %err, "failed to serialize message body");
                return;
            }
        };
        let _ = outbound.send(stomp::send_frame(destination, json).encode());
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn client() -> RealtimeClient {
        let (transport, _listener) = MemoryTransport::pair();
        RealtimeClient::new(ClientConfig::default(), Arc::new(transport))
    }

    #[test]
    fn starts_disconnected() {
        let client = client();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
        let status = client.status();
        assert_eq!(status.attempt, 0);
        assert_eq!(status.max_attempts, 5);
        assert!(!status.exhausted);
        assert_eq!(status.subscriptions, 0);
    }

    #[test]
    fn subscribe_without_connection_returns_sentinel() {
        let client = client();
        let id = client.subscribe("/topic/activity", |_| {});
        assert!(id.is_none());
        client.unsubscribe(&id);
        assert_eq!(client.status().subscriptions, 0);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn send_without_connection_is_dropped() {
        let client = client();
        client.send("/app/presence", &serde_json::json!({ "status": "online" }));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let client = client();
        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::bearer("secret-token");
        assert_eq!(format!("{credential:?}"), "Credential(<redacted>)");
        assert_eq!(credential.token(), "secret-token");
    }

    #[test]
    fn clones_share_state() {
        let a = client();
        let b = a.clone();
        let mut changes = b.state_changes();
        a.disconnect();
        assert!(!changes.has_changed().unwrap_or(true));
        assert_eq!(b.state(), ConnectionState::Disconnected);
    }
}
