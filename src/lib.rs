//! # docflow-realtime
//!
//! Real-time messaging client for the Docflow document-management
//! platform.
//!
//! One persistent STOMP connection multiplexes several logical channels
//! (notifications, document status, activity feed, presence, department
//! broadcasts, typing indicators) to any number of independent
//! subscribers, with automatic reconnection and linear backoff. Delivery
//! is best-effort: nothing is persisted or replayed across reconnects.
//!
//! ## Architecture
//!
//! ```text
//! Callers (UI views, services)
//!     │
//!     ├── Channel helpers (channels/)
//!     │
//!     ├── RealtimeClient (client/)
//!     │     ├── Connection manager: state machine, handshake, heart-beats, backoff
//!     │     └── Subscription registry: id → (topic, handler)
//!     │
//!     ├── STOMP codec (stomp/)
//!     │
//!     └── Transport adapters (transport/)
//!           WebSocket │ SockJS xhr-polling │ fallback │ in-memory
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use docflow_realtime::{ClientConfig, Credential, RealtimeClient};
//!
//! # async fn run() -> Result<(), docflow_realtime::RealtimeError> {
//! let client = RealtimeClient::from_config(ClientConfig::from_env()?)?;
//! client.connect(Some(Credential::bearer("eyJhbGciOi..."))).await?;
//!
//! let id = client.subscribe_to_activity_feed(|event| {
//!     println!("{} {}", event.user_id, event.action);
//! });
//!
//! client.unsubscribe(&id);
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod client;
pub mod config;
pub mod error;
pub mod stomp;
pub mod transport;

pub use channels::PresenceStatus;
pub use client::{ConnectionState, ConnectionStatus, Credential, RealtimeClient, SubscriptionId};
pub use config::{ClientConfig, TransportKind};
pub use error::RealtimeError;
