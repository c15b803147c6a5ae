//! Transport adapters: a uniform send/receive/close surface over a duplex
//! text connection.
//!
//! Opening a [`Transport`] yields a [`TransportLink`]. Text written to
//! [`TransportLink::outbound`] goes to the server in order; everything the
//! server sends, and the end of the connection, arrives on
//! [`TransportLink::inbound`]. Dropping the outbound sender closes the
//! connection once queued messages are flushed.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::config::{ClientConfig, TransportKind};
use crate::error::RealtimeError;

pub mod fallback;
pub mod memory;
#[cfg(feature = "polling")]
pub mod polling;
pub mod websocket;

pub use fallback::FallbackTransport;
pub use memory::{MemoryConnection, MemoryListener, MemoryTransport};
#[cfg(feature = "polling")]
pub use polling::PollingTransport;
pub use websocket::WebSocketTransport;

/// Something observed on the inbound side of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text message from the server.
    Text(String),
    /// The server closed the connection, with an optional reason.
    Closed(Option<String>),
    /// The connection failed.
    Error(String),
}

/// The two halves of an open transport connection.
#[derive(Debug)]
pub struct TransportLink {
    /// Messages to the server.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Messages and lifecycle events from the server.
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// A way of reaching the messaging server.
///
/// Implementations spawn whatever pump tasks they need inside `open` and
/// bridge them to the returned channels.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns a transport-category [`RealtimeError`] if the connection
    /// cannot be established.
    fn open(&self) -> BoxFuture<'_, Result<TransportLink, RealtimeError>>;
}

/// Builds the transport selected by `config`.
///
/// # Errors
///
/// Returns [`RealtimeError::Config`] if polling is requested but the crate
/// was built without the `polling` feature.
pub fn build(config: &ClientConfig) -> Result<Arc<dyn Transport>, RealtimeError> {
    let websocket: Arc<dyn Transport> = Arc::new(WebSocketTransport::new(&config.server_url));
    match config.transport {
        TransportKind::WebSocket => Ok(websocket),
        #[cfg(feature = "polling")]
        TransportKind::Polling => Ok(Arc::new(PollingTransport::new(&config.polling_url))),
        #[cfg(feature = "polling")]
        TransportKind::Auto => Ok(Arc::new(FallbackTransport::new(
            websocket,
            Arc::new(PollingTransport::new(&config.polling_url)),
        ))),
        #[cfg(not(feature = "polling"))]
        TransportKind::Polling => Err(RealtimeError::Config(
            "polling transport requires the `polling` feature".to_string(),
        )),
        #[cfg(not(feature = "polling"))]
        TransportKind::Auto => Ok(websocket),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn builds_requested_transport() {
        let mut config = ClientConfig::new("ws://localhost:9/ws");

        config.transport = TransportKind::WebSocket;
        let Ok(transport) = build(&config) else {
            panic!("websocket transport");
        };
        assert_eq!(transport.name(), "websocket");

        #[cfg(feature = "polling")]
        {
            config.transport = TransportKind::Polling;
            let Ok(transport) = build(&config) else {
                panic!("polling transport");
            };
            assert_eq!(transport.name(), "xhr-polling");

            config.transport = TransportKind::Auto;
            let Ok(transport) = build(&config) else {
                panic!("fallback transport");
            };
            assert_eq!(transport.name(), "fallback");
        }
    }
}
