//! In-process transport.
//!
//! [`MemoryTransport::pair`] returns a client-side transport and a
//! [`MemoryListener`] that plays the server. Every successful `open`
//! produces a [`MemoryConnection`] on the listener. Opening fails once the
//! listener has been dropped, which makes refused connections easy to
//! simulate.

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;

use super::{Transport, TransportEvent, TransportLink};
use crate::error::RealtimeError;
use crate::stomp::{self, Frame, Inbound};

/// Client side of an in-process transport.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    connector: mpsc::UnboundedSender<MemoryConnection>,
}

/// Server side: yields one [`MemoryConnection`] per client `open`.
#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<MemoryConnection>,
}

/// Server end of one open connection.
#[derive(Debug)]
pub struct MemoryConnection {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryTransport {
    /// Creates a connected transport/listener pair.
    #[must_use]
    pub fn pair() -> (Self, MemoryListener) {
        let (connector, incoming) = mpsc::unbounded_channel();
        (Self { connector }, MemoryListener { incoming })
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self) -> BoxFuture<'_, Result<TransportLink, RealtimeError>> {
        async move {
            let (out_tx, from_client) = mpsc::unbounded_channel();
            let (to_client, in_rx) = mpsc::unbounded_channel();
            self.connector
                .send(MemoryConnection {
                    from_client,
                    to_client,
                })
                .map_err(|_| RealtimeError::Transport("connection refused".to_string()))?;
            Ok(TransportLink {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
        .boxed()
    }
}

impl MemoryListener {
    /// Waits for the next client connection.
    pub async fn accept(&mut self) -> Option<MemoryConnection> {
        self.incoming.recv().await
    }

    /// Returns an already-opened connection, if any.
    pub fn try_accept(&mut self) -> Option<MemoryConnection> {
        self.incoming.try_recv().ok()
    }
}

impl MemoryConnection {
    /// Receives the next raw message from the client. `None` once the
    /// client has closed the connection.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Receives the next STOMP frame, skipping heart-beats and anything
    /// that does not decode.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            let text = self.from_client.recv().await?;
            let Ok(decoded) = stomp::decode(&text) else {
                continue;
            };
            if let Some(frame) = decoded.into_iter().find_map(|inbound| match inbound {
                Inbound::Frame(frame) => Some(frame),
                Inbound::Heartbeat => None,
            }) {
                return Some(frame);
            }
        }
    }

    /// Sends raw text to the client. Returns `false` if the client is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.to_client.send(TransportEvent::Text(text.into())).is_ok()
    }

    /// Encodes and sends a frame. Returns `false` if the client is gone.
    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.send(frame.encode())
    }

    /// Closes the connection from the server side.
    pub fn close(self, reason: Option<&str>) {
        let _ = self
            .to_client
            .send(TransportEvent::Closed(reason.map(str::to_string)));
    }

    /// Fails the connection with a transport error.
    pub fn fail(self, error: &str) {
        let _ = self.to_client.send(TransportEvent::Error(error.to_string()));
    }

    /// Returns `true` once the client has dropped its sending half.
    #[must_use]
    pub fn is_client_closed(&self) -> bool {
        self.to_client.is_closed()
    }
}
