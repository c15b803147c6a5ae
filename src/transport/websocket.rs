//! WebSocket transport backed by `tokio-tungstenite`.

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::{Transport, TransportEvent, TransportLink};
use crate::error::RealtimeError;

/// Opens plain STOMP-over-WebSocket connections to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// Creates a transport for `url` (`ws://` or `wss://`).
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }

    /// Returns the target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn open(&self) -> BoxFuture<'_, Result<TransportLink, RealtimeError>> {
        async move {
            let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
            tracing::debug!(url = %self.url, "websocket open");

            let (mut ws_tx, mut ws_rx) = stream.split();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel();

            // Writer: drains the outbound queue, closes the socket once the
            // client drops its sender.
            tokio::spawn(async move {
                while let Some(text) = out_rx.recv().await {
                    if let Err(err) = ws_tx.send(Message::text(text)).await {
                        tracing::debug!(error = %err, "websocket write failed");
                        return;
                    }
                }
                let _ = ws_tx.close().await;
            });

            // Reader
            tokio::spawn(async move {
                while let Some(msg) = ws_rx.next().await {
                    let event = match msg {
                        Ok(Message::Text(text)) => TransportEvent::Text(text.as_str().to_owned()),
                        Ok(Message::Binary(bytes)) => {
                            TransportEvent::Text(String::from_utf8_lossy(&bytes).into_owned())
                        }
                        Ok(Message::Close(frame)) => {
                            let reason = frame.map(|f| f.reason.as_str().to_owned());
                            let _ = in_tx.send(TransportEvent::Closed(reason));
                            return;
                        }
                        Ok(_) => continue,
                        Err(err) => {
                            let _ = in_tx.send(TransportEvent::Error(err.to_string()));
                            return;
                        }
                    };
                    if in_tx.send(event).is_err() {
                        return;
                    }
                }
                let _ = in_tx.send(TransportEvent::Closed(None));
            });

            Ok(TransportLink {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
        .boxed()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_is_a_recoverable_error() {
        // Port 9 (discard) is not expected to accept WebSocket upgrades.
        let transport = WebSocketTransport::new("ws://127.0.0.1:9/ws");
        let Err(err) = transport.open().await else {
            panic!("nothing should be listening on the discard port");
        };
        assert!(err.is_recoverable());
    }

    #[test]
    fn exposes_url() {
        let transport = WebSocketTransport::new("wss://docs.example.com/ws");
        assert_eq!(transport.url(), "wss://docs.example.com/ws");
        assert_eq!(transport.name(), "websocket");
    }
}
