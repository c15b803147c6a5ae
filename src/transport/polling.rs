//! SockJS xhr-polling fallback for networks that block WebSockets.
//!
//! Each connection gets a session URL `{base}/{server}/{session}`. The
//! client receives by long-polling `POST {session}/xhr` and sends by
//! `POST {session}/xhr_send` with a JSON array of messages. Poll responses
//! carry one SockJS frame: `o` (open), `h` (heart-beat), `a[...]`
//! (messages) or `c[code,"reason"]` (close).

use futures_util::future::{BoxFuture, FutureExt};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::{mpsc, oneshot};

use super::{Transport, TransportEvent, TransportLink};
use crate::error::RealtimeError;

/// A decoded SockJS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    /// Session opened.
    Open,
    /// Server heart-beat.
    Heartbeat,
    /// One or more application messages.
    Messages(Vec<String>),
    /// Session closed by the server.
    Close {
        /// SockJS close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl SockJsFrame {
    /// Parses one poll response body.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::MalformedFrame`] for unknown frame types or
    /// invalid JSON payloads.
    pub fn parse(body: &str) -> Result<Self, RealtimeError> {
        let body = body.trim_end_matches(['\r', '\n']);
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| RealtimeError::malformed("empty sockjs frame"))?;
        let payload = chars.as_str();
        match kind {
            'o' => Ok(Self::Open),
            'h' => Ok(Self::Heartbeat),
            'a' => Ok(Self::Messages(serde_json::from_str(payload)?)),
            'c' => {
                let (code, reason): (u16, String) = serde_json::from_str(payload)?;
                Ok(Self::Close { code, reason })
            }
            other => Err(RealtimeError::malformed(format!(
                "unknown sockjs frame type `{other}`"
            ))),
        }
    }
}

/// Opens SockJS xhr-polling sessions against a fixed base URL.
#[derive(Debug, Clone)]
pub struct PollingTransport {
    base_url: String,
    http: reqwest::Client,
}

impl PollingTransport {
    /// Creates a transport for the SockJS endpoint at `base_url`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Generates a fresh `{base}/{server}/{session}` URL.
    fn session_url(&self) -> String {
        let server = uuid::Uuid::new_v4().as_u128() % 1000;
        let session = uuid::Uuid::new_v4().simple();
        format!("{}/{server:03}/{session}", self.base_url)
    }
}

impl Transport for PollingTransport {
    fn name(&self) -> &'static str {
        "xhr-polling"
    }

    fn open(&self) -> BoxFuture<'_, Result<TransportLink, RealtimeError>> {
        async move {
            let session_url = self.session_url();
            let receive_url = format!("{session_url}/xhr");
            let send_url = format!("{session_url}/xhr_send");

            let body = self
                .http
                .post(&receive_url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            if SockJsFrame::parse(&body)? != SockJsFrame::Open {
                return Err(RealtimeError::Transport(format!(
                    "sockjs session did not open: {body:?}"
                )));
            }
            tracing::debug!(session = %session_url, "sockjs session open");

            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

            // Sender: batches whatever is queued into one xhr_send request.
            let http = self.http.clone();
            tokio::spawn(async move {
                let _stop = stop_tx;
                while let Some(first) = out_rx.recv().await {
                    let mut batch = vec![first];
                    while let Ok(next) = out_rx.try_recv() {
                        batch.push(next);
                    }
                    let payload = match serde_json::to_string(&batch) {
                        Ok(payload) => payload,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to encode sockjs batch");
                            continue;
                        }
                    };
                    let result = http
                        .post(&send_url)
                        .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
                        .body(payload)
                        .send()
                        .await
                        .and_then(reqwest::Response::error_for_status);
                    if let Err(err) = result {
                        tracing::debug!(error = %err, "xhr_send failed");
                        return;
                    }
                }
            });

            // Receiver: long-polls until the session closes or the sender
            // side goes away.
            let http = self.http.clone();
            tokio::spawn(async move {
                loop {
                    let poll = async {
                        http.post(&receive_url)
                            .send()
                            .await?
                            .error_for_status()?
                            .text()
                            .await
                    };
                    let body = tokio::select! {
                        _ = &mut stop_rx => return,
                        body = poll => body,
                    };
                    let frame = match body {
                        Ok(body) => SockJsFrame::parse(&body),
                        Err(err) => {
                            let _ = in_tx.send(TransportEvent::Error(err.to_string()));
                            return;
                        }
                    };
                    match frame {
                        Ok(SockJsFrame::Open | SockJsFrame::Heartbeat) => {}
                        Ok(SockJsFrame::Messages(messages)) => {
                            for message in messages {
                                if in_tx.send(TransportEvent::Text(message)).is_err() {
                                    return;
                                }
                            }
                        }
                        Ok(SockJsFrame::Close { code, reason }) => {
                            let _ = in_tx.send(TransportEvent::Closed(Some(format!(
                                "{code} {reason}"
                            ))));
                            return;
                        }
                        Err(err) => {
                            let _ = in_tx.send(TransportEvent::Error(err.to_string()));
                            return;
                        }
                    }
                }
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

    #[test]
    fn parses_control_frames() {
        assert!(matches!(SockJsFrame::parse("o\n"), Ok(SockJsFrame::Open)));
        assert!(matches!(SockJsFrame::parse("h\n"), Ok(SockJsFrame::Heartbeat)));
    }

    #[test]
    fn parses_message_arrays() {
        let Ok(SockJsFrame::Messages(messages)) =
            SockJsFrame::parse("a[\"CONNECTED\\nversion:1.2\\n\\n\\u0000\",\"\\n\"]\n")
        else {
            panic!("expected messages");
        };
        assert_eq!(
            messages,
            vec!["CONNECTED\nversion:1.2\n\n\0".to_string(), "\n".to_string()]
        );
    }

    #[test]
    fn parses_close_frame() {
        let Ok(SockJsFrame::Close { code, reason }) = SockJsFrame::parse("c[3000,\"Go away!\"]")
        else {
            panic!("expected close");
        };
        assert_eq!(code, 3000);
        assert_eq!(reason, "Go away!");
    }

    #[test]
    fn rejects_unknown_frames() {
        assert!(SockJsFrame::parse("").is_err());
        assert!(SockJsFrame::parse("x").is_err());
        assert!(SockJsFrame::parse("a{not json").is_err());
    }

    #[test]
    fn session_url_has_server_and_session_segments() {
        let transport = PollingTransport::new("http://docs.local/ws/");
        let url = transport.session_url();
        let Some(rest) = url.strip_prefix("http://docs.local/ws/") else {
            panic!("unexpected base in {url}");
        };
        let segments: Vec<&str> = rest.split('/').collect();
        assert_eq!(segments.len(), 2);
        assert!(segments.first().is_some_and(|s| s.len() == 3));
        assert!(segments.get(1).is_some_and(|s| s.len() == 32));
    }
}
