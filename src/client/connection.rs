//! Connection manager: handshake, heart-beats, failure handling and
//! reconnect scheduling.
//!
//! Every attempt runs on its own session task, tagged with the epoch it
//! was started in. A session owns the transport link; the shared state
//! only keeps a clone of the outbound sender while `Connected`.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::{Credential, Inner, RealtimeClient, SubscriptionId};
use crate::client::state::ConnectionState;
use crate::error::RealtimeError;
use crate::stomp::{self, Command, Frame, FrameDecoder, Heartbeat, Inbound};
use crate::transport::{TransportEvent, TransportLink};

/// What the session loop does after handling an event.
enum Step {
    Continue,
    /// Leave quietly; the state has already been settled.
    Stop,
    /// Transport-level failure; take the reconnect path.
    Failed(String),
}

/// Heart-beat timers of one session, armed on CONNECTED.
struct SessionTimers {
    ping: Option<Interval>,
    silence_limit: Option<Duration>,
    last_seen: Instant,
}

impl SessionTimers {
    fn new() -> Self {
        Self {
            ping: None,
            silence_limit: None,
            last_seen: Instant::now(),
        }
    }

    fn arm(&mut self, negotiated: Heartbeat) {
        if !negotiated.outgoing.is_zero() {
            let mut ping =
                tokio::time::interval_at(Instant::now() + negotiated.outgoing, negotiated.outgoing);
            ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.ping = Some(ping);
        }
        if !negotiated.incoming.is_zero() {
            // Twice the period, to tolerate one late beat.
            self.silence_limit = Some(negotiated.incoming.saturating_mul(2));
        }
        self.last_seen = Instant::now();
    }
}

async fn next_ping(ping: Option<&mut Interval>) {
    match ping {
        Some(ping) => {
            ping.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn silence(limit: Option<Duration>, last_seen: Instant) {
    match limit {
        Some(limit) => tokio::time::sleep_until(last_seen + limit).await,
        None => std::future::pending::<()>().await,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl RealtimeClient {
    /// Connects to the server.
    ///
    /// `credential` is sent as `Authorization: Bearer <token>`; `None`
    /// connects anonymously. The returned future resolves once the server
    /// acknowledges the handshake. Calling `connect` while already
    /// connected, or while an attempt or scheduled retry is in flight,
    /// returns `Ok(())` immediately without effect. After automatic
    /// reconnection has been exhausted, `connect` starts afresh.
    ///
    /// There is no handshake timeout: a server that never answers keeps
    /// the attempt pending until [`disconnect`](Self::disconnect).
    ///
    /// Subscriptions are only destroyed by `disconnect`. If a retry after a
    /// transport failure is rejected, the state becomes `Disconnected` but
    /// the live subscriptions are kept (see [`status`](Self::status)) and
    /// are re-issued by the next successful `connect`.
    ///
    /// # Errors
    ///
    /// - [`RealtimeError::Rejected`] with the server's text if the
    ///   handshake is answered with an ERROR frame; no retry follows.
    /// - [`RealtimeError::ReconnectExhausted`] if the transport kept
    ///   failing until the retry budget ran out.
    /// - [`RealtimeError::Disconnected`] if `disconnect` was called first.
    pub async fn connect(&self, credential: Option<Credential>) -> Result<(), RealtimeError> {
        let pending = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;
            match inner.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => {
                    tracing::debug!("connect ignored, attempt already in flight");
                    return Ok(());
                }
                ConnectionState::Reconnecting if !inner.exhausted => {
                    tracing::debug!("connect ignored, reconnect already scheduled");
                    return Ok(());
                }
                ConnectionState::Disconnected | ConnectionState::Reconnecting => {}
            }

            inner.credential = credential;
            inner.exhausted = false;
            inner.policy.reset();
            let (tx, rx) = oneshot::channel();
            inner.pending = Some(tx);
            tracing::info!(
                url = %self.shared.config.server_url,
                transport = self.shared.transport.name(),
                anonymous = inner.credential.is_none(),
                "connecting"
            );
            self.start_attempt(inner);
            rx
        };
        pending.await.unwrap_or(Err(RealtimeError::Disconnected))
    }

    /// Tears the connection down.
    ///
    /// Cancels any scheduled retry, unsubscribes and destroys every
    /// subscription, closes the transport and settles in `Disconnected`.
    /// Safe to call in any state, any number of times. Ids issued before
    /// the call stay inert forever.
    pub fn disconnect(&self) {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;

        if let Some(timer) = inner.retry_timer.take() {
            timer.abort();
        }
        inner.epoch = inner.epoch.wrapping_add(1);

        let ids = inner.registry.drain();
        if let Some(outbound) = inner.outbound.take() {
            for id in &ids {
                let _ = outbound.send(stomp::unsubscribe_frame(id.as_str()).encode());
            }
            let _ = outbound.send(stomp::disconnect_frame().encode());
        }
        if let Some(session) = inner.session.take() {
            session.abort();
        }
        if let Some(pending) = inner.pending.take() {
            let _ = pending.send(Err(RealtimeError::Disconnected));
        }
        inner.exhausted = false;
        inner.policy.reset();

        let previous = inner.state;
        self.shared.transition(inner, ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            tracing::info!(dropped_subscriptions = ids.len(), "disconnected");
        }
    }

    /// Moves to `Connecting` and spawns a session for a new epoch.
    fn start_attempt(&self, inner: &mut Inner) {
        self.shared.transition(inner, ConnectionState::Connecting);
        inner.epoch = inner.epoch.wrapping_add(1);
        let epoch = inner.epoch;
        let credential = inner.credential.clone();
        let client = self.clone();
        let session = tokio::spawn(async move { client.run_session(epoch, credential).await });
        if let Some(previous) = inner.session.replace(session) {
            previous.abort();
        }
    }

    async fn run_session(self, epoch: u64, credential: Option<Credential>) {
        let transport = std::sync::Arc::clone(&self.shared.transport);
        let TransportLink {
            outbound,
            mut inbound,
        } = match transport.open().await {
            Ok(link) => link,
            Err(err) => {
                self.on_transport_failure(epoch, &err.to_string());
                return;
            }
        };

        let config = &self.shared.config;
        let connect = stomp::connect_frame(
            &config.host,
            credential.as_ref().map(Credential::token),
            config.heartbeat(),
        );
        if outbound.send(connect.encode()).is_err() {
            self.on_transport_failure(epoch, "transport closed before handshake");
            return;
        }
        tracing::debug!(transport = transport.name(), epoch, "handshake sent");

        let mut timers = SessionTimers::new();
        let mut decoder = FrameDecoder::new();
        loop {
            let step = tokio::select! {
                event = inbound.recv() => match event {
                    Some(TransportEvent::Text(text)) => {
                        timers.last_seen = Instant::now();
                        self.handle_text(epoch, &text, &mut decoder, &outbound, &mut timers)
                    }
                    Some(TransportEvent::Closed(reason)) => Step::Failed(format!(
                        "connection closed by server ({})",
                        reason.as_deref().unwrap_or("no reason")
                    )),
                    Some(TransportEvent::Error(err)) => Step::Failed(err),
                    None => Step::Failed("transport ended".to_string()),
                },
                () = next_ping(timers.ping.as_mut()) => {
                    if outbound.send("\n".to_string()).is_err() {
                        Step::Failed("transport closed".to_string())
                    } else {
                        Step::Continue
                    }
                }
                () = silence(timers.silence_limit, timers.last_seen) => {
                    Step::Failed("heart-beat timeout".to_string())
                }
            };
            match step {
                Step::Continue => {}
                Step::Stop => return,
                Step::Failed(reason) => {
                    self.on_transport_failure(epoch, &reason);
                    return;
                }
            }
        }
    }

    fn handle_text(
        &self,
        epoch: u64,
        text: &str,
        decoder: &mut FrameDecoder,
        outbound: &mpsc::UnboundedSender<String>,
        timers: &mut SessionTimers,
    ) -> Step {
        let (decoded, error) = decoder.feed(text);
        if let Some(err) = error {
            tracing::warn!(error = %err, "dropping undecodable transport data");
        }
        for item in decoded {
            let Inbound::Frame(frame) = item else {
                continue;
            };
            match frame.command {
                Command::Connected => self.on_connected(epoch, &frame, outbound, timers),
                Command::Message => self.on_message(&frame),
                Command::Error => {
                    if let Step::Stop = self.on_error(epoch, &frame) {
                        return Step::Stop;
                    }
                }
                Command::Receipt => {
                    tracing::debug!(receipt = frame.get("receipt-id"), "receipt");
                }
                other => {
                    tracing::debug!(command = %other, "ignoring unexpected frame");
                }
            }
        }
        Step::Continue
    }

    fn on_connected(
        &self,
        epoch: u64,
        frame: &Frame,
        outbound: &mpsc::UnboundedSender<String>,
        timers: &mut SessionTimers,
    ) {
        let server_heartbeat = match frame.get("heart-beat").map(Heartbeat::parse) {
            Some(Ok(heartbeat)) => heartbeat,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "ignoring server heart-beat header");
                Heartbeat::DISABLED
            }
            None => Heartbeat::DISABLED,
        };
        let negotiated = Heartbeat::negotiate(self.shared.config.heartbeat(), server_heartbeat);

        let (pending, restored) = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;
            if inner.epoch != epoch || inner.state != ConnectionState::Connecting {
                tracing::debug!(epoch, "ignoring stale CONNECTED");
                return;
            }
            self.shared.transition(inner, ConnectionState::Connected);
            inner.policy.reset();
            inner.exhausted = false;
            for (id, topic) in inner.registry.iter() {
                let _ = outbound.send(stomp::subscribe_frame(id.as_str(), topic).encode());
            }
            inner.outbound = Some(outbound.clone());
            (inner.pending.take(), inner.registry.len())
        };

        timers.arm(negotiated);
        tracing::info!(
            version = frame.get("version").unwrap_or("1.0"),
            server = frame.get("server").unwrap_or("unknown"),
            heartbeat_out_ms = millis(negotiated.outgoing),
            heartbeat_in_ms = millis(negotiated.incoming),
            restored_subscriptions = restored,
            "connected"
        );
        if let Some(pending) = pending {
            let _ = pending.send(Ok(()));
        }
    }

    fn on_message(&self, frame: &Frame) {
        let Some(id) = frame.get("subscription").map(SubscriptionId::from) else {
            tracing::warn!(
                destination = frame.get("destination"),
                "dropping MESSAGE without subscription header"
            );
            return;
        };
        let delivery = self.shared.inner.lock().registry.route(&id, &frame.body);
        delivery.deliver();
    }

    fn on_error(&self, epoch: u64, frame: &Frame) -> Step {
        let text = stomp::error_text(frame);
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        if inner.epoch != epoch {
            return Step::Stop;
        }
        if inner.state != ConnectionState::Connecting {
            // The server closes the socket after an ERROR; that close
            // drives the reconnect.
            tracing::error!(reason = %text, "server reported an error");
            return Step::Continue;
        }

        tracing::warn!(reason = %text, "server rejected the connection");
        inner.outbound = None;
        inner.session = None;
        inner.policy.reset();
        self.shared.transition(inner, ConnectionState::Disconnected);
        if let Some(pending) = inner.pending.take() {
            let _ = pending.send(Err(RealtimeError::Rejected(text)));
        }
        Step::Stop
    }

    fn on_transport_failure(&self, epoch: u64, reason: &str) {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        if inner.epoch != epoch
            || !matches!(
                inner.state,
                ConnectionState::Connected | ConnectionState::Connecting
            )
        {
            return;
        }
        tracing::warn!(reason, state = %inner.state, "transport failure");
        inner.outbound = None;
        inner.session = None;
        self.shared.transition(inner, ConnectionState::Reconnecting);
        self.schedule_reconnect(inner);
    }

    fn schedule_reconnect(&self, inner: &mut Inner) {
        let Some(delay) = inner.policy.next_delay() else {
            inner.exhausted = true;
            let attempts = inner.policy.attempt();
            tracing::error!(attempts, "reconnect attempts exhausted, giving up");
            if let Some(pending) = inner.pending.take() {
                let _ = pending.send(Err(RealtimeError::ReconnectExhausted(attempts)));
            }
            return;
        };

        tracing::info!(
            attempt = inner.policy.attempt(),
            max_attempts = inner.policy.max_attempts(),
            delay_ms = millis(delay),
            "scheduling reconnect"
        );
        let epoch = inner.epoch;
        let client = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            client.retry(epoch);
        });
        if let Some(previous) = inner.retry_timer.replace(timer) {
            previous.abort();
        }
    }

    fn retry(&self, epoch: u64) {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        if inner.epoch != epoch || inner.state != ConnectionState::Reconnecting {
            return;
        }
        inner.retry_timer = None;
        tracing::info!(attempt = inner.policy.attempt(), "reconnecting");
        self.start_attempt(inner);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ClientConfig;
    use crate::transport::MemoryTransport;

    fn quiet_config() -> ClientConfig {
        let mut config = ClientConfig::new("ws://docs.local/ws");
        config.heartbeat_incoming = Duration::ZERO;
        config.heartbeat_outgoing = Duration::ZERO;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn refused_open_schedules_retry() {
        let (transport, listener) = MemoryTransport::pair();
        drop(listener);
        let client = RealtimeClient::new(quiet_config(), Arc::new(transport));
        let mut changes = client.state_changes();

        let attempt = tokio::spawn({
            let client = client.clone();
            async move { client.connect(None).await }
        });

        let Ok(_) = changes
            .wait_for(|state| *state == ConnectionState::Reconnecting)
            .await
        else {
            panic!("client should start reconnecting");
        };
        assert_eq!(client.status().attempt, 1);

        client.disconnect();
        let Ok(result) = attempt.await else {
            panic!("connect task panicked");
        };
        assert!(matches!(result, Err(RealtimeError::Disconnected)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_exhausts_immediately() {
        let (transport, listener) = MemoryTransport::pair();
        drop(listener);
        let mut config = quiet_config();
        config.max_reconnect_attempts = 0;
        let client = RealtimeClient::new(config, Arc::new(transport));

        let result = client.connect(None).await;
        assert!(matches!(result, Err(RealtimeError::ReconnectExhausted(0))));
        let status = client.status();
        assert_eq!(status.state, ConnectionState::Reconnecting);
        assert!(status.exhausted);
    }

    #[tokio::test]
    async fn outgoing_heartbeat_is_a_bare_eol() {
        let (transport, mut listener) = MemoryTransport::pair();
        let mut config = quiet_config();
        config.heartbeat_outgoing = Duration::from_millis(20);
        let client = RealtimeClient::new(config, Arc::new(transport));

        let server = tokio::spawn(async move {
            let Some(mut conn) = listener.accept().await else {
                panic!("no connection");
            };
            let Some(connect) = conn.recv_frame().await else {
                panic!("no CONNECT");
            };
            assert_eq!(connect.get("heart-beat"), Some("20,0"));
            conn.send_frame(&Frame::new(Command::Connected).header("heart-beat", "0,10"));
            conn.recv().await
        });

        assert!(client.connect(None).await.is_ok());
        let Ok(beat) = server.await else {
            panic!("server task panicked");
        };
        assert_eq!(beat.as_deref(), Some("\n"));
        client.disconnect();
    }
}
