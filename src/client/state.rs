//! Connection lifecycle states and the transitions allowed between them.
//!
//! ```text
//!                 connect()
//! Disconnected ──────────────▶ Connecting ──CONNECTED──▶ Connected
//!      ▲  ▲                     │  ▲   │                    │
//!      │  └─────ERROR frame─────┘  │   │ transport failure  │ transport failure
//!      │                  retry    │   ▼                    │
//!      │                 timer ─── Reconnecting ◀───────────┘
//!      │                               │
//!      └────────── disconnect() ◀──────┘   (from any state)
//! ```

use std::fmt;

/// Lifecycle state of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// Transport opening or handshake outstanding.
    Connecting,
    /// Handshake acknowledged; subscriptions and sends are live.
    Connected,
    /// Waiting for a retry timer, or retries exhausted.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` if `self → next` is in the transition table.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Connected, Connecting, Disconnected, Reconnecting};
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected | Disconnected | Reconnecting)
                | (Connected, Reconnecting | Disconnected)
                | (Reconnecting, Connecting | Disconnected)
        )
    }

    /// Returns `true` for [`ConnectionState::Connected`].
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` while an attempt is underway or a retry is pending.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the client, for status indicators and liveness
/// checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Reconnect attempts made since the last successful handshake.
    pub attempt: u32,
    /// Configured reconnect limit.
    pub max_attempts: u32,
    /// `true` when automatic reconnection has given up.
    pub exhausted: bool,
    /// Number of live subscriptions.
    pub subscriptions: usize,
}
