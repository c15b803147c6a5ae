//! Heart-beat header handling.
//!
//! Each side advertises `heart-beat:<can-send>,<wants-to-receive>` in
//! milliseconds. A direction is active only when both sides agree, and
//! its period is the larger of the two advertised values.

use std::time::Duration;

use crate::error::RealtimeError;

/// A pair of heart-beat periods. Zero disables a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeat {
    /// Period at which this side sends heart-beats.
    pub outgoing: Duration,
    /// Period at which this side expects to hear from the peer.
    pub incoming: Duration,
}

impl Heartbeat {
    /// Heart-beating disabled in both directions.
    pub const DISABLED: Self = Self {
        outgoing: Duration::ZERO,
        incoming: Duration::ZERO,
    };

    /// Renders the `heart-beat` header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing.as_millis(), self.incoming.as_millis())
    }

    /// Parses a `heart-beat` header value.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::MalformedFrame`] unless the value is two
    /// comma-separated non-negative integers.
    pub fn parse(value: &str) -> Result<Self, RealtimeError> {
        let (outgoing, incoming) = value
            .split_once(',')
            .ok_or_else(|| RealtimeError::malformed(format!("bad heart-beat `{value}`")))?;
        let millis = |s: &str| {
            s.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| RealtimeError::malformed(format!("bad heart-beat `{value}`: {e}")))
        };
        Ok(Self {
            outgoing: millis(outgoing)?,
            incoming: millis(incoming)?,
        })
    }

    /// Computes the effective periods for `client` given the server's
    /// advertised `server` values.
    #[must_use]
    pub fn negotiate(client: Self, server: Self) -> Self {
        Self {
            outgoing: agree(client.outgoing, server.incoming),
            incoming: agree(client.incoming, server.outgoing),
        }
    }
}

fn agree(ours: Duration, theirs: Duration) -> Duration {
    if ours.is_zero() || theirs.is_zero() {
        Duration::ZERO
    } else {
        ours.max(theirs)
    }
}
