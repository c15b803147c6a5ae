//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable numeric values
//! fall back to the defaults below.
//!
//! | Variable                           | Default                  |
//! |------------------------------------|--------------------------|
//! | `REALTIME_URL`                     | `ws://localhost:8080/ws` |
//! | `REALTIME_POLLING_URL`             | derived from the URL     |
//! | `REALTIME_TRANSPORT`               | `auto`                   |
//! | `REALTIME_MAX_RECONNECT_ATTEMPTS`  | `5`                      |
//! | `REALTIME_RECONNECT_BASE_DELAY_MS` | `3000`                   |
//! | `REALTIME_HEARTBEAT_INCOMING_MS`   | `4000`                   |
//! | `REALTIME_HEARTBEAT_OUTGOING_MS`   | `4000`                   |
//! | `REALTIME_HOST`                    | host part of the URL     |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RealtimeError;
use crate::stomp::Heartbeat;

/// Default server URL.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080/ws";
/// Default number of automatic reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Default base delay between reconnect attempts, in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 3000;
/// Default heart-beat period in both directions, in milliseconds.
pub const DEFAULT_HEARTBEAT_MS: u64 = 4000;

/// Which transport adapter the client opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// WebSocket only.
    WebSocket,
    /// SockJS xhr-polling only.
    Polling,
    /// WebSocket first, polling when the socket cannot be opened.
    #[default]
    Auto,
}

impl FromStr for TransportKind {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::WebSocket),
            "polling" | "xhr" => Ok(Self::Polling),
            "auto" => Ok(Self::Auto),
            other => Err(RealtimeError::Config(format!(
                "unknown transport `{other}` (expected websocket, polling or auto)"
            ))),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WebSocket => "websocket",
            Self::Polling => "polling",
            Self::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// Top-level client configuration.
///
/// Built once by the caller's initialization routine, usually via
/// [`ClientConfig::from_env`], and handed to
/// [`RealtimeClient::from_config`](crate::client::RealtimeClient::from_config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket endpoint (e.g. `wss://docs.example.com/ws`).
    pub server_url: String,

    /// Base URL of the SockJS polling endpoint.
    pub polling_url: String,

    /// Transport selection.
    pub transport: TransportKind,

    /// Value of the STOMP `host` header.
    pub host: String,

    /// Automatic reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// Delay unit for linear backoff; the n-th retry waits `n * base_delay`.
    pub base_delay: Duration,

    /// Expected period between frames from the server (0 disables).
    pub heartbeat_incoming: Duration,

    /// Period between heart-beats sent to the server (0 disables).
    pub heartbeat_outgoing: Duration,
}

impl ClientConfig {
    /// Creates a configuration for `server_url` with every other setting
    /// at its default.
    #[must_use]
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url = server_url.into();
        Self {
            polling_url: polling_url_for(&server_url),
            host: host_of(&server_url),
            server_url,
            transport: TransportKind::default(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            heartbeat_incoming: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            heartbeat_outgoing: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if `REALTIME_TRANSPORT` names an
    /// unknown transport or `REALTIME_URL` is empty.
    pub fn from_env() -> Result<Self, RealtimeError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RealtimeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_url = lookup("REALTIME_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        if server_url.trim().is_empty() {
            return Err(RealtimeError::Config("REALTIME_URL is empty".to_string()));
        }

        let mut config = Self::new(server_url);

        if let Some(url) = lookup("REALTIME_POLLING_URL") {
            config.polling_url = url;
        }
        if let Some(host) = lookup("REALTIME_HOST") {
            config.host = host;
        }
        if let Some(kind) = lookup("REALTIME_TRANSPORT") {
            config.transport = kind.parse()?;
        }

        config.max_reconnect_attempts = parse_or(
            &lookup,
            "REALTIME_MAX_RECONNECT_ATTEMPTS",
            DEFAULT_MAX_RECONNECT_ATTEMPTS,
        );
        config.base_delay = Duration::from_millis(parse_or(
            &lookup,
            "REALTIME_RECONNECT_BASE_DELAY_MS",
            DEFAULT_BASE_DELAY_MS,
        ));
        config.heartbeat_incoming = Duration::from_millis(parse_or(
            &lookup,
            "REALTIME_HEARTBEAT_INCOMING_MS",
            DEFAULT_HEARTBEAT_MS,
        ));
        config.heartbeat_outgoing = Duration::from_millis(parse_or(
            &lookup,
            "REALTIME_HEARTBEAT_OUTGOING_MS",
            DEFAULT_HEARTBEAT_MS,
        ));

        Ok(config)
    }

    /// Heart-beat periods advertised in the CONNECT frame.
    #[must_use]
    pub const fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            outgoing: self.heartbeat_outgoing,
            incoming: self.heartbeat_incoming,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

/// Parses `key` as `T`, returning `default` on missing or invalid values.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Maps a WebSocket URL onto the HTTP URL serving the SockJS fallback.
#[must_use]
pub fn polling_url_for(server_url: &str) -> String {
    if let Some(rest) = server_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        server_url.to_string()
    }
}

/// Extracts the host (without port, path or credentials) from a URL.
#[must_use]
pub fn host_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme);
    let host_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);
    if host_port.starts_with('[') {
        // IPv6 literal
        return host_port
            .split_once(']')
            .map_or(host_port, |(host, _)| host)
            .trim_start_matches('[')
            .to_string();
    }
    host_port
        .split(':')
        .next()
        .unwrap_or(host_port)
        .to_string()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let Ok(config) = ClientConfig::from_lookup(lookup_from(&[])) else {
            panic!("empty lookup must yield defaults");
        };
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.polling_url, "http://localhost:8080/ws");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.transport, TransportKind::Auto);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_millis(3000));
        assert_eq!(config.heartbeat_incoming, Duration::from_millis(4000));
        assert_eq!(config.heartbeat_outgoing, Duration::from_millis(4000));
    }

    #[test]
    fn overrides_are_applied() {
        let lookup = lookup_from(&[
            ("REALTIME_URL", "wss://docs.example.com:8443/ws"),
            ("REALTIME_TRANSPORT", "websocket"),
            ("REALTIME_MAX_RECONNECT_ATTEMPTS", "8"),
            ("REALTIME_RECONNECT_BASE_DELAY_MS", "250"),
            ("REALTIME_HEARTBEAT_INCOMING_MS", "0"),
            ("REALTIME_HEARTBEAT_OUTGOING_MS", "10000"),
        ]);
        let Ok(config) = ClientConfig::from_lookup(lookup) else {
            panic!("valid overrides");
        };
        assert_eq!(config.polling_url, "https://docs.example.com:8443/ws");
        assert_eq!(config.host, "docs.example.com");
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(config.max_reconnect_attempts, 8);
        assert_eq!(config.base_delay, Duration::from_millis(250));
        assert_eq!(config.heartbeat_incoming, Duration::ZERO);
        assert_eq!(config.heartbeat_outgoing, Duration::from_secs(10));
    }

    #[test]
    fn garbage_numbers_fall_back_to_defaults() {
        let lookup = lookup_from(&[("REALTIME_MAX_RECONNECT_ATTEMPTS", "many")]);
        let Ok(config) = ClientConfig::from_lookup(lookup) else {
            panic!("numeric garbage is not fatal");
        };
        assert_eq!(config.max_reconnect_attempts, DEFAULT_MAX_RECONNECT_ATTEMPTS);
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let lookup = lookup_from(&[("REALTIME_TRANSPORT", "carrier-pigeon")]);
        assert!(matches!(
            ClientConfig::from_lookup(lookup),
            Err(RealtimeError::Config(_))
        ));
    }

    #[test]
    fn host_of_handles_ports_paths_and_ipv6() {
        assert_eq!(host_of("ws://example.org/ws"), "example.org");
        assert_eq!(host_of("wss://user:pw@example.org:9000/ws?x=1"), "example.org");
        assert_eq!(host_of("ws://[::1]:8080/ws"), "::1");
        assert_eq!(host_of("localhost:61613"), "localhost");
    }

    #[test]
    fn transport_kind_parses_aliases() {
        assert!(matches!("WS".parse::<TransportKind>(), Ok(TransportKind::WebSocket)));
        assert!(matches!("xhr".parse::<TransportKind>(), Ok(TransportKind::Polling)));
        assert_eq!(TransportKind::Auto.to_string(), "auto");
    }
}
