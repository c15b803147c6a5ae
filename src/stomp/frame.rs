//! STOMP 1.2 frame model, encoder and decoder.
//!
//! A frame is a command line, zero or more `name:value` header lines, a
//! blank line, an optional body and a terminating NUL. Between frames a
//! peer may send bare end-of-line characters as heart-beats.

use std::fmt;
use std::str::FromStr;

use crate::error::RealtimeError;

/// STOMP frame commands understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client → server session request.
    Connect,
    /// Server → client session acknowledgement.
    Connected,
    /// Client → server application message.
    Send,
    /// Client → server topic subscription.
    Subscribe,
    /// Client → server subscription cancellation.
    Unsubscribe,
    /// Client → server graceful session end.
    Disconnect,
    /// Server → client topic message.
    Message,
    /// Server → client receipt for a request carrying `receipt`.
    Receipt,
    /// Server → client protocol error.
    Error,
}

impl Command {
    /// Wire representation of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim for 1.0 compatibility.
    const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl FromStr for Command {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" | "STOMP" => Ok(Self::Connect),
            "CONNECTED" => Ok(Self::Connected),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "DISCONNECT" => Ok(Self::Disconnect),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            other => Err(RealtimeError::malformed(format!("unknown command `{other}`"))),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
///
/// Headers keep their wire order; when a name repeats, the first
/// occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Frame body, empty when absent.
    pub body: String,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the value of the first header called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Encodes the frame to its wire form, NUL terminator included.
    ///
    /// A `content-length` header is added for non-empty bodies unless the
    /// caller already set one.
    #[must_use]
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// One unit decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A bare EOL sent as a heart-beat.
    Heartbeat,
    /// A complete frame.
    Frame(Frame),
}

/// Longest unterminated frame the decoder keeps waiting on.
const MAX_PENDING_BYTES: usize = 1 << 20;

/// Decodes every frame and heart-beat in one complete transport message.
///
/// # Errors
///
/// Returns [`RealtimeError::MalformedFrame`] if any part of the message is
/// not valid STOMP or the last frame is unterminated.
pub fn decode(input: &str) -> Result<Vec<Inbound>, RealtimeError> {
    let mut decoder = FrameDecoder::new();
    let (decoded, error) = decoder.feed(input);
    if let Some(err) = error {
        return Err(err);
    }
    if decoder.pending() > 0 {
        return Err(RealtimeError::malformed("unterminated frame"));
    }
    Ok(decoded)
}

/// Streaming decoder for one connection.
///
/// Transport messages need not line up with frame boundaries: a frame may
/// arrive in several pieces, and one piece may hold several frames. The
/// unterminated tail is kept until the rest arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` and decodes every unit that is now complete.
    ///
    /// On malformed input the units decoded before the bad frame are still
    /// returned, together with the error, and the buffered remainder is
    /// discarded so the next message starts clean.
    pub fn feed(&mut self, text: &str) -> (Vec<Inbound>, Option<RealtimeError>) {
        self.buffer.push_str(text);
        let mut decoded = Vec::new();
        let mut consumed = 0;
        let error = loop {
            let rest = self.buffer.get(consumed..).unwrap_or_default();
            let trimmed = rest.trim_start_matches(['\r', '\n']);
            if trimmed.len() != rest.len() {
                decoded.push(Inbound::Heartbeat);
                consumed += rest.len() - trimmed.len();
            }
            if trimmed.is_empty() {
                break None;
            }
            match parse_frame(trimmed) {
                Ok(Parsed::Complete(frame, tail)) => {
                    consumed += trimmed.len() - tail.len();
                    decoded.push(Inbound::Frame(frame));
                }
                Ok(Parsed::Incomplete) if trimmed.len() > MAX_PENDING_BYTES => {
                    break Some(RealtimeError::malformed(format!(
                        "unterminated frame exceeds {MAX_PENDING_BYTES} bytes"
                    )));
                }
                Ok(Parsed::Incomplete) => break None,
                Err(err) => break Some(err),
            }
        };
        if error.is_some() {
            self.buffer.clear();
        } else {
            self.buffer.drain(..consumed);
        }
        (decoded, error)
    }

    /// Bytes of an unterminated frame waiting for more input.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Outcome of parsing the front of the buffer.
enum Parsed<'a> {
    Complete(Frame, &'a str),
    /// The frame so far is valid but its end has not arrived yet.
    Incomplete,
}

fn parse_frame(input: &str) -> Result<Parsed<'_>, RealtimeError> {
    let Some((command_line, mut rest)) = split_line(input) else {
        return Ok(Parsed::Incomplete);
    };
    let command: Command = command_line.parse()?;

    let mut headers = Vec::new();
    loop {
        let Some((line, tail)) = split_line(rest) else {
            return Ok(Parsed::Incomplete);
        };
        rest = tail;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RealtimeError::malformed(format!("header without colon: `{line}`")))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| v.trim().parse::<usize>())
        .transpose()
        .map_err(|e| RealtimeError::malformed(format!("bad content-length: {e}")))?;

    let (body, tail) = match content_length {
        Some(len) if rest.len() <= len => return Ok(Parsed::Incomplete),
        Some(len) => {
            let body = rest
                .get(..len)
                .ok_or_else(|| RealtimeError::malformed("content-length splits a character"))?;
            let tail = rest
                .get(len..)
                .and_then(|t| t.strip_prefix('\0'))
                .ok_or_else(|| RealtimeError::malformed("missing NUL after body"))?;
            (body, tail)
        }
        None => match rest.split_once('\0') {
            Some(split) => split,
            None => return Ok(Parsed::Incomplete),
        },
    };

    let frame = Frame {
        command,
        headers,
        body: body.to_string(),
    };
    Ok(Parsed::Complete(frame, tail))
}

/// Splits off one line, accepting both `\n` and `\r\n`.
fn split_line(input: &str) -> Option<(&str, &str)> {
    let (line, rest) = input.split_once('\n')?;
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, RealtimeError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                return Err(RealtimeError::malformed(format!(
                    "undefined escape `\\{other}`"
                )));
            }
            None => return Err(RealtimeError::malformed("dangling escape")),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn single_frame(input: &str) -> Frame {
        let Ok(decoded) = decode(input) else {
            panic!("decode failed for {input:?}");
        };
        let mut frames = decoded.into_iter().filter_map(|i| match i {
            Inbound::Frame(f) => Some(f),
            Inbound::Heartbeat => None,
        });
        let Some(frame) = frames.next() else {
            panic!("no frame in {input:?}");
        };
        frame
    }

    #[test]
    fn encodes_send_with_content_length() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/presence")
            .with_body(r#"{"status":"online"}"#);
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/presence\ncontent-length:19\n\n{\"status\":\"online\"}\0"
        );
    }

    #[test]
    fn encodes_connect_headers_verbatim() {
        let frame = Frame::new(Command::Connect).header("Authorization", "Bearer a:b");
        assert_eq!(frame.encode(), "CONNECT\nAuthorization:Bearer a:b\n\n\0");
    }

    #[test]
    fn escapes_header_values_outside_connect() {
        let frame = Frame::new(Command::Subscribe).header("destination", "/topic/a:b\nc");
        assert_eq!(frame.encode(), "SUBSCRIBE\ndestination:/topic/a\\cb\\nc\n\n\0");
        let decoded = single_frame(&frame.encode());
        assert_eq!(decoded.get("destination"), Some("/topic/a:b\nc"));
    }

    #[test]
    fn decodes_message_frame() {
        let frame = single_frame(
            "MESSAGE\r\nsubscription:sub-0\r\ndestination:/topic/activity\r\nmessage-id:7\r\n\r\n{\"id\":\"a1\"}\0",
        );
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.get("destination"), Some("/topic/activity"));
        assert_eq!(frame.body, "{\"id\":\"a1\"}");
    }

    #[test]
    fn first_repeated_header_wins() {
        let frame = single_frame("MESSAGE\nfoo:first\nfoo:second\n\n\0");
        assert_eq!(frame.get("foo"), Some("first"));
    }

    #[test]
    fn content_length_allows_embedded_nul() {
        let frame = single_frame("MESSAGE\ncontent-length:3\n\na\0b\0");
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn decodes_heartbeats_and_several_frames() {
        let Ok(decoded) = decode("\n\nRECEIPT\nreceipt-id:1\n\n\0\nERROR\nmessage:boom\n\n\0") else {
            panic!("decode failed");
        };
        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded.first(), Some(&Inbound::Heartbeat));
        assert!(matches!(decoded.get(1), Some(Inbound::Frame(f)) if f.command == Command::Receipt));
        assert_eq!(decoded.get(2), Some(&Inbound::Heartbeat));
        assert!(matches!(decoded.get(3), Some(Inbound::Frame(f)) if f.get("message") == Some("boom")));
    }

    #[test]
    fn lone_eol_is_a_heartbeat() {
        assert!(matches!(decode("\n").as_deref(), Ok([Inbound::Heartbeat])));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(decode("BOGUS\n\n\0").is_err());
        assert!(decode("MESSAGE\nno-colon\n\n\0").is_err());
        assert!(decode("MESSAGE\n\nbody without terminator").is_err());
        assert!(decode("MESSAGE\ncontent-length:99\n\nshort\0").is_err());
        assert!(decode("MESSAGE\nbad:\\x\n\n\0").is_err());
    }

    #[test]
    fn frame_split_across_messages_is_reassembled() {
        let wire = Frame::new(Command::Message)
            .header("subscription", "sub-0")
            .header("destination", "/topic/activity")
            .with_body(r#"{"id":"a1","userId":7}"#)
            .encode();
        let (head, tail) = wire.split_at(wire.len() / 2);

        let mut decoder = FrameDecoder::new();
        let (first, error) = decoder.feed(head);
        assert!(first.is_empty());
        assert!(error.is_none());
        assert_eq!(decoder.pending(), head.len());

        let (second, error) = decoder.feed(tail);
        assert!(error.is_none());
        let [Inbound::Frame(frame)] = second.as_slice() else {
            panic!("expected one frame, got {second:?}");
        };
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.body, r#"{"id":"a1","userId":7}"#);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn split_inside_content_length_body() {
        let mut decoder = FrameDecoder::new();
        let (first, _) = decoder.feed("MESSAGE\ncontent-length:5\n\nab");
        assert!(first.is_empty());
        let (second, error) = decoder.feed("c\0de\0\n");
        assert!(error.is_none());
        assert!(matches!(second.first(), Some(Inbound::Frame(f)) if f.body == "abc\0de"));
        assert_eq!(second.get(1), Some(&Inbound::Heartbeat));
    }

    #[test]
    fn frames_before_a_malformed_one_survive() {
        let mut decoder = FrameDecoder::new();
        let (decoded, error) =
            decoder.feed("RECEIPT\nreceipt-id:1\n\n\0BOGUS\n\n\0MESSAGE\n\nlost\0");
        assert!(error.is_some());
        assert!(matches!(decoded.as_slice(), [Inbound::Frame(f)] if f.command == Command::Receipt));
        assert_eq!(decoder.pending(), 0);

        let (after, error) = decoder.feed("MESSAGE\n\nnext\0");
        assert!(error.is_none());
        assert!(matches!(after.as_slice(), [Inbound::Frame(f)] if f.body == "next"));
    }

    #[test]
    fn oversized_unterminated_frame_is_dropped() {
        let mut decoder = FrameDecoder::new();
        let huge = format!("MESSAGE\n\n{}", "x".repeat(MAX_PENDING_BYTES));
        let (decoded, error) = decoder.feed(&huge);
        assert!(decoded.is_empty());
        assert!(error.is_some());
        assert_eq!(decoder.pending(), 0);
    }
}
