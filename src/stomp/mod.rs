//! STOMP protocol layer: frame codec, heart-beats and the frames the
//! client emits.

pub mod frame;
pub mod heartbeat;

pub use frame::{Command, Frame, FrameDecoder, Inbound, decode};
pub use heartbeat::Heartbeat;

/// Protocol versions offered in CONNECT.
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Builds the CONNECT frame. `token` adds an `Authorization: Bearer` header;
/// without it the connection is anonymous.
#[must_use]
pub fn connect_frame(host: &str, token: Option<&str>, heartbeat: Heartbeat) -> Frame {
    let frame = Frame::new(Command::Connect)
        .header("accept-version", ACCEPT_VERSION)
        .header("host", host)
        .header("heart-beat", heartbeat.header_value());
    match token {
        Some(token) => frame.header("Authorization", format!("Bearer {token}")),
        None => frame,
    }
}

/// Builds a SUBSCRIBE frame.
#[must_use]
pub fn subscribe_frame(id: &str, destination: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .header("id", id)
        .header("destination", destination)
        .header("ack", "auto")
}

/// Builds an UNSUBSCRIBE frame.
#[must_use]
pub fn unsubscribe_frame(id: &str) -> Frame {
    Frame::new(Command::Unsubscribe).header("id", id)
}

/// Builds a SEND frame carrying a JSON body.
#[must_use]
pub fn send_frame(destination: &str, json_body: String) -> Frame {
    Frame::new(Command::Send)
        .header("destination", destination)
        .header("content-type", "application/json")
        .with_body(json_body)
}

/// Builds a DISCONNECT frame.
#[must_use]
pub fn disconnect_frame() -> Frame {
    Frame::new(Command::Disconnect)
}

/// Text of a server ERROR frame: the `message` header, or the body.
#[must_use]
pub fn error_text(frame: &Frame) -> String {
    match frame.get("message") {
        Some(message) if !message.is_empty() => message.to_string(),
        _ if !frame.body.is_empty() => frame.body.trim_end().to_string(),
        _ => "unspecified server error".to_string(),
    }
}
