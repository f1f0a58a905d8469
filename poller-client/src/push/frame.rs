//! Event-bus bridge frames exchanged over the push channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::protocol::{FRAME_ERROR, FRAME_PING, FRAME_PONG, FRAME_RECEIVE, FRAME_REGISTER};
use shared::types::StatusEvent;
use crate::error::{PollerError, Result};

#[derive(Serialize)]
struct OutboundFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
}

#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    body: Option<Value>,
}

/// What a decoded inbound frame means to the subscriber.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Status(StatusEvent),
    Pong,
    /// Bridge-level error reported by the server
    Error(String),
    /// Anything not addressed to us
    Ignored,
}

pub fn register_frame(address: &str) -> String {
    encode(&OutboundFrame {
        kind: FRAME_REGISTER,
        address: Some(address),
    })
}

pub fn ping_frame() -> String {
    encode(&OutboundFrame {
        kind: FRAME_PING,
        address: None,
    })
}

fn encode(frame: &OutboundFrame<'_>) -> String {
    // Only &str fields: serialization cannot fail
    serde_json::to_string(frame).unwrap_or_default()
}

/// Decode one text frame received on the channel subscribed at `address`.
pub fn decode(text: &str, address: &str) -> Result<Inbound> {
    let frame: InboundFrame = serde_json::from_str(text)
        .map_err(|e| PollerError::Decode(format!("Invalid bridge frame: {e}")))?;

    match frame.kind.as_str() {
        FRAME_RECEIVE => {
            if frame.address.as_deref() != Some(address) {
                return Ok(Inbound::Ignored);
            }
            let body = frame
                .body
                .ok_or_else(|| PollerError::Decode("Status frame without body".to_string()))?;
            decode_status(body).map(Inbound::Status)
        }
        FRAME_PONG => Ok(Inbound::Pong),
        FRAME_ERROR => {
            let message = match frame.body {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => "unspecified bridge error".to_string(),
            };
            Ok(Inbound::Error(message))
        }
        _ => Ok(Inbound::Ignored),
    }
}

/// The poller publishes the body as a JSON-encoded string; plain objects are
/// accepted too.
fn decode_status(body: Value) -> Result<StatusEvent> {
    let parsed = match body {
        Value::String(s) => serde_json::from_str(&s),
        other => serde_json::from_value(other),
    };
    parsed.map_err(|e| PollerError::Decode(format!("Invalid status event: {e}")))
}
