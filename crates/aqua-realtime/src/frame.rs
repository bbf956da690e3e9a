//! Inbound push frames.
//!
//! Every text frame is a JSON object `{ "type": <name>, "data": <payload> }`.
//! Two names are reserved:
//!
//! - `auth_error`: the server no longer accepts our credential
//! - `event`: an envelope whose `data` is `{ "type": <inner>, "payload": … }`;
//!   it is delivered under `event` and again under the inner name

use serde::Deserialize;
use serde_json::Value;

use crate::errors::FrameError;

/// Frame type signaling a rejected credential.
pub const AUTH_ERROR_TYPE: &str = "auth_error";
/// Frame type of the generic envelope.
pub const ENVELOPE_TYPE: &str = "event";

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// The server rejected the credential on an open socket.
    AuthError {
        /// Server-provided payload, if any.
        data: Value,
    },
    /// An application event to dispatch.
    Event {
        /// Frame `type`.
        name: String,
        /// Frame `data`.
        data: Value,
        /// Inner event of an `event` envelope.
        inner: Option<InnerEvent>,
    },
}

/// The event carried inside an `event` envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct InnerEvent {
    /// Inner `type`.
    pub name: String,
    /// Inner `payload`.
    pub payload: Value,
}

/// Decode one text frame.
pub fn parse_frame(text: &str) -> Result<Frame, FrameError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    if raw.kind.is_empty() {
        return Err(FrameError::EmptyType);
    }
    if raw.kind == AUTH_ERROR_TYPE {
        return Ok(Frame::AuthError { data: raw.data });
    }
    let inner = if raw.kind == ENVELOPE_TYPE {
        envelope_inner(&raw.data)
    } else {
        None
    };
    Ok(Frame::Event {
        name: raw.kind,
        data: raw.data,
        inner,
    })
}

fn envelope_inner(data: &Value) -> Option<InnerEvent> {
    let name = data.get("type")?.as_str()?;
    if name.is_empty() {
        return None;
    }
    Some(InnerEvent {
        name: name.to_string(),
        payload: data.get("payload").cloned().unwrap_or(Value::Null),
    })
}
