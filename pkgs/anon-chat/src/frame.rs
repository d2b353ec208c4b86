//! Wire frames exchanged with the relay
//!
//! Both directions share one JSON shape:
//!
//! ```json
//! { "type": "chat", "from": "alice", "to": "bob", "body": "hi", "messageid": "01H..." }
//! ```
//!
//! Outbound frames omit `messageid` (and `body` for history requests). Inbound
//! frames must carry every field; anything else is rejected by [`Message::decode`].

use serde::{Deserialize, Serialize};

/// Kind of a frame, serialized as the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Chat,
    History,
    Bot,
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::Chat => write!(f, "chat"),
            FrameKind::History => write!(f, "history"),
            FrameKind::Bot => write!(f, "bot"),
        }
    }
}

/// A frame as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(
        rename = "messageid",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id: Option<String>,
}

impl Frame {
    /// Request the relay to replay the conversation between `from` and `to`
    pub fn history_request(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::History,
            from: from.into(),
            to: to.into(),
            body: None,
            message_id: None,
        }
    }

    /// Outbound chat send; the relay assigns the message id
    pub fn chat(from: impl Into<String>, to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Chat,
            from: from.into(),
            to: to.into(),
            body: Some(body.into()),
            message_id: None,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// An inbound message with a relay-assigned id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: FrameKind,
    pub from: String,
    pub to: String,
    pub body: String,
    pub id: String,
}

impl Message {
    /// Parse raw inbound text; `None` when it does not match the message shape
    pub fn decode(raw: &str) -> Option<Self> {
        let frame: Frame = serde_json::from_str(raw).ok()?;
        Self::try_from(frame).ok()
    }

    /// Whether this message belongs to the conversation `{user, peer}` as seen by `user`
    ///
    /// Identity based only: there is no request correlation on the wire.
    pub fn is_relevant_to(&self, user: &str, peer: &str) -> bool {
        self.from == peer || self.to == peer || self.from == user
    }
}

impl TryFrom<Frame> for Message {
    type Error = Frame;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        match (&frame.body, &frame.message_id) {
            (Some(_), Some(id)) if !id.is_empty() => {}
            _ => return Err(frame),
        }
        let Frame {
            kind,
            from,
            to,
            body,
            message_id,
        } = frame;
        Ok(Self {
            kind,
            from,
            to,
            body: body.unwrap_or_default(),
            id: message_id.unwrap_or_default(),
        })
    }
}
