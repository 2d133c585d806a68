//! Wire shapes and the canonical message record

use serde::Deserialize;
use serde_json::Value;

/// One webhook delivery from the upstream gateway
#[derive(Debug, Clone, Deserialize)]
pub struct RawBatch {
    /// Batch status: [`crate::ingest::STATUS_OK`] when new messages are
    /// present, [`crate::ingest::STATUS_MAYBE_OFFLINE`] when the upstream
    /// session may have logged out
    #[serde(rename = "Message", default)]
    pub message: String,

    #[serde(rename = "Data", default)]
    pub data: BatchData,
}

/// Payload container of a batch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchData {
    #[serde(rename = "AddMsgs", default)]
    pub add_msgs: Vec<RawMessageEntry>,
}

/// One raw message entry as delivered on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessageEntry {
    #[serde(rename = "MsgId")]
    pub msg_id: Option<i64>,

    #[serde(rename = "NewMsgId", default)]
    pub new_msg_id: Option<i64>,

    #[serde(rename = "FromUserName", default)]
    pub from: WrappedString,

    #[serde(rename = "ToUserName", default)]
    pub to: WrappedString,

    #[serde(rename = "MsgType", default)]
    pub msg_type: i64,

    #[serde(rename = "Content", default)]
    pub content: WrappedString,

    #[serde(rename = "PushContent", default)]
    pub push_content: String,

    #[serde(rename = "CreateTime", default)]
    pub create_time: i64,
}

/// The gateway wraps several string fields as `{ "string": "..." }`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WrappedString {
    #[serde(default)]
    pub string: String,
}

impl WrappedString {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.string
    }
}

/// Resolved message taxonomy code
///
/// Coarse types arrive numeric; application, call, and system sub-payloads
/// refine them to a nested numeric code or a symbolic label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Code(i64),
    Label(String),
}

impl MessageKind {
    /// Symbolic marker for the remapped open-chat event
    #[must_use]
    pub fn open_chat() -> Self {
        Self::Label("open_chat".to_string())
    }

    /// Plain text message
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Code(1))
    }

    /// Image message
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Code(3))
    }

    /// File attachment (application sub-type)
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self, Self::Code(6))
    }

    /// System prompt message (kept as plain text, never parsed as markup)
    #[must_use]
    pub const fn is_system_prompt(&self) -> bool {
        matches!(self, Self::Code(10000))
    }

    /// Group red-packet event (application sub-type)
    #[must_use]
    pub const fn is_red_packet(&self) -> bool {
        matches!(self, Self::Code(2001))
    }

    /// Own-message revocation event
    #[must_use]
    pub fn is_revoke(&self) -> bool {
        matches!(self, Self::Label(label) if label == "revokemsg")
    }

    /// Categories dropped outright: open-chat activation, live-broadcast
    /// notice, WeCom update, unsupported legacy type 74, payment message
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        match self {
            Self::Code(code) => *code == 74,
            Self::Label(label) => {
                matches!(label.as_str(), "open_chat" | "bizlivenotify" | "qy_chat_update" | "paymsg")
            }
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Label(label) => write!(f, "{label}"),
        }
    }
}

/// Message body: raw text, or the parsed tree of an embedded markup payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Tree(Value),
}

impl MessageBody {
    /// Text content, if this is a plain-text body
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Tree(_) => None,
        }
    }

    /// Parsed payload tree, if this is a structured body
    #[must_use]
    pub const fn as_tree(&self) -> Option<&Value> {
        match self {
            Self::Text(_) => None,
            Self::Tree(tree) => Some(tree),
        }
    }
}

/// Normalized record of one chat event
///
/// Created by the classifier, consumed exactly once downstream, never
/// persisted.
#[derive(Debug, Clone)]
pub struct CanonicalMessage {
    /// Primary identifier; also the dedup key
    pub message_id: i64,
    /// Secondary (server-side) identifier
    pub secondary_id: i64,
    pub from_id: String,
    pub to_id: String,
    /// Actual author; differs from `from_id` in group conversations
    pub sender_id: String,
    pub kind: MessageKind,
    pub body: MessageBody,
    /// Push-notification preview string, when the gateway supplied one
    pub push_preview: String,
    pub created_at: i64,
    /// Display name of the conversation peer (contact or group)
    pub contact_name: String,
    /// Display name of the author within the conversation
    pub sender_name: String,
    /// Avatar URL of the conversation peer, when known
    pub avatar_url: String,
}
