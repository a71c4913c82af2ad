//! Core types for conversation orchestration.

use serde::{Deserialize, Serialize};

/// The party responsible for a turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human participant.
    User,
    /// The model itself.
    Assistant,
    /// A tool result fed back to the model.
    Tool,
}

/// One piece of a turn's content.
///
/// A single turn may carry several parts, e.g. an author marker followed by
/// an image, or a caption followed by a transcript.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ContentPart {
    /// Plain text.
    Text(String),
    /// An image, referenced by URL or carried inline as a `data:` URL.
    Image {
        /// Image locator.
        url: String,
    },
}

impl ContentPart {
    /// Text content of this part, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Image { .. } => None,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier the paired result must echo back.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Raw JSON arguments as emitted by the model.
    pub arguments: String,
}

/// One logical contribution to the dialogue, in insertion order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who produced the turn.
    pub role: Role,
    /// Ordered content parts.
    pub content: Vec<ContentPart>,
    /// Set on `Role::Tool` turns; pairs the result with its request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on assistant turns that request tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ConversationTurn {
    /// Build a user turn from content parts.
    #[must_use]
    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// Build a plain-text assistant turn.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::Text(text.into())],
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// Build an assistant turn carrying tool-call requests.
    #[must_use]
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: Vec::new(),
            tool_call_id: None,
            tool_calls,
        }
    }

    /// Build a tool-result turn answering `tool_call_id`.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentPart::Text(content.into())],
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Concatenated text of all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The orchestrator's final output for one exchange.
#[derive(Clone, Debug, Default)]
pub struct ChatReply {
    /// The answer text, never empty.
    pub answer: String,
    /// Delimited reasoning segment, when the model emitted one.
    pub thinking: Option<String>,
    /// Rendered side-effect image (e.g. a table), delivered out-of-band.
    pub artifact: Option<Vec<u8>>,
}

/// Kind of an inbound platform message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Push-to-talk voice note.
    Voice,
    /// A regular audio attachment.
    Audio,
    /// An image attachment.
    Image,
    /// A sticker, treated as an image for description purposes.
    Sticker,
    /// A document attachment (PDF or otherwise).
    Document,
    /// A call log entry.
    Call,
    /// A video attachment.
    Video,
    /// A shared location.
    Location,
    /// A group invite.
    GroupInvite,
}

impl MessageKind {
    /// Whether this kind is rejected outright rather than normalized.
    #[must_use]
    pub const fn is_unsupported(self) -> bool {
        matches!(
            self,
            Self::Call | Self::Video | Self::Location | Self::GroupInvite
        )
    }
}

/// Raw media bytes attached to a platform message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MediaPayload {
    /// Decoded media bytes.
    pub data: Vec<u8>,
    /// MIME type reported by the platform.
    pub mime_type: String,
}

/// One message as delivered by the messaging platform.
#[derive(Clone, Debug)]
pub struct PlatformMessage {
    /// Platform message id.
    pub id: String,
    /// Conversation the message belongs to.
    pub conversation_id: String,
    /// Sender identifier (e.g. a phone number).
    pub sender: String,
    /// Text body or media caption.
    pub body: String,
    /// Message kind.
    pub kind: MessageKind,
    /// Whether the bot itself authored the message.
    pub from_me: bool,
    /// Whether the conversation is a group.
    pub is_group: bool,
    /// Whether the bot is mentioned (group conversations).
    pub mentions_me: bool,
    /// Attached media, if any.
    pub media: Option<MediaPayload>,
}

impl PlatformMessage {
    /// Build a plain inbound text message for a direct conversation.
    #[must_use]
    pub fn text(
        conversation_id: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            conversation_id: conversation_id.into(),
            sender: sender.into(),
            body: body.into(),
            kind: MessageKind::Text,
            from_me: false,
            is_group: false,
            mentions_me: false,
            media: None,
        }
    }
}

/// Conversation-level context used during normalization.
#[derive(Clone, Debug)]
pub struct ConversationContext {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Whether the conversation is a group.
    pub is_group: bool,
}
