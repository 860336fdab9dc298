//! Conversation and message model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title given to conversations until their first user message arrives.
pub const PLACEHOLDER_TITLE: &str = "New Conversation";

/// Maximum number of characters kept when deriving a title.
pub const TITLE_MAX_CHARS: usize = 30;

/// Marker appended to titles that were truncated.
const TITLE_ELLIPSIS: &str = "...";

/// Identifier of a conversation, assigned monotonically by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub u64);

impl ConversationId {
    /// Identifier used for the first conversation of an empty store.
    pub const FIRST: Self = Self(1);

    /// Identifier directly after this one, `None` at `u64::MAX`.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse().map(Self)
    }
}

/// Sender of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text typed by the user.
    User,
    /// Reply produced by the completion service (or a fallback).
    #[serde(alias = "ai")]
    Assistant,
}

impl Role {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One turn in a conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent the message.
    #[serde(alias = "sender")]
    pub role: Role,
    /// Raw text, possibly markdown.
    pub text: String,
}

impl Message {
    /// Build a user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// A titled, ordered sequence of messages.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Messages in insertion order.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Creation timestamp.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation with the placeholder title.
    #[must_use]
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            title: PLACEHOLDER_TITLE.to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether the title has not been derived yet.
    #[must_use]
    pub fn has_placeholder_title(&self) -> bool {
        self.title == PLACEHOLDER_TITLE
    }

    /// Title derived from the first user message, if there is one.
    #[must_use]
    pub fn derived_title(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|message| message.role == Role::User)
            .map(|message| derive_title(&message.text))
    }
}

/// Derive a conversation title from message text.
///
/// Text longer than [`TITLE_MAX_CHARS`] characters is cut and suffixed with `...`.
#[must_use]
pub fn derive_title(text: &str) -> String {
    if text.chars().count() > TITLE_MAX_CHARS {
        let mut title: String = text.chars().take(TITLE_MAX_CHARS).collect();
        title.push_str(TITLE_ELLIPSIS);
        title
    } else {
        text.to_string()
    }
}

/// Immutable view of the session published after every command.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatSnapshot {
    /// All conversations in store order.
    pub conversations: Vec<Conversation>,
    /// Currently selected conversation.
    pub active_id: ConversationId,
    /// True while a completion request is outstanding.
    pub in_flight: bool,
    /// Bumped whenever a fresh conversation becomes active; per-conversation counters
    /// kept outside the store reset when it changes.
    pub session_epoch: u64,
}

impl ChatSnapshot {
    /// The active conversation.
    #[must_use]
    pub fn active(&self) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == self.active_id)
    }
}
