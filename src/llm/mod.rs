//! Remote completion service seam and its implementations.
//!
//! - `gemini`: HTTP client for the Gemini `generateContent` endpoint
//! - `mock`: deterministic in-process service for tests and offline runs

pub mod gemini;
pub mod mock;

use serde::{Deserialize, Serialize};

use crate::chat::errors::ChatResult;
use crate::chat::types::{Message, Role};
use crate::config::GenerationConfig;

pub use gemini::GeminiClient;
pub use mock::ScriptedCompletionService;

/// Role vocabulary of the completion service.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// User turn.
    User,
    /// Model turn (the service's name for assistant output).
    Model,
}

impl From<Role> for TurnRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Model,
        }
    }
}

/// One role-tagged turn of a transcript.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    /// Service-side role.
    pub role: TurnRole,
    /// Turn text.
    pub text: String,
}

/// Ordered turns sent to the completion service for one request.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Persona / system instruction placed before every turn.
    pub system: Option<String>,
    /// Conversation turns in order.
    pub turns: Vec<TranscriptTurn>,
}

impl Transcript {
    /// Build a transcript from a conversation history.
    #[must_use]
    pub fn from_history(persona: Option<&str>, history: &[Message]) -> Self {
        let turns = history
            .iter()
            .map(|message| TranscriptTurn {
                role: message.role.into(),
                text: message.text.clone(),
            })
            .collect();

        Self {
            system: persona.map(str::to_string),
            turns,
        }
    }

    /// Text of the last user turn, if any.
    #[must_use]
    pub fn last_user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::User)
            .map(|turn| turn.text.as_str())
    }
}

/// One completion candidate.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Candidate text, absent when the service returned no text part.
    pub text: Option<String>,
}

/// Result of a completion call.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Candidates in service order.
    pub candidates: Vec<Candidate>,
}

impl CompletionResponse {
    /// Response holding a single text candidate.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                text: Some(text.into()),
            }],
        }
    }

    /// Non-empty text of the first candidate.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.text.as_deref())
            .filter(|text| !text.is_empty())
    }
}

/// A one-shot remote completion service.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Request a completion for the transcript.
    ///
    /// # Errors
    /// Returns `RemoteUnavailable` on transport or status failures and
    /// `MalformedResponse` when the body cannot be decoded.
    async fn complete(
        &self,
        transcript: &Transcript,
        generation: &GenerationConfig,
    ) -> ChatResult<CompletionResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_maps_roles() {
        let history = vec![
            Message::user("hello"),
            Message::assistant("hi"),
            Message::user("how are you?"),
        ];
        let transcript = Transcript::from_history(Some("be kind"), &history);

        assert_eq!(transcript.system.as_deref(), Some("be kind"));
        let roles: Vec<TurnRole> = transcript.turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![TurnRole::User, TurnRole::Model, TurnRole::User]);
        assert_eq!(transcript.last_user_text(), Some("how are you?"));
    }

    #[test]
    fn test_transcript_without_persona() {
        let transcript = Transcript::from_history(None, &[Message::user("x")]);
        assert!(transcript.system.is_none());
        assert_eq!(transcript.turns.len(), 1);
    }

    #[test]
    fn test_first_text_skips_empty() {
        let empty = CompletionResponse {
            candidates: vec![Candidate {
                text: Some(String::new()),
            }],
        };
        assert!(empty.first_text().is_none());
        assert!(CompletionResponse::default().first_text().is_none());
        assert_eq!(CompletionResponse::text("ok").first_text(), Some("ok"));
    }
}
