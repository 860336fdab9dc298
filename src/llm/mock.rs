//! Deterministic completion service used by tests and by the `mock` provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::chat::errors::{ChatError, ChatResult};
use crate::config::GenerationConfig;
use crate::llm::{CompletionResponse, CompletionService, Transcript};

/// What the scripted service answers.
#[derive(Clone, Debug)]
pub enum Script {
    /// Echo the last user turn.
    Echo,
    /// Always answer with this text.
    Reply(String),
    /// Answer with a well-formed response holding no candidates.
    Empty,
    /// Fail as if the network were down.
    Unavailable(String),
    /// Fail as if the body could not be decoded.
    Malformed(String),
}

/// In-process completion service with a fixed script.
#[derive(Debug)]
pub struct ScriptedCompletionService {
    script: Script,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    last_transcript: Mutex<Option<Transcript>>,
}

impl ScriptedCompletionService {
    /// Create a service following `script`.
    #[must_use]
    pub const fn new(script: Script) -> Self {
        Self {
            script,
            gate: None,
            calls: AtomicUsize::new(0),
            last_transcript: Mutex::new(None),
        }
    }

    /// Echo service used by the `mock` provider.
    #[must_use]
    pub const fn echo() -> Self {
        Self::new(Script::Echo)
    }

    /// Hold every answer until `gate` is notified.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Number of completed or pending calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Transcript of the most recent call.
    #[must_use]
    pub fn last_transcript(&self) -> Option<Transcript> {
        self.last_transcript.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait::async_trait]
impl CompletionService for ScriptedCompletionService {
    async fn complete(
        &self,
        transcript: &Transcript,
        _generation: &GenerationConfig,
    ) -> ChatResult<CompletionResponse> {
        tracing::info!("Mock completion service processing request");

        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_transcript.lock() {
            *guard = Some(transcript.clone());
        }

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.script {
            Script::Echo => {
                let last = transcript.last_user_text().unwrap_or("empty");
                Ok(CompletionResponse::text(format!("Mock response to: {last}")))
            }
            Script::Reply(text) => Ok(CompletionResponse::text(text.clone())),
            Script::Empty => Ok(CompletionResponse::default()),
            Script::Unavailable(reason) => Err(ChatError::RemoteUnavailable(reason.clone())),
            Script::Malformed(reason) => Err(ChatError::MalformedResponse(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::Message;

    #[tokio::test]
    async fn test_echo_uses_last_user_turn() {
        let service = ScriptedCompletionService::echo();
        let transcript =
            Transcript::from_history(None, &[Message::user("Hello, world!"), Message::assistant("x")]);

        let response = service
            .complete(&transcript, &GenerationConfig::default())
            .await
            .unwrap();

        assert_eq!(response.first_text(), Some("Mock response to: Hello, world!"));
        assert_eq!(service.calls(), 1);
        assert_eq!(service.last_transcript(), Some(transcript));
    }

    #[tokio::test]
    async fn test_failure_scripts() {
        let transcript = Transcript::default();
        let generation = GenerationConfig::default();

        let down = ScriptedCompletionService::new(Script::Unavailable("down".to_string()));
        assert!(matches!(
            down.complete(&transcript, &generation).await,
            Err(ChatError::RemoteUnavailable(_))
        ));

        let garbled = ScriptedCompletionService::new(Script::Malformed("eof".to_string()));
        assert!(matches!(
            garbled.complete(&transcript, &generation).await,
            Err(ChatError::MalformedResponse(_))
        ));
    }
}
