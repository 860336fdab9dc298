//! Completion orchestrator: one remote round-trip per send, never two at once.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chat::errors::{ChatError, ChatResult};
use crate::chat::store::ConversationStore;
use crate::chat::types::{ConversationId, Message};
use crate::config::{ChatConfig, GenerationConfig};
use crate::llm::{CompletionService, Transcript};

/// Assistant text used when the service answers without candidate text.
pub const NO_RESPONSE_FALLBACK: &str = "No response from Gemini";

/// Assistant text used when the remote call fails.
pub const ERROR_FALLBACK: &str = "Error: Failed to get response.";

/// Result of a send attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    /// The exchange completed; holds the appended assistant text.
    Replied(String),
    /// Input was empty after trimming; nothing happened.
    EmptyInput,
    /// A request is already outstanding; nothing happened.
    Busy,
}

/// Drives the `Idle -> Sending -> Idle` lifecycle against a shared store.
pub struct Orchestrator {
    store: Arc<Mutex<ConversationStore>>,
    service: Arc<dyn CompletionService>,
    persona: Option<String>,
    generation: GenerationConfig,
}

impl Orchestrator {
    /// Create an orchestrator with the deployment's persona and generation settings.
    #[must_use]
    pub fn new(
        store: Arc<Mutex<ConversationStore>>,
        service: Arc<dyn CompletionService>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            store,
            service,
            persona: config.persona.text.clone(),
            generation: config.generation.clone(),
        }
    }

    /// Shared store handle.
    #[must_use]
    pub fn store(&self) -> Arc<Mutex<ConversationStore>> {
        Arc::clone(&self.store)
    }

    /// Send to the currently active conversation.
    ///
    /// # Errors
    /// Returns `NotFound` if the conversation disappears mid-exchange.
    pub async fn send_active(&self, user_text: &str) -> ChatResult<SendOutcome> {
        let active_id = self.store.lock().await.active_id();
        self.send(active_id, user_text).await
    }

    /// Append the user message, ask the service, append exactly one assistant message.
    ///
    /// Remote failures become the [`ERROR_FALLBACK`] message and never surface as
    /// errors. The in-flight flag is always cleared before returning.
    ///
    /// # Errors
    /// Returns `NotFound` if `conversation_id` is not in the store, or was deleted
    /// while the request was outstanding. The reply is dropped in that case.
    pub async fn send(
        &self,
        conversation_id: ConversationId,
        user_text: &str,
    ) -> ChatResult<SendOutcome> {
        if user_text.trim().is_empty() {
            return Ok(SendOutcome::EmptyInput);
        }

        let history = {
            let mut store = self.store.lock().await;
            if store.get(conversation_id).is_none() {
                return Err(ChatError::NotFound(conversation_id));
            }
            if !store.try_begin_send(conversation_id) {
                debug!("Rejecting send while a request is in flight");
                return Ok(SendOutcome::Busy);
            }
            match store
                .push_message(conversation_id, Message::user(user_text))
                .await
            {
                Ok(history) => history,
                Err(err) => {
                    store.finish_send();
                    return Err(err);
                }
            }
        };

        let reply = self.request_reply(&history).await;

        let mut store = self.store.lock().await;
        if store.send_target_deleted() {
            store.finish_send();
            warn!("Conversation {conversation_id} was deleted mid-exchange, dropping reply");
            return Err(ChatError::NotFound(conversation_id));
        }
        let appended = store
            .push_message(conversation_id, Message::assistant(reply.clone()))
            .await;
        store.finish_send();
        appended?;

        info!("Completed exchange in conversation {conversation_id}");
        Ok(SendOutcome::Replied(reply))
    }

    async fn request_reply(&self, history: &[Message]) -> String {
        let transcript = Transcript::from_history(self.persona.as_deref(), history);

        match self.service.complete(&transcript, &self.generation).await {
            Ok(response) => response.first_text().map_or_else(
                || {
                    warn!("Completion service returned no candidate text");
                    NO_RESPONSE_FALLBACK.to_string()
                },
                str::to_string,
            ),
            Err(err) => {
                warn!("Completion request failed: {err}");
                ERROR_FALLBACK.to_string()
            }
        }
    }
}
