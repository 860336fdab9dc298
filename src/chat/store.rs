//! Conversation store: canonical conversation list plus session state.
//!
//! Every command publishes a fresh [`ChatSnapshot`]; create, append and delete are
//! followed by a full write of the conversation list to the repository.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chat::errors::{ChatError, ChatResult};
use crate::chat::repository::ConversationRepository;
use crate::chat::types::{ChatSnapshot, Conversation, ConversationId, Message};

/// Outstanding completion request.
#[derive(Clone, Copy, Debug)]
struct PendingSend {
    conversation_id: ConversationId,
    target_deleted: bool,
}

/// Authoritative in-memory conversation state with write-through persistence.
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active_id: ConversationId,
    pending: Option<PendingSend>,
    session_epoch: u64,
    repository: Arc<dyn ConversationRepository>,
    snapshots: watch::Sender<ChatSnapshot>,
}

impl ConversationStore {
    /// Restore the store from the repository.
    ///
    /// Falls back to a single placeholder conversation when the slot is empty,
    /// unreadable, or holds an empty list. The first conversation becomes active.
    pub async fn restore(repository: Arc<dyn ConversationRepository>) -> Self {
        let conversations = match repository.load().await {
            Ok(Some(conversations)) => dedupe_ids(conversations),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("Failed to restore conversations, starting fresh: {err}");
                Vec::new()
            }
        };

        let conversations = if conversations.is_empty() {
            vec![Conversation::new(ConversationId::FIRST)]
        } else {
            conversations
        };
        let active_id = conversations
            .first()
            .map_or(ConversationId::FIRST, |conversation| conversation.id);

        info!("Restored {} conversation(s)", conversations.len());

        let initial = ChatSnapshot {
            conversations: conversations.clone(),
            active_id,
            in_flight: false,
            session_epoch: 0,
        };
        let (snapshots, _) = watch::channel(initial);

        Self {
            conversations,
            active_id,
            pending: None,
            session_epoch: 0,
            repository,
            snapshots,
        }
    }

    /// Current immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            conversations: self.conversations.clone(),
            active_id: self.active_id,
            in_flight: self.pending.is_some(),
            session_epoch: self.session_epoch,
        }
    }

    /// Subscribe to snapshots published after every command.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshots.subscribe()
    }

    /// All conversations in store order.
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Identifier of the active conversation.
    #[must_use]
    pub const fn active_id(&self) -> ConversationId {
        self.active_id
    }

    /// Whether a completion request is outstanding.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Look up a conversation by identifier.
    #[must_use]
    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == id)
    }

    /// Create an empty conversation and make it active.
    pub async fn create_conversation(&mut self) -> ConversationId {
        let id = self.next_id();

        self.conversations.push(Conversation::new(id));
        self.active_id = id;
        self.session_epoch += 1;

        info!("Created conversation {id}");
        self.write_through().await;
        self.publish();
        id
    }

    /// Make an existing conversation active.
    ///
    /// # Errors
    /// Returns `NotFound` if the conversation does not exist.
    pub fn select_conversation(&mut self, id: ConversationId) -> ChatResult<()> {
        if self.get(id).is_none() {
            return Err(ChatError::NotFound(id));
        }

        self.active_id = id;
        debug!("Switched to conversation {id}");
        self.publish();
        Ok(())
    }

    /// Replace a conversation's messages with the full extended sequence.
    ///
    /// A conversation still carrying the placeholder title is renamed after its
    /// first user message.
    ///
    /// # Errors
    /// Returns `NotFound` if the conversation does not exist.
    pub async fn append_messages(
        &mut self,
        id: ConversationId,
        messages: Vec<Message>,
    ) -> ChatResult<()> {
        let conversation = self
            .conversations
            .iter_mut()
            .find(|conversation| conversation.id == id)
            .ok_or(ChatError::NotFound(id))?;

        conversation.messages = messages;
        if conversation.has_placeholder_title() {
            if let Some(title) = conversation.derived_title() {
                debug!("Renamed conversation {id} to: {title}");
                conversation.title = title;
            }
        }

        self.write_through().await;
        self.publish();
        Ok(())
    }

    /// Append one message and return the resulting message list.
    ///
    /// # Errors
    /// Returns `NotFound` if the conversation does not exist.
    pub async fn push_message(
        &mut self,
        id: ConversationId,
        message: Message,
    ) -> ChatResult<Vec<Message>> {
        let mut messages = self
            .get(id)
            .ok_or(ChatError::NotFound(id))?
            .messages
            .clone();
        messages.push(message);
        self.append_messages(id, messages.clone()).await?;
        Ok(messages)
    }

    /// Delete a conversation; unknown identifiers are ignored.
    ///
    /// When the active conversation goes away the first remaining one becomes
    /// active; when none remain a default conversation is created.
    pub async fn delete_conversation(&mut self, id: ConversationId) {
        let before = self.conversations.len();
        self.conversations.retain(|conversation| conversation.id != id);
        if self.conversations.len() == before {
            debug!("Ignoring delete of unknown conversation {id}");
            return;
        }

        if let Some(pending) = self
            .pending
            .as_mut()
            .filter(|pending| pending.conversation_id == id)
        {
            pending.target_deleted = true;
        }

        if self.conversations.is_empty() {
            self.conversations
                .push(Conversation::new(ConversationId::FIRST));
            self.active_id = ConversationId::FIRST;
            self.session_epoch += 1;
        } else if self.active_id == id {
            self.active_id = self.conversations[0].id;
        }

        info!("Deleted conversation {id}");
        self.write_through().await;
        self.publish();
    }

    /// Write the full conversation list to the repository.
    ///
    /// # Errors
    /// Returns an error if the repository write fails.
    pub async fn persist(&self) -> ChatResult<()> {
        self.repository.save(self.conversations.clone()).await
    }

    /// Mark a request to `conversation_id` as in flight; returns `false` when a
    /// request is already outstanding.
    pub fn try_begin_send(&mut self, conversation_id: ConversationId) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(PendingSend {
            conversation_id,
            target_deleted: false,
        });
        self.publish();
        true
    }

    /// Whether the conversation targeted by the outstanding request was deleted
    /// after the request started. A later conversation reusing its id does not
    /// count as the target.
    #[must_use]
    pub fn send_target_deleted(&self) -> bool {
        self.pending.is_some_and(|pending| pending.target_deleted)
    }

    /// Clear the in-flight flag.
    pub fn finish_send(&mut self) {
        self.pending = None;
        self.publish();
    }

    /// `max + 1`, or the lowest unused id once the maximum cannot be incremented.
    fn next_id(&self) -> ConversationId {
        let Some(max) = self
            .conversations
            .iter()
            .map(|conversation| conversation.id)
            .max()
        else {
            return ConversationId::FIRST;
        };

        max.checked_next().unwrap_or_else(|| {
            warn!("Conversation id space exhausted above {max}, reusing a free id");
            let used: HashSet<ConversationId> = self
                .conversations
                .iter()
                .map(|conversation| conversation.id)
                .collect();
            (1..=u64::MAX)
                .map(ConversationId)
                .find(|id| !used.contains(id))
                .unwrap_or(ConversationId::FIRST)
        })
    }

    async fn write_through(&self) {
        if let Err(err) = self.persist().await {
            warn!("Failed to persist conversations: {err}");
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

/// Drop conversations whose identifier was already seen.
fn dedupe_ids(conversations: Vec<Conversation>) -> Vec<Conversation> {
    let mut seen = HashSet::with_capacity(conversations.len());
    conversations
        .into_iter()
        .filter(|conversation| {
            let fresh = seen.insert(conversation.id);
            if !fresh {
                warn!("Dropping duplicate conversation id {}", conversation.id);
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::repository::{InMemoryConversationRepository, SqliteConversationRepository};
    use crate::chat::types::PLACEHOLDER_TITLE;

    async fn fresh_store() -> (ConversationStore, Arc<InMemoryConversationRepository>) {
        let repo = Arc::new(InMemoryConversationRepository::new());
        let store = ConversationStore::restore(repo.clone()).await;
        (store, repo)
    }

    fn assert_active_resolves(store: &ConversationStore) {
        assert!(store.get(store.active_id()).is_some());
    }

    #[tokio::test]
    async fn test_restore_defaults_to_placeholder() {
        let (store, _) = fresh_store().await;
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.active_id(), ConversationId::FIRST);
        assert_eq!(store.conversations()[0].title, PLACEHOLDER_TITLE);
        assert!(store.conversations()[0].messages.is_empty());
    }

    #[tokio::test]
    async fn test_restore_falls_back_on_corrupt_slot() {
        let repo = Arc::new(InMemoryConversationRepository::with_raw("[{broken"));
        let store = ConversationStore::restore(repo).await;
        assert_eq!(store.conversations().len(), 1);
        assert_active_resolves(&store);
    }

    #[tokio::test]
    async fn test_restore_falls_back_on_empty_list() {
        let repo = Arc::new(InMemoryConversationRepository::with_raw("[]"));
        let store = ConversationStore::restore(repo).await;
        assert_eq!(store.conversations().len(), 1);
        assert_active_resolves(&store);
    }

    #[tokio::test]
    async fn test_restore_drops_duplicate_ids() {
        let raw = r#"[{"id":3,"title":"a","messages":[]},{"id":3,"title":"b","messages":[]}]"#;
        let repo = Arc::new(InMemoryConversationRepository::with_raw(raw));
        let store = ConversationStore::restore(repo).await;
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.conversations()[0].title, "a");
        assert_eq!(store.active_id(), ConversationId(3));
    }

    #[tokio::test]
    async fn test_created_ids_strictly_increase() {
        let (mut store, _) = fresh_store().await;
        let mut previous = store.active_id();
        for _ in 0..5 {
            let id = store.create_conversation().await;
            assert!(id > previous);
            assert_eq!(store.active_id(), id);
            previous = id;
        }

        let unique: HashSet<_> = store.conversations().iter().map(|c| c.id).collect();
        assert_eq!(unique.len(), store.conversations().len());
    }

    #[tokio::test]
    async fn test_create_after_delete_uses_max_plus_one() {
        let (mut store, _) = fresh_store().await;
        let second = store.create_conversation().await;
        let third = store.create_conversation().await;
        store.delete_conversation(second).await;
        let next = store.create_conversation().await;
        assert_eq!(Some(next), third.checked_next());
    }

    #[tokio::test]
    async fn test_create_bumps_session_epoch() {
        let (mut store, _) = fresh_store().await;
        let before = store.snapshot().session_epoch;
        store.create_conversation().await;
        assert_eq!(store.snapshot().session_epoch, before + 1);
    }

    #[tokio::test]
    async fn test_select_unknown_conversation_fails() {
        let (mut store, _) = fresh_store().await;
        let err = store.select_conversation(ConversationId(42)).unwrap_err();
        assert!(matches!(err, ChatError::NotFound(ConversationId(42))));
        assert_eq!(store.active_id(), ConversationId::FIRST);
    }

    #[tokio::test]
    async fn test_select_existing_conversation() {
        let (mut store, _) = fresh_store().await;
        store.create_conversation().await;
        store.select_conversation(ConversationId::FIRST).unwrap();
        assert_eq!(store.active_id(), ConversationId::FIRST);
    }

    #[tokio::test]
    async fn test_append_derives_truncated_title() {
        let (mut store, _) = fresh_store().await;
        let id = store.active_id();
        let text = "Hello there, this is a long message exceeding thirty characters";
        store
            .append_messages(id, vec![Message::user(text)])
            .await
            .unwrap();
        assert_eq!(
            store.get(id).unwrap().title,
            "Hello there, this is a long ma..."
        );
    }

    #[tokio::test]
    async fn test_append_derives_short_title_verbatim() {
        let (mut store, _) = fresh_store().await;
        let id = store.active_id();
        store
            .append_messages(id, vec![Message::user("What is Rust?")])
            .await
            .unwrap();
        assert_eq!(store.get(id).unwrap().title, "What is Rust?");
    }

    #[tokio::test]
    async fn test_title_is_not_rederived() {
        let (mut store, _) = fresh_store().await;
        let id = store.active_id();
        store
            .append_messages(id, vec![Message::user("first")])
            .await
            .unwrap();
        store
            .append_messages(
                id,
                vec![
                    Message::user("first"),
                    Message::assistant("reply"),
                    Message::user("second"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.get(id).unwrap().title, "first");
    }

    #[tokio::test]
    async fn test_append_unknown_conversation_fails() {
        let (mut store, _) = fresh_store().await;
        let result = store
            .append_messages(ConversationId(9), vec![Message::user("x")])
            .await;
        assert!(matches!(result, Err(ChatError::NotFound(ConversationId(9)))));
    }

    #[tokio::test]
    async fn test_push_message_extends_history() {
        let (mut store, _) = fresh_store().await;
        let id = store.active_id();
        store.push_message(id, Message::user("a")).await.unwrap();
        let messages = store.push_message(id, Message::assistant("b")).await.unwrap();
        assert_eq!(messages, vec![Message::user("a"), Message::assistant("b")]);
        assert_eq!(store.get(id).unwrap().messages, messages);
    }

    #[tokio::test]
    async fn test_delete_sole_conversation_synthesizes_default() {
        let (mut store, _) = fresh_store().await;
        let id = store.active_id();
        store.push_message(id, Message::user("hello")).await.unwrap();

        store.delete_conversation(id).await;

        assert_eq!(store.conversations().len(), 1);
        let only = &store.conversations()[0];
        assert_eq!(only.id, ConversationId::FIRST);
        assert_eq!(only.title, PLACEHOLDER_TITLE);
        assert!(only.messages.is_empty());
        assert_eq!(store.active_id(), ConversationId::FIRST);
    }

    #[tokio::test]
    async fn test_delete_active_moves_to_first_remaining() {
        let (mut store, _) = fresh_store().await;
        store.create_conversation().await;
        let third = store.create_conversation().await;

        store.delete_conversation(third).await;

        assert_eq!(store.active_id(), ConversationId::FIRST);
        assert_active_resolves(&store);
    }

    #[tokio::test]
    async fn test_delete_inactive_keeps_selection() {
        let (mut store, _) = fresh_store().await;
        let second = store.create_conversation().await;
        store.delete_conversation(ConversationId::FIRST).await;
        assert_eq!(store.active_id(), second);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_noop() {
        let (mut store, repo) = fresh_store().await;
        store.create_conversation().await;
        let before = store.snapshot();
        let raw_before = repo.raw();

        store.delete_conversation(ConversationId(77)).await;

        assert_eq!(store.snapshot(), before);
        assert_eq!(repo.raw(), raw_before);
    }

    #[tokio::test]
    async fn test_active_always_resolves_over_repeated_deletes() {
        let (mut store, _) = fresh_store().await;
        for _ in 0..4 {
            store.create_conversation().await;
        }
        for round in 0..10_u64 {
            let target = if round % 2 == 0 {
                store.active_id()
            } else {
                ConversationId(round)
            };
            store.delete_conversation(target).await;
            assert!(!store.conversations().is_empty());
            assert_active_resolves(&store);
            if round % 3 == 0 {
                store.create_conversation().await;
                assert_active_resolves(&store);
            }
        }
    }

    #[tokio::test]
    async fn test_every_mutation_writes_through() {
        let (mut store, repo) = fresh_store().await;
        assert!(repo.raw().is_none());

        let id = store.create_conversation().await;
        let saved = repo.load().await.unwrap().unwrap();
        assert_eq!(saved.len(), 2);

        store.push_message(id, Message::user("persist me")).await.unwrap();
        let saved = repo.load().await.unwrap().unwrap();
        assert_eq!(saved[1].messages, vec![Message::user("persist me")]);

        store.delete_conversation(id).await;
        let saved = repo.load().await.unwrap().unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn test_persist_restore_round_trip() {
        let repo = Arc::new(SqliteConversationRepository::open_in_memory().await.unwrap());
        let mut store = ConversationStore::restore(repo.clone()).await;

        let first = store.active_id();
        store.push_message(first, Message::user("Explain borrowing")).await.unwrap();
        store
            .push_message(first, Message::assistant("## Borrowing\n- shared\n- mutable"))
            .await
            .unwrap();

        let second = store.create_conversation().await;
        store.push_message(second, Message::user("hi")).await.unwrap();

        store.create_conversation().await;
        store.persist().await.unwrap();

        let restored = ConversationStore::restore(repo).await;
        assert_eq!(restored.conversations(), store.conversations());
        assert_eq!(restored.conversations().len(), 3);
    }

    #[tokio::test]
    async fn test_subscribers_see_new_snapshots() {
        let (mut store, _) = fresh_store().await;
        let mut rx = store.subscribe();

        let id = store.create_conversation().await;
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.active_id, id);
        assert_eq!(snapshot.conversations.len(), 2);
    }

    #[tokio::test]
    async fn test_in_flight_gate() {
        let (mut store, _) = fresh_store().await;
        let id = store.active_id();
        assert!(store.try_begin_send(id));
        assert!(store.is_in_flight());
        assert!(!store.try_begin_send(id));
        store.finish_send();
        assert!(!store.is_in_flight());
        assert!(store.try_begin_send(id));
    }

    #[tokio::test]
    async fn test_deleting_send_target_is_remembered() {
        let (mut store, _) = fresh_store().await;
        let target = store.active_id();
        let other = store.create_conversation().await;

        assert!(store.try_begin_send(target));
        store.delete_conversation(other).await;
        assert!(!store.send_target_deleted());

        // Deleting the last conversation brings the id back as a fresh default.
        store.delete_conversation(target).await;
        assert!(store.get(target).is_some());
        assert!(store.send_target_deleted());

        store.finish_send();
        assert!(!store.send_target_deleted());
    }

    #[tokio::test]
    async fn test_create_after_max_id_does_not_overflow() {
        let mut top = Conversation::new(ConversationId(u64::MAX));
        top.title = "Top".to_string();
        let raw = serde_json::to_string(&vec![top]).unwrap();
        let repo = Arc::new(InMemoryConversationRepository::with_raw(raw));
        let mut store = ConversationStore::restore(repo).await;

        let first = store.create_conversation().await;
        let second = store.create_conversation().await;

        assert_eq!(first, ConversationId(1));
        assert_eq!(second, ConversationId(2));
        assert_eq!(store.conversations().len(), 3);
        assert_eq!(store.active_id(), second);
    }
}
