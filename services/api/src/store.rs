//! In-memory conversation registry and per-conversation message channels.
//!
//! The store is the only shared mutable state in the service. Every
//! operation is a keyed map access inside one mutex critical section, so
//! per-conversation mutations are linearizable and conversations never
//! contend with each other beyond the map lock itself.
//!
//! Replacing a conversation (`create` with an existing id) bumps an epoch
//! counter instead of cancelling the old turn's task: writers pass the
//! epoch they were spawned with, and a mismatch makes their late writes
//! fail `Stale` and vanish, never touching the replacement conversation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use storytime_core::Knowledge;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A message queued for delivery to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Text to be vocalized before it reaches the user.
    Audio { text: String },
    /// The final structured result of a turn.
    Output { payload: Value },
}

/// The unit of state for one user's session with the assistant.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub epoch: u64,
    pub created_at: DateTime<Utc>,
    pub messages_to_user: VecDeque<OutboundMessage>,
    pub messages_to_agent: VecDeque<String>,
    pub knowledge: Option<Knowledge>,
    pub story_history: Vec<String>,
    pub outputs: Map<String, Value>,
}

impl Conversation {
    fn fresh(epoch: u64) -> Self {
        Self {
            epoch,
            created_at: Utc::now(),
            messages_to_user: VecDeque::new(),
            messages_to_agent: VecDeque::new(),
            knowledge: None,
            story_history: Vec::new(),
            outputs: Map::new(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("conversation '{0}' not found")]
    NotFound(String),
    /// The conversation was replaced after the caller was spawned; the
    /// caller's writes are dropped rather than applied to the new record.
    #[error("conversation '{0}' was replaced")]
    Stale(String),
}

pub struct ConversationStore {
    conversations: Mutex<HashMap<String, Conversation>>,
    /// Re-check interval for [`await_from_agent`](Self::await_from_agent).
    poll_interval: Duration,
}

impl ConversationStore {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            poll_interval,
        }
    }

    /// Creates a conversation, generating an id when none is supplied.
    ///
    /// Creating over an existing id is a soft reset: `outputs` and
    /// `knowledge` carry over, queues and story history start empty, and
    /// the epoch advances so in-flight writers for the old record go
    /// stale. Returns the id and the new epoch.
    pub async fn create(&self, id: Option<String>) -> (String, u64) {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut conversations = self.conversations.lock().await;
        let replacement = match conversations.get(&id) {
            Some(existing) => {
                let mut fresh = Conversation::fresh(existing.epoch + 1);
                fresh.knowledge = existing.knowledge.clone();
                fresh.outputs = existing.outputs.clone();
                fresh
            }
            None => Conversation::fresh(1),
        };
        let epoch = replacement.epoch;
        conversations.insert(id.clone(), replacement);
        (id, epoch)
    }

    /// Clones the current record for read-only use.
    pub async fn snapshot(&self, id: &str) -> Result<Conversation, StoreError> {
        let conversations = self.conversations.lock().await;
        conversations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Applies `f` to the stored conversation under the map lock.
    pub async fn mutate<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Conversation) -> R,
    ) -> Result<R, StoreError> {
        let mut conversations = self.conversations.lock().await;
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(f(conversation))
    }

    /// Like [`mutate`](Self::mutate), but only while `epoch` is still the
    /// live one. Orphaned writers get `Stale` and give up.
    pub async fn mutate_if_current<R>(
        &self,
        id: &str,
        epoch: u64,
        f: impl FnOnce(&mut Conversation) -> R,
    ) -> Result<R, StoreError> {
        let mut conversations = self.conversations.lock().await;
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if conversation.epoch != epoch {
            return Err(StoreError::Stale(id.to_string()));
        }
        Ok(f(conversation))
    }

    /// Queues a message for the user (agent side; epoch-checked).
    pub async fn post_to_user(
        &self,
        id: &str,
        epoch: u64,
        message: OutboundMessage,
    ) -> Result<(), StoreError> {
        self.mutate_if_current(id, epoch, |conversation| {
            conversation.messages_to_user.push_back(message);
        })
        .await
    }

    /// Removes and returns the oldest pending user-bound message.
    /// `None` is the normal "nothing yet" answer, not an error.
    pub async fn pop_to_user(&self, id: &str) -> Result<Option<OutboundMessage>, StoreError> {
        self.mutate(id, |conversation| conversation.messages_to_user.pop_front())
            .await
    }

    /// Queues a user reply for the agent (HTTP side; always targets the
    /// live record).
    pub async fn post_to_agent(&self, id: &str, text: String) -> Result<(), StoreError> {
        self.mutate(id, |conversation| {
            conversation.messages_to_agent.push_back(text);
        })
        .await
    }

    /// Suspends the calling turn until a user reply is available, then
    /// pops it FIFO.
    ///
    /// This is the single suspension point that lets an agent ask the
    /// user something and receive the answer from a separate HTTP request
    /// later in time. The wait re-checks on a fixed interval and has no
    /// timeout; only replacement of the conversation (`Stale`) or its
    /// disappearance ends it early. Other conversations keep making
    /// progress throughout: nothing is held across the sleep.
    pub async fn await_from_agent(&self, id: &str, epoch: u64) -> Result<String, StoreError> {
        loop {
            let popped = self
                .mutate_if_current(id, epoch, |conversation| {
                    conversation.messages_to_agent.pop_front()
                })
                .await?;
            if let Some(text) = popped {
                return Ok(text);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> ConversationStore {
        ConversationStore::new(Duration::from_millis(10))
    }

    fn audio(text: &str) -> OutboundMessage {
        OutboundMessage::Audio {
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn create_generates_an_id_when_none_is_given() {
        let store = store();
        let (id, epoch) = store.create(None).await;
        assert!(!id.is_empty());
        assert_eq!(epoch, 1);
        assert!(store.snapshot(&id).await.is_ok());
    }

    #[tokio::test]
    async fn pop_on_a_fresh_conversation_is_repeatedly_empty() {
        let store = store();
        let (id, _) = store.create(Some("c1".to_string())).await;
        for _ in 0..3 {
            assert_eq!(store.pop_to_user(&id).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn to_user_queue_is_fifo() {
        let store = store();
        let (id, epoch) = store.create(Some("c1".to_string())).await;
        for text in ["m1", "m2", "m3"] {
            store.post_to_user(&id, epoch, audio(text)).await.unwrap();
        }
        assert_eq!(store.pop_to_user(&id).await.unwrap(), Some(audio("m1")));
        assert_eq!(store.pop_to_user(&id).await.unwrap(), Some(audio("m2")));
        assert_eq!(store.pop_to_user(&id).await.unwrap(), Some(audio("m3")));
        assert_eq!(store.pop_to_user(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_ids_fail_not_found() {
        let store = store();
        assert_eq!(
            store.pop_to_user("ghost").await.unwrap_err(),
            StoreError::NotFound("ghost".to_string())
        );
        assert_eq!(
            store.post_to_agent("ghost", "hi".to_string()).await.unwrap_err(),
            StoreError::NotFound("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn replace_preserves_outputs_and_knowledge_but_resets_the_rest() {
        let store = store();
        let (id, epoch) = store.create(Some("c1".to_string())).await;
        store
            .mutate(&id, |conversation| {
                conversation.knowledge = Some(Knowledge::preset());
                conversation.outputs.insert("story".to_string(), json!("once"));
                conversation.story_history.push("scene".to_string());
            })
            .await
            .unwrap();
        store.post_to_user(&id, epoch, audio("pending")).await.unwrap();
        store.post_to_agent(&id, "reply".to_string()).await.unwrap();

        let (_, new_epoch) = store.create(Some("c1".to_string())).await;
        assert_eq!(new_epoch, epoch + 1);

        let conversation = store.snapshot(&id).await.unwrap();
        assert_eq!(conversation.knowledge, Some(Knowledge::preset()));
        assert_eq!(conversation.outputs.get("story"), Some(&json!("once")));
        assert!(conversation.messages_to_user.is_empty());
        assert!(conversation.messages_to_agent.is_empty());
        assert!(conversation.story_history.is_empty());
    }

    #[tokio::test]
    async fn stale_writers_are_silently_dropped() {
        let store = store();
        let (id, old_epoch) = store.create(Some("c1".to_string())).await;
        store.create(Some("c1".to_string())).await;

        let result = store.post_to_user(&id, old_epoch, audio("late")).await;
        assert_eq!(result.unwrap_err(), StoreError::Stale("c1".to_string()));
        assert_eq!(store.pop_to_user(&id).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn await_from_agent_wakes_on_a_later_post() {
        let store = Arc::new(store());
        let (id, epoch) = store.create(Some("c1".to_string())).await;

        let waiter = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.await_from_agent(&id, epoch).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.post_to_agent(&id, "the answer".to_string()).await.unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), "the answer");
    }

    #[tokio::test(start_paused = true)]
    async fn await_from_agent_drains_fifo_across_waits() {
        let store = Arc::new(store());
        let (id, epoch) = store.create(Some("c1".to_string())).await;
        store.post_to_agent(&id, "first".to_string()).await.unwrap();
        store.post_to_agent(&id, "second".to_string()).await.unwrap();

        assert_eq!(store.await_from_agent(&id, epoch).await.unwrap(), "first");
        assert_eq!(store.await_from_agent(&id, epoch).await.unwrap(), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn await_from_agent_ends_when_the_conversation_is_replaced() {
        let store = Arc::new(store());
        let (id, epoch) = store.create(Some("c1".to_string())).await;

        let waiter = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.await_from_agent(&id, epoch).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        store.create(Some("c1".to_string())).await;
        store.post_to_agent(&id, "for the new turn".to_string()).await.unwrap();

        assert_eq!(
            waiter.await.unwrap().unwrap_err(),
            StoreError::Stale("c1".to_string())
        );
        // The reply stays queued for the replacement turn.
        let conversation = store.snapshot(&id).await.unwrap();
        assert_eq!(conversation.messages_to_agent.len(), 1);
    }

    #[tokio::test]
    async fn conversations_do_not_share_queues() {
        let store = store();
        let (a, epoch_a) = store.create(Some("a".to_string())).await;
        let (b, _) = store.create(Some("b".to_string())).await;
        store.post_to_user(&a, epoch_a, audio("for a")).await.unwrap();

        assert_eq!(store.pop_to_user(&b).await.unwrap(), None);
        assert_eq!(store.pop_to_user(&a).await.unwrap(), Some(audio("for a")));
    }
}
