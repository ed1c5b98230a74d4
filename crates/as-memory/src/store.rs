//! `SessionStore`: the storage contract every backend
//! implements, plus the in-memory backend — a single mutex per store,
//! O(1) operations, directly generalizing the teacher's gateway-owned
//! `SessionStore` from a bespoke sessionKey/origin model down to the
//! spec's plain create/get/delete/list/save/load contract.

use std::collections::HashMap;

use as_domain::tool::Message;
use as_domain::trace::TraceEvent;
use as_domain::{Error, Result};
use parking_lot::RwLock;

use crate::session::Session;

/// Storage contract for sessions and their message logs.
///
/// `save_messages` is append-only: it must never lose a message under
/// concurrent calls against the same session id, though the relative
/// order *between* two concurrent callers' batches is undefined — each
/// call's own messages must still land contiguously.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, agent_name: &str, metadata: HashMap<String, String>) -> Result<Session>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn list(&self, agent_name: Option<&str>) -> Result<Vec<Session>>;
    async fn save_messages(&self, id: &str, messages: Vec<Message>) -> Result<()>;
    async fn load_messages(&self, id: &str) -> Result<Vec<Message>>;
    /// Atomically replaces the whole message log. Used only by memory
    /// strategies compacting/summarizing the log; ordinary turn-loop
    /// persistence always goes through the append-only `save_messages`.
    async fn replace_messages(&self, id: &str, messages: Vec<Message>) -> Result<()>;
}

struct SessionRecord {
    session: Session,
    messages: Vec<Message>,
}

/// A guarded map of id -> {session, message list}; the
/// "in-memory" backend.
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()) }
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemoryStore {
    async fn create(&self, agent_name: &str, metadata: HashMap<String, String>) -> Result<Session> {
        let session = Session::new(agent_name, metadata);
        let mut sessions = self.sessions.write();
        sessions.insert(session.id.clone(), SessionRecord { session: session.clone(), messages: Vec::new() });
        TraceEvent::SessionResolved {
            session_key: session.id.clone(),
            session_id: session.id.clone(),
            is_new: true,
        }
        .emit();
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().get(id).map(|r| r.session.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.write().remove(id);
        Ok(())
    }

    async fn list(&self, agent_name: Option<&str>) -> Result<Vec<Session>> {
        let sessions = self.sessions.read();
        Ok(sessions
            .values()
            .map(|r| &r.session)
            .filter(|s| agent_name.map(|a| a == s.agent_name).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn save_messages(&self, id: &str, messages: Vec<Message>) -> Result<()> {
        let mut sessions = self.sessions.write();
        let record = sessions.get_mut(id).ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        record.messages.extend(messages);
        record.session.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn load_messages(&self, id: &str) -> Result<Vec<Message>> {
        let sessions = self.sessions.read();
        let record = sessions.get(id).ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        Ok(record.messages.clone())
    }

    async fn replace_messages(&self, id: &str, messages: Vec<Message>) -> Result<()> {
        let mut sessions = self.sessions.write();
        let record = sessions.get_mut(id).ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        record.messages = messages;
        record.session.updated_at = chrono::Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryStore::new();
        let session = store.create("demo-agent", HashMap::new()).await.unwrap();
        let fetched = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.agent_name, "demo-agent");
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let store = InMemoryStore::new();
        let session = store.create("demo-agent", HashMap::new()).await.unwrap();
        store.delete(&session.id).await.unwrap();
        assert!(store.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_agent() {
        let store = InMemoryStore::new();
        store.create("a", HashMap::new()).await.unwrap();
        store.create("b", HashMap::new()).await.unwrap();
        let only_a = store.list(Some("a")).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(store.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn save_and_load_preserve_insertion_order() {
        let store = InMemoryStore::new();
        let session = store.create("demo-agent", HashMap::new()).await.unwrap();
        store.save_messages(&session.id, vec![Message::user("one"), Message::user("two")]).await.unwrap();
        store.save_messages(&session.id, vec![Message::user("three")]).await.unwrap();
        let loaded = store.load_messages(&session.id).await.unwrap();
        let texts: Vec<&str> = loaded.iter().map(|m| m.content.text().unwrap()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn concurrent_single_message_appends_lose_none() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let session = store.create("demo-agent", HashMap::new()).await.unwrap();
        let futures = (0..50).map(|i| {
            let store = store.clone();
            let id = session.id.clone();
            async move {
                store.save_messages(&id, vec![Message::user(format!("m{i}"))]).await.unwrap();
            }
        });
        join_all(futures).await;
        let loaded = store.load_messages(&session.id).await.unwrap();
        assert_eq!(loaded.len(), 50);
    }

    #[tokio::test]
    async fn save_against_unknown_session_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.save_messages("sess_missing", vec![Message::user("x")]).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn replace_messages_swaps_the_whole_log() {
        let store = InMemoryStore::new();
        let session = store.create("demo-agent", HashMap::new()).await.unwrap();
        store
            .save_messages(&session.id, vec![Message::user("a"), Message::user("b"), Message::user("c")])
            .await
            .unwrap();
        store
            .replace_messages(&session.id, vec![Message::system("summary"), Message::user("c")])
            .await
            .unwrap();
        let loaded = store.load_messages(&session.id).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content.text().unwrap(), "summary");
    }
}
