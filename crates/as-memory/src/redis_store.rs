//! Remote list-backed `SessionStore`: session metadata
//! lives in a `sessions:<id>:meta` string key, the message log in an
//! ordered `sessions:<id>:messages` list (one JSON-encoded message per
//! entry, appended with `RPUSH`), and a `sessions:index` set tracks known
//! ids for `list()`. `RPUSH` is itself atomic per call, which is what
//! gives concurrent single-message `save_messages` callers the
//! no-lost-writes guarantee the spec requires without an extra lock.

use std::collections::HashMap;

use as_domain::tool::Message;
use as_domain::trace::TraceEvent;
use as_domain::{Error, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};

use crate::session::Session;
use crate::store::SessionStore;

const INDEX_KEY: &str = "sessions:index";

fn meta_key(id: &str) -> String {
    format!("sessions:{id}:meta")
}

fn messages_key(id: &str) -> String {
    format!("sessions:{id}:messages")
}

fn map_redis_err(e: RedisError) -> Error {
    Error::Io(std::io::Error::other(e.to_string()))
}

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_err)?;
        let conn = client.get_connection_manager().await.map_err(map_redis_err)?;
        Ok(Self { conn })
    }

    /// If `sessions:<id>:messages` still holds the legacy string-encoded
    /// JSON array, migrate it in place to individual list entries before
    /// any read or append proceeds.
    async fn migrate_legacy_if_needed(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = messages_key(id);
        let key_type: String = redis::cmd("TYPE").arg(&key).query_async(&mut conn).await.map_err(map_redis_err)?;
        if key_type != "string" {
            return Ok(());
        }
        let raw: String = conn.get(&key).await.map_err(map_redis_err)?;
        let legacy: Vec<Message> = serde_json::from_str(&raw)?;
        let _: () = conn.del(&key).await.map_err(map_redis_err)?;
        if !legacy.is_empty() {
            let encoded: Result<Vec<String>> =
                legacy.iter().map(|m| serde_json::to_string(m).map_err(Error::from)).collect();
            let encoded = encoded?;
            let _: () = conn.rpush(&key, encoded).await.map_err(map_redis_err)?;
        }
        tracing::info!(session_id = id, count = legacy.len(), "migrated legacy session message encoding");
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisStore {
    async fn create(&self, agent_name: &str, metadata: HashMap<String, String>) -> Result<Session> {
        let session = Session::new(agent_name, metadata);
        let mut conn = self.conn.clone();
        let encoded = serde_json::to_string(&session)?;
        let _: () = conn.set(meta_key(&session.id), encoded).await.map_err(map_redis_err)?;
        let _: () = conn.sadd(INDEX_KEY, &session.id).await.map_err(map_redis_err)?;
        TraceEvent::SessionResolved {
            session_key: session.id.clone(),
            session_id: session.id.clone(),
            is_new: true,
        }
        .emit();
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(meta_key(id)).await.map_err(map_redis_err)?;
        raw.map(|r| serde_json::from_str(&r).map_err(Error::from)).transpose()
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(meta_key(id)).await.map_err(map_redis_err)?;
        let _: () = conn.del(messages_key(id)).await.map_err(map_redis_err)?;
        let _: () = conn.srem(INDEX_KEY, id).await.map_err(map_redis_err)?;
        Ok(())
    }

    async fn list(&self, agent_name: Option<&str>) -> Result<Vec<Session>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(INDEX_KEY).await.map_err(map_redis_err)?;
        let mut out = Vec::new();
        for id in ids {
            if let Some(session) = self.get(&id).await? {
                if agent_name.map(|a| a == session.agent_name).unwrap_or(true) {
                    out.push(session);
                }
            }
        }
        Ok(out)
    }

    async fn save_messages(&self, id: &str, messages: Vec<Message>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        self.migrate_legacy_if_needed(id).await?;
        let mut conn = self.conn.clone();
        let encoded: Result<Vec<String>> =
            messages.iter().map(|m| serde_json::to_string(m).map_err(Error::from)).collect();
        let encoded = encoded?;
        let _: () = conn.rpush(messages_key(id), encoded).await.map_err(map_redis_err)?;
        Ok(())
    }

    async fn load_messages(&self, id: &str) -> Result<Vec<Message>> {
        self.migrate_legacy_if_needed(id).await?;
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(messages_key(id), 0, -1).await.map_err(map_redis_err)?;
        raw.iter().map(|r| serde_json::from_str(r).map_err(Error::from)).collect()
    }

    /// Atomically replaces the whole message log: `DEL` the key, then
    /// `RPUSH` the re-encoded messages, mirroring the tail of
    /// `migrate_legacy_if_needed`. Used by the Summary memory strategy to
    /// compact a session's log after folding its oldest entries into one
    /// synthetic system message.
    async fn replace_messages(&self, id: &str, messages: Vec<Message>) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = messages_key(id);
        let _: () = conn.del(&key).await.map_err(map_redis_err)?;
        if !messages.is_empty() {
            let encoded: Result<Vec<String>> =
                messages.iter().map(|m| serde_json::to_string(m).map_err(Error::from)).collect();
            let encoded = encoded?;
            let _: () = conn.rpush(&key, encoded).await.map_err(map_redis_err)?;
        }
        Ok(())
    }
}
