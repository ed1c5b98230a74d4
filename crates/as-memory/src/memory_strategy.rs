//! `MemoryStrategy`: `Load(session) -> seq<Message>`, `Save(session,
//! new_messages)`, `Evict(session)`. Governs what subset of a session's
//! durable log is handed to a strategy's turn loop, distinct from the
//! store's append-only persistence of the full log.

use std::sync::Arc;

use as_domain::tool::Message;
use as_domain::trace::TraceEvent;
use as_domain::Result;
use as_providers::traits::ChatRequest;
use as_providers::LlmProvider;

use crate::store::SessionStore;

#[async_trait::async_trait]
pub trait MemoryStrategy: Send + Sync {
    /// Messages to present to the turn loop as prior context.
    async fn load(&self, store: &dyn SessionStore, session_id: &str) -> Result<Vec<Message>>;
    /// Persist newly produced messages via the store.
    async fn save(&self, store: &dyn SessionStore, session_id: &str, new_messages: Vec<Message>) -> Result<()> {
        store.save_messages(session_id, new_messages).await
    }
    /// Apply eviction to the durable log, if the strategy evicts at all.
    async fn evict(&self, store: &dyn SessionStore, session_id: &str) -> Result<()>;
}

/// Retains only the last `window` messages as context. Does not shrink
/// the durable log — eviction here means "don't load more than the
/// window", not "delete the rest".
#[derive(Debug, Clone, Copy)]
pub struct SlidingWindowStrategy {
    pub window: usize,
}

impl Default for SlidingWindowStrategy {
    fn default() -> Self {
        Self { window: 40 }
    }
}

#[async_trait::async_trait]
impl MemoryStrategy for SlidingWindowStrategy {
    async fn load(&self, store: &dyn SessionStore, session_id: &str) -> Result<Vec<Message>> {
        let all = store.load_messages(session_id).await?;
        let start = all.len().saturating_sub(self.window);
        Ok(all[start..].to_vec())
    }

    async fn evict(&self, _store: &dyn SessionStore, _session_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Produces a summary of the oldest `summarize_batch` messages once the
/// log exceeds `threshold`, via an injected [`Summarizer`] so tests can
/// supply a deterministic stand-in instead of a live LLM call.
pub trait Summarizer: Send + Sync {
    fn summarize<'a>(
        &'a self,
        messages: &'a [Message],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String>> + Send + 'a>>;
}

/// Summarizes via a chat completion call to an [`LlmProvider`].
pub struct LlmSummarizer {
    pub llm: Arc<dyn LlmProvider>,
}

impl Summarizer for LlmSummarizer {
    fn summarize<'a>(
        &'a self,
        messages: &'a [Message],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let transcript = messages
                .iter()
                .filter_map(|m| m.content.text().map(|t| format!("{:?}: {t}", m.role)))
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = format!(
                "Summarize the following conversation excerpt into a few sentences that \
                 preserve any facts, decisions, or commitments a later turn would need:\n\n{transcript}"
            );
            let resp = self
                .llm
                .chat(&ChatRequest { messages: vec![Message::user(&prompt)], ..Default::default() })
                .await?;
            Ok(resp.content)
        })
    }
}

#[derive(Clone)]
pub struct SummaryStrategy {
    pub threshold: usize,
    pub summarize_batch: usize,
    pub summarizer: Arc<dyn Summarizer>,
}

#[async_trait::async_trait]
impl MemoryStrategy for SummaryStrategy {
    async fn load(&self, store: &dyn SessionStore, session_id: &str) -> Result<Vec<Message>> {
        store.load_messages(session_id).await
    }

    async fn evict(&self, store: &dyn SessionStore, session_id: &str) -> Result<()> {
        let all = store.load_messages(session_id).await?;
        if all.len() <= self.threshold {
            return Ok(());
        }
        let batch = self.summarize_batch.min(all.len());
        let (oldest, rest) = all.split_at(batch);
        let summary_text = self.summarizer.summarize(oldest).await?;

        let mut compacted = Vec::with_capacity(rest.len() + 1);
        compacted.push(Message::system(summary_text));
        compacted.extend_from_slice(rest);
        store.replace_messages(session_id, compacted).await?;

        TraceEvent::MemoryCompacted {
            session_id: session_id.to_string(),
            turns_before: all.len(),
            turns_after: rest.len() + 1,
        }
        .emit();
        Ok(())
    }
}
