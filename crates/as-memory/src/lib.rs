//! Conversation memory and session storage.
//!
//! A [`Session`] owns an append-only message log. [`SessionStore`] is the
//! storage contract (create/get/delete/list, append-only
//! `save_messages`/`load_messages`); [`InMemoryStore`] and [`RedisStore`]
//! are the two specified backends. [`MemoryStrategy`] governs what subset
//! of the log is actually handed to a strategy's turn loop as context
//! (sliding window or running summary).

pub mod memory_strategy;
pub mod redis_store;
pub mod session;
pub mod store;

pub use memory_strategy::{MemoryStrategy, SlidingWindowStrategy, Summarizer, SummaryStrategy};
pub use redis_store::RedisStore;
pub use session::Session;
pub use store::{InMemoryStore, SessionStore};
