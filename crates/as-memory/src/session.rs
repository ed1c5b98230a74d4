//! The `Session` type: an ongoing conversation
//! identified by a `sess_`-prefixed id, scoped to one agent, carrying
//! caller-supplied metadata and timestamps. The message log itself lives
//! in the owning [`crate::SessionStore`], not on this struct, so the
//! store can append to it without handing out a mutable reference to the
//! whole session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(agent_name: impl Into<String>, metadata: HashMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            id: as_domain::id::new_session_id(),
            agent_name: agent_name.into(),
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}
