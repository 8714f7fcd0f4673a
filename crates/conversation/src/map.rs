//! The in-memory conversation table.
//!
//! Entries are `Arc<tokio::sync::Mutex<..>>` so turns of one conversation
//! serialize on the entry lock while the table lock stays short-held. LRU
//! capacity bounds memory; the idle sweep is the caller's eviction policy.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use lru::LruCache;
use tracing::debug;
use uuid::Uuid;

use crate::state::ConversationState;

pub type SharedConversation = Arc<tokio::sync::Mutex<ConversationState>>;

pub struct ConversationMap {
    inner: Mutex<LruCache<String, SharedConversation>>,
}

impl ConversationMap {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fetch an existing conversation or create one. A missing or unknown id
    /// starts a fresh conversation; when no id is supplied a new one is
    /// minted. The persona id is fixed at creation and later values are
    /// ignored, keeping persona identity stable for the conversation's life.
    pub fn get_or_create(
        &self,
        id: Option<&str>,
        persona_id: Option<&str>,
    ) -> (String, SharedConversation) {
        let id = id
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut table = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = table.get(&id) {
            return (id, Arc::clone(existing));
        }

        debug!(conversation = %id, persona = ?persona_id, "new conversation");
        let state = ConversationState::new(id.clone(), persona_id.map(|p| p.to_string()));
        let shared: SharedConversation = Arc::new(tokio::sync::Mutex::new(state));
        table.put(id.clone(), Arc::clone(&shared));
        (id, shared)
    }

    /// Peek at an existing conversation without creating one.
    pub fn get(&self, id: &str) -> Option<SharedConversation> {
        let mut table = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        table.get(id).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(table) => table.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop conversations idle for longer than `idle`. Returns the number
    /// evicted. Entries currently locked by an in-flight turn keep their
    /// `Arc` alive until that turn completes; they are still removed from
    /// the table.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let cutoff = Utc::now() - idle;
        let mut table = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let stale: Vec<String> = table
            .iter()
            .filter_map(|(id, shared)| {
                let last_updated = shared.try_lock().ok().map(|state| state.last_updated)?;
                (last_updated < cutoff).then(|| id.clone())
            })
            .collect();

        for id in &stale {
            table.pop(id);
        }
        if !stale.is_empty() {
            debug!(evicted = stale.len(), "idle conversations evicted");
        }
        stale.len()
    }
}
