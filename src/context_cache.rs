//! Page context cache
//!
//! Maps a page id to the explanation text shown on that page so the widget
//! can send `page_id` instead of the full context on every question. Entries
//! expire after a fixed TTL; expired entries are never returned and a
//! background sweeper evicts them.

use crate::error::{AppError, AppResult};
use crate::ledger::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Cached context with expiry metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    pub context: String,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ContextEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Key-value store for page context
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Store context for a page, replacing any previous entry
    async fn put(&self, page_id: &str, context: &str) -> AppResult<ContextEntry>;

    /// Fetch live context for a page
    async fn get(&self, page_id: &str) -> Option<ContextEntry>;

    /// Remove expired entries, returning how many were removed
    async fn purge_expired(&self) -> usize;
}

/// In-memory [`ContextStore`] with a fixed TTL
pub struct MemoryContextStore {
    entries: RwLock<HashMap<String, ContextEntry>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryContextStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn put(&self, page_id: &str, context: &str) -> AppResult<ContextEntry> {
        let page_id = page_id.trim();
        if page_id.is_empty() {
            return Err(AppError::Validation("page_id cannot be empty".to_string()));
        }
        if context.trim().is_empty() {
            return Err(AppError::Validation("context cannot be empty".to_string()));
        }

        let stored_at = self.clock.now();
        let entry = ContextEntry {
            context: context.to_string(),
            stored_at,
            expires_at: stored_at
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        self.entries
            .write()
            .await
            .insert(page_id.to_string(), entry.clone());

        tracing::debug!(page_id = %page_id, context_len = context.len(), "Context cached");
        Ok(entry)
    }

    async fn get(&self, page_id: &str) -> Option<ContextEntry> {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .get(page_id.trim())
            .filter(|entry| !entry.is_expired(now))
            .cloned()
    }

    async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

/// Spawn the periodic eviction task
///
/// The task holds only a weak reference and exits once the store is dropped.
pub fn spawn_sweeper<S>(store: &Arc<S>, every: Duration) -> JoinHandle<()>
where
    S: ContextStore + 'static,
{
    let weak: Weak<S> = Arc::downgrade(store);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(store) = weak.upgrade() else {
                tracing::debug!("Context store dropped, stopping sweeper");
                return;
            };

            let removed = store.purge_expired().await;
            if removed > 0 {
                tracing::info!(removed, "Evicted expired page contexts");
            }
        }
    })
}
