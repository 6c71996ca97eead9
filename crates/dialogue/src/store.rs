//! The per-user conversation state store.
//!
//! Contexts live in a concurrent map, one async mutex per user: two
//! near-simultaneous messages from the same user must not interleave their
//! read and write of the pending task, so a turn holds the user's guard for
//! its whole duration. Different users never contend.
//!
//! An optional [`ContextStore`] capability makes the map a write-through
//! cache over external persistence. A malformed persisted value is treated as
//! context-absent, never as an error.

use crate::context::ConversationContext;
use chrono::Utc;
use coursebot_config::TtlSettings;
use coursebot_core::ContextStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Owner of all conversation contexts.
pub struct ConversationState {
    entries: DashMap<String, Arc<Mutex<ConversationContext>>>,
    store: Option<Arc<dyn ContextStore>>,
    ttl: TtlSettings,
}

impl ConversationState {
    pub fn new(ttl: TtlSettings) -> Self {
        Self {
            entries: DashMap::new(),
            store: None,
            ttl,
        }
    }

    /// Attach an external persistence backend.
    pub fn with_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn ttl(&self) -> &TtlSettings {
        &self.ttl
    }

    /// Acquire this user's context, serializing against concurrent turns for
    /// the same user. Expired context or pending state is cleared before the
    /// guard is returned, so callers only ever observe live state.
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<ConversationContext> {
        let cell: Arc<Mutex<ConversationContext>> = match self.entries.get(user_id) {
            Some(cell) => Arc::clone(&cell),
            None => {
                let loaded = self.load(user_id).await;
                let ctx = loaded.unwrap_or_else(|| ConversationContext::new(user_id));
                let entry = self
                    .entries
                    .entry(user_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(ctx)));
                Arc::clone(&entry)
            }
        };

        let mut guard = cell.lock_owned().await;
        let now = Utc::now();
        if guard.is_expired(self.ttl.context(), now) {
            tracing::debug!(user_id, "Conversation context expired; reinitializing");
            *guard = ConversationContext::new(user_id);
        } else if let Some(pending) = &guard.pending_task {
            if pending.is_expired(self.ttl.pending_input(), now) {
                tracing::debug!(
                    user_id,
                    intent = %pending.intent,
                    "Pending task expired; clearing"
                );
                guard.cancel_pending();
            }
        }
        guard
    }

    /// Write the context through to the external store, best effort. A
    /// persistence failure is logged and never fails the turn.
    pub async fn persist(&self, ctx: &ConversationContext) {
        let Some(store) = &self.store else {
            return;
        };
        match serde_json::to_string(ctx) {
            Ok(json) => {
                let ttl = Duration::from_secs(self.ttl.context_secs);
                if let Err(err) = store.set(&ctx.user_id, json, ttl).await {
                    tracing::warn!(user_id = %ctx.user_id, %err, "Failed to persist context");
                }
            }
            Err(err) => {
                tracing::warn!(user_id = %ctx.user_id, %err, "Failed to encode context");
            }
        }
    }

    /// Drop a user's context from cache and backing store.
    pub async fn clear(&self, user_id: &str) {
        self.entries.remove(user_id);
        if let Some(store) = &self.store {
            if let Err(err) = store.delete(user_id).await {
                tracing::warn!(user_id, %err, "Failed to delete persisted context");
            }
        }
    }

    async fn load(&self, user_id: &str) -> Option<ConversationContext> {
        let store = self.store.as_ref()?;
        match store.get(user_id).await {
            Ok(Some(json)) => match serde_json::from_str::<ConversationContext>(&json) {
                Ok(ctx) => Some(ctx),
                Err(err) => {
                    // Corrupt state reads as absent; the turn starts fresh.
                    tracing::warn!(user_id, %err, "Discarding malformed persisted context");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(user_id, %err, "Context store read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coursebot_core::{CapabilityError, Intent, SlotKey, SlotSet};
    use parking_lot::Mutex as SyncMutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        data: SyncMutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl ContextStore for MemoryStore {
        async fn get(&self, user_id: &str) -> Result<Option<String>, CapabilityError> {
            Ok(self.data.lock().get(user_id).cloned())
        }

        async fn set(
            &self,
            user_id: &str,
            value: String,
            _ttl: Duration,
        ) -> Result<(), CapabilityError> {
            self.data.lock().insert(user_id.to_string(), value);
            Ok(())
        }

        async fn delete(&self, user_id: &str) -> Result<(), CapabilityError> {
            self.data.lock().remove(user_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_acquire_creates_lazily() {
        let state = ConversationState::new(TtlSettings::default());
        let guard = state.acquire("u1").await;
        assert_eq!(guard.user_id, "u1");
        assert!(guard.pending_task.is_none());
    }

    #[tokio::test]
    async fn test_round_trip_through_store() {
        let store = Arc::new(MemoryStore::default());
        let state = ConversationState::new(TtlSettings::default()).with_store(store.clone());

        {
            let mut guard = state.acquire("u1").await;
            let mut slots = SlotSet::new();
            slots.insert_text(SlotKey::CourseName, "數學課");
            guard.set_pending(Intent::AddCourse, slots, Utc::now());
            state.persist(&guard).await;
        }

        // A fresh state instance reloads from the store.
        let state2 = ConversationState::new(TtlSettings::default()).with_store(store);
        let guard = state2.acquire("u1").await;
        let pending = guard.pending_task.as_ref().expect("pending restored");
        assert_eq!(pending.intent, Intent::AddCourse);
        assert_eq!(pending.slots.text(SlotKey::CourseName), Some("數學課"));
    }

    #[tokio::test]
    async fn test_malformed_store_value_reads_as_absent() {
        let store = Arc::new(MemoryStore::default());
        store
            .data
            .lock()
            .insert("u1".to_string(), "{not json".to_string());

        let state = ConversationState::new(TtlSettings::default()).with_store(store);
        let guard = state.acquire("u1").await;
        assert!(guard.pending_task.is_none());
        assert!(guard.last_actions.is_empty());
    }

    #[tokio::test]
    async fn test_same_user_turns_serialize() {
        let state = Arc::new(ConversationState::new(TtlSettings::default()));

        let guard = state.acquire("u1").await;
        let state2 = state.clone();
        let contender = tokio::spawn(async move {
            let _guard = state2.acquire("u1").await;
        });

        // The second acquire must block while the first guard is held.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }
}
