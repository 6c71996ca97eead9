//! Per-user conversation context.
//!
//! The context is an explicit state object with defined transitions: idle →
//! awaiting-input → fulfilled / expired / cancelled / execution-failed. All
//! mutation goes through the methods here so the supplement-merge protocol is
//! unit-testable without a live store.

use crate::completion;
use chrono::{DateTime, Utc};
use coursebot_core::{Intent, SlotInputType, SlotKey, SlotSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

const HISTORY_CAPACITY: usize = 32;

/// A completed action, kept for context gating and same-session inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub intent: Intent,
    pub summary: String,
    pub at: DateTime<Utc>,
}

/// Lifecycle status of a pending task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PendingStatus {
    /// Waiting for the user to supply missing slots.
    AwaitingInput,
    /// Execution was attempted and failed; slots are preserved for retry.
    ExecutionFailed { error: String, retries: u32 },
}

/// An intent whose slot set is not yet complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTask {
    pub intent: Intent,
    pub slots: SlotSet,
    pub missing_fields: Vec<SlotKey>,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
}

impl PendingTask {
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at > ttl
    }
}

/// Short-lived pin tying follow-up turns to the last query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySession {
    pub student_name: Option<String>,
    pub time_reference: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Entities the user has mentioned this session, most recent first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentionedEntities {
    pub students: Vec<String>,
    pub courses: Vec<String>,
    pub times: Vec<String>,
    pub dates: Vec<String>,
}

impl MentionedEntities {
    fn note(list: &mut Vec<String>, value: &str) {
        list.retain(|v| v != value);
        list.insert(0, value.to_string());
        list.truncate(8);
    }
}

/// Where a recorded state change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Utterance,
    Supplement,
    System,
}

/// One recorded slot transition, for debugging and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub at: DateTime<Utc>,
    pub slot: SlotKey,
    pub old: Option<String>,
    pub new: Option<String>,
    pub source: ChangeSource,
}

/// Everything the pipeline knows about one user's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_id: String,
    /// Last completed action per intent tag.
    pub last_actions: BTreeMap<String, ActionRecord>,
    pub pending_task: Option<PendingTask>,
    /// Which slot inputs the next turn is expected to supply.
    pub expecting_input: Vec<SlotInputType>,
    pub mentioned: MentionedEntities,
    pub query_session: Option<QuerySession>,
    pub updated_at: DateTime<Utc>,
    /// Recent slot transitions; not persisted.
    #[serde(skip)]
    pub history: VecDeque<StateChange>,
}

impl ConversationContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            last_actions: BTreeMap::new(),
            pending_task: None,
            expecting_input: Vec::new(),
            mentioned: MentionedEntities::default(),
            query_session: None,
            updated_at: Utc::now(),
            history: VecDeque::new(),
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Whole-context idle expiry.
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.updated_at > ttl
    }

    /// The pending task, if present and within its TTL. An expired pending
    /// task is invisible here; callers that observe expiry should follow up
    /// with [`ConversationContext::cancel_pending`].
    pub fn active_pending(
        &self,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Option<&PendingTask> {
        self.pending_task
            .as_ref()
            .filter(|p| !p.is_expired(ttl, now))
    }

    /// Begin awaiting input for an incomplete intent. Sets the pending task
    /// and the expecting-input queue together.
    pub fn set_pending(
        &mut self,
        intent: Intent,
        slots: SlotSet,
        now: DateTime<Utc>,
    ) -> &PendingTask {
        let missing = completion::missing_fields(intent, &slots);
        self.expecting_input = missing
            .iter()
            .filter_map(|k| completion::slot_input_for(*k))
            .collect();
        self.record_changes(&slots, ChangeSource::Utterance, now);
        self.pending_task = Some(PendingTask {
            intent,
            slots,
            missing_fields: missing,
            status: PendingStatus::AwaitingInput,
            created_at: now,
        });
        self.touch(now);
        self.pending_task.as_ref().unwrap()
    }

    /// Merge supplement slots into the pending task, newest value winning,
    /// and recompute the missing fields. Returns true when the merged set now
    /// satisfies the pending intent's completion predicate.
    pub fn merge_supplement(&mut self, incoming: &SlotSet, now: DateTime<Utc>) -> bool {
        if self.pending_task.is_none() {
            return false;
        }
        self.record_changes(incoming, ChangeSource::Supplement, now);
        let pending = self.pending_task.as_mut().unwrap();
        pending.slots.merge_overriding(incoming);
        pending.missing_fields = completion::missing_fields(pending.intent, &pending.slots);
        let complete = completion::is_complete(pending.intent, &pending.slots);
        self.expecting_input = pending
            .missing_fields
            .iter()
            .filter_map(|k| completion::slot_input_for(*k))
            .collect();
        self.touch(now);
        complete
    }

    /// Cancel the pending task. Clears `pending_task` and `expecting_input`
    /// together; the two must never diverge.
    pub fn cancel_pending(&mut self) {
        self.pending_task = None;
        self.expecting_input.clear();
    }

    /// Clear only the expecting-input queue (the pending task survives, e.g.
    /// while an execution retry is possible).
    pub fn clear_expected_input(&mut self) {
        self.expecting_input.clear();
    }

    pub fn record_action(&mut self, intent: Intent, summary: impl Into<String>, now: DateTime<Utc>) {
        self.last_actions.insert(
            intent.as_str().to_string(),
            ActionRecord {
                intent,
                summary: summary.into(),
                at: now,
            },
        );
        self.touch(now);
    }

    pub fn last_action(&self, intent: Intent) -> Option<&ActionRecord> {
        self.last_actions.get(intent.as_str())
    }

    /// Whether any action completed within the window.
    pub fn has_recent_action(&self, within: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.last_actions.values().any(|a| now - a.at <= within)
    }

    pub fn active_query_session(&self, now: DateTime<Utc>) -> Option<&QuerySession> {
        self.query_session.as_ref().filter(|s| s.expires_at > now)
    }

    pub fn pin_query_session(
        &mut self,
        student_name: Option<String>,
        time_reference: Option<String>,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) {
        self.query_session = Some(QuerySession {
            student_name,
            time_reference,
            expires_at: now + ttl,
        });
    }

    /// Record the entities of an extracted slot set for later reference.
    pub fn note_mentions(&mut self, slots: &SlotSet) {
        if let Some(name) = slots.text(SlotKey::StudentName) {
            MentionedEntities::note(&mut self.mentioned.students, name);
        }
        if let Some(course) = slots.text(SlotKey::CourseName) {
            MentionedEntities::note(&mut self.mentioned.courses, course);
        }
        if let Some(time) = slots.get(SlotKey::ScheduleTime) {
            MentionedEntities::note(&mut self.mentioned.times, &time.render());
        }
        if let Some(date) = slots.get(SlotKey::CourseDate) {
            MentionedEntities::note(&mut self.mentioned.dates, &date.render());
        }
    }

    fn record_changes(&mut self, slots: &SlotSet, source: ChangeSource, now: DateTime<Utc>) {
        for (key, value) in slots.iter() {
            let old = self
                .pending_task
                .as_ref()
                .and_then(|p| p.slots.get(key))
                .map(|v| v.render());
            self.history.push_back(StateChange {
                at: now,
                slot: key,
                old,
                new: Some(value.render()),
                source,
            });
        }
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }
}
