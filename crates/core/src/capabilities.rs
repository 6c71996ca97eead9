//! Capability traits for the external collaborators.
//!
//! The NLU core treats the AI classifier, AI slot extractor, task executor
//! and conversation persistence as black-box capabilities behind these
//! traits. Every call site wraps them in a bounded timeout and carries a
//! deterministic fallback path, so a capability failure degrades the turn
//! instead of failing it.

use crate::error::CapabilityError;
use crate::intent::Intent;
use crate::slots::{RecurrenceKind, SlotSet};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output of the AI classification capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentPrediction {
    /// Intent tag; parsed through [`Intent::parse`], so unknown tags are safe.
    pub intent: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
}

/// AI intent classification: text in, `{intent, confidence}` out.
#[async_trait]
pub trait IntentModel: Send + Sync {
    async fn classify(&self, text: &str) -> Result<IntentPrediction, CapabilityError>;
}

/// AI slot extraction: fills fields rule extraction missed. The caller merges
/// the result only into currently-empty fields; rule output always wins.
#[async_trait]
pub trait SlotModel: Send + Sync {
    async fn extract_slots(
        &self,
        text: &str,
        intent: Intent,
        existing: &SlotSet,
    ) -> Result<SlotSet, CapabilityError>;
}

/// The renamed, composed form of a completed slot set, as the task execution
/// layer expects it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskEntities {
    pub student: Option<String>,
    pub course: Option<String>,
    /// Start of the scheduled block, composed from course date + time.
    pub starts_at: Option<NaiveDateTime>,
    /// End of the scheduled block (start + default course duration).
    pub ends_at: Option<NaiveDateTime>,
    /// Clock time in `HH:MM` when no date is known to anchor a timestamp.
    pub time_of_day: Option<String>,
    /// ISO weekday 1-7 when the request is weekday-anchored.
    pub weekday: Option<u8>,
    pub recurrence: Option<RecurrenceKind>,
    /// Reminder time in `HH:MM`.
    pub reminder_time: Option<String>,
    pub content: Option<String>,
    /// Query scope, e.g. "today" / "week".
    pub scope: Option<String>,
}

/// A task execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub intent: Intent,
    pub user_id: String,
    pub entities: TaskEntities,
}

/// Outcome reported by the task execution capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    /// User-facing message produced by the executor.
    pub message: String,
    /// Machine-readable error cause on failure.
    pub error: Option<String>,
}

/// Task execution: domain lookups, persistence and calendar side effects all
/// live behind this boundary. The core only decides *when* to call it.
#[async_trait]
pub trait TaskExecution: Send + Sync {
    async fn execute(&self, request: TaskRequest) -> Result<TaskOutcome, CapabilityError>;
}

/// Conversation persistence: key-value by user id with TTL support. The core
/// does not dictate the backing store.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<String>, CapabilityError>;
    async fn set(
        &self,
        user_id: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CapabilityError>;
    async fn delete(&self, user_id: &str) -> Result<(), CapabilityError>;
}
