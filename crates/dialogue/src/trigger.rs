//! Task triggering.
//!
//! Once a slot set satisfies its intent's completion predicate, the trigger
//! converts it into the task-execution contract, invokes the executor with a
//! bounded timeout, and settles the conversation state: clear the pending
//! task on success, or roll it back to a retryable execution-failed status
//! that preserves the already-known slots.

use crate::context::{ConversationContext, PendingStatus, PendingTask};
use chrono::{DateTime, Utc};
use coursebot_core::{
    CapabilityError, Intent, SlotKey, SlotSet, TaskEntities, TaskExecution, TaskOutcome,
    TaskRequest,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Result of a trigger attempt, for the response layer.
#[derive(Debug, Clone)]
pub enum TriggerResult {
    Executed { message: String },
    /// Execution failed; the pending task is preserved so the user can
    /// correct and resubmit without re-entering known slots.
    Failed { message: String, error: String },
}

/// Per-intent execution counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntentStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// One completed execution attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub intent: Intent,
    pub success: bool,
    pub elapsed_ms: u64,
    pub at: DateTime<Utc>,
}

/// Rolling operational statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub by_intent: BTreeMap<String, IntentStats>,
    pub history: VecDeque<ExecutionRecord>,
    #[serde(skip)]
    capacity: usize,
}

impl ExecutionStats {
    fn new(capacity: usize) -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            by_intent: BTreeMap::new(),
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, intent: Intent, success: bool, elapsed: Duration) {
        self.total += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        let entry = self.by_intent.entry(intent.as_str().to_string()).or_default();
        entry.total += 1;
        if success {
            entry.succeeded += 1;
        } else {
            entry.failed += 1;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(ExecutionRecord {
            id: Uuid::new_v4(),
            intent,
            success,
            elapsed_ms: elapsed.as_millis() as u64,
            at: Utc::now(),
        });
    }
}

/// Converts completed slot sets into task executions.
pub struct TaskTrigger {
    executor: Arc<dyn TaskExecution>,
    timeout: Duration,
    default_course_minutes: u32,
    stats: Mutex<ExecutionStats>,
}

impl TaskTrigger {
    pub fn new(
        executor: Arc<dyn TaskExecution>,
        timeout: Duration,
        default_course_minutes: u32,
        history_depth: usize,
    ) -> Self {
        Self {
            executor,
            timeout,
            default_course_minutes,
            stats: Mutex::new(ExecutionStats::new(history_depth.max(1))),
        }
    }

    /// A copy of the current operational statistics.
    pub fn stats(&self) -> ExecutionStats {
        self.stats.lock().clone()
    }

    /// Map a completed slot set onto the task-execution contract.
    pub fn build_request(&self, intent: Intent, slots: &SlotSet, user_id: &str) -> TaskRequest {
        let date = slots.date(SlotKey::CourseDate);
        let time = slots.time(SlotKey::ScheduleTime);
        let starts_at = match (date, time) {
            (Some(d), Some(t)) => Some(d.and_time(t)),
            _ => None,
        };
        let ends_at = starts_at
            .map(|s| s + chrono::Duration::minutes(self.default_course_minutes as i64));
        let entities = TaskEntities {
            student: slots.text(SlotKey::StudentName).map(str::to_string),
            course: slots.text(SlotKey::CourseName).map(str::to_string),
            starts_at,
            ends_at,
            time_of_day: if starts_at.is_none() {
                time.map(|t| t.format("%H:%M").to_string())
            } else {
                None
            },
            weekday: slots.weekday(SlotKey::DayOfWeek),
            recurrence: slots.recurrence(SlotKey::RecurrenceType),
            reminder_time: slots
                .time(SlotKey::ReminderTime)
                .map(|t| t.format("%H:%M").to_string()),
            content: slots.text(SlotKey::Content).map(str::to_string),
            scope: slots.text(SlotKey::Scope).map(str::to_string),
        };
        TaskRequest {
            intent,
            user_id: user_id.to_string(),
            entities,
        }
    }

    /// Execute a completed intent and settle the conversation state.
    pub async fn trigger(
        &self,
        ctx: &mut ConversationContext,
        intent: Intent,
        slots: SlotSet,
    ) -> TriggerResult {
        let request = self.build_request(intent, &slots, &ctx.user_id);
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.executor.execute(request))
            .await
        {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(CapabilityError::Timeout(self.timeout)),
        };
        let elapsed = started.elapsed();
        let now = Utc::now();

        match outcome {
            Ok(TaskOutcome {
                success: true,
                message,
                ..
            }) => {
                self.stats.lock().record(intent, true, elapsed);
                ctx.cancel_pending();
                ctx.record_action(intent, message.clone(), now);
                tracing::info!(
                    user_id = %ctx.user_id,
                    intent = %intent,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Task executed"
                );
                TriggerResult::Executed { message }
            }
            Ok(TaskOutcome {
                success: false,
                message,
                error,
            }) => {
                let cause = error.unwrap_or(message);
                self.settle_failure(ctx, intent, slots, cause.clone(), elapsed, now);
                TriggerResult::Failed {
                    message: retry_message(),
                    error: cause,
                }
            }
            Err(err) => {
                let cause = err.to_string();
                self.settle_failure(ctx, intent, slots, cause.clone(), elapsed, now);
                TriggerResult::Failed {
                    message: retry_message(),
                    error: cause,
                }
            }
        }
    }

    fn settle_failure(
        &self,
        ctx: &mut ConversationContext,
        intent: Intent,
        slots: SlotSet,
        cause: String,
        elapsed: Duration,
        now: DateTime<Utc>,
    ) {
        self.stats.lock().record(intent, false, elapsed);
        let retries = match &ctx.pending_task {
            Some(PendingTask {
                status: PendingStatus::ExecutionFailed { retries, .. },
                ..
            }) => retries + 1,
            _ => 1,
        };
        tracing::warn!(
            user_id = %ctx.user_id,
            intent = %intent,
            %cause,
            retries,
            "Task execution failed; keeping slots for retry"
        );
        ctx.pending_task = Some(PendingTask {
            intent,
            slots,
            missing_fields: Vec::new(),
            status: PendingStatus::ExecutionFailed {
                error: cause,
                retries,
            },
            created_at: now,
        });
        ctx.clear_expected_input();
        ctx.touch(now);
    }
}

fn retry_message() -> String {
    "抱歉，剛才的操作沒有成功，請稍後再試一次。".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};
    use coursebot_core::SlotValue;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ScriptedExecutor {
        fail: AtomicBool,
        slow: AtomicBool,
    }

    impl ScriptedExecutor {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(false),
                slow: AtomicBool::new(false),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(true),
                slow: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl TaskExecution for ScriptedExecutor {
        async fn execute(&self, request: TaskRequest) -> Result<TaskOutcome, CapabilityError> {
            if self.slow.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Ok(TaskOutcome {
                    success: false,
                    message: "寫入失敗".to_string(),
                    error: Some("storage unavailable".to_string()),
                });
            }
            Ok(TaskOutcome {
                success: true,
                message: format!("已為您安排 {}", request.intent),
                error: None,
            })
        }
    }

    fn complete_slots() -> SlotSet {
        let mut slots = SlotSet::new();
        slots.insert_text(SlotKey::StudentName, "小明");
        slots.insert_text(SlotKey::CourseName, "數學課");
        slots.insert(
            SlotKey::CourseDate,
            SlotValue::Date(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()),
        );
        slots.insert(
            SlotKey::ScheduleTime,
            SlotValue::Time(NaiveTime::from_hms_opt(15, 30, 0).unwrap()),
        );
        slots
    }

    #[test]
    fn test_request_composition() {
        let trigger = TaskTrigger::new(ScriptedExecutor::ok(), Duration::from_secs(10), 60, 8);
        let request = trigger.build_request(Intent::AddCourse, &complete_slots(), "u1");

        let starts = request.entities.starts_at.unwrap();
        let ends = request.entities.ends_at.unwrap();
        assert_eq!(starts.format("%Y-%m-%d %H:%M").to_string(), "2025-03-14 15:30");
        assert_eq!(ends - starts, chrono::Duration::minutes(60));
        assert_eq!(request.entities.student.as_deref(), Some("小明"));
        assert!(request.entities.time_of_day.is_none());
    }

    #[test]
    fn test_time_without_date_stays_clock_time() {
        let trigger = TaskTrigger::new(ScriptedExecutor::ok(), Duration::from_secs(10), 60, 8);
        let mut slots = SlotSet::new();
        slots.insert(
            SlotKey::ScheduleTime,
            SlotValue::Time(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
        );
        let request = trigger.build_request(Intent::ModifyCourse, &slots, "u1");
        assert!(request.entities.starts_at.is_none());
        assert_eq!(request.entities.time_of_day.as_deref(), Some("09:00"));
    }

    #[tokio::test]
    async fn test_success_clears_pending_and_records_action() {
        let trigger = TaskTrigger::new(ScriptedExecutor::ok(), Duration::from_secs(10), 60, 8);
        let mut ctx = ConversationContext::new("u1");
        ctx.set_pending(Intent::AddCourse, complete_slots(), Utc::now());

        let result = trigger
            .trigger(&mut ctx, Intent::AddCourse, complete_slots())
            .await;

        assert!(matches!(result, TriggerResult::Executed { .. }));
        assert!(ctx.pending_task.is_none());
        assert!(ctx.expecting_input.is_empty());
        assert!(ctx.last_action(Intent::AddCourse).is_some());

        let stats = trigger.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.by_intent["add_course"].succeeded, 1);
        assert_eq!(stats.history.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_to_retryable() {
        let trigger =
            TaskTrigger::new(ScriptedExecutor::failing(), Duration::from_secs(10), 60, 8);
        let mut ctx = ConversationContext::new("u1");

        let result = trigger
            .trigger(&mut ctx, Intent::AddCourse, complete_slots())
            .await;

        let TriggerResult::Failed { message, error } = result else {
            panic!("expected failure");
        };
        assert!(message.contains("再試"));
        assert_eq!(error, "storage unavailable");

        let pending = ctx.pending_task.as_ref().unwrap();
        assert_eq!(pending.slots.text(SlotKey::StudentName), Some("小明"));
        assert!(matches!(
            pending.status,
            PendingStatus::ExecutionFailed { retries: 1, .. }
        ));

        // A second failed attempt increments the retry counter.
        let _ = trigger
            .trigger(&mut ctx, Intent::AddCourse, complete_slots())
            .await;
        assert!(matches!(
            ctx.pending_task.as_ref().unwrap().status,
            PendingStatus::ExecutionFailed { retries: 2, .. }
        ));

        let stats = trigger.stats();
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let executor = ScriptedExecutor::ok();
        executor.slow.store(true, Ordering::SeqCst);
        let trigger = TaskTrigger::new(executor, Duration::from_millis(50), 60, 8);
        let mut ctx = ConversationContext::new("u1");

        let result = trigger
            .trigger(&mut ctx, Intent::AddCourse, complete_slots())
            .await;
        assert!(matches!(result, TriggerResult::Failed { .. }));
        assert!(ctx.pending_task.is_some());
    }

    #[tokio::test]
    async fn test_history_ring_is_bounded() {
        let trigger = TaskTrigger::new(ScriptedExecutor::ok(), Duration::from_secs(10), 60, 3);
        let mut ctx = ConversationContext::new("u1");
        for _ in 0..5 {
            let _ = trigger
                .trigger(&mut ctx, Intent::AddCourse, complete_slots())
                .await;
        }
        let stats = trigger.stats();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.history.len(), 3);
    }
}
