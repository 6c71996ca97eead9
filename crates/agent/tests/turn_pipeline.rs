//! Integration tests for the turn pipeline (classify -> extract -> decide).
//!
//! These drive whole conversations through the engine with a scripted task
//! executor and verify the multi-turn protocol end to end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use coursebot_agent::{EngineBuilder, TurnOutcome};
use coursebot_config::NluConfig;
use coursebot_core::{
    CapabilityError, Intent, SlotKey, TaskExecution, TaskOutcome, TaskRequest,
};
use coursebot_dialogue::PendingStatus;
use parking_lot::Mutex;

/// Records every request; failure can be toggled per test.
struct ScriptedExecutor {
    requests: Mutex<Vec<TaskRequest>>,
    fail: AtomicBool,
}

impl ScriptedExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    fn request(&self, index: usize) -> TaskRequest {
        self.requests.lock()[index].clone()
    }

    fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl TaskExecution for ScriptedExecutor {
    async fn execute(&self, request: TaskRequest) -> Result<TaskOutcome, CapabilityError> {
        self.requests.lock().push(request);
        if self.fail.load(Ordering::SeqCst) {
            return Ok(TaskOutcome {
                success: false,
                message: "寫入失敗".to_string(),
                error: Some("storage unavailable".to_string()),
            });
        }
        Ok(TaskOutcome {
            success: true,
            message: "完成".to_string(),
            error: None,
        })
    }
}

fn engine(executor: Arc<ScriptedExecutor>) -> coursebot_agent::DialogueEngine {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("coursebot=debug")
        .try_init();
    EngineBuilder::new(NluConfig::standard(), executor)
        // 2025-03-14 is a Friday.
        .today(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
        .build()
}

#[tokio::test]
async fn test_single_shot_add_course() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor.clone());

    let outcome = engine
        .handle_turn("u1", "幫小明排明天下午三點的數學課")
        .await;
    assert!(matches!(outcome, TurnOutcome::Executed { .. }));

    let request = executor.request(0);
    assert_eq!(request.intent, Intent::AddCourse);
    assert_eq!(request.entities.student.as_deref(), Some("小明"));
    assert_eq!(request.entities.course.as_deref(), Some("數學課"));
    let starts = request.entities.starts_at.unwrap();
    assert_eq!(
        starts.format("%Y-%m-%d %H:%M").to_string(),
        "2025-03-15 15:00"
    );
}

/// A pending add_course missing only the student name completes when the
/// next turn supplies it — and comes back as add_course, not a supplement.
#[tokio::test]
async fn test_multi_turn_supplement_completes() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor.clone());

    let outcome = engine
        .handle_turn("u1", "新增明天下午三點的數學課")
        .await;
    let TurnOutcome::AskSlot { intent, slot, .. } = outcome else {
        panic!("expected a slot prompt");
    };
    assert_eq!(intent, Intent::AddCourse);
    assert_eq!(slot, SlotKey::StudentName);
    assert_eq!(executor.count(), 0);

    let outcome = engine.handle_turn("u1", "小明").await;
    assert!(matches!(outcome, TurnOutcome::Executed { .. }));

    let request = executor.request(0);
    assert_eq!(request.intent, Intent::AddCourse);
    assert_eq!(request.entities.student.as_deref(), Some("小明"));
    assert_eq!(request.entities.course.as_deref(), Some("數學課"));
}

/// An intent-switch keyword during a supplement clears the pending task and
/// classifies normally.
#[tokio::test]
async fn test_intent_switch_during_pending() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor.clone());

    engine.handle_turn("u1", "新增數學課").await;
    {
        let ctx = engine.state().acquire("u1").await;
        assert_eq!(ctx.pending_task.as_ref().unwrap().intent, Intent::AddCourse);
    }

    let outcome = engine.handle_turn("u1", "查詢").await;
    let TurnOutcome::AskSlot { intent, .. } = outcome else {
        panic!("expected a slot prompt for the new query");
    };
    assert_eq!(intent, Intent::QuerySchedule);

    let ctx = engine.state().acquire("u1").await;
    assert_eq!(
        ctx.pending_task.as_ref().unwrap().intent,
        Intent::QuerySchedule
    );
}

/// No recognizable keyword and no AI fallback: unknown, nothing executed.
#[tokio::test]
async fn test_unknown_falls_back() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor.clone());

    let outcome = engine.handle_turn("u1", "嗚啦啦啦").await;
    assert!(matches!(outcome, TurnOutcome::Fallback { .. }));
    assert_eq!(executor.count(), 0);

    let ctx = engine.state().acquire("u1").await;
    assert!(ctx.pending_task.is_none());
}

/// A pending task older than its timeout is never matched as a supplement
/// target, whatever the utterance says.
#[tokio::test]
async fn test_expired_pending_is_not_a_supplement_target() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor.clone());

    engine
        .handle_turn("u1", "新增明天下午三點的數學課")
        .await;
    {
        let mut ctx = engine.state().acquire("u1").await;
        let pending = ctx.pending_task.as_mut().unwrap();
        pending.created_at = Utc::now() - chrono::Duration::seconds(600);
    }

    let outcome = engine.handle_turn("u1", "小明").await;
    assert!(matches!(outcome, TurnOutcome::Fallback { .. }));
    assert_eq!(executor.count(), 0);

    let ctx = engine.state().acquire("u1").await;
    assert!(ctx.pending_task.is_none());
}

/// Execution failure rolls back to a retryable pending state; a
/// confirmation retries with the preserved slots.
#[tokio::test]
async fn test_execution_failure_and_retry() {
    let executor = ScriptedExecutor::new();
    executor.fail.store(true, Ordering::SeqCst);
    let engine = engine(executor.clone());

    let outcome = engine
        .handle_turn("u1", "幫小明排明天下午三點的數學課")
        .await;
    assert!(matches!(outcome, TurnOutcome::RetryPrompt { .. }));
    {
        let ctx = engine.state().acquire("u1").await;
        let pending = ctx.pending_task.as_ref().unwrap();
        assert!(matches!(
            pending.status,
            PendingStatus::ExecutionFailed { retries: 1, .. }
        ));
        assert_eq!(pending.slots.text(SlotKey::StudentName), Some("小明"));
    }

    executor.fail.store(false, Ordering::SeqCst);
    let outcome = engine.handle_turn("u1", "確認").await;
    assert!(matches!(outcome, TurnOutcome::Executed { .. }));

    let ctx = engine.state().acquire("u1").await;
    assert!(ctx.pending_task.is_none());

    let stats = engine.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
}

/// A same-session cancel inherits the student pinned by the last query.
#[tokio::test]
async fn test_cancel_inherits_query_session_student() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor.clone());

    let outcome = engine.handle_turn("u1", "查詢小明今天的課").await;
    assert!(matches!(outcome, TurnOutcome::Executed { .. }));

    let outcome = engine.handle_turn("u1", "取消數學課").await;
    assert!(matches!(outcome, TurnOutcome::Executed { .. }));

    let request = executor.request(1);
    assert_eq!(request.intent, Intent::CancelCourse);
    assert_eq!(request.entities.student.as_deref(), Some("小明"));
    assert_eq!(request.entities.course.as_deref(), Some("數學課"));
}

/// Two plausible students force a clarification instead of a guess.
#[tokio::test]
async fn test_ambiguous_students_clarify() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor.clone());

    let outcome = engine.handle_turn("u1", "查詢小明和小華今天的課").await;
    let TurnOutcome::Clarify { candidates, .. } = outcome else {
        panic!("expected clarification");
    };
    assert_eq!(candidates, vec!["小明".to_string(), "小華".to_string()]);
    assert_eq!(executor.count(), 0);
}

#[tokio::test]
async fn test_set_reminder_flow() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor.clone());

    let outcome = engine
        .handle_turn("u1", "明天下午五點提醒我帶聯絡簿")
        .await;
    assert!(matches!(outcome, TurnOutcome::Executed { .. }));

    let request = executor.request(0);
    assert_eq!(request.intent, Intent::SetReminder);
    assert_eq!(request.entities.reminder_time.as_deref(), Some("17:00"));
    assert_eq!(request.entities.content.as_deref(), Some("帶聯絡簿"));
}

#[tokio::test]
async fn test_record_content_flow() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor.clone());

    let outcome = engine
        .handle_turn("u1", "記錄小明的數學課今天教了分數")
        .await;
    assert!(matches!(outcome, TurnOutcome::Executed { .. }));

    let request = executor.request(0);
    assert_eq!(request.intent, Intent::RecordContent);
    assert_eq!(request.entities.student.as_deref(), Some("小明"));
    assert_eq!(request.entities.course.as_deref(), Some("數學課"));
    assert_eq!(request.entities.content.as_deref(), Some("分數"));
}

/// Turns for different users are independent; a pending task for one user
/// never leaks into another's turn.
#[tokio::test]
async fn test_users_are_isolated() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor.clone());

    engine.handle_turn("u1", "新增明天下午三點的數學課").await;
    let outcome = engine.handle_turn("u2", "小明").await;
    assert!(matches!(outcome, TurnOutcome::Fallback { .. }));
    assert_eq!(executor.count(), 0);

    // u1's pending task is still waiting for its supplement.
    let outcome = engine.handle_turn("u1", "小明").await;
    assert!(matches!(outcome, TurnOutcome::Executed { .. }));
}
