//! The dialogue engine: one utterance in, one decision out.

use chrono::Utc;
use coursebot_config::NluConfig;
use coursebot_core::{
    ContextStore, Intent, IntentModel, SlotKey, SlotModel, TaskExecution,
};
use coursebot_dialogue::{
    completion, ConversationState, PendingStatus, TaskTrigger, TriggerResult,
};
use coursebot_nlu::{IntentClassifier, ReviewRecord, SlotExtractor};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The engine's decision for one turn.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The task executed; relay the executor's message.
    Executed { message: String },
    /// A slot is missing; ask the user for it.
    AskSlot {
        intent: Intent,
        slot: SlotKey,
        prompt: String,
    },
    /// Several plausible students; ask the user to pick one.
    Clarify {
        candidates: Vec<String>,
        prompt: String,
    },
    /// A confirmation turn that needed no execution.
    Acknowledged { message: String },
    /// Execution failed; the task is retryable.
    RetryPrompt { message: String },
    /// Nothing understood.
    Fallback { message: String },
}

/// Builder wiring the engine's capabilities together.
pub struct EngineBuilder {
    config: Arc<NluConfig>,
    executor: Arc<dyn TaskExecution>,
    intent_model: Option<Arc<dyn IntentModel>>,
    slot_model: Option<Arc<dyn SlotModel>>,
    context_store: Option<Arc<dyn ContextStore>>,
    review_tx: Option<mpsc::Sender<ReviewRecord>>,
    today: Option<chrono::NaiveDate>,
}

impl EngineBuilder {
    pub fn new(config: NluConfig, executor: Arc<dyn TaskExecution>) -> Self {
        Self {
            config: Arc::new(config),
            executor,
            intent_model: None,
            slot_model: None,
            context_store: None,
            review_tx: None,
            today: None,
        }
    }

    pub fn intent_model(mut self, model: Arc<dyn IntentModel>) -> Self {
        self.intent_model = Some(model);
        self
    }

    pub fn slot_model(mut self, model: Arc<dyn SlotModel>) -> Self {
        self.slot_model = Some(model);
        self
    }

    pub fn context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context_store = Some(store);
        self
    }

    pub fn review_channel(mut self, tx: mpsc::Sender<ReviewRecord>) -> Self {
        self.review_tx = Some(tx);
        self
    }

    /// Pin "today" for deterministic date resolution in tests.
    pub fn today(mut self, date: chrono::NaiveDate) -> Self {
        self.today = Some(date);
        self
    }

    pub fn build(self) -> DialogueEngine {
        let mut extractor = SlotExtractor::new(self.config.clone());
        if let Some(model) = self.slot_model {
            extractor = extractor.with_ai(model);
        }
        if let Some(tx) = self.review_tx {
            extractor = extractor.with_review_channel(tx);
        }
        if let Some(date) = self.today {
            extractor = extractor.with_today(date);
        }
        let extractor = Arc::new(extractor);

        let mut classifier = IntentClassifier::new(self.config.clone(), extractor.clone());
        if let Some(model) = self.intent_model {
            classifier = classifier.with_ai(model);
        }

        let mut state = ConversationState::new(self.config.settings.ttl.clone());
        if let Some(store) = self.context_store {
            state = state.with_store(store);
        }

        let trigger = TaskTrigger::new(
            self.executor,
            self.config.settings.timeouts.execution(),
            self.config.settings.default_course_minutes,
            self.config.settings.execution_history_depth,
        );

        DialogueEngine {
            config: self.config,
            classifier,
            extractor,
            state: Arc::new(state),
            trigger,
        }
    }
}

pub struct DialogueEngine {
    config: Arc<NluConfig>,
    classifier: IntentClassifier,
    extractor: Arc<SlotExtractor>,
    state: Arc<ConversationState>,
    trigger: TaskTrigger,
}

impl DialogueEngine {
    /// Process one utterance for one user. Holds the user's context guard
    /// for the whole turn, so same-user turns never interleave.
    pub async fn handle_turn(&self, user_id: &str, text: &str) -> TurnOutcome {
        let mut ctx = self.state.acquire(user_id).await;
        let classification = self.classifier.classify(text, &mut ctx).await;
        tracing::debug!(
            user_id,
            intent = %classification.intent,
            confidence = classification.confidence,
            source = ?classification.source,
            "Turn classified"
        );

        let outcome = match classification.intent {
            Intent::Unknown => TurnOutcome::Fallback {
                message: "不好意思，我沒有聽懂，可以換個方式說嗎？".to_string(),
            },
            Intent::ConfirmAction => self.handle_confirm(&mut ctx).await,
            Intent::Supplement(_) => self.handle_supplement(&ctx),
            intent => {
                self.handle_task_intent(&mut ctx, intent, classification.slots, text)
                    .await
            }
        };

        self.state.persist(&ctx).await;
        outcome
    }

    /// Operational statistics of the execution layer.
    pub fn stats(&self) -> coursebot_dialogue::ExecutionStats {
        self.trigger.stats()
    }

    /// The conversation state store (exposed for supervision and tests).
    pub fn state(&self) -> &Arc<ConversationState> {
        &self.state
    }

    async fn handle_confirm(
        &self,
        ctx: &mut coursebot_dialogue::ConversationContext,
    ) -> TurnOutcome {
        match &ctx.pending_task {
            Some(pending) => match &pending.status {
                // A confirmation after a failed execution retries it with
                // the preserved slots.
                PendingStatus::ExecutionFailed { .. } => {
                    let intent = pending.intent;
                    let slots = pending.slots.clone();
                    match self.trigger.trigger(ctx, intent, slots).await {
                        TriggerResult::Executed { message } => TurnOutcome::Executed { message },
                        TriggerResult::Failed { message, .. } => {
                            TurnOutcome::RetryPrompt { message }
                        }
                    }
                }
                PendingStatus::AwaitingInput => {
                    let slot = pending
                        .missing_fields
                        .first()
                        .copied()
                        .unwrap_or(SlotKey::StudentName);
                    TurnOutcome::AskSlot {
                        intent: pending.intent,
                        slot,
                        prompt: prompt_for(slot),
                    }
                }
            },
            None => TurnOutcome::Acknowledged {
                message: "好的！".to_string(),
            },
        }
    }

    fn handle_supplement(&self, ctx: &coursebot_dialogue::ConversationContext) -> TurnOutcome {
        // The classifier already merged the supplement into the pending
        // task; what remains is asking for the next missing slot.
        match &ctx.pending_task {
            Some(pending) => {
                let slot = pending
                    .missing_fields
                    .first()
                    .copied()
                    .unwrap_or(SlotKey::StudentName);
                TurnOutcome::AskSlot {
                    intent: pending.intent,
                    slot,
                    prompt: prompt_for(slot),
                }
            }
            None => TurnOutcome::Fallback {
                message: "不好意思，我沒有聽懂，可以換個方式說嗎？".to_string(),
            },
        }
    }

    async fn handle_task_intent(
        &self,
        ctx: &mut coursebot_dialogue::ConversationContext,
        intent: Intent,
        merged: Option<coursebot_core::SlotSet>,
        text: &str,
    ) -> TurnOutcome {
        let (slots, candidates) = match merged {
            // Pending completion: execute with the merged set, not a fresh
            // extraction of the supplement fragment.
            Some(slots) => (slots, Vec::new()),
            None => {
                let extraction = self.extractor.extract(text, intent, ctx).await;
                (extraction.slots, extraction.student_candidates)
            }
        };

        if candidates.len() > 1 {
            let prompt = format!("請問是指{}呢？", candidates.join("還是"));
            return TurnOutcome::Clarify { candidates, prompt };
        }

        ctx.note_mentions(&slots);

        if intent == Intent::QuerySchedule {
            let student = slots.text(SlotKey::StudentName).map(str::to_string);
            let reference = slots
                .text(SlotKey::Scope)
                .map(str::to_string)
                .or_else(|| slots.get(SlotKey::CourseDate).map(|v| v.render()));
            ctx.pin_query_session(
                student,
                reference,
                self.config.settings.ttl.query_session(),
                Utc::now(),
            );
        }

        if completion::is_complete(intent, &slots) {
            match self.trigger.trigger(ctx, intent, slots).await {
                TriggerResult::Executed { message } => TurnOutcome::Executed { message },
                TriggerResult::Failed { message, .. } => TurnOutcome::RetryPrompt { message },
            }
        } else {
            ctx.set_pending(intent, slots, Utc::now());
            let slot = ctx
                .pending_task
                .as_ref()
                .and_then(|p| p.missing_fields.first().copied())
                .unwrap_or(SlotKey::StudentName);
            TurnOutcome::AskSlot {
                intent,
                slot,
                prompt: prompt_for(slot),
            }
        }
    }
}

/// The clarification prompt for a missing slot.
fn prompt_for(slot: SlotKey) -> String {
    match slot {
        SlotKey::StudentName => "請問是哪位學生呢？".to_string(),
        SlotKey::CourseName => "請問是哪一門課呢？".to_string(),
        SlotKey::ScheduleTime | SlotKey::ReminderTime => "請問時間是什麼時候呢？".to_string(),
        SlotKey::CourseDate | SlotKey::DayOfWeek => "請問是哪一天呢？".to_string(),
        SlotKey::Content => "請問內容是什麼呢？".to_string(),
        SlotKey::Scope | SlotKey::Recurring | SlotKey::RecurrenceType => {
            "可以再說清楚一點嗎？".to_string()
        }
    }
}
