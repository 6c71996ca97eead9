//! Intent classification.
//!
//! Single-turn state machine: pending-input handling first (complete the
//! pending task in context, or name the slot a supplement turn is filling),
//! then rule scoring, then the AI fallback behind a confidence threshold,
//! and finally context gating of anaphoric intents.

use crate::slots::SlotExtractor;
use chrono::Utc;
use coursebot_config::NluConfig;
use coursebot_core::{Intent, IntentModel, SlotInputType, SlotKey, SlotSet};
use coursebot_dialogue::ConversationContext;
use std::sync::Arc;

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    /// A supplement turn completed the pending task.
    PendingCompletion,
    /// A supplement turn filled one expected slot; the task is still open.
    Supplement,
    Rules,
    Model,
    /// A context-gated intent was downgraded to unknown.
    Gated,
    Fallback,
}

/// One turn's classification.
#[derive(Debug, Clone)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
    pub source: ClassificationSource,
    /// The merged slot set, present when the pending task completed in
    /// context: the engine executes with these, not a fresh extraction.
    pub slots: Option<SlotSet>,
}

impl Classification {
    fn new(intent: Intent, confidence: f32, source: ClassificationSource) -> Self {
        Self {
            intent,
            confidence,
            source,
            slots: None,
        }
    }
}

pub struct IntentClassifier {
    config: Arc<NluConfig>,
    extractor: Arc<SlotExtractor>,
    ai: Option<Arc<dyn IntentModel>>,
}

impl IntentClassifier {
    pub fn new(config: Arc<NluConfig>, extractor: Arc<SlotExtractor>) -> Self {
        Self {
            config,
            extractor,
            ai: None,
        }
    }

    /// Attach the AI classification capability used as a fallback.
    pub fn with_ai(mut self, ai: Arc<dyn IntentModel>) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Classify one utterance against the user's conversation context.
    /// Mutates the context only through the defined pending-task transitions
    /// (supplement merge, cancellation on switch or expiry).
    pub async fn classify(&self, text: &str, ctx: &mut ConversationContext) -> Classification {
        let text = text.trim();

        if let Some(result) = self.try_pending(text, ctx).await {
            return result;
        }

        if let Some(result) = self.score_rules(text, ctx) {
            return result;
        }

        if self.config.settings.toggles.ai_fallback {
            if let Some(result) = self.ai_fallback(text, ctx).await {
                return result;
            }
        }

        Classification::new(Intent::Unknown, 0.0, ClassificationSource::Fallback)
    }

    /// Pending-input handling. Returns `None` when normal classification
    /// should proceed.
    async fn try_pending(
        &self,
        text: &str,
        ctx: &mut ConversationContext,
    ) -> Option<Classification> {
        let now = Utc::now();
        let ttl = self.config.settings.ttl.pending_input();

        if ctx.pending_task.is_some() && ctx.active_pending(ttl, now).is_none() {
            // TTL expiry clears pending and expecting-input together.
            tracing::debug!(user_id = %ctx.user_id, "Pending task expired during classify");
            ctx.cancel_pending();
            return None;
        }

        let pending_intent = ctx.active_pending(ttl, now)?.intent;
        if ctx.expecting_input.is_empty() {
            return None;
        }

        // An explicit intent switch abandons the pending task.
        if self.config.lexicon.contains_intent_switch(text) {
            tracing::debug!(
                user_id = %ctx.user_id,
                pending = %pending_intent,
                "Intent-switch keyword during supplement; clearing pending task"
            );
            ctx.cancel_pending();
            return None;
        }

        // Complete-in-context: re-extract for the original pending intent.
        let extraction = self.extractor.extract(text, pending_intent, ctx).await;
        let matched = self.matched_input(&extraction.slots, &ctx.expecting_input, text);

        if !extraction.slots.is_empty() {
            let complete = ctx.merge_supplement(&extraction.slots, now);
            if complete {
                let merged = ctx
                    .pending_task
                    .as_ref()
                    .map(|p| p.slots.clone())
                    .unwrap_or_default();
                let mut result = Classification::new(
                    pending_intent,
                    0.95,
                    ClassificationSource::PendingCompletion,
                );
                result.slots = Some(merged);
                return Some(result);
            }
        }

        match matched {
            Some(kind) => Some(Classification::new(
                Intent::Supplement(kind),
                0.85,
                ClassificationSource::Supplement,
            )),
            // Shape matches nothing we are waiting for; the pending task
            // stays put and normal classification handles the utterance.
            None => None,
        }
    }

    /// Match the utterance shape against the expected inputs, in queue order.
    fn matched_input(
        &self,
        extracted: &SlotSet,
        expecting: &[SlotInputType],
        text: &str,
    ) -> Option<SlotInputType> {
        for expected in expecting {
            let hit = match expected {
                SlotInputType::StudentName => extracted.contains(SlotKey::StudentName),
                SlotInputType::CourseName => extracted.contains(SlotKey::CourseName),
                SlotInputType::Time => {
                    extracted.contains(SlotKey::ScheduleTime)
                        || extracted.contains(SlotKey::ReminderTime)
                        || self.extractor.has_time_expression(text)
                }
                SlotInputType::Date => {
                    extracted.contains(SlotKey::CourseDate)
                        || extracted.contains(SlotKey::DayOfWeek)
                        || self.extractor.has_date_expression(text)
                }
            };
            if hit {
                return Some(*expected);
            }
        }
        None
    }

    /// Keyword/pattern scoring with priority tie-breaking.
    fn score_rules(&self, text: &str, ctx: &ConversationContext) -> Option<Classification> {
        let mut candidates: Vec<(Intent, i32, u8)> = Vec::new();
        for rule in self.config.rules.rules() {
            if !rule.admits(text) {
                continue;
            }
            let keyword = rule.keyword_hit(text);
            let pattern = rule.pattern_hit(text);
            if !keyword && !pattern {
                continue;
            }
            let mut score = 20 - rule.priority as i32;
            if keyword {
                score += 10;
            }
            if pattern {
                score += 15;
            }
            candidates.push((rule.intent, score, rule.priority));
        }

        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        let (intent, score, _) = candidates.into_iter().next()?;
        let confidence = (score as f32 / 44.0).clamp(0.0, 1.0);

        Some(self.gate(
            Classification::new(intent, confidence, ClassificationSource::Rules),
            text,
            ctx,
        ))
    }

    async fn ai_fallback(&self, text: &str, ctx: &ConversationContext) -> Option<Classification> {
        let ai = self.ai.as_ref()?;
        let timeout = self.config.settings.timeouts.ai();
        let prediction = match tokio::time::timeout(timeout, ai.classify(text)).await {
            Ok(Ok(prediction)) => prediction,
            Ok(Err(err)) => {
                tracing::warn!(%err, "AI classification failed; returning unknown");
                return None;
            }
            Err(_) => {
                tracing::warn!(?timeout, "AI classification timed out; returning unknown");
                return None;
            }
        };

        let intent = Intent::parse(&prediction.intent);
        if intent == Intent::Unknown
            || prediction.confidence < self.config.settings.thresholds.ai_intent_accept
        {
            tracing::debug!(
                intent = %prediction.intent,
                confidence = prediction.confidence,
                "AI prediction below acceptance threshold"
            );
            return None;
        }

        Some(self.gate(
            Classification::new(intent, prediction.confidence, ClassificationSource::Model),
            text,
            ctx,
        ))
    }

    /// Downgrade anaphoric intents (bare confirm/modify/cancel) to unknown
    /// when the conversation shows nothing they could refer to.
    fn gate(
        &self,
        classification: Classification,
        text: &str,
        ctx: &ConversationContext,
    ) -> Classification {
        if !classification.intent.requires_recent_action() {
            return classification;
        }
        if !self.is_bare_reference(text) {
            return classification;
        }
        let now = Utc::now();
        let anchored = ctx.pending_task.is_some()
            || ctx.has_recent_action(self.config.settings.ttl.context(), now);
        if anchored {
            classification
        } else {
            tracing::debug!(
                intent = %classification.intent,
                "Anaphoric intent without recent action; downgrading to unknown"
            );
            Classification::new(Intent::Unknown, 0.0, ClassificationSource::Gated)
        }
    }

    /// An utterance with no extractable entity refers to a prior action.
    fn is_bare_reference(&self, text: &str) -> bool {
        !self.extractor.has_any_entity(text)
    }
}
