//! Per-intent slot extraction pipeline.
//!
//! Stages: rule extraction, context enhancement, confidence scoring,
//! AI-assisted extraction (merged only into empty fields), validation and
//! cleanup, final normalization. The pipeline never errors — a field that
//! cannot be extracted is simply absent, and the turn degrades to asking for
//! it. Low-confidence turns are queued for offline review on a bounded
//! channel that can never block or fail the turn.

use crate::entities::EntityPatternMatcher;
use crate::time::{DateExpressionParser, ParseOptions, TimeExpressionParser};
use chrono::{DateTime, NaiveDate, Utc};
use coursebot_config::NluConfig;
use coursebot_core::{
    ExtractionResult, Intent, RecurrenceKind, SlotInputType, SlotKey, SlotModel, SlotSet,
    SlotValue,
};
use coursebot_dialogue::{completion, ConversationContext};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::mpsc;
use unicode_segmentation::UnicodeSegmentation;

/// A low-confidence turn queued for offline review.
#[derive(Debug, Clone)]
pub struct ReviewRecord {
    pub user_id: String,
    pub text: String,
    pub intent: Intent,
    pub confidence: f32,
    pub at: DateTime<Utc>,
}

static REMINDER_CONTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"提醒(?:我|一下)?[,，:：]?(.+)$").unwrap());
static RECORD_TAUGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:上|教|學|学)了(.+)$").unwrap());
static RECORD_CONTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:記錄|紀錄|记录)(?:一下)?[,，:：]?(.+)$").unwrap());
/// Leading date/time fragments stripped off captured content.
static CONTENT_LEAD_TRIM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:今天|明天|後天|后天|大後天)?(?:早上|上午|中午|下午|晚上|傍晚)?(?:[0-9零〇一二兩两三四五六七八九十]+[點点時时](?:半|[0-9零〇一二兩两三四五六七八九十]+分?)?)?[,，\s]*",
    )
    .unwrap()
});

const PENALTY: f32 = 0.15;

pub struct SlotExtractor {
    config: Arc<NluConfig>,
    matcher: EntityPatternMatcher,
    time: TimeExpressionParser,
    dates: DateExpressionParser,
    ai: Option<Arc<dyn SlotModel>>,
    review_tx: Option<mpsc::Sender<ReviewRecord>>,
}

impl SlotExtractor {
    pub fn new(config: Arc<NluConfig>) -> Self {
        let matcher = EntityPatternMatcher::new(config.lexicon.clone());
        let time = TimeExpressionParser::new(config.periods.clone());
        Self {
            config,
            matcher,
            time,
            dates: DateExpressionParser::new(),
            ai: None,
            review_tx: None,
        }
    }

    /// Attach the AI slot-extraction capability.
    pub fn with_ai(mut self, ai: Arc<dyn SlotModel>) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Attach the low-confidence review side-channel.
    pub fn with_review_channel(mut self, tx: mpsc::Sender<ReviewRecord>) -> Self {
        self.review_tx = Some(tx);
        self
    }

    /// Pin "today" for deterministic date resolution in tests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.dates = DateExpressionParser::new().with_today(today);
        self
    }

    /// Run the full extraction pipeline. Never errors; returns a best-effort
    /// partial slot set with a confidence score.
    pub async fn extract(
        &self,
        text: &str,
        intent: Intent,
        ctx: &ConversationContext,
    ) -> ExtractionResult {
        let mut result = self.rule_extract(text, intent);

        self.enhance_from_context(intent, ctx, &mut result);

        let confidence = self.score(intent, &result);

        if self.should_assist(intent, confidence, &result.slots) {
            if let Some(ai_slots) = self.ai_extract(text, intent, &result.slots).await {
                result.slots.merge_missing(&ai_slots);
            }
        }

        self.cleanup(intent, &mut result);
        result.confidence = self.score(intent, &result).clamp(0.0, 1.0);

        if result.confidence < self.config.settings.thresholds.review_below {
            self.queue_for_review(text, intent, result.confidence, ctx);
        }

        result
    }

    // ---- stage 1: rule extraction ----

    fn rule_extract(&self, text: &str, intent: Intent) -> ExtractionResult {
        let mut result = ExtractionResult::default();
        match intent {
            Intent::AddCourse | Intent::ModifyCourse | Intent::CancelCourse => {
                self.extract_student(text, &mut result);
                self.extract_course(text, &mut result);
                self.extract_schedule(text, intent, &mut result);
                if intent == Intent::AddCourse {
                    self.extract_recurrence(text, &mut result);
                }
            }
            Intent::QuerySchedule => {
                self.extract_student(text, &mut result);
                self.extract_course(text, &mut result);
                self.extract_schedule(text, intent, &mut result);
                self.extract_scope(text, &mut result);
            }
            Intent::SetReminder => {
                if let Some(time) = self.time.parse(text) {
                    result.slots.insert(SlotKey::ReminderTime, SlotValue::Time(time));
                }
                if let Some(date) = self.dates.resolve(text) {
                    result.slots.insert(SlotKey::CourseDate, SlotValue::Date(date));
                }
                if let Some(content) = self.reminder_content(text) {
                    result.slots.insert_text(SlotKey::Content, content);
                }
            }
            Intent::RecordContent => {
                self.extract_student(text, &mut result);
                self.extract_course(text, &mut result);
                if let Some(content) = self.record_content(text) {
                    result.slots.insert_text(SlotKey::Content, content);
                }
            }
            Intent::Supplement(kind) => match kind {
                SlotInputType::StudentName => self.extract_student(text, &mut result),
                SlotInputType::CourseName => self.extract_course(text, &mut result),
                SlotInputType::Time => {
                    if let Some(time) = self.time.parse(text) {
                        result
                            .slots
                            .insert(SlotKey::ScheduleTime, SlotValue::Time(time));
                    }
                }
                SlotInputType::Date => {
                    self.extract_schedule(text, Intent::AddCourse, &mut result)
                }
            },
            Intent::ConfirmAction | Intent::Unknown => {}
        }
        result
    }

    fn extract_student(&self, text: &str, result: &mut ExtractionResult) {
        let candidates = self.matcher.extract_student_candidates(text);
        match candidates.len() {
            0 => {}
            1 => {
                result
                    .slots
                    .insert_text(SlotKey::StudentName, candidates.into_iter().next().unwrap());
            }
            _ => {
                // Several plausible names: clarify, never guess.
                result.note(format!("ambiguous student names: {}", candidates.join("/")));
                result.student_candidates = candidates;
            }
        }
    }

    fn extract_course(&self, text: &str, result: &mut ExtractionResult) {
        if let Some(course) = self.matcher.extract_course_name(text) {
            result.slots.insert_text(SlotKey::CourseName, course);
        }
    }

    fn extract_schedule(&self, text: &str, intent: Intent, result: &mut ExtractionResult) {
        let opts = ParseOptions {
            assume_afternoon: intent == Intent::ModifyCourse
                && self.config.settings.toggles.prefer_afternoon_for_bare_hours,
        };
        if let Some(time) = self.time.parse_with(text, opts) {
            result.slots.insert(SlotKey::ScheduleTime, SlotValue::Time(time));
        }
        if let Some(date) = self.dates.resolve(text) {
            result.slots.insert(SlotKey::CourseDate, SlotValue::Date(date));
        }
        if let Some(weekday) = self.dates.weekday_of(text) {
            result.slots.insert(SlotKey::DayOfWeek, SlotValue::Weekday(weekday));
        }
    }

    fn extract_recurrence(&self, text: &str, result: &mut ExtractionResult) {
        let kind = if text.contains("隔週") || text.contains("隔周") {
            Some(RecurrenceKind::Biweekly)
        } else if text.contains("每週") || text.contains("每周") || text.contains("每星期") {
            Some(RecurrenceKind::Weekly)
        } else if text.contains("每天") || text.contains("每日") {
            if self.config.settings.toggles.daily_recurrence {
                Some(RecurrenceKind::Daily)
            } else {
                result.note("daily recurrence requested but disabled");
                None
            }
        } else {
            None
        };
        if let Some(kind) = kind {
            result.slots.insert(SlotKey::Recurring, SlotValue::Flag(true));
            result
                .slots
                .insert(SlotKey::RecurrenceType, SlotValue::Recurrence(kind));
        }
    }

    fn extract_scope(&self, text: &str, result: &mut ExtractionResult) {
        let scope = if text.contains("今天") || text.contains("今日") {
            Some("today")
        } else if text.contains("明天") {
            Some("tomorrow")
        } else if text.contains("下週") || text.contains("下周") {
            Some("next_week")
        } else if text.contains("這週")
            || text.contains("这周")
            || text.contains("本週")
            || text.contains("本周")
        {
            Some("week")
        } else {
            None
        };
        if let Some(scope) = scope {
            result.slots.insert_text(SlotKey::Scope, scope);
        }
    }

    fn reminder_content(&self, text: &str) -> Option<String> {
        let caps = REMINDER_CONTENT.captures(text)?;
        let raw = caps.get(1)?.as_str();
        let trimmed = CONTENT_LEAD_TRIM.replace(raw, "");
        let content = trimmed.trim().trim_end_matches(['。', '!', '！']);
        if content.is_empty() {
            None
        } else {
            Some(content.to_string())
        }
    }

    fn record_content(&self, text: &str) -> Option<String> {
        let raw = RECORD_TAUGHT
            .captures(text)
            .or_else(|| RECORD_CONTENT.captures(text))
            .and_then(|caps| caps.get(1))?
            .as_str();
        let trimmed = CONTENT_LEAD_TRIM.replace(raw, "");
        let content = trimmed.trim().trim_end_matches(['。', '!', '！']);
        if content.is_empty() {
            None
        } else {
            Some(content.to_string())
        }
    }

    // ---- stage 2: context enhancement ----

    /// Auto-fill from conversation context is disabled by default to avoid
    /// false inheritance. Only the allow-listed same-session operations may
    /// inherit the query session's student.
    fn enhance_from_context(
        &self,
        intent: Intent,
        ctx: &ConversationContext,
        result: &mut ExtractionResult,
    ) {
        const ALLOW_INHERIT: &[Intent] = &[Intent::CancelCourse, Intent::QuerySchedule];
        if !ALLOW_INHERIT.contains(&intent) {
            return;
        }
        if result.slots.contains(SlotKey::StudentName) || !result.student_candidates.is_empty() {
            return;
        }
        let now = Utc::now();
        if let Some(session) = ctx.active_query_session(now) {
            if let Some(student) = &session.student_name {
                result.slots.insert_text(SlotKey::StudentName, student.clone());
                result.note("inherited student from active query session");
            }
        }
    }

    // ---- stage 3: confidence ----

    /// Fill rate over the intent's expected fields, penalized per quality
    /// defect found in the filled values.
    fn score(&self, intent: Intent, result: &ExtractionResult) -> f32 {
        let expected = completion::expected_fields(intent);
        if expected.is_empty() {
            return 1.0;
        }
        let filled = expected
            .iter()
            .filter(|k| result.slots.contains(**k))
            .count();
        let fill_rate = filled as f32 / expected.len() as f32;
        let penalties = self.quality_defects(&result.slots) as f32;
        (fill_rate - penalties * PENALTY).clamp(0.0, 1.0)
    }

    fn quality_defects(&self, slots: &SlotSet) -> usize {
        let mut defects = 0;
        if let Some(name) = slots.text(SlotKey::StudentName) {
            let len = name.graphemes(true).count();
            if !(2..=4).contains(&len) {
                defects += 1;
            }
            if name.chars().any(|c| c.is_ascii_digit()) {
                defects += 1;
            }
            if self.config.lexicon.contains_action_verb(name) {
                defects += 1;
            }
        }
        if let Some(course) = slots.text(SlotKey::CourseName) {
            if course.graphemes(true).count() > 12 {
                defects += 1;
            }
            if self.config.lexicon.contains_action_verb(course) {
                defects += 1;
            }
        }
        defects
    }

    // ---- stage 4: AI assist ----

    fn should_assist(&self, intent: Intent, confidence: f32, slots: &SlotSet) -> bool {
        if !self.config.settings.toggles.ai_slot_assist || self.ai.is_none() {
            return false;
        }
        let expected = completion::expected_fields(intent);
        if expected.is_empty() {
            return false;
        }
        confidence < self.config.settings.thresholds.ai_assist_below
            || expected.iter().any(|k| !slots.contains(*k))
    }

    async fn ai_extract(
        &self,
        text: &str,
        intent: Intent,
        existing: &SlotSet,
    ) -> Option<SlotSet> {
        let ai = self.ai.as_ref()?;
        let timeout = self.config.settings.timeouts.ai();
        match tokio::time::timeout(timeout, ai.extract_slots(text, intent, existing)).await {
            Ok(Ok(slots)) => Some(slots),
            Ok(Err(err)) => {
                tracing::warn!(%err, "AI slot extraction failed; keeping rule output");
                None
            }
            Err(_) => {
                tracing::warn!(?timeout, "AI slot extraction timed out; keeping rule output");
                None
            }
        }
    }

    // ---- stage 5: validation & cleanup ----

    fn cleanup(&self, intent: Intent, result: &mut ExtractionResult) {
        // Strip action verbs that leaked into the student name.
        if let Some(name) = result.slots.text(SlotKey::StudentName).map(str::to_string) {
            let cleaned = self.strip_verbs(&name);
            if cleaned.is_empty() || self.config.lexicon.is_denied_name(&cleaned) {
                result.slots.remove(SlotKey::StudentName);
                result.note(format!("dropped invalid student name: {name}"));
            } else if cleaned != name {
                result.slots.insert_text(SlotKey::StudentName, cleaned.clone());
                result.note(format!("stripped verbs from student name: {name} → {cleaned}"));
            }
            if cleaned.chars().any(|c| c.is_ascii_digit()) {
                result.slots.remove(SlotKey::StudentName);
                result.note("dropped student name containing digits");
            }
        }

        // A nickname absorbed into the course field moves to the student
        // field when the student is unknown (新增小明課 → student 小明).
        if !result.slots.contains(SlotKey::StudentName)
            && intent != Intent::QuerySchedule
        {
            if let Some(course) = result.slots.text(SlotKey::CourseName).map(str::to_string) {
                let core = course
                    .strip_suffix("課程")
                    .or_else(|| course.strip_suffix('課'))
                    .or_else(|| course.strip_suffix('课'))
                    .unwrap_or(&course);
                let looks_like_nickname = core.starts_with('小') || core.starts_with('阿');
                if looks_like_nickname && !self.matcher.is_known_subject(core) {
                    result.slots.remove(SlotKey::CourseName);
                    result.slots.insert_text(SlotKey::StudentName, core);
                    result.note(format!("re-homed {core} from course to student"));
                }
            }
        }

        // A course name that merely echoes the student is a capture artifact.
        if let (Some(student), Some(course)) = (
            result.slots.text(SlotKey::StudentName).map(str::to_string),
            result.slots.text(SlotKey::CourseName).map(str::to_string),
        ) {
            let core = course
                .strip_suffix("課程")
                .or_else(|| course.strip_suffix('課'))
                .or_else(|| course.strip_suffix('课'))
                .unwrap_or(&course);
            if core == student {
                result.slots.remove(SlotKey::CourseName);
                result.note("dropped course name duplicating the student name");
            }
        }

        // A course name that is really a question fragment is noise.
        if let Some(course) = result.slots.text(SlotKey::CourseName).map(str::to_string) {
            if self.config.lexicon.contains_question_word(&course) {
                result.slots.remove(SlotKey::CourseName);
                result.note(format!("dropped question-fragment course name: {course}"));
            }
        }
    }

    fn strip_verbs(&self, value: &str) -> String {
        let mut current = value;
        loop {
            let mut stripped = false;
            for verb in &self.config.lexicon.action_verbs {
                if let Some(rest) = current.strip_prefix(verb.as_str()) {
                    current = rest;
                    stripped = true;
                }
            }
            if !stripped {
                break;
            }
        }
        current.trim().to_string()
    }

    // ---- side channel ----

    /// Fire-and-forget: a full or closed queue drops the record, it never
    /// fails the turn.
    fn queue_for_review(
        &self,
        text: &str,
        intent: Intent,
        confidence: f32,
        ctx: &ConversationContext,
    ) {
        let Some(tx) = &self.review_tx else {
            return;
        };
        let record = ReviewRecord {
            user_id: ctx.user_id.clone(),
            text: text.to_string(),
            intent,
            confidence,
            at: Utc::now(),
        };
        if let Err(err) = tx.try_send(record) {
            tracing::trace!(%err, "Review queue full; dropping record");
        }
    }

    // ---- shape probes used by the classifier ----

    pub fn has_time_expression(&self, text: &str) -> bool {
        self.time.parse(text).is_some()
    }

    pub fn has_date_expression(&self, text: &str) -> bool {
        self.dates.resolve(text).is_some() || self.dates.weekday_of(text).is_some()
    }

    /// Whether the utterance carries any extractable entity at all. Used to
    /// distinguish fully-specified requests from bare anaphoric ones.
    pub fn has_any_entity(&self, text: &str) -> bool {
        !self.matcher.extract_student_candidates(text).is_empty()
            || self.matcher.extract_course_name(text).is_some()
            || self.has_time_expression(text)
            || self.has_date_expression(text)
    }
}
