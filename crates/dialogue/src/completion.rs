//! Per-intent completion predicates.
//!
//! A completion predicate decides whether a slot set carries enough
//! information to execute its intent. The tables here are the single source
//! of truth for "what does this intent need" — the extractor's confidence
//! scoring and the engine's ask-for-missing-slot prompts both read them.

use coursebot_core::{Intent, SlotInputType, SlotKey, SlotSet};

/// Fields the extractor aims to fill for an intent; the fill rate over this
/// list is the base of the extraction confidence.
pub fn expected_fields(intent: Intent) -> &'static [SlotKey] {
    match intent {
        Intent::AddCourse => &[
            SlotKey::StudentName,
            SlotKey::CourseName,
            SlotKey::ScheduleTime,
            SlotKey::CourseDate,
        ],
        Intent::QuerySchedule => &[SlotKey::StudentName, SlotKey::CourseDate],
        Intent::CancelCourse => &[
            SlotKey::StudentName,
            SlotKey::CourseName,
            SlotKey::CourseDate,
        ],
        Intent::ModifyCourse => &[
            SlotKey::StudentName,
            SlotKey::CourseName,
            SlotKey::ScheduleTime,
        ],
        Intent::SetReminder => &[SlotKey::Content, SlotKey::ReminderTime],
        Intent::RecordContent => &[
            SlotKey::StudentName,
            SlotKey::CourseName,
            SlotKey::Content,
        ],
        Intent::ConfirmAction | Intent::Supplement(_) | Intent::Unknown => &[],
    }
}

/// Whether `slots` satisfies `intent`'s completion predicate.
pub fn is_complete(intent: Intent, slots: &SlotSet) -> bool {
    let has = |k: SlotKey| slots.contains(k);
    match intent {
        // A course needs who, what, and a schedule anchor (an explicit time,
        // a date, or a weekday for recurring courses).
        Intent::AddCourse => {
            has(SlotKey::StudentName)
                && has(SlotKey::CourseName)
                && (has(SlotKey::ScheduleTime)
                    || has(SlotKey::CourseDate)
                    || has(SlotKey::DayOfWeek))
        }
        // Any one anchor is enough to answer a query.
        Intent::QuerySchedule => {
            has(SlotKey::StudentName)
                || has(SlotKey::CourseName)
                || has(SlotKey::CourseDate)
                || has(SlotKey::DayOfWeek)
                || has(SlotKey::Scope)
        }
        Intent::CancelCourse => {
            has(SlotKey::StudentName)
                && (has(SlotKey::CourseName)
                    || has(SlotKey::CourseDate)
                    || has(SlotKey::DayOfWeek))
        }
        Intent::ModifyCourse => {
            has(SlotKey::StudentName)
                && (has(SlotKey::ScheduleTime) || has(SlotKey::CourseDate))
        }
        Intent::SetReminder => has(SlotKey::Content) && has(SlotKey::ReminderTime),
        Intent::RecordContent => has(SlotKey::StudentName) && has(SlotKey::CourseName),
        Intent::ConfirmAction => true,
        Intent::Supplement(_) | Intent::Unknown => false,
    }
}

/// Missing fields for `intent`, in the order the user should be asked.
pub fn missing_fields(intent: Intent, slots: &SlotSet) -> Vec<SlotKey> {
    let has = |k: SlotKey| slots.contains(k);
    let mut missing = Vec::new();
    match intent {
        Intent::AddCourse => {
            if !has(SlotKey::StudentName) {
                missing.push(SlotKey::StudentName);
            }
            if !has(SlotKey::CourseName) {
                missing.push(SlotKey::CourseName);
            }
            if !(has(SlotKey::ScheduleTime)
                || has(SlotKey::CourseDate)
                || has(SlotKey::DayOfWeek))
            {
                missing.push(SlotKey::ScheduleTime);
            }
        }
        Intent::QuerySchedule => {
            if !is_complete(intent, slots) {
                missing.push(SlotKey::StudentName);
            }
        }
        Intent::CancelCourse => {
            if !has(SlotKey::StudentName) {
                missing.push(SlotKey::StudentName);
            }
            if !(has(SlotKey::CourseName)
                || has(SlotKey::CourseDate)
                || has(SlotKey::DayOfWeek))
            {
                missing.push(SlotKey::CourseName);
            }
        }
        Intent::ModifyCourse => {
            if !has(SlotKey::StudentName) {
                missing.push(SlotKey::StudentName);
            }
            if !(has(SlotKey::ScheduleTime) || has(SlotKey::CourseDate)) {
                missing.push(SlotKey::ScheduleTime);
            }
        }
        Intent::SetReminder => {
            if !has(SlotKey::Content) {
                missing.push(SlotKey::Content);
            }
            if !has(SlotKey::ReminderTime) {
                missing.push(SlotKey::ReminderTime);
            }
        }
        Intent::RecordContent => {
            if !has(SlotKey::StudentName) {
                missing.push(SlotKey::StudentName);
            }
            if !has(SlotKey::CourseName) {
                missing.push(SlotKey::CourseName);
            }
        }
        Intent::ConfirmAction | Intent::Supplement(_) | Intent::Unknown => {}
    }
    missing
}

/// Which supplement input type fills a given slot key.
pub fn slot_input_for(key: SlotKey) -> Option<SlotInputType> {
    match key {
        SlotKey::StudentName => Some(SlotInputType::StudentName),
        SlotKey::CourseName => Some(SlotInputType::CourseName),
        SlotKey::ScheduleTime | SlotKey::ReminderTime => Some(SlotInputType::Time),
        SlotKey::CourseDate | SlotKey::DayOfWeek => Some(SlotInputType::Date),
        SlotKey::Content | SlotKey::Scope | SlotKey::Recurring | SlotKey::RecurrenceType => None,
    }
}
