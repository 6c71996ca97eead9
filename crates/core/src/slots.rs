//! Typed slot model.
//!
//! A slot is a named, typed parameter required to execute a task intent.
//! The design goal is that *omitted*, *invalid* and *present* are distinct,
//! enumerable states: an unset field is simply absent from the [`SlotSet`],
//! never an empty string or a literal `"null"`, and a present value always
//! satisfies its key's type.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Known slot names. Keys are intent-dependent; the completion tables in the
/// dialogue crate decide which of these an intent expects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum SlotKey {
    StudentName,
    CourseName,
    ScheduleTime,
    CourseDate,
    DayOfWeek,
    Recurring,
    RecurrenceType,
    ReminderTime,
    Content,
    Scope,
}

impl SlotKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKey::StudentName => "studentName",
            SlotKey::CourseName => "courseName",
            SlotKey::ScheduleTime => "scheduleTime",
            SlotKey::CourseDate => "courseDate",
            SlotKey::DayOfWeek => "dayOfWeek",
            SlotKey::Recurring => "recurring",
            SlotKey::RecurrenceType => "recurrenceType",
            SlotKey::ReminderTime => "reminderTime",
            SlotKey::Content => "content",
            SlotKey::Scope => "scope",
        }
    }

    /// The value type this key admits.
    pub fn kind(&self) -> SlotKind {
        match self {
            SlotKey::StudentName | SlotKey::CourseName | SlotKey::Content | SlotKey::Scope => {
                SlotKind::Text
            }
            SlotKey::ScheduleTime | SlotKey::ReminderTime => SlotKind::Time,
            SlotKey::CourseDate => SlotKind::Date,
            SlotKey::DayOfWeek => SlotKind::Weekday,
            SlotKey::Recurring => SlotKind::Flag,
            SlotKey::RecurrenceType => SlotKind::Recurrence,
        }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value type discriminant for a [`SlotKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Text,
    Date,
    Time,
    Weekday,
    Flag,
    Recurrence,
}

/// Recurrence descriptor for repeating courses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    Weekly,
    Biweekly,
    Daily,
}

impl RecurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceKind::Weekly => "weekly",
            RecurrenceKind::Biweekly => "biweekly",
            RecurrenceKind::Daily => "daily",
        }
    }
}

/// A typed slot value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    /// ISO weekday, 1 = Monday .. 7 = Sunday
    Weekday(u8),
    Flag(bool),
    Recurrence(RecurrenceKind),
}

impl SlotValue {
    /// Whether this value matches the given kind.
    pub fn is_kind(&self, kind: SlotKind) -> bool {
        matches!(
            (self, kind),
            (SlotValue::Text(_), SlotKind::Text)
                | (SlotValue::Date(_), SlotKind::Date)
                | (SlotValue::Time(_), SlotKind::Time)
                | (SlotValue::Weekday(_), SlotKind::Weekday)
                | (SlotValue::Flag(_), SlotKind::Flag)
                | (SlotValue::Recurrence(_), SlotKind::Recurrence)
        )
    }

    /// Render the canonical wire form: dates as `YYYY-MM-DD`, times as `HH:MM`.
    pub fn render(&self) -> String {
        match self {
            SlotValue::Text(s) => s.clone(),
            SlotValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SlotValue::Time(t) => t.format("%H:%M").to_string(),
            SlotValue::Weekday(w) => w.to_string(),
            SlotValue::Flag(b) => b.to_string(),
            SlotValue::Recurrence(r) => r.as_str().to_string(),
        }
    }
}

/// Whether a raw text value should be treated as absent.
///
/// Upstream sources (AI extraction in particular) occasionally hand back the
/// literal string "null" or whitespace for a field they could not fill.
pub fn is_null_like(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed == "無"
}

/// A validated mapping from slot key to typed value.
///
/// Insertion enforces the key's type and rejects null-like text, so any value
/// that is present is well-formed by construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotSet {
    values: BTreeMap<SlotKey, SlotValue>,
}

impl SlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a typed value. Returns false (and leaves the set unchanged) if
    /// the value does not match the key's kind or is null-like text.
    pub fn insert(&mut self, key: SlotKey, value: SlotValue) -> bool {
        if !value.is_kind(key.kind()) {
            tracing::debug!(slot = key.as_str(), "Rejected slot value of wrong kind");
            return false;
        }
        if let SlotValue::Text(ref s) = value {
            if is_null_like(s) {
                return false;
            }
        }
        if let SlotValue::Weekday(w) = value {
            if !(1..=7).contains(&w) {
                return false;
            }
        }
        let normalized = match value {
            SlotValue::Text(s) => SlotValue::Text(s.trim().to_string()),
            other => other,
        };
        self.values.insert(key, normalized);
        true
    }

    /// Insert free text for a text-kinded key, normalizing null-likes to
    /// absence. Non-text keys are rejected here; use [`SlotSet::insert`].
    pub fn insert_text(&mut self, key: SlotKey, raw: impl Into<String>) -> bool {
        let raw = raw.into();
        if is_null_like(&raw) {
            return false;
        }
        self.insert(key, SlotValue::Text(raw))
    }

    pub fn get(&self, key: SlotKey) -> Option<&SlotValue> {
        self.values.get(&key)
    }

    pub fn text(&self, key: SlotKey) -> Option<&str> {
        match self.values.get(&key) {
            Some(SlotValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn date(&self, key: SlotKey) -> Option<NaiveDate> {
        match self.values.get(&key) {
            Some(SlotValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn time(&self, key: SlotKey) -> Option<NaiveTime> {
        match self.values.get(&key) {
            Some(SlotValue::Time(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn weekday(&self, key: SlotKey) -> Option<u8> {
        match self.values.get(&key) {
            Some(SlotValue::Weekday(w)) => Some(*w),
            _ => None,
        }
    }

    pub fn flag(&self, key: SlotKey) -> Option<bool> {
        match self.values.get(&key) {
            Some(SlotValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn recurrence(&self, key: SlotKey) -> Option<RecurrenceKind> {
        match self.values.get(&key) {
            Some(SlotValue::Recurrence(r)) => Some(*r),
            _ => None,
        }
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn remove(&mut self, key: SlotKey) -> Option<SlotValue> {
        self.values.remove(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = SlotKey> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &SlotValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Merge `other` into self, filling only keys that are currently absent.
    /// Existing values always win; used to merge AI output under rule output.
    pub fn merge_missing(&mut self, other: &SlotSet) {
        for (key, value) in other.iter() {
            if !self.contains(key) {
                self.insert(key, value.clone());
            }
        }
    }

    /// Merge `other` into self with `other` winning on conflict. Used for the
    /// supplement protocol, where the newest utterance corrects older values.
    pub fn merge_overriding(&mut self, other: &SlotSet) {
        for (key, value) in other.iter() {
            self.insert(key, value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_like_text_is_absence() {
        let mut slots = SlotSet::new();
        assert!(!slots.insert_text(SlotKey::StudentName, ""));
        assert!(!slots.insert_text(SlotKey::StudentName, "  "));
        assert!(!slots.insert_text(SlotKey::StudentName, "null"));
        assert!(!slots.insert_text(SlotKey::StudentName, "NULL"));
        assert!(!slots.insert_text(SlotKey::CourseName, "無"));
        assert!(slots.is_empty());
    }

    #[test]
    fn test_kind_enforcement() {
        let mut slots = SlotSet::new();
        // A text value cannot land in a date-kinded key.
        assert!(!slots.insert(SlotKey::CourseDate, SlotValue::Text("明天".into())));
        assert!(slots.insert(
            SlotKey::CourseDate,
            SlotValue::Date(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
        ));
        assert_eq!(
            slots.get(SlotKey::CourseDate).unwrap().render(),
            "2025-03-14"
        );
    }

    #[test]
    fn test_weekday_range() {
        let mut slots = SlotSet::new();
        assert!(!slots.insert(SlotKey::DayOfWeek, SlotValue::Weekday(0)));
        assert!(!slots.insert(SlotKey::DayOfWeek, SlotValue::Weekday(8)));
        assert!(slots.insert(SlotKey::DayOfWeek, SlotValue::Weekday(3)));
    }

    #[test]
    fn test_time_render() {
        let mut slots = SlotSet::new();
        slots.insert(
            SlotKey::ScheduleTime,
            SlotValue::Time(NaiveTime::from_hms_opt(15, 30, 0).unwrap()),
        );
        assert_eq!(
            slots.get(SlotKey::ScheduleTime).unwrap().render(),
            "15:30"
        );
    }

    #[test]
    fn test_merge_missing_keeps_existing() {
        let mut rule_out = SlotSet::new();
        rule_out.insert_text(SlotKey::StudentName, "小明");

        let mut ai_out = SlotSet::new();
        ai_out.insert_text(SlotKey::StudentName, "小華");
        ai_out.insert_text(SlotKey::CourseName, "數學課");

        rule_out.merge_missing(&ai_out);
        assert_eq!(rule_out.text(SlotKey::StudentName), Some("小明"));
        assert_eq!(rule_out.text(SlotKey::CourseName), Some("數學課"));
    }

    #[test]
    fn test_merge_overriding_takes_newest() {
        let mut pending = SlotSet::new();
        pending.insert_text(SlotKey::CourseName, "數學課");

        let mut supplement = SlotSet::new();
        supplement.insert_text(SlotKey::CourseName, "英文課");

        pending.merge_overriding(&supplement);
        assert_eq!(pending.text(SlotKey::CourseName), Some("英文課"));
    }

    #[test]
    fn test_text_is_trimmed() {
        let mut slots = SlotSet::new();
        slots.insert_text(SlotKey::StudentName, " 小明 ");
        assert_eq!(slots.text(SlotKey::StudentName), Some("小明"));
    }
}
