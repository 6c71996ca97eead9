//! Intent taxonomy for the course assistant.
//!
//! An [`Intent`] is derived fresh for every turn and never stored long-term;
//! only the validated slots of an incomplete intent survive a turn, attached
//! to the pending task.

use serde::{Deserialize, Serialize};

/// Which kind of slot a supplement turn is expected to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotInputType {
    StudentName,
    CourseName,
    Time,
    Date,
}

impl SlotInputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotInputType::StudentName => "student_name",
            SlotInputType::CourseName => "course_name",
            SlotInputType::Time => "time",
            SlotInputType::Date => "date",
        }
    }
}

impl std::fmt::Display for SlotInputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classified purpose of a user utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// 新增課程 — schedule a course for a student
    AddCourse,
    /// 查詢課表 — look up scheduled courses
    QuerySchedule,
    /// 取消課程
    CancelCourse,
    /// 修改課程時間或內容
    ModifyCourse,
    /// 設定提醒
    SetReminder,
    /// 記錄上課內容
    RecordContent,
    /// 確認先前提出的動作
    ConfirmAction,
    /// A follow-up turn filling a specific missing slot
    Supplement(SlotInputType),
    /// No rule or model produced a usable classification
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::AddCourse => "add_course",
            Intent::QuerySchedule => "query_schedule",
            Intent::CancelCourse => "cancel_course",
            Intent::ModifyCourse => "modify_course",
            Intent::SetReminder => "set_reminder",
            Intent::RecordContent => "record_content",
            Intent::ConfirmAction => "confirm_action",
            Intent::Supplement(SlotInputType::StudentName) => "supplement_student_name",
            Intent::Supplement(SlotInputType::CourseName) => "supplement_course_name",
            Intent::Supplement(SlotInputType::Time) => "supplement_time",
            Intent::Supplement(SlotInputType::Date) => "supplement_date",
            Intent::Unknown => "unknown",
        }
    }

    /// Parse an intent tag as produced by [`Intent::as_str`] or by the AI
    /// classification capability. Unrecognized tags map to `Unknown` so a
    /// misbehaving model can never inject a new intent into the pipeline.
    pub fn parse(tag: &str) -> Intent {
        match tag {
            "add_course" => Intent::AddCourse,
            "query_schedule" => Intent::QuerySchedule,
            "cancel_course" => Intent::CancelCourse,
            "modify_course" => Intent::ModifyCourse,
            "set_reminder" => Intent::SetReminder,
            "record_content" => Intent::RecordContent,
            "confirm_action" => Intent::ConfirmAction,
            "supplement_student_name" => Intent::Supplement(SlotInputType::StudentName),
            "supplement_course_name" => Intent::Supplement(SlotInputType::CourseName),
            "supplement_time" => Intent::Supplement(SlotInputType::Time),
            "supplement_date" => Intent::Supplement(SlotInputType::Date),
            _ => Intent::Unknown,
        }
    }

    pub fn is_supplement(&self) -> bool {
        matches!(self, Intent::Supplement(_))
    }

    /// Intents that act on a prior turn and are meaningless without one.
    ///
    /// A bare "取消" or "確認" refers to something already on the table; the
    /// classifier downgrades these to `Unknown` when the conversation shows
    /// neither a recent action nor an active pending task.
    pub fn requires_recent_action(&self) -> bool {
        matches!(
            self,
            Intent::ConfirmAction | Intent::ModifyCourse | Intent::CancelCourse
        )
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
