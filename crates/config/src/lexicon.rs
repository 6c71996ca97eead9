//! Deny-lists, category words and the period-inference table.
//!
//! The entity matcher consults these to reject false matches; the time parser
//! consults the period table to resolve 12-hour numerals.

use serde::{Deserialize, Serialize};

/// Word lists used across extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    /// Time references that must never survive as a name.
    pub time_words: Vec<String>,
    /// Action verbs that leak into captured name spans.
    pub action_verbs: Vec<String>,
    /// Generic nouns that look like names to proximity rules.
    pub generic_nouns: Vec<String>,
    /// Words that already categorize a course; no canonical suffix appended.
    pub category_suffixes: Vec<String>,
    /// Keywords that signal the user is switching intent mid-supplement.
    pub intent_switch_keywords: Vec<String>,
    /// Week qualifiers trimmed off the tail of a captured name span.
    pub week_trim_tokens: Vec<String>,
    /// Question fragments; a course name containing one is dropped.
    pub question_words: Vec<String>,
}

impl Lexicon {
    /// A candidate name is denied when it equals or contains any deny-listed
    /// token from the time/action/generic lists.
    pub fn is_denied_name(&self, candidate: &str) -> bool {
        self.time_words
            .iter()
            .chain(self.action_verbs.iter())
            .chain(self.generic_nouns.iter())
            .any(|w| candidate == w || candidate.contains(w.as_str()))
    }

    pub fn contains_intent_switch(&self, text: &str) -> bool {
        self.intent_switch_keywords
            .iter()
            .any(|w| text.contains(w.as_str()))
    }

    pub fn contains_action_verb(&self, text: &str) -> bool {
        self.action_verbs.iter().any(|w| text.contains(w.as_str()))
    }

    pub fn contains_question_word(&self, text: &str) -> bool {
        self.question_words.iter().any(|w| text.contains(w.as_str()))
    }

    pub fn is_category_word(&self, candidate: &str) -> bool {
        self.category_suffixes
            .iter()
            .any(|w| candidate.ends_with(w.as_str()))
    }

    /// Strip a trailing week qualifier that was captured into a name span.
    pub fn trim_week_suffix<'a>(&self, candidate: &'a str) -> &'a str {
        for token in &self.week_trim_tokens {
            if let Some(stripped) = candidate.strip_suffix(token.as_str()) {
                return stripped;
            }
        }
        candidate
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            time_words: words(&[
                "今天", "明天", "後天", "后天", "昨天", "大後天", "早上", "上午", "中午",
                "下午", "晚上", "傍晚", "深夜", "凌晨", "這週", "這周", "本週", "本周",
                "下週", "下周", "上週", "上周", "星期", "禮拜", "礼拜", "週末", "周末",
                "時間", "时间", "小時", "分鐘",
            ]),
            action_verbs: words(&[
                "新增", "取消", "查詢", "查询", "修改", "安排", "提醒", "記錄", "紀錄",
                "记录", "請假", "请假", "調整", "调整", "預約", "预约", "幫我", "帮我",
                "確認", "确认", "確定", "确定",
            ]),
            generic_nouns: words(&[
                "課程", "课程", "老師", "老师", "學生", "学生", "內容", "内容", "進度",
                "进度", "行程", "課表", "课表", "大家", "我們", "我们", "好的", "沒錯",
                "没错", "謝謝", "谢谢", "麻煩", "麻烦", "請問", "请问", "同學", "同学",
                "小朋友", "嗯", "喔", "哦", "啊", "呀", "欸", "哈",
            ]),
            category_suffixes: words(&["課", "课", "班", "教學", "教学", "培訓", "培训", "訓練", "训练", "評量", "评量", "檢定", "检定"]),
            intent_switch_keywords: words(&[
                "查詢", "查询", "新增", "取消", "修改", "提醒", "記錄", "记录", "請假", "请假",
            ]),
            week_trim_tokens: words(&[
                "這週", "這周", "本週", "本周", "下週", "下周", "上週", "上周",
            ]),
            question_words: words(&["什麼", "什么", "嗎", "吗", "哪", "呢", "幾點", "几点", "誰", "谁", "？", "?"]),
        }
    }
}

/// One period-inference rule: a set of period words mapped to the canonical
/// hour range `[start, end)` they imply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodRule {
    pub words: Vec<String>,
    pub start: u32,
    pub end: u32,
    /// Scan order when several period words appear in one utterance.
    pub priority: u8,
    /// Period wraps midnight: a raw 12 resolves to 0 (深夜十二點 → 00:00).
    #[serde(default)]
    pub midnight_wrap: bool,
}

impl PeriodRule {
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start && hour < self.end
    }
}

/// The period-inference table, scanned in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodTable {
    rules: Vec<PeriodRule>,
}

impl PeriodTable {
    pub fn rules(&self) -> &[PeriodRule] {
        &self.rules
    }

    /// Find the period rule whose word occurs in `text`, preferring lower
    /// priority values.
    pub fn find(&self, text: &str) -> Option<&PeriodRule> {
        let mut best: Option<&PeriodRule> = None;
        for rule in &self.rules {
            if rule.words.iter().any(|w| text.contains(w.as_str())) {
                match best {
                    Some(b) if b.priority <= rule.priority => {}
                    _ => best = Some(rule),
                }
            }
        }
        best
    }
}

fn period(words_list: &[&str], start: u32, end: u32, priority: u8, midnight_wrap: bool) -> PeriodRule {
    PeriodRule {
        words: words(words_list),
        start,
        end,
        priority,
        midnight_wrap,
    }
}

impl Default for PeriodTable {
    fn default() -> Self {
        Self {
            rules: vec![
                period(&["凌晨"], 0, 6, 1, true),
                period(&["早上", "上午", "清晨"], 5, 12, 2, false),
                period(&["中午"], 11, 14, 2, false),
                period(&["下午"], 12, 18, 2, false),
                period(&["傍晚"], 17, 19, 3, false),
                period(&["晚上", "晚間", "晚间"], 18, 24, 2, false),
                period(&["夜間", "夜间"], 19, 24, 3, false),
                period(&["深夜", "半夜"], 22, 24, 3, true),
                period(&["am", "AM", "a.m."], 0, 12, 4, true),
                period(&["pm", "PM", "p.m."], 12, 24, 4, false),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_names() {
        let lex = Lexicon::default();
        assert!(lex.is_denied_name("明天"));
        assert!(lex.is_denied_name("取消"));
        assert!(lex.is_denied_name("老師"));
        // Containment also denies.
        assert!(lex.is_denied_name("明天的"));
        assert!(!lex.is_denied_name("小明"));
        assert!(!lex.is_denied_name("王小美"));
    }

    #[test]
    fn test_week_suffix_trim() {
        let lex = Lexicon::default();
        assert_eq!(lex.trim_week_suffix("數學下週"), "數學");
        assert_eq!(lex.trim_week_suffix("小明"), "小明");
    }

    #[test]
    fn test_period_lookup() {
        let table = PeriodTable::default();
        let afternoon = table.find("下午三點").unwrap();
        assert!(afternoon.contains(15));
        assert!(!afternoon.contains(3));

        let night = table.find("深夜十二點").unwrap();
        assert!(night.midnight_wrap);
    }

    #[test]
    fn test_period_priority_prefers_specific() {
        let table = PeriodTable::default();
        // 凌晨 outranks the generic am tag.
        let rule = table.find("凌晨三點 am").unwrap();
        assert_eq!(rule.start, 0);
        assert_eq!(rule.end, 6);
    }
}
