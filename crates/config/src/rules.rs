//! Intent rule tables.
//!
//! Each rule carries keywords, compiled regex patterns, a priority used as a
//! tie-break, an optional required-keyword predicate and an exclusion list.
//! Rule order in the table is not significant; the classifier scores every
//! rule and sorts by score, then priority.

use crate::ConfigError;
use coursebot_core::Intent;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Serde shape of a single rule, as written in YAML overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub intent: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    pub priority: u8,
    /// If non-empty, at least one listed keyword must appear or the rule is
    /// discarded.
    #[serde(default)]
    pub required_keywords: Vec<String>,
    /// Any listed keyword appearing discards the rule.
    #[serde(default)]
    pub exclusions: Vec<String>,
}

/// A compiled intent rule.
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub intent: Intent,
    pub keywords: Vec<String>,
    pub patterns: Vec<Regex>,
    pub priority: u8,
    pub required_keywords: Vec<String>,
    pub exclusions: Vec<String>,
}

impl IntentRule {
    /// Discard checks: required-keyword predicate holds, no exclusion present.
    pub fn admits(&self, text: &str) -> bool {
        if !self.required_keywords.is_empty()
            && !self.required_keywords.iter().any(|k| text.contains(k.as_str()))
        {
            return false;
        }
        !self.exclusions.iter().any(|k| text.contains(k.as_str()))
    }

    pub fn keyword_hit(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }

    pub fn pattern_hit(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// The full compiled rule table.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<IntentRule>,
}

impl RuleSet {
    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    /// Compile a list of rule specs, validating patterns and intent tags.
    pub fn compile(specs: Vec<RuleSpec>) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            let intent = Intent::parse(&spec.intent);
            if intent == Intent::Unknown && spec.intent != "unknown" {
                return Err(ConfigError::UnknownIntent(spec.intent));
            }
            let mut patterns = Vec::with_capacity(spec.patterns.len());
            for raw in &spec.patterns {
                let compiled = Regex::new(raw).map_err(|_| ConfigError::InvalidPattern {
                    intent: spec.intent.clone(),
                    pattern: raw.clone(),
                })?;
                patterns.push(compiled);
            }
            rules.push(IntentRule {
                intent,
                keywords: spec.keywords,
                patterns,
                priority: spec.priority,
                required_keywords: spec.required_keywords,
                exclusions: spec.exclusions,
            });
        }
        Ok(Self { rules })
    }

    /// The embedded standard rule table.
    pub fn standard() -> Self {
        Self::compile(standard_specs()).expect("standard rule table must compile")
    }
}

fn spec(
    intent: &str,
    keywords: &[&str],
    patterns: &[&str],
    priority: u8,
    required: &[&str],
    exclusions: &[&str],
) -> RuleSpec {
    RuleSpec {
        intent: intent.to_string(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        patterns: patterns.iter().map(|s| s.to_string()).collect(),
        priority,
        required_keywords: required.iter().map(|s| s.to_string()).collect(),
        exclusions: exclusions.iter().map(|s| s.to_string()).collect(),
    }
}

/// The standard rule specs. Priorities: lower wins ties.
fn standard_specs() -> Vec<RuleSpec> {
    vec![
        spec(
            "confirm_action",
            &["確認", "確定", "沒錯", "没错"],
            // Anchored: a bare acknowledgement, nothing else in the message.
            &[r"^(好|好的|好啊|對|对|是|是的|嗯|可以|行|確認|確定|沒錯|ok|OK|Ok)[的啊喔哦呀呢！!。．.～~\s]*$"],
            1,
            &[],
            &["嗎", "吗", "?", "？"],
        ),
        spec(
            "query_schedule",
            &["查詢", "查询", "課表", "课表", "看一下", "有哪些課", "什麼課", "行程"],
            &[
                r"(查|看).{0,4}(課|课|行程|課表|课表)",
                r"(今天|明天|後天|这周|這週|本週|下週|下周).{0,4}有.{0,3}課",
                r"^查詢$|^查询$",
            ],
            2,
            &[],
            &[],
        ),
        spec(
            "cancel_course",
            &["取消", "請假", "请假", "停課", "停课", "不上了"],
            &[r"(取消|請假|请假|停).{0,8}(課|课)", r"(課|课).{0,4}取消"],
            2,
            &[],
            &[],
        ),
        spec(
            "modify_course",
            &["修改", "改到", "改成", "調整", "调整", "換時間", "换时间", "延後", "延后", "提前"],
            &[r"(改|調|调|延|挪).{0,6}(到|成|時間|时间)", r"(時間|时间).{0,4}(改|調|调|換|换)"],
            3,
            &["課", "時間"],
            &["取消"],
        ),
        spec(
            "add_course",
            &["新增", "加課", "加课", "排課", "排课", "安排", "約課", "约课", "預約", "预约"],
            &[
                r"(新增|安排|預約|预约|約|约|排|加).{0,8}(課|课|堂)",
                r"幫.{1,4}(排|約|约|加|安排)",
                r"每(週|周|天|日).{0,8}(課|课|上)",
            ],
            3,
            &[],
            &["取消", "查詢", "查询"],
        ),
        spec(
            "set_reminder",
            &["提醒", "通知我", "記得叫我", "记得叫我"],
            &[r"提醒(我|一下)?", r"(到時|到时).{0,4}(通知|提醒)"],
            4,
            &[],
            &["取消"],
        ),
        spec(
            "record_content",
            &["記錄", "纪录", "紀錄", "记录", "筆記", "笔记", "上課內容", "上课内容"],
            &[
                r"(記錄|紀錄|记录).{0,10}(內容|内容|進度|进度)?",
                r"今天(上|教|學|学)了",
            ],
            4,
            &[],
            &["提醒", "取消", "查詢", "查询"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_compiles() {
        let set = RuleSet::standard();
        assert_eq!(set.rules().len(), 7);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let specs = vec![spec("add_course", &[], &["(unclosed"], 1, &[], &[])];
        assert!(matches!(
            RuleSet::compile(specs),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_unknown_intent_is_rejected() {
        let specs = vec![spec("order_pizza", &["披薩"], &[], 1, &[], &[])];
        assert!(matches!(
            RuleSet::compile(specs),
            Err(ConfigError::UnknownIntent(_))
        ));
    }

    #[test]
    fn test_exclusion_discards_rule() {
        let set = RuleSet::standard();
        let add = set
            .rules()
            .iter()
            .find(|r| r.intent == Intent::AddCourse)
            .unwrap();
        assert!(add.admits("幫小明排數學課"));
        assert!(!add.admits("取消幫小明排的數學課"));
    }

    #[test]
    fn test_required_keywords_predicate() {
        let set = RuleSet::standard();
        let modify = set
            .rules()
            .iter()
            .find(|r| r.intent == Intent::ModifyCourse)
            .unwrap();
        // 修改 without any course/time anchor fails the required predicate.
        assert!(!modify.admits("修改一下資料"));
        assert!(modify.admits("把課改到下午的時間"));
    }
}
