//! Entity extraction: student names and course names.
//!
//! Rules are ordered from highest to lowest precision — explicit "X的Y課"
//! structures before bare proximity rules. Every candidate passes the
//! deny-list before it is accepted; a rejected candidate does not stop the
//! scan, matching continues with the next rule.

use coursebot_config::Lexicon;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Subjects recognized without a course suffix. A closed list beats a guess.
static SUBJECTS: &[&str] = &[
    "數學", "数学", "英文", "英語", "英语", "國語", "国语", "國文", "作文", "自然",
    "物理", "化學", "化学", "生物", "歷史", "历史", "地理", "鋼琴", "钢琴", "小提琴",
    "美術", "美术", "畫畫", "画画", "游泳", "舞蹈", "音樂", "音乐", "書法", "书法",
    "圍棋", "围棋", "程式", "珠算", "心算", "桌球", "籃球", "篮球", "足球", "排球",
    "跆拳道",
];

static NAME_RULES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // X的...課 — the most explicit structure.
        Regex::new(r"([\p{Han}]{2,4})的[\p{Han}A-Za-z0-9]{0,8}(?:課|课|班)").unwrap(),
        // 幫X安排 / 替X取消 ...
        Regex::new(
            r"(?:幫|帮|替|給|给)([\p{Han}]{2,4})(?:安排|新增|排|約|约|加|取消|請假|请假|記錄|记录|預約|预约|報名|报名|上)",
        )
        .unwrap(),
        // X同學 / X小朋友
        Regex::new(r"([\p{Han}]{2,4})(?:同學|同学|小朋友)").unwrap(),
        // Proximity to a day word: X今天 / X下週 ...
        Regex::new(
            r"([\p{Han}]{2,4})(?:今天|明天|後天|后天|昨天|這週|这周|本週|本周|下週|下周|星期|禮拜|礼拜|週|周|每)",
        )
        .unwrap(),
    ]
});

static COURSE_RULES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // 的X課 — possessive structure.
        Regex::new(r"的([\p{Han}A-Za-z]{1,8})(課程|课程|課|课|班)").unwrap(),
        // Known subject, suffix optional.
        Regex::new(&format!(r"({})(課程|课程|課|课|班)?", SUBJECTS.join("|"))).unwrap(),
        // 上X課 / 學X課 / 補X課
        Regex::new(r"(?:上|學|学|補|补|教)([\p{Han}A-Za-z]{1,8})(課程|课程|課|课|班)").unwrap(),
        // Bare X課, cleaned up afterwards.
        Regex::new(r"([\p{Han}A-Za-z]{1,8})(課程|课程|課|课|班)").unwrap(),
    ]
});

/// Conjunctions splitting co-mentioned entities ("小明和小華").
const CONJUNCTIONS: &[char] = &['和', '跟', '與', '与', '、', ',', '，'];

/// Leading particles and verbs stripped off a captured course span.
static COURSE_PREFIX_TRIM: &[&str] = &[
    "的", "了", "一堂", "一節", "一节", "堂", "節", "节", "個", "个", "新增", "安排",
    "取消", "查詢", "查询", "預約", "预约", "幫", "帮", "把", "請", "请", "排", "約",
    "约", "加", "上", "查", "看", "改", "想", "要",
];

/// Tokens that mark a captured course span as generic phrasing ("排一堂課")
/// rather than an actual course name.
static COURSE_JUNK: &[&str] = &[
    "堂", "節", "节", "個", "个", "排", "約", "约", "查", "看", "改",
];

/// Particles stripped off a captured name span in addition to action verbs.
static NAME_PREFIX_TRIM: &[&str] = &["把", "請", "请", "幫", "帮", "替", "給", "给", "要"];

pub struct EntityPatternMatcher {
    lexicon: Lexicon,
}

impl EntityPatternMatcher {
    pub fn new(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }

    /// Extract the student name when exactly one plausible candidate exists.
    /// With several candidates the caller must clarify, not guess.
    pub fn extract_student_name(&self, text: &str) -> Option<String> {
        let candidates = self.extract_student_candidates(text);
        if candidates.len() == 1 {
            candidates.into_iter().next()
        } else {
            None
        }
    }

    /// All plausible student-name candidates, in mention order.
    pub fn extract_student_candidates(&self, text: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        for segment in text.split(CONJUNCTIONS) {
            for candidate in self.student_matches(segment) {
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }
        candidates
    }

    fn student_matches(&self, segment: &str) -> Vec<String> {
        let mut found = Vec::new();
        for rule in NAME_RULES.iter() {
            for caps in rule.captures_iter(segment) {
                if let Some(m) = caps.get(1) {
                    if let Some(name) = self.accept_name(m.as_str()) {
                        found.push(name);
                    }
                }
            }
            if !found.is_empty() {
                return found;
            }
        }
        // A bare short name on its own (a supplement turn, or one side of a
        // conjunction). Category-suffixed words are course names, not people.
        let bare = segment.trim();
        if bare.graphemes(true).count() >= 2
            && bare.graphemes(true).count() <= 4
            && bare.chars().all(is_han)
            && !self.lexicon.is_category_word(bare)
        {
            if let Some(name) = self.accept_name(bare) {
                found.push(name);
            }
        }
        found
    }

    fn accept_name(&self, raw: &str) -> Option<String> {
        let mut trimmed = self.lexicon.trim_week_suffix(raw.trim());
        // Leading verbs and particles leak into greedy captures
        // (取消小明 → 小明, 把小美 → 小美).
        loop {
            let mut stripped = false;
            for prefix in self
                .lexicon
                .action_verbs
                .iter()
                .map(String::as_str)
                .chain(NAME_PREFIX_TRIM.iter().copied())
            {
                if let Some(rest) = trimmed.strip_prefix(prefix) {
                    trimmed = rest;
                    stripped = true;
                }
            }
            if !stripped {
                break;
            }
        }
        if trimmed.graphemes(true).count() < 2 {
            return None;
        }
        if self.lexicon.is_denied_name(trimmed) {
            tracing::trace!(candidate = trimmed, "Name candidate denied");
            return None;
        }
        Some(trimmed.to_string())
    }

    /// Extract and normalize the course name: first surviving candidate.
    pub fn extract_course_name(&self, text: &str) -> Option<String> {
        self.extract_course_candidates(text).into_iter().next()
    }

    /// All plausible course-name candidates, normalized, in mention order.
    pub fn extract_course_candidates(&self, text: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        for segment in text.split(CONJUNCTIONS) {
            for rule in COURSE_RULES.iter() {
                let mut hit = false;
                for caps in rule.captures_iter(segment) {
                    let core = match caps.get(1) {
                        Some(m) => m.as_str(),
                        None => continue,
                    };
                    let suffix = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                    if let Some(course) = self.accept_course(core, suffix) {
                        if !candidates.contains(&course) {
                            candidates.push(course);
                        }
                        hit = true;
                    }
                }
                if hit {
                    break;
                }
            }
        }
        candidates
    }

    fn accept_course(&self, raw: &str, suffix: &str) -> Option<String> {
        let mut core = raw.trim();
        // Greedy captures swallow whatever precedes the suffix; shorten from
        // the left until the remainder reads as an actual course name.
        loop {
            let before = core;
            core = strip_prefixes(core, COURSE_PREFIX_TRIM);
            core = self.lexicon.trim_week_suffix(core);
            core = core.strip_suffix('的').unwrap_or(core);
            if self.is_course_core(core) || core.is_empty() {
                break;
            }
            if core == before {
                let mut chars = core.chars();
                chars.next();
                core = chars.as_str();
            }
        }
        if core.is_empty() {
            return None;
        }
        if self.lexicon.contains_question_word(core) {
            return None;
        }
        Some(self.normalize_course(core, suffix))
    }

    /// Whether a candidate core is a plausible course name: a known subject,
    /// or free of deny-listed words, verbs and counter phrasing.
    fn is_course_core(&self, core: &str) -> bool {
        if self.is_known_subject(core) {
            return true;
        }
        core.chars().count() >= 2
            && !self.lexicon.is_denied_name(core)
            && !COURSE_JUNK.iter().any(|t| core.contains(t))
            && !self.lexicon.contains_question_word(core)
    }

    /// Keep the captured category suffix; append the canonical suffix when
    /// there is none and the candidate is not itself a category word.
    fn normalize_course(&self, core: &str, suffix: &str) -> String {
        if !suffix.is_empty() {
            format!("{core}{suffix}")
        } else if self.lexicon.is_category_word(core) {
            core.to_string()
        } else {
            format!("{core}課")
        }
    }

    pub fn is_known_subject(&self, candidate: &str) -> bool {
        let core = candidate
            .strip_suffix("課程")
            .or_else(|| candidate.strip_suffix('課'))
            .or_else(|| candidate.strip_suffix('课'))
            .unwrap_or(candidate);
        SUBJECTS.contains(&core)
    }
}

fn strip_prefixes<'a>(mut value: &'a str, prefixes: &[&str]) -> &'a str {
    loop {
        let mut stripped = false;
        for prefix in prefixes {
            if let Some(rest) = value.strip_prefix(prefix) {
                value = rest;
                stripped = true;
            }
        }
        if !stripped {
            return value;
        }
    }
}

fn is_han(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c) || ('\u{3400}'..='\u{4DBF}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> EntityPatternMatcher {
        EntityPatternMatcher::new(Lexicon::default())
    }

    #[test]
    fn test_possessive_structure() {
        let m = matcher();
        assert_eq!(
            m.extract_student_name("小明的數學課改到明天"),
            Some("小明".to_string())
        );
        assert_eq!(
            m.extract_course_name("小明的數學課改到明天"),
            Some("數學課".to_string())
        );
    }

    #[test]
    fn test_help_verb_structure() {
        let m = matcher();
        assert_eq!(
            m.extract_student_name("幫小美安排鋼琴課"),
            Some("小美".to_string())
        );
        assert_eq!(
            m.extract_course_name("幫小美安排鋼琴課"),
            Some("鋼琴課".to_string())
        );
    }

    #[test]
    fn test_proximity_rule() {
        let m = matcher();
        assert_eq!(
            m.extract_student_name("小華明天有什麼課"),
            Some("小華".to_string())
        );
    }

    #[test]
    fn test_deny_list_rejects_whole_span() {
        let m = matcher();
        // The proximity rule would capture 我們, but it is deny-listed.
        assert_eq!(m.extract_student_name("我們明天有課嗎"), None);
        // A bare deny-listed word never survives as a name.
        assert_eq!(m.extract_student_name("明天"), None);
        assert_eq!(m.extract_student_name("取消"), None);
    }

    #[test]
    fn test_bare_supplement_name() {
        let m = matcher();
        assert_eq!(m.extract_student_name("小明"), Some("小明".to_string()));
        assert_eq!(m.extract_student_name("王小美"), Some("王小美".to_string()));
        // A course-looking token is not a name.
        assert_eq!(m.extract_student_name("數學課"), None);
    }

    #[test]
    fn test_multiple_candidates_force_clarification() {
        let m = matcher();
        let candidates = m.extract_student_candidates("小明和小華的數學課");
        assert_eq!(candidates, vec!["小明".to_string(), "小華".to_string()]);
        // The single-name accessor refuses to guess.
        assert_eq!(m.extract_student_name("小明和小華的數學課"), None);
    }

    #[test]
    fn test_course_suffix_normalization() {
        let m = matcher();
        assert_eq!(m.extract_course_name("學鋼琴課"), Some("鋼琴課".to_string()));
        // Known subject without suffix gets the canonical one appended.
        assert_eq!(m.extract_course_name("想學游泳"), Some("游泳課".to_string()));
        // Category words stand on their own.
        assert_eq!(
            m.extract_course_name("報名書法班"),
            Some("書法班".to_string())
        );
    }

    #[test]
    fn test_week_token_trimmed_from_name_span() {
        let m = matcher();
        // 下週 directly after the course span must not stick to the name.
        assert_eq!(
            m.extract_course_name("查詢數學下週的課"),
            Some("數學課".to_string())
        );
    }

    #[test]
    fn test_question_fragment_course_dropped() {
        let m = matcher();
        assert_eq!(m.extract_course_name("有什麼課"), None);
        assert_eq!(m.extract_course_name("哪些課"), None);
    }

    #[test]
    fn test_generic_course_span_is_cleaned() {
        let m = matcher();
        // The generic rule captures leading verbs; they are stripped.
        assert_eq!(
            m.extract_course_name("新增英文課"),
            Some("英文課".to_string())
        );
        assert_eq!(m.extract_course_name("下週的課"), None);
    }
}
