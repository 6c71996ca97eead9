//! Natural-language time and date parsing.
//!
//! [`TimeExpressionParser`] converts time fragments — Chinese numerals,
//! half-hour markers, AM/PM period words, 24h/12h numerals — into a
//! [`NaiveTime`]. Patterns are tried in an explicit precedence order:
//! period-qualified forms before bare numerals, so "下午三點" resolves the
//! period qualifier instead of stopping at a bare "三點".
//!
//! [`DateExpressionParser`] resolves relative day words, weekday references
//! and explicit month/day forms against an injectable "today".

use chrono::{Datelike, NaiveDate, NaiveTime};
use coursebot_config::{PeriodRule, PeriodTable};
use regex::Regex;

/// Intermediate parse value; never leaves this crate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TimeToken {
    pub hour: Option<u32>,
    pub minute: u32,
    pub period_hint: Option<String>,
}

/// Options tuning ambiguous-hour resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Resolve a bare 1–11 hour to the afternoon. Used for modify requests,
    /// where the legacy behavior reads a bare "6" as 18:00.
    pub assume_afternoon: bool,
}

const CN_DIGITS: &str = "零〇一二兩两三四五六七八九十";

pub struct TimeExpressionParser {
    periods: PeriodTable,
    period_cn: Regex,
    period_ar: Regex,
    ampm_pre: Regex,
    ampm_post: Regex,
    hhmm: Regex,
    cn_bare: Regex,
    ar_bare: Regex,
}

impl TimeExpressionParser {
    pub fn new(periods: PeriodTable) -> Self {
        let alt = periods
            .rules()
            .iter()
            .flat_map(|r| r.words.iter())
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        let min_cn = format!(r"半|[一二三]刻|[{CN_DIGITS}]+分?|\d{{1,2}}分?");
        let min_ar = format!(r"半|[一二三]刻|\d{{1,2}}分?|[{CN_DIGITS}]+分?");

        let period_cn = Regex::new(&format!(
            r"({alt})\s*([{CN_DIGITS}]+)[點点時时]\s*({min_cn})?"
        ))
        .expect("period_cn pattern");
        let period_ar = Regex::new(&format!(
            r"({alt})\s*(\d{{1,2}})(?:[:：](\d{{2}})|[點点時时]\s*({min_ar})?)?"
        ))
        .expect("period_ar pattern");
        let ampm_pre = Regex::new(r"(?i)\b(am|pm|a\.m\.|p\.m\.)\s*(\d{1,2})(?:[:：](\d{2}))?")
            .expect("ampm_pre pattern");
        let ampm_post = Regex::new(r"(?i)(\d{1,2})(?:[:：](\d{2}))?\s*(am|pm|a\.m\.|p\.m\.)")
            .expect("ampm_post pattern");
        let hhmm = Regex::new(r"([01]?\d|2[0-3])[:：]([0-5]\d)").expect("hhmm pattern");
        let cn_bare = Regex::new(&format!(r"([{CN_DIGITS}]+)[點点時时]\s*({min_cn})?"))
            .expect("cn_bare pattern");
        let ar_bare = Regex::new(&format!(r"(\d{{1,2}})[點点時时]\s*({min_ar})?"))
            .expect("ar_bare pattern");

        Self {
            periods,
            period_cn,
            period_ar,
            ampm_pre,
            ampm_post,
            hhmm,
            cn_bare,
            ar_bare,
        }
    }

    /// Parse a time expression. Returns `None` on no match or an
    /// out-of-range result; never errors.
    pub fn parse(&self, text: &str) -> Option<NaiveTime> {
        self.parse_with(text, ParseOptions::default())
    }

    pub fn parse_with(&self, text: &str, opts: ParseOptions) -> Option<NaiveTime> {
        let token = self.tokenize(text)?;
        self.resolve(token, opts)
    }

    /// First matching pattern wins; period-qualified forms are tried before
    /// bare numerals by construction.
    fn tokenize(&self, text: &str) -> Option<TimeToken> {
        if let Some(caps) = self.period_cn.captures(text) {
            let hour = chinese_numeral(caps.get(2)?.as_str())?;
            let minute = parse_minute(caps.get(3).map(|m| m.as_str()))?;
            return Some(TimeToken {
                hour: Some(hour),
                minute,
                period_hint: Some(caps.get(1)?.as_str().to_string()),
            });
        }
        if let Some(caps) = self.period_ar.captures(text) {
            let hour: u32 = caps.get(2)?.as_str().parse().ok()?;
            let minute = match caps.get(3) {
                Some(m) => m.as_str().parse().ok()?,
                None => parse_minute(caps.get(4).map(|m| m.as_str()))?,
            };
            return Some(TimeToken {
                hour: Some(hour),
                minute,
                period_hint: Some(caps.get(1)?.as_str().to_string()),
            });
        }
        if let Some(caps) = self.ampm_pre.captures(text) {
            let hour: u32 = caps.get(2)?.as_str().parse().ok()?;
            let minute = caps
                .get(3)
                .map(|m| m.as_str().parse().ok())
                .unwrap_or(Some(0))?;
            return Some(TimeToken {
                hour: Some(hour),
                minute,
                period_hint: Some(caps.get(1)?.as_str().to_lowercase()),
            });
        }
        if let Some(caps) = self.ampm_post.captures(text) {
            let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
            let minute = caps
                .get(2)
                .map(|m| m.as_str().parse().ok())
                .unwrap_or(Some(0))?;
            return Some(TimeToken {
                hour: Some(hour),
                minute,
                period_hint: Some(caps.get(3)?.as_str().to_lowercase()),
            });
        }
        if let Some(caps) = self.hhmm.captures(text) {
            let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
            let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
            return Some(TimeToken {
                hour: Some(hour),
                minute,
                period_hint: None,
            });
        }
        if let Some(caps) = self.cn_bare.captures(text) {
            let hour = chinese_numeral(caps.get(1)?.as_str())?;
            let minute = parse_minute(caps.get(2).map(|m| m.as_str()))?;
            return Some(TimeToken {
                hour: Some(hour),
                minute,
                period_hint: None,
            });
        }
        if let Some(caps) = self.ar_bare.captures(text) {
            let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
            let minute = parse_minute(caps.get(2).map(|m| m.as_str()))?;
            return Some(TimeToken {
                hour: Some(hour),
                minute,
                period_hint: None,
            });
        }
        None
    }

    fn resolve(&self, token: TimeToken, opts: ParseOptions) -> Option<NaiveTime> {
        let raw = token.hour?;
        if token.minute >= 60 || raw > 24 {
            return None;
        }
        let hour = match token.period_hint.as_deref() {
            Some(hint) => {
                let rule = self.periods.find(hint)?;
                reconcile(raw, rule)?
            }
            None => {
                if opts.assume_afternoon && (1..=11).contains(&raw) {
                    raw + 12
                } else {
                    raw
                }
            }
        };
        if hour >= 24 {
            return None;
        }
        NaiveTime::from_hms_opt(hour, token.minute, 0)
    }
}

/// Reconcile a raw 12-hour numeral against the inferred period's canonical
/// range: in range as-is, else add 12, else 12 → 0 for midnight-wrapping
/// periods. A raw 24-hour value outside the range is kept as given.
fn reconcile(raw: u32, rule: &PeriodRule) -> Option<u32> {
    if rule.contains(raw) {
        return Some(raw);
    }
    if raw + 12 < 24 && rule.contains(raw + 12) {
        return Some(raw + 12);
    }
    if rule.midnight_wrap && raw == 12 {
        return Some(0);
    }
    if raw < 24 {
        return Some(raw);
    }
    None
}

/// Convert a Chinese numeral (零–九, 十-compounds, 兩) to an integer.
pub(crate) fn chinese_numeral(text: &str) -> Option<u32> {
    fn digit(c: char) -> Option<u32> {
        match c {
            '零' | '〇' => Some(0),
            '一' => Some(1),
            '二' | '兩' | '两' => Some(2),
            '三' => Some(3),
            '四' => Some(4),
            '五' => Some(5),
            '六' => Some(6),
            '七' => Some(7),
            '八' => Some(8),
            '九' => Some(9),
            _ => None,
        }
    }

    let chars: Vec<char> = text.chars().collect();
    match chars.as_slice() {
        [] => None,
        ['十'] => Some(10),
        [c] => digit(*c),
        // Leading 零 as in 零五
        ['零' | '〇', rest @ ..] if !rest.is_empty() => {
            chinese_numeral(&rest.iter().collect::<String>())
        }
        ['十', c] => Some(10 + digit(*c)?),
        [c, '十'] => Some(digit(*c)? * 10),
        [c, '十', u] => Some(digit(*c)? * 10 + digit(*u)?),
        _ => None,
    }
}

/// Parse the minute fragment following the hour marker. `None` fragment means
/// on-the-hour; 半 forces 30; X刻 is a quarter multiple.
fn parse_minute(fragment: Option<&str>) -> Option<u32> {
    let Some(fragment) = fragment else {
        return Some(0);
    };
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return Some(0);
    }
    if fragment == "半" {
        return Some(30);
    }
    if let Some(quarters) = fragment.strip_suffix('刻') {
        return chinese_numeral(quarters).map(|q| q * 15).filter(|m| *m < 60);
    }
    let digits = fragment.strip_suffix('分').unwrap_or(fragment);
    if let Ok(minute) = digits.parse::<u32>() {
        return Some(minute);
    }
    chinese_numeral(digits)
}

/// Resolves date fragments against an injectable "today".
pub struct DateExpressionParser {
    fixed_today: Option<NaiveDate>,
    full: Regex,
    month_day: Regex,
    slash: Regex,
    cn_month_day: Regex,
    weekday: Regex,
}

impl DateExpressionParser {
    pub fn new() -> Self {
        Self {
            fixed_today: None,
            full: Regex::new(r"(\d{4})[年/\-](\d{1,2})[月/\-](\d{1,2})[日號号]?")
                .expect("full date pattern"),
            month_day: Regex::new(r"(\d{1,2})月(\d{1,2})[日號号]?").expect("month_day pattern"),
            slash: Regex::new(r"\b(\d{1,2})/(\d{1,2})\b").expect("slash pattern"),
            cn_month_day: Regex::new(&format!(
                r"([{CN_DIGITS}]{{1,3}})月([{CN_DIGITS}]{{1,3}})[日號号]"
            ))
            .expect("cn_month_day pattern"),
            weekday: Regex::new(r"(下下|這|这|本|下|上)?(?:星期|禮拜|礼拜|週|周)([一二三四五六日天])")
                .expect("weekday pattern"),
        }
    }

    /// Pin "today" for deterministic tests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.fixed_today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Resolve a date reference to a calendar date. Malformed explicit dates
    /// (e.g. 2月30日) resolve to `None` rather than propagating downstream.
    pub fn resolve(&self, text: &str) -> Option<NaiveDate> {
        let today = self.today();

        // Relative day words; the longer 大後天 must be checked before 後天.
        for (word, offset) in [
            ("大後天", 3i64),
            ("大后天", 3),
            ("後天", 2),
            ("后天", 2),
            ("明天", 1),
            ("明日", 1),
            ("今天", 0),
            ("今日", 0),
            ("昨天", -1),
        ] {
            if text.contains(word) {
                return today.checked_add_signed(chrono::Duration::days(offset));
            }
        }

        if let Some(caps) = self.full.captures(text) {
            let year: i32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let day: u32 = caps.get(3)?.as_str().parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }

        for pattern in [&self.month_day, &self.slash] {
            if let Some(caps) = pattern.captures(text) {
                let month: u32 = caps.get(1)?.as_str().parse().ok()?;
                let day: u32 = caps.get(2)?.as_str().parse().ok()?;
                return roll_forward(today, month, day);
            }
        }

        if let Some(caps) = self.cn_month_day.captures(text) {
            let month = chinese_numeral(caps.get(1)?.as_str())?;
            let day = chinese_numeral(caps.get(2)?.as_str())?;
            return roll_forward(today, month, day);
        }

        if let Some(caps) = self.weekday.captures(text) {
            let target = weekday_number(caps.get(2)?.as_str())?;
            let current = today.weekday().number_from_monday();
            let base = ((target + 7 - current) % 7) as i64;
            let offset = match caps.get(1).map(|m| m.as_str()) {
                Some("下下") => base + 14,
                Some("下") => base + 7,
                Some("上") => base - 7,
                _ => base,
            };
            return today.checked_add_signed(chrono::Duration::days(offset));
        }

        None
    }

    /// The bare weekday number mentioned in the text, if any.
    pub fn weekday_of(&self, text: &str) -> Option<u8> {
        let caps = self.weekday.captures(text)?;
        weekday_number(caps.get(2)?.as_str()).map(|w| w as u8)
    }
}

impl Default for DateExpressionParser {
    fn default() -> Self {
        Self::new()
    }
}

/// A month/day without a year schedules forward: if the date already passed
/// this year, it means next year.
fn roll_forward(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(this_year)
    }
}

fn weekday_number(c: &str) -> Option<u32> {
    match c {
        "一" => Some(1),
        "二" => Some(2),
        "三" => Some(3),
        "四" => Some(4),
        "五" => Some(5),
        "六" => Some(6),
        "日" | "天" => Some(7),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> TimeExpressionParser {
        TimeExpressionParser::new(PeriodTable::default())
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_period_with_chinese_numeral() {
        let p = parser();
        assert_eq!(p.parse("下午三點半"), Some(t(15, 30)));
        assert_eq!(p.parse("早上十點"), Some(t(10, 0)));
        assert_eq!(p.parse("晚上八點半"), Some(t(20, 30)));
        assert_eq!(p.parse("中午十二點"), Some(t(12, 0)));
        assert_eq!(p.parse("下午兩點"), Some(t(14, 0)));
    }

    #[test]
    fn test_period_with_arabic_numeral() {
        let p = parser();
        assert_eq!(p.parse("下午3點"), Some(t(15, 0)));
        assert_eq!(p.parse("下午3:30"), Some(t(15, 30)));
        assert_eq!(p.parse("晚上9點15分"), Some(t(21, 15)));
        assert_eq!(p.parse("早上8點"), Some(t(8, 0)));
    }

    #[test]
    fn test_period_qualified_wins_over_bare() {
        // The whole point of the precedence order: the bare "三點" inside a
        // period-qualified expression must not be parsed first.
        let p = parser();
        assert_eq!(p.parse("把課改到下午三點"), Some(t(15, 0)));
    }

    #[test]
    fn test_pure_numeral_forms() {
        let p = parser();
        assert_eq!(p.parse("15:30"), Some(t(15, 30)));
        assert_eq!(p.parse("三點"), Some(t(3, 0)));
        assert_eq!(p.parse("二十一點"), Some(t(21, 0)));
        assert_eq!(p.parse("6點"), Some(t(6, 0)));
    }

    #[test]
    fn test_quarter_marks() {
        let p = parser();
        assert_eq!(p.parse("下午三點一刻"), Some(t(15, 15)));
        assert_eq!(p.parse("下午三點三刻"), Some(t(15, 45)));
    }

    #[test]
    fn test_am_pm_tags() {
        let p = parser();
        assert_eq!(p.parse("3pm"), Some(t(15, 0)));
        assert_eq!(p.parse("10:30am"), Some(t(10, 30)));
        assert_eq!(p.parse("pm 4"), Some(t(16, 0)));
    }

    #[test]
    fn test_midnight_wrap() {
        let p = parser();
        assert_eq!(p.parse("深夜十二點"), Some(t(0, 0)));
        assert_eq!(p.parse("凌晨三點"), Some(t(3, 0)));
    }

    #[test]
    fn test_afternoon_assumption_for_bare_hours() {
        let p = parser();
        let opts = ParseOptions {
            assume_afternoon: true,
        };
        assert_eq!(p.parse_with("6點", opts), Some(t(18, 0)));
        // An explicit period always wins over the assumption.
        assert_eq!(p.parse_with("早上6點", opts), Some(t(6, 0)));
        // Unambiguous 24h values are left alone.
        assert_eq!(p.parse_with("21點", opts), Some(t(21, 0)));
    }

    #[test]
    fn test_no_match_and_out_of_range() {
        let p = parser();
        assert_eq!(p.parse("我們聊聊"), None);
        assert_eq!(p.parse("2小時後"), None);
        assert_eq!(p.parse("99點"), None);
    }

    #[test]
    fn test_chinese_numeral_table() {
        assert_eq!(chinese_numeral("零"), Some(0));
        assert_eq!(chinese_numeral("九"), Some(9));
        assert_eq!(chinese_numeral("十"), Some(10));
        assert_eq!(chinese_numeral("十一"), Some(11));
        assert_eq!(chinese_numeral("二十"), Some(20));
        assert_eq!(chinese_numeral("二十四"), Some(24));
        assert_eq!(chinese_numeral("兩"), Some(2));
        assert_eq!(chinese_numeral("貓"), None);
    }

    // ---- dates ----

    fn dates() -> DateExpressionParser {
        // 2025-03-14 is a Friday.
        DateExpressionParser::new().with_today(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_relative_days() {
        let p = dates();
        assert_eq!(p.resolve("今天有課嗎"), Some(d(2025, 3, 14)));
        assert_eq!(p.resolve("明天下午"), Some(d(2025, 3, 15)));
        assert_eq!(p.resolve("後天"), Some(d(2025, 3, 16)));
        assert_eq!(p.resolve("大後天"), Some(d(2025, 3, 17)));
        assert_eq!(p.resolve("昨天上了什麼"), Some(d(2025, 3, 13)));
    }

    #[test]
    fn test_weekday_resolution() {
        let p = dates();
        // Today is Friday; 星期三 means the coming Wednesday.
        assert_eq!(p.resolve("星期三"), Some(d(2025, 3, 19)));
        assert_eq!(p.resolve("下週三"), Some(d(2025, 3, 26)));
        assert_eq!(p.resolve("星期五"), Some(d(2025, 3, 14)));
        assert_eq!(p.resolve("星期日"), Some(d(2025, 3, 16)));
        assert_eq!(p.resolve("禮拜天"), Some(d(2025, 3, 16)));
    }

    #[test]
    fn test_explicit_dates() {
        let p = dates();
        assert_eq!(p.resolve("2025年4月1日"), Some(d(2025, 4, 1)));
        assert_eq!(p.resolve("4月1日"), Some(d(2025, 4, 1)));
        assert_eq!(p.resolve("4/1"), Some(d(2025, 4, 1)));
        assert_eq!(p.resolve("三月二十日"), Some(d(2025, 3, 20)));
    }

    #[test]
    fn test_passed_date_rolls_to_next_year() {
        let p = dates();
        assert_eq!(p.resolve("1月5日"), Some(d(2026, 1, 5)));
    }

    #[test]
    fn test_malformed_date_is_rejected() {
        let p = dates();
        assert_eq!(p.resolve("2月30日"), None);
        assert_eq!(p.resolve("13月1日"), None);
    }

    #[test]
    fn test_weekday_of() {
        let p = dates();
        assert_eq!(p.weekday_of("每週三的課"), Some(3));
        assert_eq!(p.weekday_of("星期天"), Some(7));
        assert_eq!(p.weekday_of("下午三點"), None);
    }
}
