//! Local keyword fallback for the AI classification capability.
//!
//! The capability contract requires degrading to a local keyword-based
//! classifier when the external model is unreachable — a failure there must
//! never propagate to the caller.

use async_trait::async_trait;
use coursebot_core::{CapabilityError, IntentModel, IntentPrediction};
use std::sync::Arc;

/// Phrasings the rule tables do not cover, mapped to intent tags. Matching
/// is containment over the raw text; the longest hit wins.
const FALLBACK_KEYWORDS: &[(&str, &[&str])] = &[
    ("add_course", &["想上課", "報名", "补习", "補習", "加一堂"]),
    ("query_schedule", &["幾點上課", "什麼時候上課", "有課嗎", "課排在"]),
    ("cancel_course", &["不用上", "暫停", "暂停", "先停掉"]),
    ("set_reminder", &["記得", "记得", "叫我", "通知我", "別忘了", "别忘了"]),
    ("record_content", &["寫下", "写下", "做個筆記", "做个笔记"]),
];

/// Deterministic keyword classifier; always answers, never errors.
#[derive(Debug, Default, Clone)]
pub struct KeywordFallbackClassifier;

impl KeywordFallbackClassifier {
    pub fn new() -> Self {
        Self
    }

    fn best_match(text: &str) -> Option<(&'static str, usize)> {
        let mut best: Option<(&'static str, usize)> = None;
        for (intent, keywords) in FALLBACK_KEYWORDS {
            for keyword in *keywords {
                if text.contains(keyword) {
                    let len = keyword.chars().count();
                    if best.map(|(_, l)| len > l).unwrap_or(true) {
                        best = Some((intent, len));
                    }
                }
            }
        }
        best
    }
}

#[async_trait]
impl IntentModel for KeywordFallbackClassifier {
    async fn classify(&self, text: &str) -> Result<IntentPrediction, CapabilityError> {
        match Self::best_match(text) {
            Some((intent, _)) => Ok(IntentPrediction {
                intent: intent.to_string(),
                confidence: 0.7,
            }),
            None => Ok(IntentPrediction {
                intent: "unknown".to_string(),
                confidence: 0.0,
            }),
        }
    }
}

/// Wraps an external classification capability with the local fallback: a
/// primary failure degrades, it never propagates.
pub struct ResilientIntentModel {
    primary: Arc<dyn IntentModel>,
    fallback: KeywordFallbackClassifier,
}

impl ResilientIntentModel {
    pub fn new(primary: Arc<dyn IntentModel>) -> Self {
        Self {
            primary,
            fallback: KeywordFallbackClassifier::new(),
        }
    }
}

#[async_trait]
impl IntentModel for ResilientIntentModel {
    async fn classify(&self, text: &str) -> Result<IntentPrediction, CapabilityError> {
        match self.primary.classify(text).await {
            Ok(prediction) => Ok(prediction),
            Err(err) => {
                tracing::warn!(%err, "AI classifier failed; using keyword fallback");
                self.fallback.classify(text).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_hits() {
        let fallback = KeywordFallbackClassifier::new();
        let prediction = fallback.classify("明天記得叫我複習").await.unwrap();
        assert_eq!(prediction.intent, "set_reminder");
        assert!(prediction.confidence >= 0.7);
    }

    #[tokio::test]
    async fn test_no_hit_is_unknown() {
        let fallback = KeywordFallbackClassifier::new();
        let prediction = fallback.classify("嗚啦啦").await.unwrap();
        assert_eq!(prediction.intent, "unknown");
        assert_eq!(prediction.confidence, 0.0);
    }

    struct BrokenModel;

    #[async_trait]
    impl IntentModel for BrokenModel {
        async fn classify(&self, _text: &str) -> Result<IntentPrediction, CapabilityError> {
            Err(CapabilityError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_resilient_wrapper_degrades() {
        let model = ResilientIntentModel::new(Arc::new(BrokenModel));
        let prediction = model.classify("記得叫我複習").await.unwrap();
        assert_eq!(prediction.intent, "set_reminder");
    }
}
