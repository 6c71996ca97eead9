//! Thresholds, TTLs, timeouts and feature toggles.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Confidence thresholds gating the AI-assisted paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum model confidence to accept an AI intent classification.
    pub ai_intent_accept: f32,
    /// Rule-extraction confidence below which AI slot assistance runs.
    pub ai_assist_below: f32,
    /// Final confidence below which the turn is queued for offline review.
    pub review_below: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ai_intent_accept: 0.65,
            ai_assist_below: 0.5,
            review_below: 0.4,
        }
    }
}

/// TTL windows. Expired state is treated as absent, not as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlSettings {
    /// How long a pending task may wait for supplement input.
    pub pending_input_secs: u64,
    /// Idle window after which the whole conversation context expires.
    pub context_secs: u64,
    /// Lifetime of a query-session pin.
    pub query_session_secs: u64,
}

impl Default for TtlSettings {
    fn default() -> Self {
        Self {
            pending_input_secs: 120,
            context_secs: 1800,
            query_session_secs: 600,
        }
    }
}

impl TtlSettings {
    pub fn pending_input(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pending_input_secs as i64)
    }

    pub fn context(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.context_secs as i64)
    }

    pub fn query_session(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.query_session_secs as i64)
    }
}

/// Bounded timeouts around potentially-blocking capability calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub ai_ms: u64,
    pub execution_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            ai_ms: 2_500,
            execution_ms: 10_000,
        }
    }
}

impl TimeoutSettings {
    pub fn ai(&self) -> Duration {
        Duration::from_millis(self.ai_ms)
    }

    pub fn execution(&self) -> Duration {
        Duration::from_millis(self.execution_ms)
    }
}

/// Explicit feature toggles, passed into the classifier/extractor
/// constructors instead of being read from process-wide environment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    /// Defer to the AI classifier when rule scoring yields nothing.
    pub ai_fallback: bool,
    /// Invoke AI slot extraction on low confidence or missing fields.
    pub ai_slot_assist: bool,
    /// Recognize 每天/每日 recurrence. Off by default.
    pub daily_recurrence: bool,
    /// Resolve an ambiguous bare hour to the afternoon when the utterance is
    /// a modify request. Observed legacy behavior; tunable, not a law.
    pub prefer_afternoon_for_bare_hours: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            ai_fallback: true,
            ai_slot_assist: true,
            daily_recurrence: false,
            prefer_afternoon_for_bare_hours: true,
        }
    }
}

/// Top-level settings object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NluSettings {
    pub thresholds: Thresholds,
    pub ttl: TtlSettings,
    pub toggles: FeatureToggles,
    pub timeouts: TimeoutSettings,
    /// Default course length used to compose the end timestamp.
    pub default_course_minutes: u32,
    /// Capacity of the low-confidence review queue.
    pub review_queue_depth: usize,
    /// Capacity of the execution-history ring buffer.
    pub execution_history_depth: usize,
}

impl Default for NluSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            ttl: TtlSettings::default(),
            toggles: FeatureToggles::default(),
            timeouts: TimeoutSettings::default(),
            default_course_minutes: 60,
            review_queue_depth: 64,
            execution_history_depth: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = NluSettings::default();
        assert_eq!(settings.thresholds.ai_intent_accept, 0.65);
        assert_eq!(settings.ttl.pending_input_secs, 120);
        assert_eq!(settings.ttl.context_secs, 1800);
        assert!(settings.toggles.ai_fallback);
        assert!(!settings.toggles.daily_recurrence);
        assert_eq!(settings.default_course_minutes, 60);
    }

    #[test]
    fn test_ttl_durations() {
        let ttl = TtlSettings::default();
        assert_eq!(ttl.pending_input(), chrono::Duration::seconds(120));
        assert_eq!(ttl.context(), chrono::Duration::minutes(30));
    }
}
