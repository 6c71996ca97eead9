//! Per-turn extraction output.

use crate::slots::SlotSet;
use serde::{Deserialize, Serialize};

/// Result of running slot extraction over one utterance.
///
/// Produced fresh per turn and never persisted directly; only the validated
/// [`SlotSet`] may be attached to a pending task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Extracted, validated slots.
    pub slots: SlotSet,
    /// Fill-rate confidence in `[0, 1]`, penalized for quality defects.
    pub confidence: f32,
    /// Human-readable notes on defects found during extraction, for review
    /// logging and tests. Never shown to the user.
    pub issues: Vec<String>,
    /// When several plausible student names were found, they are listed here
    /// instead of one being guessed into the slots, so the caller can ask
    /// the user to pick.
    #[serde(default)]
    pub student_candidates: Vec<String>,
}

impl ExtractionResult {
    pub fn new(slots: SlotSet, confidence: f32) -> Self {
        Self {
            slots,
            confidence: confidence.clamp(0.0, 1.0),
            issues: Vec::new(),
            student_candidates: Vec::new(),
        }
    }

    pub fn note(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }
}
