//! The turn pipeline.
//!
//! [`DialogueEngine`] owns one end-to-end turn: acquire the user's context
//! (serializing same-user turns), classify, extract, check completion, then
//! execute or ask for what is missing. [`KeywordFallbackClassifier`] is the
//! deterministic local stand-in for the AI classification capability.

pub mod engine;
pub mod fallback;

pub use engine::{DialogueEngine, EngineBuilder, TurnOutcome};
pub use fallback::{KeywordFallbackClassifier, ResilientIntentModel};
