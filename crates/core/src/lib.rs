//! Core types and capability traits for the course assistant NLU pipeline.
//!
//! This crate has no internal dependencies. It defines:
//! - The intent taxonomy ([`Intent`], [`SlotInputType`])
//! - The typed slot model ([`SlotKey`], [`SlotValue`], [`SlotSet`])
//! - Per-turn extraction output ([`ExtractionResult`])
//! - Capability traits for the external collaborators (AI classification,
//!   AI slot extraction, task execution, conversation persistence)
//! - The error taxonomy shared across the pipeline
//!
//! Domain-specific heuristics (regex rules, numeral tables, thresholds) live
//! in the `config` and `nlu` crates; nothing here matches text.

pub mod capabilities;
pub mod error;
pub mod extraction;
pub mod intent;
pub mod slots;

pub use capabilities::{
    ContextStore, IntentModel, IntentPrediction, SlotModel, TaskEntities, TaskExecution,
    TaskOutcome, TaskRequest,
};
pub use error::CapabilityError;
pub use extraction::ExtractionResult;
pub use intent::{Intent, SlotInputType};
pub use slots::{RecurrenceKind, SlotKey, SlotKind, SlotSet, SlotValue};
