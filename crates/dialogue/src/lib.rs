//! Per-user conversation state and task triggering.
//!
//! [`ConversationState`] owns every [`ConversationContext`]; no other
//! component mutates one except through a guard acquired here, which also
//! serializes concurrent turns for the same user. Completion predicates and
//! the slot-to-task mapping live alongside because they operate on the same
//! pending-task lifecycle: idle → awaiting-input → fulfilled / expired /
//! cancelled / execution-failed.

pub mod completion;
pub mod context;
pub mod store;
pub mod trigger;

pub use completion::{expected_fields, is_complete, missing_fields, slot_input_for};
pub use context::{
    ActionRecord, ChangeSource, ConversationContext, MentionedEntities, PendingStatus,
    PendingTask, QuerySession, StateChange,
};
pub use store::ConversationState;
pub use trigger::{ExecutionRecord, ExecutionStats, IntentStats, TaskTrigger, TriggerResult};
