//! Error taxonomy.
//!
//! Parse failures are not errors: a component that cannot extract a value
//! resolves to `None` so the pipeline degrades to asking for the field. The
//! types here cover the failures that *do* cross component boundaries.

use std::time::Duration;
use thiserror::Error;

/// Failure of an external capability (AI classifier/extractor, task
/// execution, persistence). Caught at the call site, logged, and replaced by
/// the rule-based result; never surfaced to the user as-is.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability timed out after {0:?}")]
    Timeout(Duration),

    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("malformed capability response: {0}")]
    MalformedResponse(String),
}
