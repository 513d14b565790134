use thiserror::Error;

use crate::domain::step::StepStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid step transition from {from:?} to {to:?}")]
    InvalidStepTransition { from: StepStatus, to: StepStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Validate a step transition before it is attempted against storage.
///
/// Steps resolve exactly once: only PENDING may move, and only to a resolved
/// status. The storage-level compare-and-set enforces the same rule under
/// concurrency; this check exists so pure callers fail early with a typed
/// error instead of a zero-row update.
pub fn validate_step_transition(from: StepStatus, to: StepStatus) -> Result<(), DomainError> {
    match (from, to) {
        (StepStatus::Pending, to) if to.is_resolved() => Ok(()),
        (from, to) => Err(DomainError::InvalidStepTransition { from, to }),
    }
}
