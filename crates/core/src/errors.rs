use thiserror::Error;

use crate::domain::definition::DefinitionId;
use crate::domain::request::{RequestId, RequestStatus};
use crate::domain::user::UserId;

/// Every failure the engine reports to a caller. Errors are returned as
/// typed results; the engine never retries a human decision and never
/// leaves data partially mutated.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("approval request not found: {0}")]
    RequestNotFound(RequestId),
    #[error("step {step_order} not found for request {request_id}")]
    StepNotFound { request_id: RequestId, step_order: u32 },
    #[error("workflow definition not found: {0}")]
    DefinitionNotFound(DefinitionId),
    #[error("actor `{actor}` is not authorized: {reason}")]
    Unauthorized { actor: UserId, reason: String },
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// Lost race on the same step. An expected concurrent outcome, not a
    /// caller bug, which is why it is distinct from `InvalidTransition`.
    #[error("step {step_order} of request {request_id} was already completed")]
    AlreadyCompleted { request_id: RequestId, step_order: u32 },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("delegation chain revisits `{user}`")]
    CyclicDelegation { user: UserId },
    #[error("directory lookup failed: {0}")]
    Directory(String),
}

impl EngineError {
    pub fn terminal_request(request_id: &RequestId, status: RequestStatus) -> Self {
        Self::InvalidTransition(format!(
            "request {request_id} is already terminal ({status:?})"
        ))
    }

    /// Stable machine-readable class for audit metadata and CLI output.
    pub fn class(&self) -> &'static str {
        match self {
            Self::RequestNotFound(_) | Self::StepNotFound { .. } | Self::DefinitionNotFound(_) => {
                "not_found"
            }
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::AlreadyCompleted { .. } => "already_completed",
            Self::Validation(_) => "validation",
            Self::CyclicDelegation { .. } => "cyclic_delegation",
            Self::Directory(_) => "directory",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EngineError;
    use crate::domain::request::{RequestId, RequestStatus};
    use crate::domain::user::UserId;

    #[test]
    fn already_completed_is_distinct_from_invalid_transition() {
        let request_id = RequestId::generate();
        let lost_race = EngineError::AlreadyCompleted { request_id: request_id.clone(), step_order: 1 };
        let terminal = EngineError::terminal_request(&request_id, RequestStatus::Approved);

        assert_eq!(lost_race.class(), "already_completed");
        assert_eq!(terminal.class(), "invalid_transition");
        assert_ne!(lost_race, terminal);
    }

    #[test]
    fn error_messages_name_the_offender() {
        let error = EngineError::Unauthorized {
            actor: UserId::new("u-intruder"),
            reason: "not the nominal approver or an active delegate".to_string(),
        };
        assert!(error.to_string().contains("u-intruder"));
    }
}
