use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::definition::DefinitionId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled | Self::Expired)
    }
}

/// Opaque reference to the external artifact being approved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: String,
    pub object_id: String,
}

impl SubjectRef {
    pub fn new(kind: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self { kind: kind.into(), object_id: object_id.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub definition_id: DefinitionId,
    pub definition_version: u32,
    pub requester: UserId,
    pub subject: SubjectRef,
    pub title: String,
    pub description: String,
    pub justification: String,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_urgent: bool,
    /// 1 (lowest) to 5 (highest).
    pub priority_level: u8,
    pub state_version: u32,
}

impl ApprovalRequest {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the request into a terminal status. Fails if it is already
    /// terminal; callers must invoke this inside the store's critical
    /// section so the first writer wins.
    pub(crate) fn complete(
        &mut self,
        status: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RequestStatus> {
        if self.status.is_terminal() {
            return Err(self.status);
        }
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(now);
        self.state_version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ApprovalRequest, RequestId, RequestStatus, SubjectRef};
    use crate::domain::definition::DefinitionId;
    use crate::domain::user::UserId;

    fn request(status: RequestStatus) -> ApprovalRequest {
        ApprovalRequest {
            id: RequestId::generate(),
            definition_id: DefinitionId::new("credit-message"),
            definition_version: 1,
            requester: UserId::new("u-requester"),
            subject: SubjectRef::new("message", "msg-17"),
            title: "Outgoing credit message".to_string(),
            description: String::new(),
            justification: String::new(),
            amount: None,
            currency: "SAR".to_string(),
            status,
            created_at: Utc::now(),
            deadline: None,
            completed_at: None,
            is_urgent: false,
            priority_level: 3,
            state_version: 1,
        }
    }

    #[test]
    fn terminal_statuses_are_classified() {
        for status in [
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
            RequestStatus::Expired,
        ] {
            assert!(status.is_terminal());
        }
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::InProgress.is_terminal());
    }

    #[test]
    fn complete_sets_completed_at_and_bumps_version() {
        let mut req = request(RequestStatus::InProgress);
        let now = Utc::now();
        req.complete(RequestStatus::Approved, now).expect("first completion wins");

        assert_eq!(req.status, RequestStatus::Approved);
        assert_eq!(req.completed_at, Some(now));
        assert_eq!(req.state_version, 2);
    }

    #[test]
    fn complete_refuses_second_terminal_transition() {
        let mut req = request(RequestStatus::InProgress);
        let now = Utc::now();
        req.complete(RequestStatus::Cancelled, now).expect("first completion wins");

        let lost = req.complete(RequestStatus::Approved, now);
        assert_eq!(lost, Err(RequestStatus::Cancelled));
        assert_eq!(req.status, RequestStatus::Cancelled);
    }
}
