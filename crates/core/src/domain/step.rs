use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Approve,
    Reject,
    RequestInfo,
    Delegate,
    Skip,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::Approve => "approve",
            StepAction::Reject => "reject",
            StepAction::RequestInfo => "request_info",
            StepAction::Delegate => "delegate",
            StepAction::Skip => "skip",
        }
    }
}

/// One approver's slot in a request's chain, keyed by
/// `(request_id, step_order)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub request_id: RequestId,
    pub step_order: u32,
    pub nominal_approver: UserId,
    /// The user who actually responded; differs from `nominal_approver`
    /// when an active delegate acted on the step.
    pub effective_approver: Option<UserId>,
    pub action: Option<StepAction>,
    pub comments: String,
    pub assigned_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub is_current: bool,
    /// Every user who has held this step before the present nominal
    /// approver, via per-step delegation or escalation. Guards against
    /// delegation ping-pong.
    pub prior_approvers: Vec<UserId>,
    pub state_version: u32,
}

impl ApprovalStep {
    pub fn new(
        request_id: RequestId,
        step_order: u32,
        nominal_approver: UserId,
        assigned_at: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
        is_current: bool,
    ) -> Self {
        Self {
            request_id,
            step_order,
            nominal_approver,
            effective_approver: None,
            action: None,
            comments: String::new(),
            assigned_at,
            responded_at: None,
            deadline,
            is_completed: false,
            is_current,
            prior_approvers: Vec::new(),
            state_version: 1,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.is_current && !self.is_completed
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_actionable() && self.deadline.is_some_and(|deadline| deadline < now)
    }
}
