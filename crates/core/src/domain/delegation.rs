use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

/// A standing, time-bounded handover of decision authority from one user
/// to another. Distinct from per-step delegation, which is a single
/// explicit hop recorded on the step itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: UserId,
    pub delegate: UserId,
    pub active_from: DateTime<Utc>,
    pub active_until: DateTime<Utc>,
}

impl Delegation {
    pub fn new(
        delegator: UserId,
        delegate: UserId,
        active_from: DateTime<Utc>,
        active_until: DateTime<Utc>,
    ) -> Self {
        Self { delegator, delegate, active_from, active_until }
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.active_from <= at && at <= self.active_until
    }
}
