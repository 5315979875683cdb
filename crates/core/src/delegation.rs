use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::directory::DirectoryClient;
use crate::domain::user::UserId;
use crate::errors::EngineError;

/// Resolves who currently holds a nominal approver's authority.
///
/// Resolution is pure and never cached: delegation windows are
/// time-bounded, so the answer must reflect the supplied instant.
#[derive(Clone, Copy, Debug)]
pub struct DelegationResolver {
    hop_limit: usize,
}

impl DelegationResolver {
    pub fn new(hop_limit: usize) -> Self {
        Self { hop_limit }
    }

    /// Follows standing delegations from `nominal` until no active
    /// delegation remains. A chain that revisits a user fails with
    /// `CyclicDelegation`; a chain longer than the hop limit stops at the
    /// last user reached.
    pub fn resolve_active_approver(
        &self,
        directory: &dyn DirectoryClient,
        nominal: &UserId,
        at: DateTime<Utc>,
    ) -> Result<UserId, EngineError> {
        let mut visited: HashSet<UserId> = HashSet::new();
        visited.insert(nominal.clone());
        let mut current = nominal.clone();

        for _ in 0..self.hop_limit {
            let delegations = directory.standing_delegations(&current)?;
            let Some(active) =
                delegations.iter().find(|delegation| delegation.is_active_at(at))
            else {
                return Ok(current);
            };

            let next = active.delegate.clone();
            if !visited.insert(next.clone()) {
                return Err(EngineError::CyclicDelegation { user: next });
            }
            current = next;
        }

        // Hop limit reached without a cycle: bounded stop.
        Ok(current)
    }
}
