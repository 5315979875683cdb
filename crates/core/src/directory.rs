use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::delegation::Delegation;
use crate::domain::user::{DepartmentId, UserId};
use crate::errors::EngineError;

/// Read-only view of the organizational directory. The engine consumes
/// this at its boundary; how the hierarchy is stored is someone else's
/// problem.
pub trait DirectoryClient: Send + Sync {
    /// Managers of `user` from nearest upward, filtered to those at or
    /// above `min_level`.
    fn resolve_manager_chain(
        &self,
        user: &UserId,
        min_level: u8,
    ) -> Result<Vec<UserId>, EngineError>;

    /// Standing delegations where `user` is the delegator.
    fn standing_delegations(&self, user: &UserId) -> Result<Vec<Delegation>, EngineError>;

    /// Direct manager, used as the escalation fallback.
    fn manager_of(&self, user: &UserId) -> Result<Option<UserId>, EngineError>;

    fn department_of(&self, user: &UserId) -> Result<Option<DepartmentId>, EngineError>;
}

#[derive(Clone, Debug)]
pub struct DirectoryUser {
    pub id: UserId,
    pub manager: Option<UserId>,
    pub permission_level: u8,
    pub department: Option<DepartmentId>,
}

/// In-memory directory for tests, demos, and local operation.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    inner: Arc<Mutex<DirectoryState>>,
}

#[derive(Default)]
struct DirectoryState {
    users: HashMap<UserId, DirectoryUser>,
    delegations: Vec<Delegation>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: DirectoryUser) {
        let mut state = self.lock();
        state.users.insert(user.id.clone(), user);
    }

    pub fn add_delegation(&self, delegation: Delegation) {
        self.lock().delegations.push(delegation);
    }

    pub fn clear_delegations(&self) {
        self.lock().delegations.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        match self.inner.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl DirectoryClient for InMemoryDirectory {
    fn resolve_manager_chain(
        &self,
        user: &UserId,
        min_level: u8,
    ) -> Result<Vec<UserId>, EngineError> {
        let state = self.lock();
        let mut chain = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let mut current = user.clone();

        while visited.insert(current.clone()) {
            let Some(entry) = state.users.get(&current) else { break };
            let Some(manager_id) = entry.manager.clone() else { break };
            if let Some(manager) = state.users.get(&manager_id) {
                if manager.permission_level >= min_level {
                    chain.push(manager_id.clone());
                }
            }
            current = manager_id;
        }

        Ok(chain)
    }

    fn standing_delegations(&self, user: &UserId) -> Result<Vec<Delegation>, EngineError> {
        let state = self.lock();
        Ok(state
            .delegations
            .iter()
            .filter(|delegation| &delegation.delegator == user)
            .cloned()
            .collect())
    }

    fn manager_of(&self, user: &UserId) -> Result<Option<UserId>, EngineError> {
        let state = self.lock();
        let entry = state
            .users
            .get(user)
            .ok_or_else(|| EngineError::Directory(format!("unknown user `{user}`")))?;
        Ok(entry.manager.clone())
    }

    fn department_of(&self, user: &UserId) -> Result<Option<DepartmentId>, EngineError> {
        let state = self.lock();
        Ok(state.users.get(user).and_then(|entry| entry.department.clone()))
    }
}
