use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::request::{ApprovalRequest, RequestId, RequestStatus};
use crate::domain::step::ApprovalStep;
use crate::domain::user::UserId;
use crate::errors::EngineError;

/// Arena of requests and steps addressed by stable identifiers.
///
/// The inner mutex is the engine's single serialization point: every
/// mutating operation — interactive or escalation sweep — runs as one
/// read-modify-write inside it, so two callers racing on the same step or
/// on a request's terminal transition always produce exactly one effective
/// change and one typed error for the loser.
#[derive(Clone, Default)]
pub struct RequestStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
pub(crate) struct StoreState {
    pub(crate) requests: HashMap<RequestId, ApprovalRequest>,
    pub(crate) steps: BTreeMap<(RequestId, u32), ApprovalStep>,
}

impl StoreState {
    pub(crate) fn request_mut(
        &mut self,
        id: &RequestId,
    ) -> Result<&mut ApprovalRequest, EngineError> {
        self.requests.get_mut(id).ok_or_else(|| EngineError::RequestNotFound(id.clone()))
    }

    pub(crate) fn step_mut(
        &mut self,
        id: &RequestId,
        step_order: u32,
    ) -> Result<&mut ApprovalStep, EngineError> {
        self.steps.get_mut(&(id.clone(), step_order)).ok_or_else(|| EngineError::StepNotFound {
            request_id: id.clone(),
            step_order,
        })
    }

    pub(crate) fn step_orders_of(&self, id: &RequestId) -> Vec<u32> {
        self.steps.range((id.clone(), 0)..=(id.clone(), u32::MAX)).map(|((_, order), _)| *order).collect()
    }

    /// Marks every still-current step of a request moot. Used when the
    /// request reaches a terminal status; moot steps are not completed.
    pub(crate) fn deactivate_current_steps(&mut self, id: &RequestId) {
        for order in self.step_orders_of(id) {
            if let Some(step) = self.steps.get_mut(&(id.clone(), order)) {
                if step.is_current {
                    step.is_current = false;
                    step.state_version += 1;
                }
            }
        }
    }
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one atomic read-modify-write against the arena.
    pub(crate) fn with_state<R>(&self, mutate: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut state = self.lock();
        mutate(&mut state)
    }

    /// Atomically materializes a request together with its step chain.
    pub fn insert_request(&self, request: ApprovalRequest, steps: Vec<ApprovalStep>) {
        let mut state = self.lock();
        for step in steps {
            state.steps.insert((step.request_id.clone(), step.step_order), step);
        }
        state.requests.insert(request.id.clone(), request);
    }

    pub fn get_request(&self, id: &RequestId) -> Result<ApprovalRequest, EngineError> {
        let state = self.lock();
        state.requests.get(id).cloned().ok_or_else(|| EngineError::RequestNotFound(id.clone()))
    }

    pub fn get_step(&self, id: &RequestId, step_order: u32) -> Result<ApprovalStep, EngineError> {
        let state = self.lock();
        state.steps.get(&(id.clone(), step_order)).cloned().ok_or_else(|| {
            EngineError::StepNotFound { request_id: id.clone(), step_order }
        })
    }

    /// Steps of one request in chain order.
    pub fn steps_for_request(&self, id: &RequestId) -> Vec<ApprovalStep> {
        let state = self.lock();
        state
            .steps
            .range((id.clone(), 0)..=(id.clone(), u32::MAX))
            .map(|(_, step)| step.clone())
            .collect()
    }

    pub fn requests_by_requester(&self, requester: &UserId) -> Vec<ApprovalRequest> {
        let state = self.lock();
        let mut requests: Vec<ApprovalRequest> = state
            .requests
            .values()
            .filter(|request| &request.requester == requester)
            .cloned()
            .collect();
        requests.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        requests
    }

    pub fn requests_with_status(&self, status: RequestStatus) -> Vec<ApprovalRequest> {
        let state = self.lock();
        state.requests.values().filter(|request| request.status == status).cloned().collect()
    }

    /// Current, incomplete steps across all open requests.
    pub fn actionable_steps(&self) -> Vec<ApprovalStep> {
        let state = self.lock();
        state.steps.values().filter(|step| step.is_actionable()).cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        match self.inner.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
