use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::config::EngineConfig;
use crate::definitions::DefinitionStore;
use crate::delegation::DelegationResolver;
use crate::directory::DirectoryClient;
use crate::domain::definition::WorkflowDefinition;
use crate::domain::request::{ApprovalRequest, RequestId, RequestStatus};
use crate::domain::step::{ApprovalStep, StepAction};
use crate::domain::user::UserId;
use crate::errors::EngineError;
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::store::RequestStore;

/// The state-machine core: builds step chains, applies responses and
/// per-step delegation, and computes request completion.
///
/// All mutation happens inside the store's critical section; audit events
/// and notifications are collected there and emitted after the lock is
/// released, so observational failures can never roll back a transition.
#[derive(Clone)]
pub struct StepScheduler {
    store: RequestStore,
    definitions: DefinitionStore,
    directory: Arc<dyn DirectoryClient>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
    resolver: DelegationResolver,
    config: EngineConfig,
}

/// Side effects gathered during a critical section, flushed afterwards.
#[derive(Default)]
pub(crate) struct Effects {
    pub(crate) audit: Vec<AuditEvent>,
    pub(crate) notifications: Vec<Notification>,
}

impl StepScheduler {
    pub fn new(
        store: RequestStore,
        definitions: DefinitionStore,
        directory: Arc<dyn DirectoryClient>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        let resolver = DelegationResolver::new(config.delegation_hop_limit);
        Self { store, definitions, directory, audit, notifier, resolver, config }
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn flush(&self, effects: Effects) {
        for event in effects.audit {
            self.audit.emit(event);
        }
        for notification in effects.notifications {
            self.notifier.notify(notification);
        }
    }

    /// Materializes the step chain for a new request. Sequential mode
    /// activates only step 1; threshold mode opens every step at once
    /// with independent deadlines.
    pub fn build_steps(
        &self,
        definition: &WorkflowDefinition,
        request: &ApprovalRequest,
        approver_chain: &[UserId],
        now: DateTime<Utc>,
    ) -> Vec<ApprovalStep> {
        let deadline = self.step_deadline(request, now);
        approver_chain
            .iter()
            .enumerate()
            .map(|(index, approver)| {
                let order = index as u32 + 1;
                let is_current = !definition.sequential || order == 1;
                ApprovalStep::new(
                    request.id.clone(),
                    order,
                    approver.clone(),
                    now,
                    is_current.then_some(deadline),
                    is_current,
                )
            })
            .collect()
    }

    /// Applies one approver's decision to a step and advances the owning
    /// request per the definition's mode.
    pub fn respond_to_step(
        &self,
        request_id: &RequestId,
        step_order: u32,
        actor: &UserId,
        action: StepAction,
        comments: impl Into<String>,
    ) -> Result<ApprovalStep, EngineError> {
        if action == StepAction::Delegate {
            return Err(EngineError::Validation(
                "delegation goes through delegate_step, not respond_to_step".to_string(),
            ));
        }

        let now = Utc::now();
        let comments = comments.into();
        let snapshot = self.store.get_request(request_id)?;
        let definition =
            self.definitions.get_version(&snapshot.definition_id, snapshot.definition_version)?;
        self.respond_with_definition(request_id, step_order, actor, action, comments, &definition, now)
    }

    /// Same as `respond_to_step` but with the pinned definition already
    /// resolved, so callers that need a fixed clock can supply one.
    pub(crate) fn respond_with_definition(
        &self,
        request_id: &RequestId,
        step_order: u32,
        actor: &UserId,
        action: StepAction,
        comments: String,
        definition: &WorkflowDefinition,
        now: DateTime<Utc>,
    ) -> Result<ApprovalStep, EngineError> {
        let mut effects = Effects::default();
        let directory = Arc::clone(&self.directory);
        let resolver = self.resolver;
        let step_deadline_secs = self.config.default_step_deadline_secs;

        let result = self.store.with_state(|state| {
            let request = state.request_mut(request_id)?;
            if request.is_terminal() {
                return Err(EngineError::terminal_request(request_id, request.status));
            }
            let request_deadline = request.deadline;
            let requester = request.requester.clone();

            let step = state.step_mut(request_id, step_order)?;
            if step.is_completed {
                return Err(EngineError::AlreadyCompleted {
                    request_id: request_id.clone(),
                    step_order,
                });
            }
            if !step.is_current {
                return Err(EngineError::InvalidTransition(format!(
                    "step {step_order} of request {request_id} is not current"
                )));
            }

            let nominal = step.nominal_approver.clone();
            if actor != &nominal {
                let resolved =
                    resolver.resolve_active_approver(directory.as_ref(), &nominal, now)?;
                if actor != &resolved {
                    return Err(EngineError::Unauthorized {
                        actor: actor.clone(),
                        reason: format!(
                            "not the nominal approver `{nominal}` or an active delegate"
                        ),
                    });
                }
            }

            // The claim: first writer flips is_completed, later callers
            // hit the AlreadyCompleted arm above.
            step.action = Some(action);
            step.comments = comments.clone();
            step.effective_approver = Some(actor.clone());
            step.responded_at = Some(now);
            step.is_completed = true;
            step.is_current = false;
            step.state_version += 1;
            let completed = step.clone();

            effects.audit.push(
                AuditEvent::new(
                    Some(request_id.clone()),
                    Some(step_order),
                    "step.responded",
                    AuditCategory::Step,
                    actor.0.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("action", action.as_str()),
            );

            match action {
                StepAction::Reject => {
                    let request = state.request_mut(request_id)?;
                    // Cannot lose: terminal status was checked in this
                    // same critical section.
                    let _ = request.complete(RequestStatus::Rejected, now);
                    state.deactivate_current_steps(request_id);
                    effects.audit.push(AuditEvent::new(
                        Some(request_id.clone()),
                        None,
                        "request.rejected",
                        AuditCategory::Request,
                        actor.0.clone(),
                        AuditOutcome::Success,
                    ));
                    effects.notifications.push(Notification::new(
                        NotificationKind::RequestRejected,
                        request_id.clone(),
                        None,
                        requester,
                    ));
                }
                StepAction::Approve if definition.sequential => {
                    let next_order = step_order + 1;
                    if state.step_orders_of(request_id).contains(&next_order) {
                        let deadline = request_deadline.unwrap_or_else(|| {
                            now + Duration::seconds(step_deadline_secs)
                        });
                        let next = state.step_mut(request_id, next_order)?;
                        next.is_current = true;
                        next.deadline = Some(deadline);
                        next.state_version += 1;
                        let next_approver = next.nominal_approver.clone();
                        effects.notifications.push(Notification::new(
                            NotificationKind::StepActivated,
                            request_id.clone(),
                            Some(next_order),
                            next_approver,
                        ));
                    } else {
                        let request = state.request_mut(request_id)?;
                        let _ = request.complete(RequestStatus::Approved, now);
                        effects.audit.push(AuditEvent::new(
                            Some(request_id.clone()),
                            None,
                            "request.approved",
                            AuditCategory::Request,
                            actor.0.clone(),
                            AuditOutcome::Success,
                        ));
                        effects.notifications.push(Notification::new(
                            NotificationKind::RequestApproved,
                            request_id.clone(),
                            None,
                            requester,
                        ));
                    }
                }
                StepAction::Approve => {
                    let approvals = state
                        .step_orders_of(request_id)
                        .into_iter()
                        .filter_map(|order| state.steps.get(&(request_id.clone(), order)))
                        .filter(|step| {
                            step.is_completed && step.action == Some(StepAction::Approve)
                        })
                        .count() as u32;
                    if approvals >= definition.minimum_approvers {
                        let request = state.request_mut(request_id)?;
                        let _ = request.complete(RequestStatus::Approved, now);
                        state.deactivate_current_steps(request_id);
                        effects.audit.push(AuditEvent::new(
                            Some(request_id.clone()),
                            None,
                            "request.approved",
                            AuditCategory::Request,
                            actor.0.clone(),
                            AuditOutcome::Success,
                        ));
                        effects.notifications.push(Notification::new(
                            NotificationKind::RequestApproved,
                            request_id.clone(),
                            None,
                            requester,
                        ));
                    }
                }
                StepAction::RequestInfo => {
                    effects.notifications.push(Notification::new(
                        NotificationKind::InfoRequested,
                        request_id.clone(),
                        Some(step_order),
                        requester,
                    ));
                }
                StepAction::Skip => {}
                StepAction::Delegate => unreachable!("rejected before the critical section"),
            }

            Ok(completed)
        });

        self.flush(effects);
        result
    }

    /// One explicit delegation hop: the current nominal approver hands
    /// the step to someone else. Standing delegations are not consulted
    /// here; this bounds per-step chains to one hop per call.
    pub fn delegate_step(
        &self,
        request_id: &RequestId,
        step_order: u32,
        from_approver: &UserId,
        to_approver: &UserId,
    ) -> Result<ApprovalStep, EngineError> {
        let now = Utc::now();
        let mut effects = Effects::default();

        let result = self.store.with_state(|state| {
            let request = state.request_mut(request_id)?;
            if request.is_terminal() {
                return Err(EngineError::terminal_request(request_id, request.status));
            }

            let step = state.step_mut(request_id, step_order)?;
            if step.is_completed {
                return Err(EngineError::AlreadyCompleted {
                    request_id: request_id.clone(),
                    step_order,
                });
            }
            if !step.is_current {
                return Err(EngineError::InvalidTransition(format!(
                    "step {step_order} of request {request_id} is not current"
                )));
            }
            if from_approver != &step.nominal_approver {
                return Err(EngineError::Unauthorized {
                    actor: from_approver.clone(),
                    reason: format!(
                        "only the nominal approver `{}` may delegate this step",
                        step.nominal_approver
                    ),
                });
            }
            if to_approver == from_approver {
                return Err(EngineError::Validation(
                    "cannot delegate a step to its current approver".to_string(),
                ));
            }
            if step.prior_approvers.contains(to_approver) {
                return Err(EngineError::CyclicDelegation { user: to_approver.clone() });
            }

            step.prior_approvers.push(step.nominal_approver.clone());
            step.nominal_approver = to_approver.clone();
            step.action = Some(StepAction::Delegate);
            step.state_version += 1;
            let delegated = step.clone();

            effects.audit.push(
                AuditEvent::new(
                    Some(request_id.clone()),
                    Some(step_order),
                    "step.delegated",
                    AuditCategory::Step,
                    from_approver.0.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("to", to_approver.0.clone()),
            );
            effects.notifications.push(Notification::new(
                NotificationKind::StepActivated,
                request_id.clone(),
                Some(step_order),
                to_approver.clone(),
            ));

            Ok(delegated)
        });

        self.flush(effects);
        result
    }

    /// Current, incomplete steps whose authority resolves to `user` at
    /// `now` — either nominally or through an active standing delegation.
    pub fn pending_steps_for(&self, user: &UserId, now: DateTime<Utc>) -> Vec<ApprovalStep> {
        self.store
            .actionable_steps()
            .into_iter()
            .filter(|step| {
                if &step.nominal_approver == user {
                    return true;
                }
                match self.resolver.resolve_active_approver(
                    self.directory.as_ref(),
                    &step.nominal_approver,
                    now,
                ) {
                    Ok(resolved) => &resolved == user,
                    Err(error) => {
                        warn!(
                            event_name = "scheduler.delegation_resolution_failed",
                            request_id = %step.request_id,
                            step_order = step.step_order,
                            error = %error,
                            "skipping step with unresolvable delegation chain"
                        );
                        false
                    }
                }
            })
            .collect()
    }

    fn step_deadline(&self, request: &ApprovalRequest, now: DateTime<Utc>) -> DateTime<Utc> {
        request
            .deadline
            .unwrap_or_else(|| now + Duration::seconds(self.config.default_step_deadline_secs))
    }
}
