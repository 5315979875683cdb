use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::definitions::DefinitionStore;
use crate::directory::DirectoryClient;
use crate::domain::definition::{DefinitionId, WorkflowDefinition};
use crate::domain::request::{ApprovalRequest, RequestId, RequestStatus, SubjectRef};
use crate::domain::step::ApprovalStep;
use crate::domain::user::UserId;
use crate::errors::EngineError;
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::scheduler::{Effects, StepScheduler};
use crate::store::RequestStore;

/// Everything a caller supplies to open a request. The approver chain is
/// caller-provided; the engine validates it against the definition but
/// does not invent approvers.
#[derive(Clone, Debug)]
pub struct RequestSubmission {
    pub definition_id: DefinitionId,
    pub requester: UserId,
    pub subject: SubjectRef,
    pub title: String,
    pub description: String,
    pub justification: String,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub deadline: Option<DateTime<Utc>>,
    pub is_urgent: bool,
    pub priority_level: u8,
    pub approver_chain: Vec<UserId>,
}

impl RequestSubmission {
    pub fn new(
        definition_id: DefinitionId,
        requester: UserId,
        subject: SubjectRef,
        title: impl Into<String>,
        approver_chain: Vec<UserId>,
    ) -> Self {
        Self {
            definition_id,
            requester,
            subject,
            title: title.into(),
            description: String::new(),
            justification: String::new(),
            amount: None,
            currency: "SAR".to_string(),
            deadline: None,
            is_urgent: false,
            priority_level: 3,
            approver_chain,
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = justification.into();
        self
    }

    pub fn urgent(mut self, priority_level: u8) -> Self {
        self.is_urgent = true;
        self.priority_level = priority_level;
        self
    }
}

/// Request lifecycle facade: opens requests against registered
/// definitions, owns cancellation, and answers read-side queries. Step
/// mechanics live in [`StepScheduler`].
#[derive(Clone)]
pub struct ApprovalRequestManager {
    store: RequestStore,
    definitions: DefinitionStore,
    scheduler: StepScheduler,
    directory: Arc<dyn DirectoryClient>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
}

impl ApprovalRequestManager {
    pub fn new(
        store: RequestStore,
        definitions: DefinitionStore,
        scheduler: StepScheduler,
        directory: Arc<dyn DirectoryClient>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { store, definitions, scheduler, directory, audit, notifier }
    }

    /// Opens a request against the latest active version of its
    /// definition. Requests below the definition's auto-approve threshold
    /// complete immediately with no steps; everything else materializes
    /// its step chain atomically and starts in `InProgress`.
    pub fn create_request(
        &self,
        submission: RequestSubmission,
    ) -> Result<ApprovalRequest, EngineError> {
        let now = Utc::now();
        let definition = self.definitions.get(&submission.definition_id)?;
        self.validate_submission(&submission, &definition)?;

        let auto_approved = matches!(
            (submission.amount, definition.auto_approve_threshold),
            (Some(amount), Some(threshold)) if amount <= threshold
        );

        let mut request = ApprovalRequest {
            id: RequestId::generate(),
            definition_id: definition.id.clone(),
            definition_version: definition.version,
            requester: submission.requester.clone(),
            subject: submission.subject,
            title: submission.title,
            description: submission.description,
            justification: submission.justification,
            amount: submission.amount,
            currency: submission.currency,
            status: RequestStatus::InProgress,
            created_at: now,
            deadline: submission.deadline,
            completed_at: None,
            is_urgent: submission.is_urgent,
            priority_level: submission.priority_level,
            state_version: 1,
        };

        if auto_approved {
            request.status = RequestStatus::Approved;
            request.completed_at = Some(now);
            let snapshot = request.clone();
            self.store.insert_request(request, Vec::new());

            info!(
                event_name = "manager.request_auto_approved",
                request_id = %snapshot.id,
                definition_id = %snapshot.definition_id,
                "request auto-approved below threshold"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(snapshot.id.clone()),
                    None,
                    "request.auto_approved",
                    AuditCategory::Request,
                    snapshot.requester.0.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("definition_id", snapshot.definition_id.to_string()),
            );
            self.notifier.notify(Notification::new(
                NotificationKind::RequestApproved,
                snapshot.id.clone(),
                None,
                snapshot.requester.clone(),
            ));
            return Ok(snapshot);
        }

        let steps =
            self.scheduler.build_steps(&definition, &request, &submission.approver_chain, now);
        let active: Vec<ApprovalStep> =
            steps.iter().filter(|step| step.is_current).cloned().collect();
        let snapshot = request.clone();
        self.store.insert_request(request, steps);

        info!(
            event_name = "manager.request_created",
            request_id = %snapshot.id,
            definition_id = %snapshot.definition_id,
            sequential = definition.sequential,
            chain_len = submission.approver_chain.len(),
            "request opened"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(snapshot.id.clone()),
                None,
                "request.created",
                AuditCategory::Request,
                snapshot.requester.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("definition_id", snapshot.definition_id.to_string()),
        );
        for step in active {
            self.notifier.notify(Notification::new(
                NotificationKind::StepActivated,
                snapshot.id.clone(),
                Some(step.step_order),
                step.nominal_approver,
            ));
        }

        Ok(snapshot)
    }

    /// Requester-only terminal transition. Racing against an approval is
    /// resolved inside the store's critical section; the loser observes
    /// `InvalidTransition`.
    pub fn cancel_request(
        &self,
        request_id: &RequestId,
        actor: &UserId,
    ) -> Result<ApprovalRequest, EngineError> {
        let now = Utc::now();
        let mut effects = Effects::default();

        let result = self.store.with_state(|state| {
            let request = state.request_mut(request_id)?;
            if actor != &request.requester {
                return Err(EngineError::Unauthorized {
                    actor: actor.clone(),
                    reason: "only the requester may cancel a request".to_string(),
                });
            }
            request
                .complete(RequestStatus::Cancelled, now)
                .map_err(|status| EngineError::terminal_request(request_id, status))?;
            let snapshot = request.clone();
            state.deactivate_current_steps(request_id);

            effects.audit.push(AuditEvent::new(
                Some(request_id.clone()),
                None,
                "request.cancelled",
                AuditCategory::Request,
                actor.0.clone(),
                AuditOutcome::Success,
            ));
            effects.notifications.push(Notification::new(
                NotificationKind::RequestCancelled,
                request_id.clone(),
                None,
                snapshot.requester.clone(),
            ));
            Ok(snapshot)
        });

        self.scheduler.flush(effects);
        if result.is_ok() {
            info!(
                event_name = "manager.request_cancelled",
                request_id = %request_id,
                actor = %actor,
                "request cancelled by requester"
            );
        }
        result
    }

    pub fn get_status(&self, request_id: &RequestId) -> Result<RequestStatus, EngineError> {
        Ok(self.store.get_request(request_id)?.status)
    }

    pub fn get_request(&self, request_id: &RequestId) -> Result<ApprovalRequest, EngineError> {
        self.store.get_request(request_id)
    }

    /// Current, incomplete steps whose authority resolves to `user` now.
    pub fn list_pending_for_user(&self, user: &UserId) -> Vec<ApprovalStep> {
        self.scheduler.pending_steps_for(user, Utc::now())
    }

    /// Per-requester history, newest first.
    pub fn list_requests_by_requester(&self, requester: &UserId) -> Vec<ApprovalRequest> {
        self.store.requests_by_requester(requester)
    }

    fn validate_submission(
        &self,
        submission: &RequestSubmission,
        definition: &WorkflowDefinition,
    ) -> Result<(), EngineError> {
        if !(1..=5).contains(&submission.priority_level) {
            return Err(EngineError::Validation(format!(
                "priority_level must be 1..=5, got {}",
                submission.priority_level
            )));
        }
        if submission.title.trim().is_empty() {
            return Err(EngineError::Validation("request title must not be empty".to_string()));
        }
        if submission.approver_chain.is_empty() {
            return Err(EngineError::Validation("approver chain must not be empty".to_string()));
        }
        if !definition.sequential
            && (submission.approver_chain.len() as u32) < definition.minimum_approvers
        {
            return Err(EngineError::Validation(format!(
                "threshold workflow needs at least {} approvers, chain has {}",
                definition.minimum_approvers,
                submission.approver_chain.len()
            )));
        }

        if !definition.applicable_departments.is_empty() {
            let department = self.directory.department_of(&submission.requester)?;
            if !definition.applies_to(department.as_ref()) {
                return Err(EngineError::Validation(format!(
                    "definition `{}` does not apply to requester's department",
                    definition.id
                )));
            }
        }
        Ok(())
    }
}
