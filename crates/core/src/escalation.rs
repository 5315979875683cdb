use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::config::EngineConfig;
use crate::directory::DirectoryClient;
use crate::domain::request::{RequestId, RequestStatus};
use crate::domain::user::UserId;
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::store::RequestStore;

/// Outcome of one escalation sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub swept_at: Option<DateTime<Utc>>,
    /// Overdue steps reassigned to the approver's manager.
    pub escalated: usize,
    /// Requests moved to `Expired` because their own deadline passed.
    pub expired: usize,
    /// Overdue steps left alone: no manager, manager already in the
    /// step's history, or a directory failure.
    pub skipped: usize,
}

/// Periodic deadline enforcement. Every mutation goes through the same
/// store critical section as interactive calls, so a sweep racing a human
/// decision resolves like any other lost CAS: re-checked under the lock,
/// skipped if the state moved.
#[derive(Clone)]
pub struct EscalationTimer {
    store: RequestStore,
    directory: Arc<dyn DirectoryClient>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl EscalationTimer {
    pub fn new(
        store: RequestStore,
        directory: Arc<dyn DirectoryClient>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self { store, directory, audit, notifier, config }
    }

    /// One pass over open requests at the supplied instant. Deterministic:
    /// tests drive this directly with a fixed `now` instead of sleeping.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport { swept_at: Some(now), ..SweepReport::default() };

        for request in self.expired_candidates(now) {
            if self.expire_request(&request, now) {
                report.expired += 1;
            }
        }

        for (request_id, step_order, nominal) in self.overdue_candidates(now) {
            match self.escalate_step(&request_id, step_order, &nominal, now) {
                EscalationOutcome::Escalated => report.escalated += 1,
                EscalationOutcome::Skipped => report.skipped += 1,
                EscalationOutcome::Moot => {}
            }
        }

        info!(
            event_name = "escalation.sweep_complete",
            escalated = report.escalated,
            expired = report.expired,
            skipped = report.skipped,
            "escalation sweep finished"
        );
        report
    }

    /// Drives [`sweep_once`](Self::sweep_once) on the configured interval
    /// until the task is dropped.
    pub async fn run(self) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.sweep_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.sweep_once(Utc::now());
        }
    }

    fn expired_candidates(&self, now: DateTime<Utc>) -> Vec<RequestId> {
        self.store
            .requests_with_status(RequestStatus::InProgress)
            .into_iter()
            .chain(self.store.requests_with_status(RequestStatus::Pending))
            .filter(|request| request.deadline.is_some_and(|deadline| deadline < now))
            .map(|request| request.id)
            .collect()
    }

    fn overdue_candidates(&self, now: DateTime<Utc>) -> Vec<(RequestId, u32, UserId)> {
        self.store
            .actionable_steps()
            .into_iter()
            .filter(|step| step.is_overdue(now))
            .map(|step| (step.request_id.clone(), step.step_order, step.nominal_approver.clone()))
            .collect()
    }

    /// Terminal CAS on the request; a concurrent approval or cancellation
    /// that landed first simply wins.
    fn expire_request(&self, request_id: &RequestId, now: DateTime<Utc>) -> bool {
        let mut requester = None;
        let expired = self.store.with_state(|state| {
            let Ok(request) = state.request_mut(request_id) else { return false };
            if !request.deadline.is_some_and(|deadline| deadline < now) {
                return false;
            }
            if request.complete(RequestStatus::Expired, now).is_err() {
                return false;
            }
            requester = Some(request.requester.clone());
            state.deactivate_current_steps(request_id);
            true
        });

        if expired {
            if let Some(requester) = requester {
                self.audit.emit(AuditEvent::new(
                    Some(request_id.clone()),
                    None,
                    "request.expired",
                    AuditCategory::Escalation,
                    "escalation-timer",
                    AuditOutcome::Success,
                ));
                self.notifier.notify(Notification::new(
                    NotificationKind::RequestExpired,
                    request_id.clone(),
                    None,
                    requester,
                ));
            }
        }
        expired
    }

    fn escalate_step(
        &self,
        request_id: &RequestId,
        step_order: u32,
        nominal: &UserId,
        now: DateTime<Utc>,
    ) -> EscalationOutcome {
        let manager = match self.directory.manager_of(nominal) {
            Ok(Some(manager)) => manager,
            Ok(None) => {
                warn!(
                    event_name = "escalation.no_manager",
                    request_id = %request_id,
                    step_order,
                    approver = %nominal,
                    "overdue step has no escalation target"
                );
                return EscalationOutcome::Skipped;
            }
            Err(error) => {
                warn!(
                    event_name = "escalation.directory_failed",
                    request_id = %request_id,
                    step_order,
                    approver = %nominal,
                    error = %error,
                    "directory lookup failed, continuing sweep"
                );
                return EscalationOutcome::Skipped;
            }
        };

        let deadline = now + Duration::seconds(self.config.escalation_window_secs);
        let outcome = self.store.with_state(|state| {
            let Ok(request) = state.request_mut(request_id) else {
                return EscalationOutcome::Moot;
            };
            if request.is_terminal() {
                return EscalationOutcome::Moot;
            }
            let Ok(step) = state.step_mut(request_id, step_order) else {
                return EscalationOutcome::Moot;
            };
            // Re-check under the lock: the approver may have responded
            // between the scan and this write.
            if !step.is_overdue(now) || &step.nominal_approver != nominal {
                return EscalationOutcome::Moot;
            }
            if step.prior_approvers.contains(&manager) || &manager == nominal {
                return EscalationOutcome::Skipped;
            }

            step.prior_approvers.push(step.nominal_approver.clone());
            step.nominal_approver = manager.clone();
            step.deadline = Some(deadline);
            step.state_version += 1;
            EscalationOutcome::Escalated
        });

        if outcome == EscalationOutcome::Escalated {
            self.audit.emit(
                AuditEvent::new(
                    Some(request_id.clone()),
                    Some(step_order),
                    "step.escalated",
                    AuditCategory::Escalation,
                    "escalation-timer",
                    AuditOutcome::Success,
                )
                .with_metadata("from", nominal.0.clone())
                .with_metadata("to", manager.0.clone()),
            );
            self.notifier.notify(Notification::new(
                NotificationKind::StepEscalated,
                request_id.clone(),
                Some(step_order),
                manager,
            ));
        }
        outcome
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EscalationOutcome {
    Escalated,
    Skipped,
    /// State moved between the scan and the write; nothing to do.
    Moot,
}
