//! End-to-end lifecycle tests driving a fully wired engine: request
//! creation, sequential and threshold chains, delegation, cancellation
//! races, and escalation sweeps.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use signoff_core::{
    ApprovalRequest, ApprovalRequestManager, DefinitionId, DefinitionStore, Delegation,
    DirectoryUser, EngineConfig, EngineError, EscalationTimer, InMemoryAuditSink,
    InMemoryDirectory, InMemoryNotifier, RequestStatus, RequestStore, RequestSubmission,
    StepAction, StepScheduler, SubjectRef, UserId, WorkflowDefinition, WorkflowKind,
};

struct Engine {
    manager: ApprovalRequestManager,
    scheduler: StepScheduler,
    timer: EscalationTimer,
    store: RequestStore,
    definitions: DefinitionStore,
    directory: Arc<InMemoryDirectory>,
    audit: Arc<InMemoryAuditSink>,
    notifier: Arc<InMemoryNotifier>,
}

fn engine() -> Engine {
    let store = RequestStore::new();
    let definitions = DefinitionStore::new();
    let directory = Arc::new(InMemoryDirectory::new());
    let audit = Arc::new(InMemoryAuditSink::default());
    let notifier = Arc::new(InMemoryNotifier::default());
    let config = EngineConfig::default();
    let scheduler = StepScheduler::new(
        store.clone(),
        definitions.clone(),
        directory.clone(),
        audit.clone(),
        notifier.clone(),
        config.clone(),
    );
    let manager = ApprovalRequestManager::new(
        store.clone(),
        definitions.clone(),
        scheduler.clone(),
        directory.clone(),
        audit.clone(),
        notifier.clone(),
    );
    let timer = EscalationTimer::new(
        store.clone(),
        directory.clone(),
        audit.clone(),
        notifier.clone(),
        config,
    );
    Engine { manager, scheduler, timer, store, definitions, directory, audit, notifier }
}

fn sequential(id: &str) -> WorkflowDefinition {
    WorkflowDefinition::new(
        DefinitionId::new(id),
        WorkflowKind::TransactionApproval,
        "Transaction sign-off",
    )
}

fn submit(engine: &Engine, definition: &str, chain: &[&str]) -> ApprovalRequest {
    engine
        .manager
        .create_request(RequestSubmission::new(
            DefinitionId::new(definition),
            UserId::new("u-requester"),
            SubjectRef::new("transaction", "txn-1"),
            "Wire transfer",
            chain.iter().map(|name| UserId::new(*name)).collect(),
        ))
        .expect("request opens")
}

fn assert_completed_at_matches_terminal(request: &ApprovalRequest) {
    assert_eq!(request.completed_at.is_some(), request.status.is_terminal());
}

#[test]
fn sequential_chain_advances_one_step_at_a_time() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    let request = submit(&e, "txn", &["u-a", "u-b", "u-c"]);

    e.scheduler
        .respond_to_step(&request.id, 1, &UserId::new("u-a"), StepAction::Approve, "ok")
        .unwrap();
    e.scheduler
        .respond_to_step(&request.id, 2, &UserId::new("u-b"), StepAction::Approve, "ok")
        .unwrap();

    let current = e.manager.get_request(&request.id).unwrap();
    assert_eq!(current.status, RequestStatus::InProgress);
    assert_completed_at_matches_terminal(&current);

    let steps = e.store.steps_for_request(&request.id);
    let current_steps: Vec<u32> =
        steps.iter().filter(|s| s.is_current).map(|s| s.step_order).collect();
    assert_eq!(current_steps, vec![3]);
    assert!(steps[2].deadline.is_some());

    e.scheduler
        .respond_to_step(&request.id, 3, &UserId::new("u-c"), StepAction::Approve, "ok")
        .unwrap();
    let approved = e.manager.get_request(&request.id).unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_completed_at_matches_terminal(&approved);
    assert_eq!(e.audit.events_of_type("request.approved").len(), 1);
}

#[test]
fn out_of_order_sequential_response_is_an_invalid_transition() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    let request = submit(&e, "txn", &["u-a", "u-b"]);

    let error = e
        .scheduler
        .respond_to_step(&request.id, 2, &UserId::new("u-b"), StepAction::Approve, "")
        .expect_err("step 2 is not current yet");
    assert!(matches!(error, EngineError::InvalidTransition(_)));
}

#[test]
fn second_response_to_a_completed_step_is_already_completed_and_changes_nothing() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    let request = submit(&e, "txn", &["u-a", "u-b"]);

    e.scheduler
        .respond_to_step(&request.id, 1, &UserId::new("u-a"), StepAction::Approve, "first")
        .unwrap();
    let before = e.store.get_step(&request.id, 1).unwrap();

    let error = e
        .scheduler
        .respond_to_step(&request.id, 1, &UserId::new("u-a"), StepAction::Reject, "second")
        .expect_err("step already claimed");
    assert!(matches!(error, EngineError::AlreadyCompleted { step_order: 1, .. }));

    let after = e.store.get_step(&request.id, 1).unwrap();
    assert_eq!(before, after);
    assert_eq!(after.comments, "first");
    assert_eq!(after.action, Some(StepAction::Approve));
}

#[test]
fn stranger_cannot_respond_to_a_step() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    let request = submit(&e, "txn", &["u-a"]);

    let error = e
        .scheduler
        .respond_to_step(&request.id, 1, &UserId::new("u-intruder"), StepAction::Approve, "")
        .expect_err("not the approver");
    assert!(matches!(error, EngineError::Unauthorized { .. }));
}

#[test]
fn threshold_request_approves_after_minimum_and_deactivates_the_rest() {
    let e = engine();
    e.definitions.register(sequential("budget").with_threshold_mode(2)).unwrap();
    let request = submit(&e, "budget", &["u-a", "u-b", "u-c"]);

    // All three steps open at once in threshold mode.
    let open: Vec<bool> =
        e.store.steps_for_request(&request.id).iter().map(|s| s.is_current).collect();
    assert_eq!(open, vec![true, true, true]);

    e.scheduler
        .respond_to_step(&request.id, 1, &UserId::new("u-a"), StepAction::Approve, "ok")
        .unwrap();
    assert_eq!(e.manager.get_status(&request.id).unwrap(), RequestStatus::InProgress);

    e.scheduler
        .respond_to_step(&request.id, 3, &UserId::new("u-c"), StepAction::Approve, "ok")
        .unwrap();
    let approved = e.manager.get_request(&request.id).unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_completed_at_matches_terminal(&approved);

    // The unused slot is moot, not completed.
    let leftover = e.store.get_step(&request.id, 2).unwrap();
    assert!(!leftover.is_current);
    assert!(!leftover.is_completed);
}

#[test]
fn single_reject_short_circuits_a_threshold_request() {
    let e = engine();
    e.definitions.register(sequential("budget").with_threshold_mode(2)).unwrap();
    let request = submit(&e, "budget", &["u-a", "u-b", "u-c"]);

    e.scheduler
        .respond_to_step(&request.id, 2, &UserId::new("u-b"), StepAction::Reject, "no")
        .unwrap();

    let rejected = e.manager.get_request(&request.id).unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_completed_at_matches_terminal(&rejected);

    let late = e
        .scheduler
        .respond_to_step(&request.id, 1, &UserId::new("u-a"), StepAction::Approve, "")
        .expect_err("request already terminal");
    assert!(matches!(late, EngineError::InvalidTransition(_)));
}

#[test]
fn request_info_completes_the_step_without_moving_the_request() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    let request = submit(&e, "txn", &["u-a", "u-b"]);

    e.scheduler
        .respond_to_step(
            &request.id,
            1,
            &UserId::new("u-a"),
            StepAction::RequestInfo,
            "need the invoice",
        )
        .unwrap();

    assert_eq!(e.manager.get_status(&request.id).unwrap(), RequestStatus::InProgress);
    let step = e.store.get_step(&request.id, 1).unwrap();
    assert!(step.is_completed);
    // Step 2 was not activated; the chain is parked pending more info.
    assert!(!e.store.get_step(&request.id, 2).unwrap().is_current);
    assert_eq!(e.notifier.sent_to(&UserId::new("u-requester")).len(), 1);
}

#[test]
fn explicit_delegation_hands_the_step_over_and_blocks_ping_pong() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    let request = submit(&e, "txn", &["u-a"]);

    let delegated = e
        .scheduler
        .delegate_step(&request.id, 1, &UserId::new("u-a"), &UserId::new("u-b"))
        .unwrap();
    assert_eq!(delegated.nominal_approver, UserId::new("u-b"));
    assert_eq!(delegated.prior_approvers, vec![UserId::new("u-a")]);
    assert!(delegated.is_current);
    assert!(!delegated.is_completed);

    // The original approver no longer holds the step.
    let stale = e
        .scheduler
        .respond_to_step(&request.id, 1, &UserId::new("u-a"), StepAction::Approve, "")
        .expect_err("u-a gave the step away");
    assert!(matches!(stale, EngineError::Unauthorized { .. }));

    // Handing it back to someone in the step's history is refused.
    let bounce = e
        .scheduler
        .delegate_step(&request.id, 1, &UserId::new("u-b"), &UserId::new("u-a"))
        .expect_err("ping-pong");
    assert!(matches!(bounce, EngineError::CyclicDelegation { .. }));

    e.scheduler
        .respond_to_step(&request.id, 1, &UserId::new("u-b"), StepAction::Approve, "ok")
        .unwrap();
    let step = e.store.get_step(&request.id, 1).unwrap();
    assert_eq!(step.effective_approver, Some(UserId::new("u-b")));
    assert_eq!(e.manager.get_status(&request.id).unwrap(), RequestStatus::Approved);
}

#[test]
fn standing_delegation_authorizes_the_delegate() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    let request = submit(&e, "txn", &["u-a"]);

    let now = Utc::now();
    e.directory.add_delegation(Delegation::new(
        UserId::new("u-a"),
        UserId::new("u-b"),
        now - Duration::days(1),
        now + Duration::days(1),
    ));

    e.scheduler
        .respond_to_step(&request.id, 1, &UserId::new("u-b"), StepAction::Approve, "covering")
        .unwrap();

    let step = e.store.get_step(&request.id, 1).unwrap();
    assert_eq!(step.nominal_approver, UserId::new("u-a"));
    assert_eq!(step.effective_approver, Some(UserId::new("u-b")));
}

#[test]
fn standing_delegation_cycle_surfaces_as_cyclic_delegation() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    let request = submit(&e, "txn", &["u-a"]);

    let now = Utc::now();
    for (from, to) in [("u-a", "u-b"), ("u-b", "u-c"), ("u-c", "u-a")] {
        e.directory.add_delegation(Delegation::new(
            UserId::new(from),
            UserId::new(to),
            now - Duration::days(1),
            now + Duration::days(1),
        ));
    }

    let error = e
        .scheduler
        .respond_to_step(&request.id, 1, &UserId::new("u-c"), StepAction::Approve, "")
        .expect_err("cycle cannot resolve");
    assert!(matches!(error, EngineError::CyclicDelegation { .. }));

    // Pending-work queries skip the unresolvable step instead of failing.
    assert!(e.scheduler.pending_steps_for(&UserId::new("u-c"), now).is_empty());
}

#[test]
fn pending_steps_reflect_standing_delegation() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    let request = submit(&e, "txn", &["u-a", "u-b"]);

    let now = Utc::now();
    assert_eq!(e.scheduler.pending_steps_for(&UserId::new("u-a"), now).len(), 1);
    assert!(e.scheduler.pending_steps_for(&UserId::new("u-b"), now).is_empty());

    e.directory.add_delegation(Delegation::new(
        UserId::new("u-a"),
        UserId::new("u-stand-in"),
        now - Duration::hours(1),
        now + Duration::hours(1),
    ));
    let pending = e.scheduler.pending_steps_for(&UserId::new("u-stand-in"), now);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id, request.id);
}

#[test]
fn cancel_approve_race_yields_exactly_one_terminal_status() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    let request = submit(&e, "txn", &["u-a"]);

    let approve = {
        let scheduler = e.scheduler.clone();
        let id = request.id.clone();
        std::thread::spawn(move || {
            scheduler.respond_to_step(&id, 1, &UserId::new("u-a"), StepAction::Approve, "ok")
        })
    };
    let cancel = {
        let manager = e.manager.clone();
        let id = request.id.clone();
        std::thread::spawn(move || manager.cancel_request(&id, &UserId::new("u-requester")))
    };

    let approve_result = approve.join().expect("approve thread");
    let cancel_result = cancel.join().expect("cancel thread");

    let winners = [approve_result.is_ok(), cancel_result.is_ok()];
    assert_eq!(winners.iter().filter(|ok| **ok).count(), 1, "exactly one writer wins");

    let settled = e.manager.get_request(&request.id).unwrap();
    assert!(settled.status.is_terminal());
    assert_completed_at_matches_terminal(&settled);
    match settled.status {
        RequestStatus::Approved => {
            assert!(matches!(cancel_result, Err(EngineError::InvalidTransition(_))));
        }
        RequestStatus::Cancelled => {
            assert!(matches!(approve_result, Err(EngineError::InvalidTransition(_))));
        }
        other => panic!("unexpected terminal status {other:?}"),
    }
}

#[test]
fn escalation_sweep_reassigns_overdue_work_and_expires_dead_requests() {
    let e = engine();
    e.definitions.register(sequential("txn")).unwrap();
    e.directory.add_user(DirectoryUser {
        id: UserId::new("u-a"),
        manager: Some(UserId::new("u-boss")),
        permission_level: 1,
        department: None,
    });

    let stuck = submit(&e, "txn", &["u-a"]);
    let doomed = e
        .manager
        .create_request(
            RequestSubmission::new(
                DefinitionId::new("txn"),
                UserId::new("u-requester"),
                SubjectRef::new("transaction", "txn-2"),
                "Old transfer",
                vec![UserId::new("u-a")],
            )
            .with_deadline(Utc::now() - Duration::hours(1)),
        )
        .unwrap();

    // Jump past every step deadline without sleeping.
    let later = Utc::now() + Duration::days(30);
    let report = e.timer.sweep_once(later);
    assert_eq!(report.expired, 1);
    assert_eq!(report.escalated, 1);

    assert_eq!(e.manager.get_status(&doomed.id).unwrap(), RequestStatus::Expired);
    let escalated = e.store.get_step(&stuck.id, 1).unwrap();
    assert_eq!(escalated.nominal_approver, UserId::new("u-boss"));
    assert!(escalated.deadline.unwrap() > later);

    // The new holder can approve through the ordinary path.
    e.scheduler
        .respond_to_step(&stuck.id, 1, &UserId::new("u-boss"), StepAction::Approve, "late")
        .unwrap();
    assert_eq!(e.manager.get_status(&stuck.id).unwrap(), RequestStatus::Approved);
}

#[test]
fn auto_approved_request_emits_its_own_audit_trail() {
    let e = engine();
    e.definitions
        .register(sequential("petty-cash").with_auto_approve_threshold(Decimal::from(250)))
        .unwrap();

    let request = e
        .manager
        .create_request(
            RequestSubmission::new(
                DefinitionId::new("petty-cash"),
                UserId::new("u-requester"),
                SubjectRef::new("transaction", "txn-3"),
                "Stationery",
                vec![UserId::new("u-a")],
            )
            .with_amount(Decimal::from(100)),
        )
        .unwrap();

    assert_eq!(request.status, RequestStatus::Approved);
    assert_completed_at_matches_terminal(&request);
    assert!(e.store.steps_for_request(&request.id).is_empty());
    assert_eq!(e.audit.events_of_type("request.auto_approved").len(), 1);
    assert!(e.scheduler.pending_steps_for(&UserId::new("u-a"), Utc::now()).is_empty());
}
