use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::CommandResult;
use crate::engine::{wire, WiredEngine};
use signoff_core::{
    DefinitionId, DirectoryUser, EngineConfig, RequestSubmission, StepAction, SubjectRef, UserId,
    WorkflowDefinition, WorkflowKind,
};

#[derive(Debug, Serialize)]
struct DemoScenario {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DemoReport {
    command: &'static str,
    status: &'static str,
    scenarios: Vec<DemoScenario>,
    audit_events: usize,
    notifications: usize,
}

/// Runs four scripted scenarios against a freshly wired engine and
/// reports what each one produced.
pub fn run() -> CommandResult {
    let engine = wire(EngineConfig::default());
    seed_directory(&engine);

    let scenarios = vec![
        sequential_scenario(&engine),
        threshold_scenario(&engine),
        auto_approve_scenario(&engine),
        escalation_scenario(&engine),
    ];

    let failed = scenarios.iter().any(|scenario| scenario.status != "ok");
    let report = DemoReport {
        command: "demo",
        status: if failed { "error" } else { "ok" },
        scenarios,
        audit_events: engine.audit.events().len(),
        notifications: engine.notifier.sent().len(),
    };

    let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
        format!("{{\"command\":\"demo\",\"status\":\"error\",\"message\":\"{error}\"}}")
    });
    CommandResult { exit_code: if failed { 5 } else { 0 }, output }
}

fn seed_directory(engine: &WiredEngine) {
    let users = [
        ("u-analyst", Some("u-supervisor"), 1),
        ("u-supervisor", Some("u-director"), 3),
        ("u-director", None, 5),
        ("u-auditor", Some("u-director"), 3),
    ];
    for (id, manager, level) in users {
        engine.directory.add_user(DirectoryUser {
            id: UserId::new(id),
            manager: manager.map(UserId::new),
            permission_level: level,
            department: None,
        });
    }
}

fn sequential_scenario(engine: &WiredEngine) -> DemoScenario {
    let run = || -> Result<String, signoff_core::EngineError> {
        engine.definitions.register(WorkflowDefinition::new(
            DefinitionId::new("demo-sequential"),
            WorkflowKind::TransactionApproval,
            "Sequential transaction sign-off",
        ))?;
        let request = engine.manager.create_request(RequestSubmission::new(
            DefinitionId::new("demo-sequential"),
            UserId::new("u-analyst"),
            SubjectRef::new("transaction", "txn-demo-1"),
            "Quarterly vendor payment",
            vec![UserId::new("u-supervisor"), UserId::new("u-director")],
        ))?;
        engine.scheduler.respond_to_step(
            &request.id,
            1,
            &UserId::new("u-supervisor"),
            StepAction::Approve,
            "within budget",
        )?;
        engine.scheduler.respond_to_step(
            &request.id,
            2,
            &UserId::new("u-director"),
            StepAction::Approve,
            "approved",
        )?;
        let status = engine.manager.get_status(&request.id)?;
        Ok(format!("request {} finished {:?} after both approvals", request.id, status))
    };
    scenario("sequential_chain", run())
}

fn threshold_scenario(engine: &WiredEngine) -> DemoScenario {
    let run = || -> Result<String, signoff_core::EngineError> {
        engine.definitions.register(
            WorkflowDefinition::new(
                DefinitionId::new("demo-threshold"),
                WorkflowKind::BudgetApproval,
                "Budget sign-off, any two of three",
            )
            .with_threshold_mode(2),
        )?;
        let request = engine.manager.create_request(RequestSubmission::new(
            DefinitionId::new("demo-threshold"),
            UserId::new("u-analyst"),
            SubjectRef::new("budget", "budget-demo-1"),
            "Team offsite budget",
            vec![
                UserId::new("u-supervisor"),
                UserId::new("u-director"),
                UserId::new("u-auditor"),
            ],
        ))?;
        engine.scheduler.respond_to_step(
            &request.id,
            1,
            &UserId::new("u-supervisor"),
            StepAction::Approve,
            "",
        )?;
        engine.scheduler.respond_to_step(
            &request.id,
            3,
            &UserId::new("u-auditor"),
            StepAction::Approve,
            "",
        )?;
        let status = engine.manager.get_status(&request.id)?;
        Ok(format!("request {} reached {:?} after 2 of 3 approvals", request.id, status))
    };
    scenario("threshold_quorum", run())
}

fn auto_approve_scenario(engine: &WiredEngine) -> DemoScenario {
    let run = || -> Result<String, signoff_core::EngineError> {
        engine.definitions.register(
            WorkflowDefinition::new(
                DefinitionId::new("demo-petty-cash"),
                WorkflowKind::TransactionApproval,
                "Petty cash, auto-approved under 500",
            )
            .with_auto_approve_threshold(Decimal::from(500)),
        )?;
        let request = engine.manager.create_request(
            RequestSubmission::new(
                DefinitionId::new("demo-petty-cash"),
                UserId::new("u-analyst"),
                SubjectRef::new("transaction", "txn-demo-2"),
                "Office supplies",
                vec![UserId::new("u-supervisor")],
            )
            .with_amount(Decimal::from(120)),
        )?;
        let steps = engine.store.steps_for_request(&request.id).len();
        Ok(format!(
            "request {} opened as {:?} with {} steps (amount under threshold)",
            request.id, request.status, steps
        ))
    };
    scenario("auto_approve_threshold", run())
}

fn escalation_scenario(engine: &WiredEngine) -> DemoScenario {
    let run = || -> Result<String, signoff_core::EngineError> {
        engine.definitions.register(WorkflowDefinition::new(
            DefinitionId::new("demo-escalation"),
            WorkflowKind::AccessRequest,
            "Access request with deadline enforcement",
        ))?;
        let request = engine.manager.create_request(RequestSubmission::new(
            DefinitionId::new("demo-escalation"),
            UserId::new("u-analyst"),
            SubjectRef::new("access", "vault-7"),
            "Vault access",
            vec![UserId::new("u-supervisor")],
        ))?;

        // Sweep from a point past every step deadline instead of waiting.
        let later = Utc::now() + Duration::days(30);
        let report = engine.timer.sweep_once(later);
        let step = engine.store.get_step(&request.id, 1)?;

        engine.scheduler.respond_to_step(
            &request.id,
            1,
            &step.nominal_approver.clone(),
            StepAction::Approve,
            "approved after escalation",
        )?;
        let status = engine.manager.get_status(&request.id)?;
        Ok(format!(
            "sweep escalated {} step(s); step now held by {}; request finished {:?}",
            report.escalated, step.nominal_approver, status
        ))
    };
    scenario("escalation_sweep", run())
}

fn scenario(
    name: &'static str,
    outcome: Result<String, signoff_core::EngineError>,
) -> DemoScenario {
    match outcome {
        Ok(detail) => DemoScenario { name, status: "ok", detail },
        Err(error) => DemoScenario { name, status: "error", detail: error.to_string() },
    }
}
