use std::path::Path;
use std::time::Instant;

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::commands::CommandResult;
use crate::engine::wire;
use signoff_core::{
    DefinitionId, EngineConfig, RequestStatus, RequestSubmission, StepAction, SubjectRef, UserId,
    WorkflowDefinition, WorkflowKind,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| EngineConfig::load(detect_config_path().as_deref())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_load",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_load",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("sequential_transition"));
            checks.push(skipped("escalation_sweep"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let engine = wire(config);

    let transition_started = Instant::now();
    let transition = (|| -> Result<RequestStatus, signoff_core::EngineError> {
        engine.definitions.register(WorkflowDefinition::new(
            DefinitionId::new("smoke-sequential"),
            WorkflowKind::DocumentApproval,
            "Smoke check document sign-off",
        ))?;
        let request = engine.manager.create_request(RequestSubmission::new(
            DefinitionId::new("smoke-sequential"),
            UserId::new("u-smoke-requester"),
            SubjectRef::new("document", "doc-smoke-1"),
            "Smoke check document",
            vec![UserId::new("u-smoke-approver")],
        ))?;
        engine.scheduler.respond_to_step(
            &request.id,
            1,
            &UserId::new("u-smoke-approver"),
            StepAction::Approve,
            "",
        )?;
        engine.manager.get_status(&request.id)
    })();
    match transition {
        Ok(RequestStatus::Approved) => checks.push(SmokeCheck {
            name: "sequential_transition",
            status: SmokeStatus::Pass,
            elapsed_ms: transition_started.elapsed().as_millis() as u64,
            message: "create + approve reached Approved".to_string(),
        }),
        Ok(other) => checks.push(SmokeCheck {
            name: "sequential_transition",
            status: SmokeStatus::Fail,
            elapsed_ms: transition_started.elapsed().as_millis() as u64,
            message: format!("expected Approved, got {other:?}"),
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "sequential_transition",
            status: SmokeStatus::Fail,
            elapsed_ms: transition_started.elapsed().as_millis() as u64,
            message: error.to_string(),
        }),
    }

    let sweep_started = Instant::now();
    let report = engine.timer.sweep_once(Utc::now() + Duration::days(1));
    checks.push(SmokeCheck {
        name: "escalation_sweep",
        status: SmokeStatus::Pass,
        elapsed_ms: sweep_started.elapsed().as_millis() as u64,
        message: format!(
            "sweep completed: {} escalated, {} expired, {} skipped",
            report.escalated, report.expired, report.skipped
        ),
    });

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn detect_config_path() -> Option<std::path::PathBuf> {
    for candidate in ["signoff.toml", "config/signoff.toml"] {
        let path = Path::new(candidate);
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }
    None
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
