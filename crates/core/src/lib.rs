pub mod audit;
pub mod config;
pub mod definitions;
pub mod delegation;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod manager;
pub mod notify;
pub mod scheduler;
pub mod store;

pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, NullAuditSink,
};
pub use config::{ConfigError, EngineConfig};
pub use definitions::DefinitionStore;
pub use delegation::DelegationResolver;
pub use directory::{DirectoryClient, DirectoryUser, InMemoryDirectory};
pub use domain::definition::{DefinitionId, WorkflowDefinition, WorkflowKind};
pub use domain::delegation::Delegation;
pub use domain::request::{ApprovalRequest, RequestId, RequestStatus, SubjectRef};
pub use domain::step::{ApprovalStep, StepAction};
pub use domain::user::{DepartmentId, UserId};
pub use errors::EngineError;
pub use escalation::{EscalationTimer, SweepReport};
pub use manager::{ApprovalRequestManager, RequestSubmission};
pub use notify::{
    InMemoryNotifier, Notification, NotificationKind, Notifier, NullNotifier,
};
pub use scheduler::StepScheduler;
pub use store::RequestStore;
