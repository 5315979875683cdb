use std::sync::Arc;

use signoff_core::{
    ApprovalRequestManager, DefinitionStore, EngineConfig, EscalationTimer, InMemoryAuditSink,
    InMemoryDirectory, InMemoryNotifier, RequestStore, StepScheduler,
};

/// A fully wired in-process engine backed by the in-memory collaborator
/// doubles. This is what `demo` and `smoke` drive; a deployment would
/// swap the directory, audit, and notifier seams for real adapters.
pub struct WiredEngine {
    pub manager: ApprovalRequestManager,
    pub scheduler: StepScheduler,
    pub timer: EscalationTimer,
    pub store: RequestStore,
    pub definitions: DefinitionStore,
    pub directory: Arc<InMemoryDirectory>,
    pub audit: Arc<InMemoryAuditSink>,
    pub notifier: Arc<InMemoryNotifier>,
}

pub fn wire(config: EngineConfig) -> WiredEngine {
    let store = RequestStore::new();
    let definitions = DefinitionStore::new();
    let directory = Arc::new(InMemoryDirectory::new());
    let audit = Arc::new(InMemoryAuditSink::default());
    let notifier = Arc::new(InMemoryNotifier::default());

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

    WiredEngine { manager, scheduler, timer, store, definitions, directory, audit, notifier }
}
