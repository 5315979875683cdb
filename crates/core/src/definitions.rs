use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::definition::{DefinitionId, WorkflowDefinition};
use crate::errors::EngineError;

/// Versioned registry of workflow definitions.
///
/// Registering an id that already exists appends a new version; existing
/// versions are never mutated, so requests pinned to an older version keep
/// their original semantics.
#[derive(Clone, Default)]
pub struct DefinitionStore {
    inner: Arc<Mutex<HashMap<DefinitionId, Vec<WorkflowDefinition>>>>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, mut definition: WorkflowDefinition) -> Result<u32, EngineError> {
        definition.validate()?;
        let mut inner = self.lock();
        let versions = inner.entry(definition.id.clone()).or_default();
        definition.version = versions.last().map_or(1, |latest| latest.version + 1);
        let version = definition.version;
        versions.push(definition);
        Ok(version)
    }

    /// Latest active version.
    pub fn get(&self, id: &DefinitionId) -> Result<WorkflowDefinition, EngineError> {
        let inner = self.lock();
        inner
            .get(id)
            .and_then(|versions| versions.iter().rev().find(|def| def.is_active))
            .cloned()
            .ok_or_else(|| EngineError::DefinitionNotFound(id.clone()))
    }

    /// Exact version, active or not; used by requests pinned at creation.
    pub fn get_version(
        &self,
        id: &DefinitionId,
        version: u32,
    ) -> Result<WorkflowDefinition, EngineError> {
        let inner = self.lock();
        inner
            .get(id)
            .and_then(|versions| versions.iter().find(|def| def.version == version))
            .cloned()
            .ok_or_else(|| EngineError::DefinitionNotFound(id.clone()))
    }

    /// Marks all versions of a definition inactive. Open requests keep
    /// working against their pinned version.
    pub fn deactivate(&self, id: &DefinitionId) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let versions =
            inner.get_mut(id).ok_or_else(|| EngineError::DefinitionNotFound(id.clone()))?;
        for definition in versions.iter_mut() {
            definition.is_active = false;
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<WorkflowDefinition> {
        let inner = self.lock();
        let mut latest: Vec<WorkflowDefinition> = inner
            .values()
            .filter_map(|versions| versions.iter().rev().find(|def| def.is_active))
            .cloned()
            .collect();
        latest.sort_by(|left, right| left.id.cmp(&right.id));
        latest
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DefinitionId, Vec<WorkflowDefinition>>> {
        match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
