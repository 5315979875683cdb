use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::DepartmentId;
use crate::errors::EngineError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionId(pub String);

impl DefinitionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    MessageApproval,
    DocumentApproval,
    TransactionApproval,
    AccessRequest,
    BudgetApproval,
    PolicyChange,
}

/// A versioned description of one workflow type.
///
/// Definitions are immutable once a request references them: re-registering
/// the same id produces a new version, and open requests stay pinned to the
/// version they were created against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: DefinitionId,
    pub version: u32,
    pub kind: WorkflowKind,
    pub name: String,
    pub description: String,
    /// True for an ordered chain; false for threshold (parallel) mode.
    pub sequential: bool,
    pub minimum_approvers: u32,
    pub auto_approve_threshold: Option<Decimal>,
    /// Empty set means the definition is unrestricted.
    pub applicable_departments: BTreeSet<DepartmentId>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl WorkflowDefinition {
    pub fn new(id: DefinitionId, kind: WorkflowKind, name: impl Into<String>) -> Self {
        Self {
            id,
            version: 1,
            kind,
            name: name.into(),
            description: String::new(),
            sequential: true,
            minimum_approvers: 1,
            auto_approve_threshold: None,
            applicable_departments: BTreeSet::new(),
            created_at: Utc::now(),
            is_active: true,
        }
    }

    pub fn with_threshold_mode(mut self, minimum_approvers: u32) -> Self {
        self.sequential = false;
        self.minimum_approvers = minimum_approvers;
        self
    }

    pub fn with_auto_approve_threshold(mut self, threshold: Decimal) -> Self {
        self.auto_approve_threshold = Some(threshold);
        self
    }

    pub fn with_departments(mut self, departments: impl IntoIterator<Item = DepartmentId>) -> Self {
        self.applicable_departments = departments.into_iter().collect();
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.minimum_approvers == 0 {
            return Err(EngineError::Validation(format!(
                "definition `{}` must require at least one approver",
                self.id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "definition `{}` must have a non-empty name",
                self.id
            )));
        }
        Ok(())
    }

    pub fn applies_to(&self, department: Option<&DepartmentId>) -> bool {
        if self.applicable_departments.is_empty() {
            return true;
        }
        department.is_some_and(|dept| self.applicable_departments.contains(dept))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{DefinitionId, WorkflowDefinition, WorkflowKind};
    use crate::domain::user::DepartmentId;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new(
            DefinitionId::new("credit-message"),
            WorkflowKind::MessageApproval,
            "Credit message sign-off",
        )
    }

    #[test]
    fn new_definition_defaults_to_sequential_single_approver() {
        let def = definition();
        assert!(def.sequential);
        assert_eq!(def.minimum_approvers, 1);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn zero_minimum_approvers_fails_validation() {
        let mut def = definition().with_threshold_mode(2);
        def.minimum_approvers = 0;
        assert!(def.validate().is_err());
    }

    #[test]
    fn empty_department_scope_is_unrestricted() {
        let def = definition();
        assert!(def.applies_to(None));
        assert!(def.applies_to(Some(&DepartmentId::new("treasury"))));
    }

    #[test]
    fn scoped_definition_only_applies_to_listed_departments() {
        let def = definition().with_departments([DepartmentId::new("treasury")]);
        assert!(def.applies_to(Some(&DepartmentId::new("treasury"))));
        assert!(!def.applies_to(Some(&DepartmentId::new("credit"))));
        assert!(!def.applies_to(None));
    }

    #[test]
    fn builder_sets_threshold_and_auto_approve() {
        let def = definition()
            .with_threshold_mode(3)
            .with_auto_approve_threshold(Decimal::new(100_000, 2));
        assert!(!def.sequential);
        assert_eq!(def.minimum_approvers, 3);
        assert_eq!(def.auto_approve_threshold, Some(Decimal::new(100_000, 2)));
    }
}
