//! Job definitions and identifiers.
//!
//! This module provides the desired-state model read from the job store:
//!
//! - **JobDefinitionId / TenantId**: strongly typed identifiers
//! - **HandlerRef**: the handler a scheduled entry invokes
//! - **JobDefinition**: the persisted description of a schedulable unit of work
//! - **status**: the status vocabulary written back by the reconciliation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::schedule::effective_expression;

// ═══════════════════════════════════════════════════════════════════════════════
// Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable identifier of a job definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobDefinitionId(pub Uuid);

impl JobDefinitionId {
    /// Create a new random definition ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobDefinitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobDefinitionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Handler Reference
// ═══════════════════════════════════════════════════════════════════════════════

/// Reference to the handler type a scheduled entry runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRef {
    /// Fully qualified handler type name
    pub class: String,
    /// Module or package that provides the handler
    #[serde(default)]
    pub assembly: Option<String>,
}

impl HandlerRef {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            assembly: None,
        }
    }

    pub fn with_assembly(mut self, assembly: impl Into<String>) -> Self {
        self.assembly = Some(assembly.into());
        self
    }

    /// Resolve the handler type name used by the scheduler.
    ///
    /// Returns `None` when the reference cannot name a handler.
    pub fn resolve(&self) -> Option<String> {
        let class = self.class.trim();
        if class.is_empty() {
            return None;
        }

        match self.assembly.as_deref().map(str::trim) {
            Some(assembly) if !assembly.is_empty() => Some(format!("{}, {}", class, assembly)),
            _ => Some(class.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Definition
// ═══════════════════════════════════════════════════════════════════════════════

/// Desired, persisted description of a schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Stable identifier
    pub id: JobDefinitionId,
    /// Owning tenant (`None` in single-tenant deployments)
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    /// Friendly name
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Cron-style schedule expression
    pub schedule_expression: String,
    /// Handler the entry invokes
    pub handler: HandlerRef,
    /// Parameters handed to the handler
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Whether the job should be scheduled at all
    #[serde(default = "default_active")]
    pub active: bool,
    /// Last status written for this job
    #[serde(default)]
    pub last_status: Option<String>,
    /// Message accompanying the last status
    #[serde(default)]
    pub last_status_message: Option<String>,
}

fn default_active() -> bool {
    true
}

impl JobDefinition {
    /// Create an active definition with no parameters.
    pub fn new(
        name: impl Into<String>,
        schedule_expression: impl Into<String>,
        handler: HandlerRef,
    ) -> Self {
        Self {
            id: JobDefinitionId::new(),
            tenant_id: None,
            name: name.into(),
            description: None,
            schedule_expression: schedule_expression.into(),
            handler,
            parameters: HashMap::new(),
            active: true,
            last_status: None,
            last_status_message: None,
        }
    }

    pub fn for_tenant(mut self, tenant_id: impl Into<TenantId>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>, message: impl Into<String>) -> Self {
        self.last_status = Some(status.into());
        self.last_status_message = Some(message.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Expression actually registered with the scheduler.
    ///
    /// Invalid expressions are replaced with the never-run sentinel.
    pub fn effective_expression(&self) -> String {
        effective_expression(&self.schedule_expression)
    }

    /// Whether the last recorded status is an error.
    pub fn has_error_status(&self) -> bool {
        self.last_status
            .as_deref()
            .is_some_and(|s| s.contains(status::ERROR_MARKER))
    }
}

/// Status vocabulary persisted against job definitions.
pub mod status {
    /// Substring identifying an error status.
    pub const ERROR_MARKER: &str = "Error";

    /// Status written when scheduling a new entry failed.
    pub const ERROR_SCHEDULING: &str = "Error scheduling Job";

    /// Status written when replacing an existing entry failed.
    pub const ERROR_RESCHEDULING: &str = "Error re-scheduling Job";

    /// Friendly status message for a failed schedule change.
    pub fn error_message(job_name: &str, error: &str) -> String {
        format!("Error scheduling the job: {}.\n\n{}", job_name, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::schedule::NEVER_RUN_EXPRESSION;

    #[test]
    fn test_handler_resolve() {
        assert_eq!(
            HandlerRef::new("Reports.Nightly").resolve().as_deref(),
            Some("Reports.Nightly")
        );
        assert_eq!(
            HandlerRef::new("Reports.Nightly")
                .with_assembly("Reports")
                .resolve()
                .as_deref(),
            Some("Reports.Nightly, Reports")
        );
        assert_eq!(HandlerRef::new("  ").resolve(), None);
    }

    #[test]
    fn test_effective_expression() {
        let valid = JobDefinition::new("a", "0 0 * * * *", HandlerRef::new("A"));
        assert_eq!(valid.effective_expression(), "0 0 * * * *");

        let invalid = JobDefinition::new("b", "every tuesday", HandlerRef::new("B"));
        assert_eq!(invalid.effective_expression(), NEVER_RUN_EXPRESSION);
    }

    #[test]
    fn test_error_status_detection() {
        let job = JobDefinition::new("a", "0 0 * * * *", HandlerRef::new("A"));
        assert!(!job.has_error_status());

        let job = job.with_status(status::ERROR_RESCHEDULING, "boom");
        assert!(job.has_error_status());

        let job = job.with_status("Success", "");
        assert!(!job.has_error_status());
    }

    #[test]
    fn test_error_message_format() {
        assert_eq!(
            status::error_message("Nightly", "store down"),
            "Error scheduling the job: Nightly.\n\nstore down"
        );
    }

    #[test]
    fn test_definition_deserialize_defaults() {
        let json = r#"{
            "id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
            "tenant_id": 4,
            "name": "Nightly",
            "schedule_expression": "0 0 2 * * *",
            "handler": { "class": "Reports.Nightly" }
        }"#;

        let job: JobDefinition = serde_json::from_str(json).unwrap();
        assert!(job.active);
        assert_eq!(job.tenant_id, Some(TenantId(4)));
        assert!(job.parameters.is_empty());
        assert!(job.last_status.is_none());
    }
}
