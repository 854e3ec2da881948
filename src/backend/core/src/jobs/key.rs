//! Scheduler key mapping.
//!
//! Desired job definitions and live scheduler entries are matched purely by
//! key, so the mapping here must stay deterministic and free of I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::definition::{JobDefinitionId, TenantId};

/// Group holding entries that are not tenant scoped.
pub const DEFAULT_GROUP: &str = "default";

/// Group reserved for the host's own entries (the pulse itself). Never reconciled.
pub const SYSTEM_GROUP: &str = "System";

const TENANT_GROUP_PREFIX: &str = "tenant_";
const TRIGGER_SUFFIX: &str = "_trigger";

/// Identity of a live scheduler entry (or trigger).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchedulerKey {
    /// Isolation group
    pub group: String,
    /// Name within the group
    pub name: String,
}

impl SchedulerKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Key of the trigger attached to this entry.
    pub fn trigger_key(&self) -> SchedulerKey {
        SchedulerKey::new(self.group.clone(), format!("{}{}", self.name, TRIGGER_SUFFIX))
    }

    /// Whether this key lives in the reserved system group.
    pub fn is_system(&self) -> bool {
        self.group == SYSTEM_GROUP
    }
}

impl fmt::Display for SchedulerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Isolation group for a tenant scope.
pub fn tenant_group(tenant: Option<TenantId>) -> String {
    match tenant {
        Some(id) => format!("{}{}", TENANT_GROUP_PREFIX, id),
        None => DEFAULT_GROUP.to_string(),
    }
}

/// Map a job definition to its scheduler key.
pub fn scheduler_key(job_id: JobDefinitionId, tenant: Option<TenantId>) -> SchedulerKey {
    match tenant {
        Some(id) => SchedulerKey::new(tenant_group(tenant), format!("{}_{}", job_id, id)),
        None => SchedulerKey::new(DEFAULT_GROUP, job_id.to_string()),
    }
}
