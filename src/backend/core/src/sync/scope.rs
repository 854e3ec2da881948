//! Tenant scope of one unit of reconciliation work.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::jobs::{tenant_group, TenantId};

/// A tenant, or the single-tenant default scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantScope(pub Option<TenantId>);

impl TenantScope {
    /// The scope of a single-tenant deployment.
    pub const DEFAULT: TenantScope = TenantScope(None);

    pub fn tenant(id: impl Into<TenantId>) -> Self {
        Self(Some(id.into()))
    }

    /// Tenant id passed to the repository.
    pub fn id(&self) -> Option<TenantId> {
        self.0
    }

    /// Scheduler group owned by this scope.
    pub fn group(&self) -> String {
        tenant_group(self.0)
    }
}

impl From<Option<TenantId>> for TenantScope {
    fn from(id: Option<TenantId>) -> Self {
        Self(id)
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{}", id),
            None => f.write_str("default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display_and_group() {
        assert_eq!(TenantScope::tenant(7).to_string(), "7");
        assert_eq!(TenantScope::tenant(7).group(), "tenant_7");
        assert_eq!(TenantScope::DEFAULT.to_string(), "default");
        assert_eq!(TenantScope::DEFAULT.group(), "default");
    }

    #[test]
    fn test_default_scope_sorts_first() {
        let mut scopes = vec![TenantScope::tenant(2), TenantScope::DEFAULT, TenantScope::tenant(1)];
        scopes.sort();
        assert_eq!(
            scopes,
            vec![TenantScope::DEFAULT, TenantScope::tenant(1), TenantScope::tenant(2)]
        );
    }
}
