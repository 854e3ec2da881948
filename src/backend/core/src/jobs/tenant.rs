//! Tenant discovery.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::definition::TenantId;

/// A tenant whose jobs are reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
}

impl Tenant {
    pub fn new(id: impl Into<TenantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Source of the tenant list, snapshotted at the start of each cycle.
pub trait TenantSource: Send + Sync {
    fn tenants(&self) -> Vec<Tenant>;
}

/// Tenant source backed by a replaceable list.
#[derive(Debug, Default)]
pub struct StaticTenantSource {
    tenants: RwLock<Vec<Tenant>>,
}

impl StaticTenantSource {
    pub fn new(tenants: Vec<Tenant>) -> Self {
        Self {
            tenants: RwLock::new(tenants),
        }
    }

    /// Replace the tenant list; picked up by the next cycle.
    pub fn replace(&self, tenants: Vec<Tenant>) {
        *self.tenants.write() = tenants;
    }
}

impl TenantSource for StaticTenantSource {
    fn tenants(&self) -> Vec<Tenant> {
        self.tenants.read().clone()
    }
}
