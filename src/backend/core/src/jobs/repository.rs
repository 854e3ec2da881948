//! Job store access.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::definition::{JobDefinition, JobDefinitionId, TenantId};
use crate::error::{ErrorCode, Result, SyncError};

/// Persistence for job definitions and their status fields.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Active job definitions for a tenant scope.
    async fn get_active_jobs(&self, tenant: Option<TenantId>) -> Result<Vec<JobDefinition>>;

    /// Record a status on exactly one job.
    async fn update_status(
        &self,
        job_id: JobDefinitionId,
        tenant: Option<TenantId>,
        message: &str,
        status: &str,
    ) -> Result<()>;

    /// Clear the status fields of exactly one job.
    async fn clear_status(&self, job_id: JobDefinitionId, tenant: Option<TenantId>) -> Result<()>;
}

/// In-memory job store keyed by tenant scope.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Option<TenantId>, Vec<JobDefinition>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from definitions, grouping them by their tenant.
    pub fn with_jobs(jobs: impl IntoIterator<Item = JobDefinition>) -> Self {
        let repo = Self::new();
        for job in jobs {
            repo.upsert(job);
        }
        repo
    }

    /// Insert or replace a definition.
    pub fn upsert(&self, job: JobDefinition) {
        let mut jobs = self.jobs.write();
        let scope = jobs.entry(job.tenant_id).or_default();
        match scope.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => scope.push(job),
        }
    }

    /// Get a definition regardless of its active flag.
    pub fn get(&self, job_id: JobDefinitionId, tenant: Option<TenantId>) -> Option<JobDefinition> {
        self.jobs
            .read()
            .get(&tenant)
            .and_then(|scope| scope.iter().find(|j| j.id == job_id).cloned())
    }

    /// Tenant scopes that hold at least one definition.
    pub fn scopes(&self) -> Vec<Option<TenantId>> {
        let mut scopes: Vec<_> = self.jobs.read().keys().copied().collect();
        scopes.sort();
        scopes
    }

    fn with_job<F>(&self, job_id: JobDefinitionId, tenant: Option<TenantId>, f: F) -> Result<()>
    where
        F: FnOnce(&mut JobDefinition),
    {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&tenant)
            .and_then(|scope| scope.iter_mut().find(|j| j.id == job_id))
            .ok_or_else(|| {
                SyncError::new(
                    ErrorCode::RecordNotFound,
                    format!("Job definition not found: {}", job_id),
                )
            })?;
        f(job);
        Ok(())
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn get_active_jobs(&self, tenant: Option<TenantId>) -> Result<Vec<JobDefinition>> {
        Ok(self
            .jobs
            .read()
            .get(&tenant)
            .map(|scope| scope.iter().filter(|j| j.active).cloned().collect())
            .unwrap_or_default())
    }

    async fn update_status(
        &self,
        job_id: JobDefinitionId,
        tenant: Option<TenantId>,
        message: &str,
        status: &str,
    ) -> Result<()> {
        self.with_job(job_id, tenant, |job| {
            job.last_status = Some(status.to_string());
            job.last_status_message = Some(message.to_string());
        })
    }

    async fn clear_status(&self, job_id: JobDefinitionId, tenant: Option<TenantId>) -> Result<()> {
        self.with_job(job_id, tenant, |job| {
            job.last_status = None;
            job.last_status_message = None;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::definition::HandlerRef;

    fn job(tenant: i64) -> JobDefinition {
        JobDefinition::new("job", "0 0 * * * *", HandlerRef::new("Handler")).for_tenant(tenant)
    }

    #[tokio::test]
    async fn test_active_jobs_are_scoped() {
        let a = job(1);
        let b = job(2);
        let inactive = job(1).inactive();
        let repo = InMemoryJobRepository::with_jobs([a.clone(), b, inactive]);

        let jobs = repo.get_active_jobs(Some(TenantId(1))).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, a.id);

        assert!(repo.get_active_jobs(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let a = job(1);
        let sibling = job(1);
        let repo = InMemoryJobRepository::with_jobs([a.clone(), sibling.clone()]);

        repo.update_status(a.id, Some(TenantId(1)), "boom", "Error scheduling Job")
            .await
            .unwrap();
        let stored = repo.get(a.id, Some(TenantId(1))).unwrap();
        assert_eq!(stored.last_status.as_deref(), Some("Error scheduling Job"));
        assert!(repo.get(sibling.id, Some(TenantId(1))).unwrap().last_status.is_none());

        repo.clear_status(a.id, Some(TenantId(1))).await.unwrap();
        assert!(repo.get(a.id, Some(TenantId(1))).unwrap().last_status.is_none());
    }

    #[tokio::test]
    async fn test_status_for_wrong_tenant_fails() {
        let a = job(1);
        let repo = InMemoryJobRepository::with_jobs([a.clone()]);

        let err = repo.clear_status(a.id, Some(TenantId(2))).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordNotFound);
    }
}
