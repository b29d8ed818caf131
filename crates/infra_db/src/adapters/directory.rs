//! PostgreSQL Directory Adapter

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use core_kernel::{DirectoryPort, DomainPort, GroupId, HealthCheckResult, HealthCheckable, PortError, UserId};

use super::ping;
use crate::repositories::directory::DirectoryRepository;

/// Reads users and groups from the household tables
#[derive(Debug, Clone)]
pub struct PostgresDirectoryAdapter {
    repository: DirectoryRepository,
    pool: PgPool,
}

impl PostgresDirectoryAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: DirectoryRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn repository(&self) -> &DirectoryRepository {
        &self.repository
    }
}

impl DomainPort for PostgresDirectoryAdapter {}

#[async_trait]
impl HealthCheckable for PostgresDirectoryAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-directory-adapter").await
    }
}

#[async_trait]
impl DirectoryPort for PostgresDirectoryAdapter {
    async fn user_exists(&self, id: UserId) -> Result<bool, PortError> {
        Ok(self.repository.user_exists(*id.as_uuid()).await?)
    }

    async fn group_weight(&self, id: GroupId) -> Result<Option<Decimal>, PortError> {
        Ok(self.repository.group_weight(*id.as_uuid()).await?)
    }
}
