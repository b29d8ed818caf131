//! Directory repository
//!
//! Read access to users and groups, plus the inserts the test harness and
//! seeding scripts use.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    pool: PgPool,
}

impl DirectoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn user_exists(&self, user_id: Uuid) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    pub async fn group_weight(&self, group_id: Uuid) -> Result<Option<Decimal>, DatabaseError> {
        let weight = sqlx::query_scalar("SELECT weight FROM groups WHERE group_id = $1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(weight)
    }

    pub async fn insert_user(&self, user_id: Uuid, display_name: &str) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO users (user_id, display_name) VALUES ($1, $2)")
            .bind(user_id)
            .bind(display_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_group(
        &self,
        group_id: Uuid,
        name: &str,
        weight: Decimal,
    ) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO groups (group_id, name, weight) VALUES ($1, $2, $3)")
            .bind(group_id)
            .bind(name)
            .bind(weight)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
