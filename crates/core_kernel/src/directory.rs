//! Household directory port
//!
//! Users and groups are managed elsewhere in the application; the engine only
//! needs to know whether a user exists and what weight a group carries when
//! a bill is split by weight.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::identifiers::{GroupId, UserId};
use crate::ports::{DomainPort, PortError};

/// Weight a group carries when none has been configured
pub const DEFAULT_GROUP_WEIGHT: Decimal = Decimal::ONE;

/// Read-only view of the user/group directory
#[async_trait]
pub trait DirectoryPort: DomainPort {
    /// Returns true if the user exists
    async fn user_exists(&self, id: UserId) -> Result<bool, PortError>;

    /// Returns the configured weight of a group, or None if the group is unknown
    async fn group_weight(&self, id: GroupId) -> Result<Option<Decimal>, PortError>;

    /// Fails with `PortError::NotFound` when the user does not exist
    async fn require_user(&self, id: UserId) -> Result<(), PortError> {
        if self.user_exists(id).await? {
            Ok(())
        } else {
            Err(PortError::not_found("User", id))
        }
    }
}

/// In-memory directory for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    pub struct MockDirectory {
        users: RwLock<HashSet<UserId>>,
        groups: RwLock<HashMap<GroupId, Decimal>>,
    }

    impl MockDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates the directory with users
        pub async fn with_users(users: impl IntoIterator<Item = UserId>) -> Self {
            let directory = Self::new();
            directory.users.write().await.extend(users);
            directory
        }

        pub async fn add_user(&self, id: UserId) {
            self.users.write().await.insert(id);
        }

        pub async fn add_group(&self, id: GroupId, weight: Decimal) {
            self.groups.write().await.insert(id, weight);
        }
    }

    impl DomainPort for MockDirectory {}

    #[async_trait]
    impl DirectoryPort for MockDirectory {
        async fn user_exists(&self, id: UserId) -> Result<bool, PortError> {
            Ok(self.users.read().await.contains(&id))
        }

        async fn group_weight(&self, id: GroupId) -> Result<Option<Decimal>, PortError> {
            Ok(self.groups.read().await.get(&id).copied())
        }
    }

}
