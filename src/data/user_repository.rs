use crate::domain::error::DomainError;
use crate::domain::repository::UserRepository;
use crate::domain::user::User;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace, warn};

#[derive(Default)]
struct UserTable {
    rows: BTreeMap<u32, User>,
    last_id: u32,
}

impl UserTable {
    fn email_taken(&self, email: &str, except: Option<u32>) -> bool {
        self.rows
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

/// Auto-incrementing user table kept in memory.
#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    table: Arc<RwLock<UserTable>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn insert(&self, mut user: User) -> Result<User> {
        trace!("Acquiring write lock for user table");
        let mut table = self.table.write().await;

        if table.email_taken(&user.email, None) {
            warn!(email = %user.email, "Email already registered");
            return Err(DomainError::Conflict(format!("email {} is already registered", user.email)).into());
        }

        let id = table
            .last_id
            .checked_add(1)
            .ok_or_else(|| DomainError::Internal("user id space exhausted".to_string()))?;
        table.last_id = id;
        user.id = id;
        table.rows.insert(id, user.clone());

        debug!(user_id = id, email = %user.email, "User inserted");
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: u32) -> Result<Option<User>> {
        trace!("Acquiring read lock for user table");
        let table = self.table.read().await;
        let user = table.rows.get(&id).cloned();
        match &user {
            Some(u) => debug!(user_id = u.id, email = %u.email, "User found"),
            None => trace!(user_id = id, "User not found"),
        }
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        trace!("Acquiring read lock for user table");
        let table = self.table.read().await;
        let user = table.rows.values().find(|u| u.email == email).cloned();
        match &user {
            Some(u) => debug!(user_id = u.id, email = %u.email, "User found"),
            None => trace!(email = email, "User not found"),
        }
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_all(&self) -> Result<Vec<User>> {
        let table = self.table.read().await;
        Ok(table.rows.values().cloned().collect())
    }

    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn update(&self, id: u32, user: User) -> Result<Option<User>> {
        trace!("Acquiring write lock for user table");
        let mut table = self.table.write().await;

        if !table.rows.contains_key(&id) {
            trace!(user_id = id, "Nothing to update");
            return Ok(None);
        }
        if table.email_taken(&user.email, Some(id)) {
            warn!(user_id = id, email = %user.email, "Email belongs to another user");
            return Err(DomainError::Conflict(format!("email {} is already registered", user.email)).into());
        }

        let updated = User { id, ..user };
        table.rows.insert(id, updated.clone());
        debug!(user_id = id, "User updated");
        Ok(Some(updated))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: u32) -> Result<bool> {
        let mut table = self.table.write().await;
        let removed = table.rows.remove(&id).is_some();
        debug!(user_id = id, removed = removed, "Delete applied");
        Ok(removed)
    }

    async fn max_id(&self) -> Result<u32> {
        let table = self.table.read().await;
        Ok(table.rows.keys().next_back().copied().unwrap_or(0))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.table.read().await.rows.len())
    }
}
