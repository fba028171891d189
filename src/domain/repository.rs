use crate::domain::user::User;
use anyhow::Result;
use async_trait::async_trait;

/// Persistence contract for user records.
///
/// Ids are assigned by the store on insert and never reused. Emails are
/// unique: `insert` and `update` fail with `DomainError::Conflict` when the
/// email already belongs to another record.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Stores a new record. The `id` of the argument is ignored.
    async fn insert(&self, user: User) -> Result<User>;
    async fn find_by_id(&self, id: u32) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_all(&self) -> Result<Vec<User>>;
    /// Replaces name, email and password of record `id`. `None` if absent.
    async fn update(&self, id: u32, user: User) -> Result<Option<User>>;
    /// Returns whether a record was removed. Absence is not an error.
    async fn delete(&self, id: u32) -> Result<bool>;
    /// Highest id currently stored, or 0 when empty.
    async fn max_id(&self) -> Result<u32>;
    async fn count(&self) -> Result<usize>;
}
