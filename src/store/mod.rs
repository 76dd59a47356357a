//! Storage collaborator.
//!
//! Services talk to persistence only through [`Store`]. Every method that writes more
//! than one row is atomic: either all of its writes land or none do.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    IssuedRefreshToken, NewTask, NewUser, RefreshToken, TaskChanges, TaskView, User,
};
use crate::tasks::query::TaskListParams;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn user_exists(&self, user_id: i32) -> Result<bool, AppError>;

    async fn email_exists(&self, email: &str) -> Result<bool, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_id(&self, user_id: i32) -> Result<Option<User>, AppError>;

    /// Inserts a user together with its first refresh token, atomically.
    async fn create_user(
        &self,
        user: NewUser,
        token: IssuedRefreshToken,
    ) -> Result<(User, RefreshToken), AppError>;

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError>;

    /// The user's oldest token that is neither revoked nor expired at `now`.
    async fn find_active_refresh_token(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>, AppError>;

    async fn insert_refresh_token(
        &self,
        user_id: i32,
        token: IssuedRefreshToken,
    ) -> Result<RefreshToken, AppError>;

    /// Revokes `old_id` and inserts `replacement` for the same user, atomically.
    ///
    /// Returns `None` (and writes nothing) when the old token was already revoked.
    async fn rotate_refresh_token(
        &self,
        old_id: i32,
        revoked_on: DateTime<Utc>,
        replacement: IssuedRefreshToken,
    ) -> Result<Option<RefreshToken>, AppError>;

    /// Sets `revoked_on`; returns `false` when the token was already revoked.
    async fn revoke_refresh_token(
        &self,
        token_id: i32,
        revoked_on: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Inserts a task and associates its tags, reusing tag rows by name.
    async fn create_task(&self, task: NewTask) -> Result<TaskView, AppError>;

    async fn find_task(&self, user_id: i32, task_id: i32) -> Result<Option<TaskView>, AppError>;

    /// Updates fields and reconciles tags in one transaction.
    ///
    /// Returns `None` when the user owns no task with that id.
    async fn update_task(
        &self,
        user_id: i32,
        task_id: i32,
        changes: TaskChanges,
    ) -> Result<Option<TaskView>, AppError>;

    /// Deletes a task and its tag associations; tag rows stay.
    async fn delete_task(&self, user_id: i32, task_id: i32) -> Result<bool, AppError>;

    /// One page of the user's tasks and the total number of matches.
    async fn list_tasks(
        &self,
        user_id: i32,
        params: &TaskListParams,
    ) -> Result<(Vec<TaskView>, i64), AppError>;
}
