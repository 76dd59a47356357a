//! In-process [`Store`] used by tests and local experiments.
//!
//! All tables sit behind one mutex. Writes are staged on a copy of the tables and
//! committed by swapping the copy in, so a failing operation leaves no partial writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::AppError;
use crate::models::{
    IssuedRefreshToken, NewTask, NewUser, RefreshToken, Tag, Task, TaskChanges, TaskTagLink,
    TaskView, User,
};
use crate::store::Store;
use crate::tasks::query::{select_page, TaskListParams};
use crate::tasks::tags::{plan_for_new_task, reconcile, TagPlan};

#[derive(Debug, Default, Clone)]
struct Sequences {
    user: i32,
    token: i32,
    task: i32,
    tag: i32,
    link: i32,
}

fn bump(seq: &mut i32) -> i32 {
    *seq += 1;
    *seq
}

#[derive(Debug, Default, Clone)]
struct Tables {
    users: Vec<User>,
    refresh_tokens: Vec<RefreshToken>,
    tasks: Vec<Task>,
    tags: Vec<Tag>,
    task_tags: Vec<TaskTagLink>,
    seq: Sequences,
}

impl Tables {
    fn tag_names(&self, task_id: i32) -> BTreeSet<String> {
        self.task_tags
            .iter()
            .filter(|link| link.task_id == task_id)
            .filter_map(|link| self.tags.iter().find(|tag| tag.id == link.tag_id))
            .map(|tag| tag.name.clone())
            .collect()
    }

    fn view(&self, task: &Task) -> TaskView {
        TaskView::from_task(task.clone(), self.tag_names(task.id).into_iter().collect())
    }

    fn owned_task_index(&self, user_id: i32, task_id: i32) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.id == task_id && t.user_id == user_id)
    }

    fn find_or_create_tag(&mut self, name: &str) -> i32 {
        if let Some(tag) = self.tags.iter().find(|t| t.name == name) {
            return tag.id;
        }
        let id = bump(&mut self.seq.tag);
        self.tags.push(Tag {
            id,
            name: name.to_string(),
        });
        id
    }

    fn apply_plan(
        &mut self,
        task_id: i32,
        plan: &TagPlan,
        failing: &HashSet<String>,
    ) -> Result<(), AppError> {
        match plan {
            TagPlan::ClearAll => self.task_tags.retain(|link| link.task_id != task_id),
            TagPlan::Apply { remove, add } => {
                let removed: HashSet<i32> = self
                    .tags
                    .iter()
                    .filter(|tag| remove.contains(&tag.name))
                    .map(|tag| tag.id)
                    .collect();
                self.task_tags
                    .retain(|link| !(link.task_id == task_id && removed.contains(&link.tag_id)));

                for name in add {
                    if failing.contains(name) {
                        return Err(AppError::Storage(format!(
                            "could not associate tag '{}'",
                            name
                        )));
                    }
                    let tag_id = self.find_or_create_tag(name);
                    let linked = self
                        .task_tags
                        .iter()
                        .any(|link| link.task_id == task_id && link.tag_id == tag_id);
                    if !linked {
                        let id = bump(&mut self.seq.link);
                        self.task_tags.push(TaskTagLink {
                            id,
                            task_id,
                            tag_id,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn new_token(&mut self, user_id: i32, issued: IssuedRefreshToken) -> RefreshToken {
        let token = RefreshToken {
            id: bump(&mut self.seq.token),
            token: issued.token,
            user_id,
            created_on: issued.created_on,
            expires_on: issued.expires_on,
            revoked_on: None,
        };
        self.refresh_tokens.push(token.clone());
        token
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing_tags: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later attempt to associate the (normalized) tag `name` fail with a
    /// storage error, for exercising rollback paths.
    pub fn fail_on_tag(&self, name: &str) {
        if let Ok(mut failing) = self.failing_tags.lock() {
            failing.insert(name.to_string());
        }
    }

    /// Number of tag rows ever created.
    pub fn tag_count(&self) -> usize {
        self.lock().map(|t| t.tags.len()).unwrap_or(0)
    }

    /// Every refresh token stored for a user, oldest first.
    pub fn refresh_tokens_for(&self, user_id: i32) -> Vec<RefreshToken> {
        self.lock()
            .map(|t| {
                t.refresh_tokens
                    .iter()
                    .filter(|token| token.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }

    fn failing(&self) -> HashSet<String> {
        self.failing_tags
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, AppError> {
        let tables = self.lock()?;
        Ok(f(&tables))
    }

    /// Runs `f` against a staged copy and commits it only if `f` succeeds.
    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T, AppError>) -> Result<T, AppError> {
        let mut tables = self.lock()?;
        let mut staged = tables.clone();
        let out = f(&mut staged)?;
        *tables = staged;
        Ok(out)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_exists(&self, user_id: i32) -> Result<bool, AppError> {
        self.read(|t| t.users.iter().any(|u| u.id == user_id))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        self.read(|t| t.users.iter().any(|u| u.email == email))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.read(|t| t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, user_id: i32) -> Result<Option<User>, AppError> {
        self.read(|t| t.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn create_user(
        &self,
        user: NewUser,
        token: IssuedRefreshToken,
    ) -> Result<(User, RefreshToken), AppError> {
        self.write(|t| {
            if t.users.iter().any(|u| u.email == user.email) {
                return Err(AppError::Validation("email: Email already exists.".into()));
            }
            let user = User {
                id: bump(&mut t.seq.user),
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                created_at: user.created_at,
            };
            t.users.push(user.clone());
            let token = t.new_token(user.id, token);
            Ok((user, token))
        })
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        self.read(|t| t.refresh_tokens.iter().find(|r| r.token == token).cloned())
    }

    async fn find_active_refresh_token(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>, AppError> {
        self.read(|t| {
            t.refresh_tokens
                .iter()
                .filter(|r| r.user_id == user_id && r.is_active(now))
                .min_by_key(|r| (r.created_on, r.id))
                .cloned()
        })
    }

    async fn insert_refresh_token(
        &self,
        user_id: i32,
        token: IssuedRefreshToken,
    ) -> Result<RefreshToken, AppError> {
        self.write(|t| {
            if !t.users.iter().any(|u| u.id == user_id) {
                return Err(AppError::NotFound("User not found.".into()));
            }
            Ok(t.new_token(user_id, token))
        })
    }

    async fn rotate_refresh_token(
        &self,
        old_id: i32,
        revoked_on: DateTime<Utc>,
        replacement: IssuedRefreshToken,
    ) -> Result<Option<RefreshToken>, AppError> {
        self.write(|t| {
            let old = match t
                .refresh_tokens
                .iter_mut()
                .find(|r| r.id == old_id && r.revoked_on.is_none())
            {
                Some(old) => old,
                None => return Ok(None),
            };
            old.revoked_on = Some(revoked_on);
            let user_id = old.user_id;
            Ok(Some(t.new_token(user_id, replacement)))
        })
    }

    async fn revoke_refresh_token(
        &self,
        token_id: i32,
        revoked_on: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.write(|t| {
            match t
                .refresh_tokens
                .iter_mut()
                .find(|r| r.id == token_id && r.revoked_on.is_none())
            {
                Some(token) => {
                    token.revoked_on = Some(revoked_on);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    async fn create_task(&self, task: NewTask) -> Result<TaskView, AppError> {
        let failing = self.failing();
        self.write(|t| {
            let row = Task {
                id: bump(&mut t.seq.task),
                title: task.title,
                description: task.description,
                user_id: task.user_id,
                created_date: task.created_date,
                updated_date: None,
            };
            t.tasks.push(row.clone());
            t.apply_plan(row.id, &plan_for_new_task(&task.tags), &failing)?;
            Ok(t.view(&row))
        })
    }

    async fn find_task(&self, user_id: i32, task_id: i32) -> Result<Option<TaskView>, AppError> {
        self.read(|t| {
            t.owned_task_index(user_id, task_id)
                .map(|idx| t.view(&t.tasks[idx]))
        })
    }

    async fn update_task(
        &self,
        user_id: i32,
        task_id: i32,
        changes: TaskChanges,
    ) -> Result<Option<TaskView>, AppError> {
        let failing = self.failing();
        self.write(|t| {
            let idx = match t.owned_task_index(user_id, task_id) {
                Some(idx) => idx,
                None => return Ok(None),
            };
            {
                let task = &mut t.tasks[idx];
                task.title = changes.title;
                task.description = changes.description;
                task.updated_date = Some(changes.updated_date);
            }
            let plan = reconcile(&t.tag_names(task_id), &changes.tags);
            if !plan.is_noop() {
                t.apply_plan(task_id, &plan, &failing)?;
            }
            let row = t.tasks[idx].clone();
            Ok(Some(t.view(&row)))
        })
    }

    async fn delete_task(&self, user_id: i32, task_id: i32) -> Result<bool, AppError> {
        self.write(|t| {
            let idx = match t.owned_task_index(user_id, task_id) {
                Some(idx) => idx,
                None => return Ok(false),
            };
            t.task_tags.retain(|link| link.task_id != task_id);
            t.tasks.remove(idx);
            Ok(true)
        })
    }

    async fn list_tasks(
        &self,
        user_id: i32,
        params: &TaskListParams,
    ) -> Result<(Vec<TaskView>, i64), AppError> {
        let owned = self.read(|t| {
            t.tasks
                .iter()
                .filter(|task| task.user_id == user_id)
                .map(|task| t.view(task))
                .collect::<Vec<_>>()
        })?;
        Ok(select_page(owned, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::tags::normalize_tags;
    use chrono::Duration;

    fn issued(token: &str, now: DateTime<Utc>) -> IssuedRefreshToken {
        IssuedRefreshToken {
            token: token.to_string(),
            created_on: now,
            expires_on: now + Duration::days(7),
        }
    }

    async fn seeded_user(store: &MemoryStore, now: DateTime<Utc>) -> User {
        let (user, _) = store
            .create_user(
                NewUser {
                    name: "Ann".to_string(),
                    email: "ann@x.com".to_string(),
                    password_hash: "hash".to_string(),
                    created_at: now,
                },
                issued("first", now),
            )
            .await
            .unwrap();
        user
    }

    #[actix_rt::test]
    async fn test_rotation_is_single_use() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = seeded_user(&store, now).await;
        let first = store.find_refresh_token("first").await.unwrap().unwrap();

        let rotated = store
            .rotate_refresh_token(first.id, now, issued("second", now))
            .await
            .unwrap();
        assert_eq!(rotated.map(|r| r.user_id), Some(user.id));

        let again = store
            .rotate_refresh_token(first.id, now, issued("third", now))
            .await
            .unwrap();
        assert!(again.is_none());
        assert!(store.find_refresh_token("third").await.unwrap().is_none());
    }

    #[actix_rt::test]
    async fn test_failed_update_leaves_no_partial_writes() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = seeded_user(&store, now).await;
        let task = store
            .create_task(NewTask {
                user_id: user.id,
                title: "Original".to_string(),
                description: "d".to_string(),
                created_date: now,
                tags: normalize_tags(vec!["keep"]),
            })
            .await
            .unwrap();

        store.fail_on_tag("broken");
        let result = store
            .update_task(
                user.id,
                task.id,
                TaskChanges {
                    title: "Changed".to_string(),
                    description: "d2".to_string(),
                    updated_date: now,
                    tags: normalize_tags(vec!["fresh", "broken"]),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Storage(_))));

        let after = store.find_task(user.id, task.id).await.unwrap().unwrap();
        assert_eq!(after, task);
        assert_eq!(store.tag_count(), 1);
    }
}
