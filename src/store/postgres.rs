//! Postgres-backed [`Store`].
//!
//! Multi-row writes run inside a single sqlx transaction. A transaction that is dropped
//! before `commit` (an error path, or the request future being cancelled) rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use std::collections::{BTreeSet, HashMap};

use crate::error::AppError;
use crate::models::{
    IssuedRefreshToken, NewTask, NewUser, RefreshToken, Task, TaskChanges, TaskView, User,
};
use crate::store::Store;
use crate::tasks::query::{like_pattern, SortKey, TaskListParams};
use crate::tasks::tags::{plan_for_new_task, reconcile, TagPlan};

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at";
const TOKEN_COLUMNS: &str = "id, token, user_id, created_on, expires_on, revoked_on";
const TASK_COLUMNS: &str = "id, title, description, user_id, created_date, updated_date";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        Ok(Self::new(PgPool::connect(database_url).await?))
    }

    /// Applies the embedded migrations under `migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        log::info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps a unique-constraint violation to a validation error, anything else to storage.
fn unique_violation_as(error: sqlx::Error, message: &str) -> AppError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Validation(message.to_string())
        }
        _ => error.into(),
    }
}

async fn insert_token(
    conn: &mut PgConnection,
    user_id: i32,
    issued: IssuedRefreshToken,
) -> Result<RefreshToken, sqlx::Error> {
    sqlx::query_as::<_, RefreshToken>(&format!(
        "INSERT INTO refresh_tokens (token, user_id, created_on, expires_on) \
         VALUES ($1, $2, $3, $4) RETURNING {}",
        TOKEN_COLUMNS
    ))
    .bind(issued.token)
    .bind(user_id)
    .bind(issued.created_on)
    .bind(issued.expires_on)
    .fetch_one(&mut *conn)
    .await
}

async fn tag_names(conn: &mut PgConnection, task_id: i32) -> Result<BTreeSet<String>, sqlx::Error> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT g.name FROM task_tags tt JOIN tags g ON g.id = tt.tag_id WHERE tt.task_id = $1",
    )
    .bind(task_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(names.into_iter().collect())
}

/// Applies a reconciliation plan for one task, reusing tag rows by name.
async fn apply_plan(conn: &mut PgConnection, task_id: i32, plan: &TagPlan) -> Result<(), sqlx::Error> {
    match plan {
        TagPlan::ClearAll => {
            sqlx::query("DELETE FROM task_tags WHERE task_id = $1")
                .bind(task_id)
                .execute(&mut *conn)
                .await?;
        }
        TagPlan::Apply { remove, add } => {
            if !remove.is_empty() {
                sqlx::query(
                    "DELETE FROM task_tags tt USING tags g \
                     WHERE tt.tag_id = g.id AND tt.task_id = $1 AND g.name = ANY($2)",
                )
                .bind(task_id)
                .bind(remove.iter().cloned().collect::<Vec<String>>())
                .execute(&mut *conn)
                .await?;
            }
            for name in add {
                // The no-op update makes RETURNING yield the existing row on conflict.
                let tag_id = sqlx::query_scalar::<_, i32>(
                    "INSERT INTO tags (name) VALUES ($1) \
                     ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id",
                )
                .bind(name)
                .fetch_one(&mut *conn)
                .await?;
                sqlx::query(
                    "INSERT INTO task_tags (task_id, tag_id) VALUES ($1, $2) \
                     ON CONFLICT (task_id, tag_id) DO NOTHING",
                )
                .bind(task_id)
                .bind(tag_id)
                .execute(&mut *conn)
                .await?;
            }
        }
    }
    Ok(())
}

async fn load_view(conn: &mut PgConnection, task: Task) -> Result<TaskView, sqlx::Error> {
    let tags = tag_names(conn, task.id).await?;
    Ok(TaskView::from_task(task, tags.into_iter().collect()))
}

#[async_trait]
impl Store for PgStore {
    async fn user_exists(&self, user_id: i32) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: i32) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(
        &self,
        user: NewUser,
        token: IssuedRefreshToken,
    ) -> Result<(User, RefreshToken), AppError> {
        let mut tx = self.pool.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| unique_violation_as(e, "email: Email already exists."))?;
        let token = insert_token(&mut tx, user.id, token).await?;
        tx.commit().await?;
        Ok((user, token))
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let found = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {} FROM refresh_tokens WHERE token = $1",
            TOKEN_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found)
    }

    async fn find_active_refresh_token(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>, AppError> {
        let found = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {} FROM refresh_tokens \
             WHERE user_id = $1 AND revoked_on IS NULL AND expires_on > $2 \
             ORDER BY created_on, id LIMIT 1",
            TOKEN_COLUMNS
        ))
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found)
    }

    async fn insert_refresh_token(
        &self,
        user_id: i32,
        token: IssuedRefreshToken,
    ) -> Result<RefreshToken, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(insert_token(&mut conn, user_id, token).await?)
    }

    async fn rotate_refresh_token(
        &self,
        old_id: i32,
        revoked_on: DateTime<Utc>,
        replacement: IssuedRefreshToken,
    ) -> Result<Option<RefreshToken>, AppError> {
        let mut tx = self.pool.begin().await?;
        let owner = sqlx::query_scalar::<_, i32>(
            "UPDATE refresh_tokens SET revoked_on = $1 \
             WHERE id = $2 AND revoked_on IS NULL RETURNING user_id",
        )
        .bind(revoked_on)
        .bind(old_id)
        .fetch_optional(&mut *tx)
        .await?;
        let user_id = match owner {
            Some(user_id) => user_id,
            // Dropping `tx` rolls back; nothing was written anyway.
            None => return Ok(None),
        };
        let token = insert_token(&mut tx, user_id, replacement).await?;
        tx.commit().await?;
        Ok(Some(token))
    }

    async fn revoke_refresh_token(
        &self,
        token_id: i32,
        revoked_on: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_on = $1 WHERE id = $2 AND revoked_on IS NULL",
        )
        .bind(revoked_on)
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn create_task(&self, task: NewTask) -> Result<TaskView, AppError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (title, description, user_id, created_date) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.user_id)
        .bind(task.created_date)
        .fetch_one(&mut *tx)
        .await?;
        apply_plan(&mut tx, row.id, &plan_for_new_task(&task.tags)).await?;
        let view = load_view(&mut tx, row).await?;
        tx.commit().await?;
        Ok(view)
    }

    async fn find_task(&self, user_id: i32, task_id: i32) -> Result<Option<TaskView>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = $1 AND user_id = $2",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
        match row {
            Some(task) => Ok(Some(load_view(&mut conn, task).await?)),
            None => Ok(None),
        }
    }

    async fn update_task(
        &self,
        user_id: i32,
        task_id: i32,
        changes: TaskChanges,
    ) -> Result<Option<TaskView>, AppError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET title = $1, description = $2, updated_date = $3 \
             WHERE id = $4 AND user_id = $5 RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.updated_date)
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let existing = tag_names(&mut tx, task_id).await?;
        let plan = reconcile(&existing, &changes.tags);
        if !plan.is_noop() {
            apply_plan(&mut tx, task_id, &plan).await?;
        }
        let view = load_view(&mut tx, row).await?;
        tx.commit().await?;
        Ok(Some(view))
    }

    async fn delete_task(&self, user_id: i32, task_id: i32) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        let owned = sqlx::query_scalar::<_, i32>(
            "SELECT id FROM tasks WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if owned.is_none() {
            return Ok(false);
        }
        sqlx::query("DELETE FROM task_tags WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn list_tasks(
        &self,
        user_id: i32,
        params: &TaskListParams,
    ) -> Result<(Vec<TaskView>, i64), AppError> {
        // $1 is always the owner; filter patterns follow in order.
        let mut conditions = vec!["t.user_id = $1".to_string()];
        let mut patterns: Vec<String> = Vec::new();

        if let Some(tag) = &params.tag {
            patterns.push(like_pattern(tag));
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM task_tags tt JOIN tags g ON g.id = tt.tag_id \
                 WHERE tt.task_id = t.id AND g.name ILIKE ${})",
                patterns.len() + 1
            ));
        }
        if let Some(title) = &params.title {
            patterns.push(like_pattern(title));
            conditions.push(format!("t.title ILIKE ${}", patterns.len() + 1));
        }
        if let Some(description) = &params.description {
            patterns.push(like_pattern(description));
            conditions.push(format!("t.description ILIKE ${}", patterns.len() + 1));
        }
        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM tasks t WHERE {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(user_id);
        for pattern in &patterns {
            count_query = count_query.bind(pattern.as_str());
        }
        let total = count_query.fetch_one(&self.pool).await?;
        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let direction = if params.ascending { "ASC" } else { "DESC" };
        let order = match params.sort {
            SortKey::Id => format!("t.id {}", direction),
            // Lower-cased and byte-ordered so the result does not depend on the database locale.
            SortKey::Title => format!(
                "lower(t.title) COLLATE \"C\" {d}, t.id {d}",
                d = direction
            ),
            SortKey::TagCount => format!(
                "(SELECT COUNT(*) FROM task_tags tc WHERE tc.task_id = t.id) {d}, t.id {d}",
                d = direction
            ),
        };
        let page_sql = format!(
            "SELECT t.id, t.title, t.description, t.user_id, t.created_date, t.updated_date \
             FROM tasks t WHERE {} ORDER BY {} LIMIT ${} OFFSET ${}",
            where_clause,
            order,
            patterns.len() + 2,
            patterns.len() + 3
        );
        let mut page_query = sqlx::query_as::<_, Task>(&page_sql).bind(user_id);
        for pattern in &patterns {
            page_query = page_query.bind(pattern.as_str());
        }
        let rows = page_query
            .bind(params.page_size)
            .bind(params.offset())
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<i32> = rows.iter().map(|t| t.id).collect();
        let links = sqlx::query_as::<_, (i32, String)>(
            "SELECT tt.task_id, g.name FROM task_tags tt JOIN tags g ON g.id = tt.tag_id \
             WHERE tt.task_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let mut tags_by_task: HashMap<i32, Vec<String>> = HashMap::new();
        for (task_id, name) in links {
            tags_by_task.entry(task_id).or_default().push(name);
        }

        let page = rows
            .into_iter()
            .map(|task| {
                let tags = tags_by_task.remove(&task.id).unwrap_or_default();
                TaskView::from_task(task, tags)
            })
            .collect();
        Ok((page, total))
    }
}
