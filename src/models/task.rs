use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::borrow::Cow;
use std::collections::BTreeSet;
use validator::{Validate, ValidationError};

/// Rejects strings that are empty or whitespace-only.
fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some(Cow::from("must not be blank"));
        return Err(error);
    }
    Ok(())
}

/// Input structure for creating a task.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TaskInput {
    /// Must be non-blank and at most 200 characters.
    #[validate(length(max = 200), custom = "not_blank")]
    pub title: String,

    /// Must be non-blank and at most 1000 characters.
    #[validate(length(max = 1000), custom = "not_blank")]
    pub description: String,

    /// Free-form labels; normalized before storage.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Input structure for updating a task. The task id travels in the body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateTaskInput {
    #[validate(range(min = 1, message = "must be a positive task id"))]
    pub task_id: i32,

    #[validate(length(max = 200), custom = "not_blank")]
    pub title: String,

    #[validate(length(max = 1000), custom = "not_blank")]
    pub description: String,

    /// The complete desired tag set; tags not listed are removed.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Represents a task row as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Task {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub user_id: i32,
    pub created_date: DateTime<Utc>,
    pub updated_date: Option<DateTime<Utc>>,
}

/// A task about to be inserted; `tags` is already normalized.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: i32,
    pub title: String,
    pub description: String,
    pub created_date: DateTime<Utc>,
    pub tags: BTreeSet<String>,
}

/// Field changes applied by an update; `tags` is the normalized desired set.
#[derive(Debug, Clone)]
pub struct TaskChanges {
    pub title: String,
    pub description: String,
    pub updated_date: DateTime<Utc>,
    pub tags: BTreeSet<String>,
}

/// Flattened projection of a task and its tag names (alphabetical).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub created_date: DateTime<Utc>,
    pub updated_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl TaskView {
    pub fn from_task(task: Task, mut tags: Vec<String>) -> Self {
        tags.sort();
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            created_date: task.created_date,
            updated_date: task.updated_date,
            tags,
        }
    }
}
