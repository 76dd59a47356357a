use sqlx::FromRow;

/// A label shared across all users; `name` is trimmed and lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Tag {
    pub id: i32,
    pub name: String,
}

/// Join row between a task and a tag.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TaskTagLink {
    pub id: i32,
    pub task_id: i32,
    pub tag_id: i32,
}
