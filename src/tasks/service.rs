use log::{debug, info};
use std::sync::Arc;
use validator::Validate;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{NewTask, TaskChanges, TaskInput, TaskView, UpdateTaskInput};
use crate::store::Store;
use crate::tasks::query::{PageMeta, TaskListRequest, TaskPage};
use crate::tasks::tags::normalize_tags;

fn task_not_found() -> AppError {
    AppError::NotFound("Task not found.".into())
}

/// Task CRUD scoped to the owning user. A task owned by someone else behaves exactly
/// like a task that does not exist.
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create(&self, user_id: i32, input: TaskInput) -> Result<TaskView, AppError> {
        if !self.store.user_exists(user_id).await? {
            return Err(AppError::Validation("User not found.".into()));
        }
        input.validate()?;

        let task = self
            .store
            .create_task(NewTask {
                user_id,
                title: input.title,
                description: input.description,
                created_date: self.clock.now(),
                tags: normalize_tags(&input.tags),
            })
            .await?;
        info!("User {} created task {}", user_id, task.id);
        Ok(task)
    }

    /// Replaces title, description and the whole tag set in one atomic write.
    pub async fn update(&self, user_id: i32, input: UpdateTaskInput) -> Result<TaskView, AppError> {
        input.validate()?;

        let changes = TaskChanges {
            title: input.title,
            description: input.description,
            updated_date: self.clock.now(),
            tags: normalize_tags(&input.tags),
        };
        let task = self
            .store
            .update_task(user_id, input.task_id, changes)
            .await?
            .ok_or_else(task_not_found)?;
        info!("User {} updated task {}", user_id, task.id);
        Ok(task)
    }

    pub async fn get(&self, user_id: i32, task_id: i32) -> Result<TaskView, AppError> {
        self.store
            .find_task(user_id, task_id)
            .await?
            .ok_or_else(task_not_found)
    }

    pub async fn list(&self, user_id: i32, request: &TaskListRequest) -> Result<TaskPage, AppError> {
        let params = request.normalize();
        let (items, total) = self.store.list_tasks(user_id, &params).await?;
        debug!(
            "Listed {} of {} tasks for user {} (page {})",
            items.len(),
            total,
            user_id,
            params.page
        );
        Ok(TaskPage {
            items,
            meta: PageMeta::new(total, params.page, params.page_size),
        })
    }

    /// Removes the task and its tag links. Tag rows are kept.
    pub async fn delete(&self, user_id: i32, task_id: i32) -> Result<(), AppError> {
        if !self.store.delete_task(user_id, task_id).await? {
            return Err(task_not_found());
        }
        info!("User {} deleted task {}", user_id, task_id);
        Ok(())
    }
}
