use crate::{
    auth::AuthenticatedUserId,
    error::AppError,
    models::{TaskInput, UpdateTaskInput},
    tasks::{query::TaskListRequest, service::TaskService},
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};

/// Retrieves one page of the authenticated user's tasks.
///
/// ## Query Parameters:
/// - `page_number`, `page_size` (optional): 1-based page and its size (default 10, at most 100).
/// - `filter_by_tag`, `filter_by_title`, `filter_by_description` (optional):
///   case-insensitive substring filters, combined with AND.
/// - `sort_by` (optional): `id` (default), `title` or `tagcount`.
/// - `is_ascending` (optional): defaults to `true`.
///
/// ## Responses:
/// - `200 OK`: A `TaskPage` with the items and paging metadata.
/// - `401 Unauthorized`: If the request lacks a valid access token.
#[get("")]
pub async fn list_tasks(
    tasks: web::Data<TaskService>,
    query_params: web::Query<TaskListRequest>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    let page = tasks.list(user.0, &query_params).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Creates a new task for the authenticated user.
///
/// ## Request Body:
/// A JSON `TaskInput`: `title` (at most 200 characters), `description` (at most 1000
/// characters), and optional `tags`.
///
/// ## Responses:
/// - `201 Created`: The new task with its normalized tags.
/// - `400 Bad Request`: Blank or oversized fields.
/// - `401 Unauthorized`: If the request lacks a valid access token.
#[post("")]
pub async fn create_task(
    tasks: web::Data<TaskService>,
    task_data: web::Json<TaskInput>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    let task = tasks.create(user.0, task_data.into_inner()).await?;
    Ok(HttpResponse::Created().json(task))
}

/// Retrieves a single task owned by the authenticated user.
///
/// ## Responses:
/// - `200 OK`: The task.
/// - `404 Not Found`: No such task for this user.
#[get("/{id}")]
pub async fn get_task(
    tasks: web::Data<TaskService>,
    task_id: web::Path<i32>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    let task = tasks.get(user.0, task_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// Replaces a task's title, description and tags. The task id is part of the body.
///
/// ## Responses:
/// - `200 OK`: The updated task.
/// - `400 Bad Request`: Invalid task id or blank fields.
/// - `404 Not Found`: No such task for this user.
#[put("")]
pub async fn update_task(
    tasks: web::Data<TaskService>,
    task_data: web::Json<UpdateTaskInput>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    let task = tasks.update(user.0, task_data.into_inner()).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// Deletes a task owned by the authenticated user.
///
/// ## Responses:
/// - `204 No Content`: Deleted.
/// - `404 Not Found`: No such task for this user.
#[delete("/{id}")]
pub async fn delete_task(
    tasks: web::Data<TaskService>,
    task_id: web::Path<i32>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    tasks.delete(user.0, task_id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
