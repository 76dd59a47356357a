//! Tasks: tag reconciliation, listing queries, and the task service.

pub mod query;
pub mod service;
pub mod tags;

pub use service::TaskService;
