#![doc = "The `todo-api` library crate."]
#![doc = ""]
#![doc = "Domain models, the refresh-token authentication lifecycle, task tagging and"]
#![doc = "listing, storage backends, routing and error handling. The binary (`main.rs`)"]
#![doc = "wires these together with a Postgres store; the tests use the in-memory store."]

pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod store;
pub mod tasks;

pub use crate::app::AppState;
pub use crate::error::AppError;
