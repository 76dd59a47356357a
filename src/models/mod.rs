pub mod refresh_token;
pub mod tag;
pub mod task;
pub mod user;

pub use refresh_token::{IssuedRefreshToken, RefreshToken};
pub use tag::{Tag, TaskTagLink};
pub use task::{NewTask, Task, TaskChanges, TaskInput, TaskView, UpdateTaskInput};
pub use user::{NewUser, User};
