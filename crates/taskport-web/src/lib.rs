//! HTTP API for Taskport.
//!
//! Plain CRUD over tasks, subtasks, attachments and users. Creating a task, subtask
//! or attachment allocates its id from the shared counter store before the document
//! is written, so a failed write only wastes an id.

mod error;
mod models;
mod routes;

pub use error::ApiError;
pub use models::{Attachment, NewAttachment, NewTask, Subtask, Task, User};
pub use routes::{AppState, create_router};
