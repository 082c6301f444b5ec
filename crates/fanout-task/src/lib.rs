//! Task contract for fanout.
//!
//! A [`Task`] is an opaque unit of work: an identifier plus a body that
//! receives a [`CancelObserver`] and produces either a JSON value or a
//! [`TaskError`]. The pipeline never looks inside the body; it only decides
//! when (and whether) to run it.
//!
//! # Usage
//!
//! ```ignore
//! use fanout_task::{FnTask, TaskError};
//!
//! let task = FnTask::boxed("thumb-1", |cancel| async move {
//!     cancel.check()?;
//!     // ... do one unit of sub-work ...
//!     cancel.check()?;
//!     Ok(serde_json::json!({ "written": "a.thumb.png" }))
//! });
//! ```

mod cancel;
mod error;
mod task;

pub use cancel::CancelObserver;
pub use error::TaskError;
pub use task::{BoxTask, FnTask, Task, TaskFuture};
