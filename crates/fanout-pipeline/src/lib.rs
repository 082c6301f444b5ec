//! Fanout Pipeline
//!
//! Runs tasks from a source with a fixed upper bound on how many bodies
//! execute at once. The first task failure (in completion order) cancels the
//! run: nothing new is admitted, running bodies are asked to stop, and the
//! failure is returned once every launched task has finished.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Pipeline                            │
//! │  - run(source) / run_with_cancel(source, token)             │
//! │  - admission loop and drain polled together on one flow     │
//! └─────────────────────────────────────────────────────────────┘
//!            │ acquire                          ▲ outcomes
//!            ▼                                  │
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │      AdmissionGate       │   │          Collector           │
//! │  - semaphore, C slots    │   │  - completion order          │
//! │  - cancel beats a slot   │   │  - first failure wins        │
//! └──────────────────────────┘   └──────────────────────────────┘
//!            │ launch                           ▲ publish
//!            ▼                                  │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Executor (one tokio task)                  │
//! │  - skip if cancelled, else run body, catch panics           │
//! │  - publish, release slot, exit its TaskTracker entry        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Executors are spawned on a `TaskTracker` that is closed only when
//! admission ends, so a streamed source never looks finished early. A closer
//! future waits on the tracker and then closes the collector's intake.
//! Dropping the run future cancels the run's signal, so executors that are
//! still alive stop cooperatively.
//!
//! # Usage
//!
//! ```ignore
//! use fanout_pipeline::{FnTask, Pipeline, from_tasks};
//!
//! let pipeline = Pipeline::with_capacity(2)?;
//! let tasks = (0..5).map(|i| {
//!     FnTask::boxed(i.to_string(), move |cancel| async move {
//!         cancel.check()?;
//!         Ok(serde_json::json!(i * 2))
//!     })
//! });
//! let summary = pipeline.run(from_tasks(tasks.collect::<Vec<_>>())).await?;
//! ```

mod cancel;
mod collector;
mod error;
pub mod events;
mod gate;
mod launcher;
mod outcome;
mod pipeline;
mod source;

pub use cancel::{CancelReason, Cancellation};
pub use error::PipelineError;
pub use events::{ChannelNotifier, NoopNotifier, PipelineEvent, PipelineNotifier};
pub use gate::{Admission, AdmissionGate, Slot};
pub use outcome::RunSummary;
pub use pipeline::Pipeline;
pub use source::{TaskSource, from_channel, from_tasks};

pub use fanout_config::{ConfigError, PipelineConfig};
pub use fanout_task::{BoxTask, CancelObserver, FnTask, Task, TaskError, TaskFuture};
