//! Fanout Config
//!
//! Serializable settings for a pipeline run. A config can be built in code,
//! parsed from a JSON string, or loaded from a JSON file (via the CLI with
//! `--config=pipeline.json`):
//!
//! ```json
//! { "capacity": 8, "timeout_ms": 30000 }
//! ```
//!
//! Every loader validates before returning, so a config that made it out of
//! this crate is safe to hand to the pipeline.

mod error;
mod pipeline;

pub use error::ConfigError;
pub use pipeline::{DEFAULT_CAPACITY, PipelineConfig};
