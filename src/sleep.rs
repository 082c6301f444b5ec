//! Simulated jobs for the `sleep` demo.

use std::time::Duration;

use fanout_task::{BoxTask, FnTask, TaskError};
use serde_json::json;

/// `count` jobs that each sleep for `millis`. The job at index `fail`, if
/// any, gives up halfway through with an error.
pub fn jobs(count: usize, millis: u64, fail: Option<usize>) -> Vec<BoxTask> {
  (0..count)
    .map(|index| {
      FnTask::boxed(format!("job-{}", index), move |cancel| async move {
        let fails = fail == Some(index);
        let nap = if fails { millis / 2 } else { millis };

        if cancel
          .run_until_cancelled(tokio::time::sleep(Duration::from_millis(nap)))
          .await
          .is_none()
        {
          return Err(TaskError::Cancelled);
        }
        if fails {
          return Err(TaskError::failed(format!("job-{} failed", index)));
        }
        Ok(json!({ "index": index, "slept_ms": nap }))
      })
    })
    .collect()
}
