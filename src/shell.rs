//! Shell command tasks.

use std::process::Stdio;

use fanout_task::{BoxTask, CancelObserver, Task, TaskError, TaskFuture};
use futures::FutureExt;
use serde_json::json;
use tokio::process::Command;
use tracing::debug;

/// Runs one command line through `sh -c`.
///
/// The child is killed if the run is cancelled while it is still executing.
#[derive(Debug, Clone)]
pub struct ShellTask {
  id: String,
  command: String,
}

impl ShellTask {
  pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      command: command.into(),
    }
  }

  pub fn boxed(id: impl Into<String>, command: impl Into<String>) -> BoxTask {
    Box::new(Self::new(id, command))
  }

  async fn execute(self, cancel: CancelObserver) -> Result<serde_json::Value, TaskError> {
    cancel.check()?;

    let child = Command::new("sh")
      .arg("-c")
      .arg(&self.command)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()?;
    debug!(task_id = %self.id, command = %self.command, pid = ?child.id(), "spawned");

    // Dropping the wait future drops the child, which kills it.
    let output = match cancel.run_until_cancelled(child.wait_with_output()).await {
      Some(output) => output?,
      None => return Err(TaskError::Cancelled),
    };

    if output.status.success() {
      let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
      Ok(json!({
        "command": self.command,
        "stdout": stdout,
      }))
    } else {
      let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
      Err(TaskError::failed(format!(
        "`{}` exited with {}: {}",
        self.command, output.status, stderr
      )))
    }
  }
}

impl Task for ShellTask {
  fn id(&self) -> &str {
    &self.id
  }

  fn run(self: Box<Self>, cancel: CancelObserver) -> TaskFuture {
    self.execute(cancel).boxed()
  }
}
