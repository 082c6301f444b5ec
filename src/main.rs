use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use fanout_config::{DEFAULT_CAPACITY, PipelineConfig};
use fanout_pipeline::{ChannelNotifier, Pipeline, PipelineEvent, RunSummary, from_channel, from_tasks};
use fanout_task::BoxTask;

mod shell;
mod sleep;

use shell::ShellTask;

/// Fanout - run jobs with bounded concurrency, stopping at the first failure
#[derive(Parser)]
#[command(name = "fanout")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run shell commands, from arguments or one per line on stdin
  Run {
    /// Maximum number of commands running at once
    #[arg(long)]
    capacity: Option<usize>,

    /// Cancel the run after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Path to a JSON pipeline config; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cancel the run when ENTER is pressed
    #[arg(long)]
    abort_on_enter: bool,

    /// Commands to run; read from stdin when omitted
    commands: Vec<String>,
  },

  /// Run simulated jobs that sleep, and report the wall time
  Sleep {
    /// Number of jobs
    #[arg(long, default_value_t = 5)]
    count: usize,

    /// How long each job sleeps
    #[arg(long, default_value_t = 1000)]
    millis: u64,

    /// Index of a job that fails halfway through
    #[arg(long)]
    fail: Option<usize>,

    /// Maximum number of jobs running at once
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,
  },
}

struct RunArgs {
  capacity: Option<usize>,
  timeout_ms: Option<u64>,
  config: Option<PathBuf>,
  abort_on_enter: bool,
  commands: Vec<String>,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(std::io::stderr)
    .init();

  match cli.command {
    Some(Commands::Run {
      capacity,
      timeout_ms,
      config,
      abort_on_enter,
      commands,
    }) => {
      block_on(run_commands(RunArgs {
        capacity,
        timeout_ms,
        config,
        abort_on_enter,
        commands,
      }))?;
    }
    Some(Commands::Sleep {
      count,
      millis,
      fail,
      capacity,
    }) => {
      block_on(run_sleep(count, millis, fail, capacity))?;
    }
    None => {
      println!("fanout - use --help to see available commands");
    }
  }

  Ok(())
}

fn block_on<F>(future: F) -> Result<()>
where
  F: std::future::Future<Output = Result<()>>,
{
  let rt = tokio::runtime::Runtime::new()?;
  let result = rt.block_on(future);
  // A pending stdin read would otherwise keep the runtime alive.
  rt.shutdown_timeout(Duration::from_millis(100));
  result
}

async fn run_commands(args: RunArgs) -> Result<()> {
  let mut config = match &args.config {
    Some(path) => PipelineConfig::load(path)
      .with_context(|| format!("failed to load config: {}", path.display()))?,
    None => PipelineConfig::default(),
  };
  if let Some(capacity) = args.capacity {
    config.capacity = capacity;
  }
  if let Some(timeout_ms) = args.timeout_ms {
    config.timeout_ms = Some(timeout_ms);
  }

  let from_stdin = args.commands.is_empty();
  if from_stdin && args.abort_on_enter {
    bail!("--abort-on-enter needs the commands as arguments, stdin is already used for the command list");
  }

  let (notifier, events) = ChannelNotifier::channel();
  let pipeline = Pipeline::new(config)
    .context("invalid pipeline configuration")?
    .with_notifier(Arc::new(notifier));

  let cancel = CancellationToken::new();
  let mut interrupts = vec![spawn_ctrl_c(cancel.clone())];
  if args.abort_on_enter {
    interrupts.push(spawn_abort_on_enter(cancel.clone()));
  }
  let printer = tokio::spawn(print_events(events));

  let result = if from_stdin {
    let (sender, receiver) = mpsc::channel(pipeline.capacity());
    let reader = tokio::spawn(read_commands(sender, cancel.clone()));
    let result = pipeline.run_with_cancel(from_channel(receiver), cancel.clone()).await;
    reader.abort();
    result
  } else {
    let tasks: Vec<BoxTask> = args
      .commands
      .into_iter()
      .enumerate()
      .map(|(index, command)| ShellTask::boxed(index.to_string(), command))
      .collect();
    pipeline.run_with_cancel(from_tasks(tasks), cancel.clone()).await
  };

  for handle in interrupts {
    handle.abort();
  }
  // Closes the event channel so the printer can finish.
  drop(pipeline);
  printer.await.context("event printer failed")?;

  let summary = result.context("pipeline run failed")?;
  report(&summary);
  Ok(())
}

async fn run_sleep(count: usize, millis: u64, fail: Option<usize>, capacity: usize) -> Result<()> {
  let pipeline = Pipeline::with_capacity(capacity).context("invalid pipeline configuration")?;
  let cancel = CancellationToken::new();
  let ctrl_c = spawn_ctrl_c(cancel.clone());

  eprintln!(
    "Running {} jobs of {}ms with capacity {}",
    count, millis, capacity
  );
  let started = Instant::now();
  let result = pipeline
    .run_with_cancel(from_tasks(sleep::jobs(count, millis, fail)), cancel)
    .await;
  ctrl_c.abort();
  eprintln!("Finished in {}ms", started.elapsed().as_millis());

  let summary = result.context("pipeline run failed")?;
  report(&summary);
  Ok(())
}

fn report(summary: &RunSummary) {
  eprintln!(
    "Execution {}: {} succeeded, {} failed, {} skipped",
    summary.execution_id, summary.succeeded, summary.failed, summary.skipped
  );
  match serde_json::to_string_pretty(summary) {
    Ok(json) => println!("{}", json),
    Err(e) => warn!(error = %e, "failed to serialize run summary"),
  }
}

/// Print every pipeline event as one JSON line.
async fn print_events(mut events: mpsc::UnboundedReceiver<PipelineEvent>) {
  while let Some(event) = events.recv().await {
    match serde_json::to_string(&event) {
      Ok(line) => println!("{}", line),
      Err(e) => warn!(error = %e, "failed to serialize event"),
    }
  }
}

/// Feed one shell task per non-empty stdin line into `sender`.
async fn read_commands(sender: mpsc::Sender<BoxTask>, cancel: CancellationToken) {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut index = 0usize;

  loop {
    let line = tokio::select! {
      biased;
      _ = cancel.cancelled() => break,
      line = lines.next_line() => line,
    };
    let command = match line {
      Ok(Some(line)) => line,
      Ok(None) => break,
      Err(e) => {
        warn!(error = %e, "failed to read command from stdin");
        break;
      }
    };
    let command = command.trim();
    if command.is_empty() {
      continue;
    }

    let task = ShellTask::boxed(index.to_string(), command);
    index += 1;
    if sender.send(task).await.is_err() {
      // The run stopped pulling.
      break;
    }
  }
}

fn spawn_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => {
        eprintln!("Interrupted, cancelling remaining jobs");
        cancel.cancel();
      }
      Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
    }
  })
}

fn spawn_abort_on_enter(cancel: CancellationToken) -> JoinHandle<()> {
  eprintln!("Press ENTER to abort");
  tokio::spawn(async move {
    let mut byte = [0u8; 1];
    match tokio::io::stdin().read(&mut byte).await {
      Ok(n) if n > 0 => {
        eprintln!("Sent signal to abort all jobs");
        cancel.cancel();
      }
      // EOF or a closed stdin never aborts the run.
      Ok(_) => {}
      Err(e) => warn!(error = %e, "failed to read stdin"),
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn test_cli_is_well_formed() {
    Cli::command().debug_assert();
  }

  #[test]
  fn test_parse_run_args() {
    let cli = Cli::try_parse_from([
      "fanout",
      "run",
      "--capacity",
      "2",
      "--timeout-ms",
      "500",
      "echo a",
      "echo b",
    ])
    .unwrap();

    match cli.command {
      Some(Commands::Run {
        capacity,
        timeout_ms,
        commands,
        abort_on_enter,
        ..
      }) => {
        assert_eq!(capacity, Some(2));
        assert_eq!(timeout_ms, Some(500));
        assert!(!abort_on_enter);
        assert_eq!(commands, vec!["echo a", "echo b"]);
      }
      _ => panic!("expected run command"),
    }
  }

  #[test]
  fn test_sleep_defaults() {
    let cli = Cli::try_parse_from(["fanout", "sleep"]).unwrap();
    match cli.command {
      Some(Commands::Sleep {
        count,
        capacity,
        fail,
        ..
      }) => {
        assert_eq!(count, 5);
        assert_eq!(capacity, DEFAULT_CAPACITY);
        assert_eq!(fail, None);
      }
      _ => panic!("expected sleep command"),
    }
  }

  #[tokio::test]
  async fn test_abort_on_enter_rejected_for_stdin_commands() {
    let err = run_commands(RunArgs {
      capacity: None,
      timeout_ms: None,
      config: None,
      abort_on_enter: true,
      commands: Vec::new(),
    })
    .await
    .unwrap_err();
    assert!(err.to_string().contains("--abort-on-enter"));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_run_commands_from_args() {
    run_commands(RunArgs {
      capacity: Some(2),
      timeout_ms: None,
      config: None,
      abort_on_enter: false,
      commands: vec!["true".to_string(), "echo hi".to_string()],
    })
    .await
    .unwrap();
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_failing_command_fails_run() {
    let err = run_commands(RunArgs {
      capacity: Some(1),
      timeout_ms: None,
      config: None,
      abort_on_enter: false,
      commands: vec!["exit 1".to_string(), "true".to_string()],
    })
    .await
    .unwrap_err();
    assert!(format!("{:#}", err).contains("task '0' failed"));
  }
}
