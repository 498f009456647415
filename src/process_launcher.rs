use std::process::Stdio;

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

use crate::{launch_strategy::ExecutionStrategy, SupervisorError};

/// Everything the supervisor needs to observe about a live backend process,
/// delivered through a single channel so the dispatch loop has one place to
/// consume from.
#[derive(Debug)]
pub(crate) enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    Exited(Option<i32>),
}

/// Owns a spawned backend process. Exactly one handle is live at a time; the
/// supervisor kills it before starting a replacement, and `kill()` is safe to
/// call from a synchronous shutdown path.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pid: Option<u32>,
    events: mpsc::Receiver<ProcessEvent>,
    kill_token: CancellationToken,
}

impl ProcessHandle {
    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn kill_token(&self) -> CancellationToken {
        self.kill_token.clone()
    }

    /// Requests termination. The waiter task performs the actual kill and
    /// still delivers a final `Exited` event.
    pub(crate) fn kill(&self) {
        self.kill_token.cancel();
    }

    /// `None` once the process has exited and all buffered events are drained.
    pub(crate) async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill_token.cancel();
    }
}

#[cfg(target_os = "windows")]
fn kill_process_tree(pid: u32) {
    // taskkill takes down the whole tree; plain kill leaves grandchildren
    // (uv -> python) running.
    let _ = std::process::Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/t", "/f"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Spawn the backend per the given strategy. Returns immediately; readiness
/// is observed asynchronously through the handle's event stream. stdout and
/// stderr are piped, never inherited, so backend output cannot interleave
/// with the shell's own streams.
pub(crate) fn launch(strategy: &ExecutionStrategy) -> Result<ProcessHandle, SupervisorError> {
    let mut command = match strategy {
        ExecutionStrategy::RunExecutable {
            program,
            args,
            working_dir,
        } => {
            let mut command = Command::new(program);
            command.args(args).current_dir(working_dir);
            command
        }
        ExecutionStrategy::RunFromSource { source_dir, runner } => {
            let mut command = Command::new(runner.program());
            command.args(runner.args()).current_dir(source_dir);
            command
        }
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // The readiness marker must not sit in a pipe buffer.
        .env("PYTHONUNBUFFERED", "1")
        .env("PYTHONUTF8", "1")
        .env("PYTHONIOENCODING", "utf-8")
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|error| SupervisorError::Spawn(format!("{}: {error}", strategy.describe())))?;

    let pid = child.id();
    let (events_tx, events_rx) = mpsc::channel(64);
    let kill_token = CancellationToken::new();

    let stdout_task = child.stdout.take().map(|stdout| {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(ProcessEvent::Stdout(line)).await.is_err() {
                    break;
                }
            }
        })
    });

    let stderr_task = child.stderr.take().map(|stderr| {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(ProcessEvent::Stderr(line)).await.is_err() {
                    break;
                }
            }
        })
    });

    let waiter_token = kill_token.clone();
    tokio::spawn(async move {
        let exit_code = tokio::select! {
            status = child.wait() => status.ok().and_then(|status| status.code()),
            _ = waiter_token.cancelled() => {
                #[cfg(target_os = "windows")]
                if let Some(pid) = child.id() {
                    kill_process_tree(pid);
                }
                let _ = child.start_kill();
                let _ = child.wait().await;
                None
            }
        };
        // drain the readers first so Exited is always the final event
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }
        let _ = events_tx.send(ProcessEvent::Exited(exit_code)).await;
    });

    Ok(ProcessHandle {
        pid,
        events: events_rx,
        kill_token,
    })
}
