use std::{sync::Arc, time::Duration};

use crate::{
    launch_strategy::ExecutionStrategy,
    process_launcher::{self, ProcessEvent, ProcessHandle},
    BackendStatus, ShellState, SupervisorError, SupervisorPhase, MAX_BACKEND_ATTEMPTS,
    READINESS_MARKERS, RETRY_BACKOFF,
};

pub(crate) struct SupervisorConfig {
    pub(crate) max_attempts: u32,
    pub(crate) retry_backoff: Duration,
    pub(crate) strategies: Vec<ExecutionStrategy>,
}

impl SupervisorConfig {
    pub(crate) fn new(strategies: Vec<ExecutionStrategy>) -> Self {
        Self {
            max_attempts: MAX_BACKEND_ATTEMPTS,
            retry_backoff: RETRY_BACKOFF,
            strategies,
        }
    }
}

enum AttemptOutcome {
    Ready(ProcessHandle),
    Failed(SupervisorError),
    Shutdown,
}

enum WaitResult {
    Ready,
    Exited(Option<i32>),
    MissingRunner,
    Shutdown,
}

pub(crate) fn contains_readiness_marker(line: &str) -> bool {
    READINESS_MARKERS.iter().any(|marker| line.contains(marker))
}

/// stderr signature of a missing managed runner, e.g. `uv: command not found`
/// or Windows' `'uv' is not recognized`.
pub(crate) fn missing_runner_signature(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("uv") && (lower.contains("not found") || lower.contains("not recognized"))
}

/// The full retry ladder: the selector's candidates plus, as the final rung,
/// the plain-interpreter form of the last source strategy. Attempts past the
/// end of the ladder reuse its last rung.
pub(crate) fn build_ladder(strategies: &[ExecutionStrategy]) -> Vec<ExecutionStrategy> {
    let mut ladder = strategies.to_vec();
    if let Some(plain) = ladder
        .last()
        .and_then(ExecutionStrategy::with_plain_interpreter)
    {
        ladder.push(plain);
    }
    ladder
}

/// Drives the backend through `Idle → Launching → AwaitingReadiness → Ready`,
/// retrying down the strategy ladder with a fixed backoff until readiness or
/// `Exhausted`. Readiness is detected by scanning stdout lines for a known
/// marker; output is consumed line-by-line, so a marker split across output
/// lines would be missed (uvicorn prints both markers on a single line).
pub(crate) struct BackendSupervisor {
    config: SupervisorConfig,
    state: Arc<ShellState>,
}

impl BackendSupervisor {
    pub(crate) fn new(config: SupervisorConfig, state: Arc<ShellState>) -> Self {
        Self { config, state }
    }

    fn publish(&self, phase: SupervisorPhase, attempts: u32, strategy: Option<&ExecutionStrategy>) {
        self.state.status_tx.send_replace(BackendStatus {
            phase,
            attempts,
            strategy: strategy.map(ExecutionStrategy::describe),
        });
    }

    pub(crate) async fn run(self) {
        let ladder = build_ladder(&self.config.strategies);
        if ladder.is_empty() {
            tracing::error!("no backend launch strategies available");
            self.publish(SupervisorPhase::Exhausted, 0, None);
            return;
        }

        let mut attempts = 0u32;
        loop {
            if self.state.shutdown.is_cancelled() {
                return;
            }
            if attempts >= self.config.max_attempts {
                tracing::error!("{}", SupervisorError::AttemptsExhausted { attempts });
                self.publish(SupervisorPhase::Exhausted, attempts, None);
                return;
            }

            let strategy = ladder[(attempts as usize).min(ladder.len() - 1)].clone();
            attempts += 1;

            match self.run_attempt(strategy, attempts).await {
                AttemptOutcome::Ready(handle) => {
                    self.monitor_ready(handle).await;
                    return;
                }
                AttemptOutcome::Shutdown => return,
                AttemptOutcome::Failed(error) => {
                    tracing::warn!(attempt = attempts, %error, "backend launch attempt failed");
                    self.publish(SupervisorPhase::Failed, attempts, None);
                    if attempts < self.config.max_attempts {
                        tokio::select! {
                            _ = tokio::time::sleep(self.config.retry_backoff) => {}
                            _ = self.state.shutdown.cancelled() => return,
                        }
                    }
                }
            }
        }
    }

    /// One attempt against the budget. A missing managed runner (spawn error
    /// or stderr signature) switches laterally to the plain interpreter
    /// without consuming another attempt.
    async fn run_attempt(&self, strategy: ExecutionStrategy, attempts: u32) -> AttemptOutcome {
        let mut strategy = strategy;
        let mut lateral_available = true;
        loop {
            self.publish(SupervisorPhase::Launching, attempts, Some(&strategy));
            tracing::info!(
                attempt = attempts,
                max = self.config.max_attempts,
                strategy = %strategy.describe(),
                "launching backend"
            );

            let mut handle = match process_launcher::launch(&strategy) {
                Ok(handle) => handle,
                Err(error) => {
                    if lateral_available {
                        if let Some(fallback) = strategy.with_plain_interpreter() {
                            tracing::warn!(%error, "managed runner unavailable, switching to plain interpreter");
                            lateral_available = false;
                            strategy = fallback;
                            continue;
                        }
                    }
                    return AttemptOutcome::Failed(error);
                }
            };

            self.state.register_child(handle.pid(), handle.kill_token());
            self.publish(SupervisorPhase::AwaitingReadiness, attempts, Some(&strategy));

            let allow_lateral = lateral_available && strategy.with_plain_interpreter().is_some();
            match self.await_readiness(&mut handle, allow_lateral).await {
                WaitResult::Ready => {
                    tracing::info!(attempt = attempts, "backend is ready");
                    self.publish(SupervisorPhase::Ready, attempts, Some(&strategy));
                    return AttemptOutcome::Ready(handle);
                }
                WaitResult::Exited(code) => {
                    self.state.clear_child();
                    return AttemptOutcome::Failed(SupervisorError::EarlyExit { code });
                }
                WaitResult::MissingRunner => match strategy.with_plain_interpreter() {
                    Some(fallback) => {
                        tracing::warn!("managed runner reported missing, switching to plain interpreter");
                        handle.kill();
                        drop(handle);
                        self.state.clear_child();
                        lateral_available = false;
                        strategy = fallback;
                    }
                    None => {
                        self.state.clear_child();
                        return AttemptOutcome::Failed(SupervisorError::EarlyExit { code: None });
                    }
                },
                WaitResult::Shutdown => {
                    handle.kill();
                    self.state.clear_child();
                    return AttemptOutcome::Shutdown;
                }
            }
        }
    }

    async fn await_readiness(&self, handle: &mut ProcessHandle, allow_lateral: bool) -> WaitResult {
        loop {
            tokio::select! {
                _ = self.state.shutdown.cancelled() => return WaitResult::Shutdown,
                event = handle.next_event() => match event {
                    Some(ProcessEvent::Stdout(line)) => {
                        tracing::info!(target: "backend", "{line}");
                        if contains_readiness_marker(&line) {
                            return WaitResult::Ready;
                        }
                    }
                    Some(ProcessEvent::Stderr(line)) => {
                        tracing::warn!(target: "backend", "{line}");
                        if allow_lateral && missing_runner_signature(&line) {
                            return WaitResult::MissingRunner;
                        }
                    }
                    Some(ProcessEvent::Exited(code)) => return WaitResult::Exited(code),
                    None => return WaitResult::Exited(None),
                }
            }
        }
    }

    /// Keeps forwarding backend logs after readiness. A backend that dies
    /// after becoming ready is NOT relaunched; startup failures are the only
    /// retried class, and the connectivity poller degrades the UI to
    /// substitute data instead. Known limitation.
    async fn monitor_ready(&self, mut handle: ProcessHandle) {
        loop {
            tokio::select! {
                _ = self.state.shutdown.cancelled() => {
                    handle.kill();
                    self.state.clear_child();
                    return;
                }
                event = handle.next_event() => match event {
                    Some(ProcessEvent::Stdout(line)) => tracing::info!(target: "backend", "{line}"),
                    Some(ProcessEvent::Stderr(line)) => tracing::warn!(target: "backend", "{line}"),
                    Some(ProcessEvent::Exited(code)) => {
                        tracing::error!(?code, "backend exited after readiness; not restarting");
                        self.state.clear_child();
                        let attempts = self.state.status_snapshot().attempts;
                        self.publish(SupervisorPhase::Idle, attempts, None);
                        return;
                    }
                    None => {
                        self.state.clear_child();
                        let attempts = self.state.status_snapshot().attempts;
                        self.publish(SupervisorPhase::Idle, attempts, None);
                        return;
                    }
                }
            }
        }
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::launch_strategy::ExecutionStrategy;
    use std::path::PathBuf;
    use tokio::time::timeout;

    fn shell_strategy(script: &str) -> ExecutionStrategy {
        ExecutionStrategy::RunExecutable {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: PathBuf::from("."),
        }
    }

    fn write_fake_tool(dir: &std::path::Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write tool");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod tool");
    }

    fn test_config(strategies: Vec<ExecutionStrategy>) -> SupervisorConfig {
        SupervisorConfig {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(10),
            strategies,
        }
    }

    #[tokio::test]
    async fn three_early_exits_exhaust_after_exactly_three_launches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let counter = dir.path().join("launches");
        let script = format!("echo x >> {}; exit 1", counter.display());

        let state = Arc::new(ShellState::default());
        let supervisor = BackendSupervisor::new(test_config(vec![shell_strategy(&script)]), state.clone());

        timeout(Duration::from_secs(10), supervisor.run())
            .await
            .expect("supervisor should terminate");

        let status = state.status_snapshot();
        assert_eq!(status.phase, SupervisorPhase::Exhausted);
        assert_eq!(status.attempts, 3);

        let launches = std::fs::read_to_string(&counter).expect("counter file");
        assert_eq!(launches.lines().count(), 3, "never a 4th launch");
    }

    #[tokio::test]
    async fn readiness_marker_on_stdout_reaches_ready() {
        let state = Arc::new(ShellState::default());
        let supervisor = BackendSupervisor::new(
            test_config(vec![shell_strategy(
                "echo 'INFO: Application startup complete.'; sleep 30",
            )]),
            state.clone(),
        );
        let mut status_rx = state.subscribe_status();
        let task = tokio::spawn(supervisor.run());

        timeout(Duration::from_secs(10), async {
            loop {
                if status_rx.borrow().phase == SupervisorPhase::Ready {
                    break;
                }
                status_rx.changed().await.expect("status channel open");
            }
        })
        .await
        .expect("backend should reach Ready");

        assert_eq!(state.status_snapshot().attempts, 1);
        assert!(state.backend_running());

        state.shutdown();
        timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor should stop on shutdown")
            .expect("supervisor task");
        assert!(!state.backend_running());
    }

    #[tokio::test]
    async fn failed_executable_falls_back_to_next_strategy() {
        let state = Arc::new(ShellState::default());
        let supervisor = BackendSupervisor::new(
            test_config(vec![
                ExecutionStrategy::executable("/nonexistent/backend/main"),
                shell_strategy("echo 'Uvicorn running on http://127.0.0.1:8000'; sleep 30"),
            ]),
            state.clone(),
        );
        let mut status_rx = state.subscribe_status();
        let task = tokio::spawn(supervisor.run());

        timeout(Duration::from_secs(10), async {
            loop {
                if status_rx.borrow().phase == SupervisorPhase::Ready {
                    break;
                }
                status_rx.changed().await.expect("status channel open");
            }
        })
        .await
        .expect("fallback strategy should reach Ready");

        // first attempt failed to spawn, second succeeded
        assert_eq!(state.status_snapshot().attempts, 2);

        state.shutdown();
        let _ = timeout(Duration::from_secs(5), task).await;
    }

    #[tokio::test]
    async fn missing_runner_switches_to_plain_interpreter_within_one_attempt() {
        use crate::launch_strategy::SourceRunner;

        let dir = tempfile::tempdir().expect("tempdir");
        write_fake_tool(dir.path(), "uv", "echo 'uv: command not found' >&2\nexit 127\n");
        write_fake_tool(
            dir.path(),
            "python",
            "echo 'INFO: Application startup complete.'\nsleep 30\n",
        );
        // prepend-only so every other binary still resolves
        let original_path = std::env::var("PATH").unwrap_or_default();
        std::env::set_var(
            "PATH",
            format!("{}:{original_path}", dir.path().display()),
        );

        let state = Arc::new(ShellState::default());
        let supervisor = BackendSupervisor::new(
            test_config(vec![ExecutionStrategy::from_source(
                dir.path(),
                SourceRunner::Uv,
            )]),
            state.clone(),
        );
        let mut status_rx = state.subscribe_status();
        let task = tokio::spawn(supervisor.run());

        timeout(Duration::from_secs(10), async {
            loop {
                if status_rx.borrow().phase == SupervisorPhase::Ready {
                    break;
                }
                status_rx.changed().await.expect("status channel open");
            }
        })
        .await
        .expect("plain interpreter should reach Ready");

        let status = state.status_snapshot();
        assert_eq!(status.attempts, 1, "the runner switch is not a new attempt");
        let strategy = status.strategy.expect("ready status names the strategy");
        assert!(strategy.starts_with("python"), "got {strategy}");

        std::env::set_var("PATH", original_path);
        state.shutdown();
        let _ = timeout(Duration::from_secs(5), task).await;
    }

    #[tokio::test]
    async fn exit_after_readiness_is_not_retried() {
        let state = Arc::new(ShellState::default());
        let supervisor = BackendSupervisor::new(
            test_config(vec![shell_strategy(
                "echo 'INFO: Application startup complete.'",
            )]),
            state.clone(),
        );

        timeout(Duration::from_secs(10), supervisor.run())
            .await
            .expect("supervisor should return after the ready backend exits");

        let status = state.status_snapshot();
        assert_eq!(status.phase, SupervisorPhase::Idle);
        assert_eq!(status.attempts, 1, "no relaunch after a post-readiness exit");
        assert!(!state.backend_running());
    }

    #[tokio::test]
    async fn shutdown_during_backoff_cancels_pending_retry() {
        let state = Arc::new(ShellState::default());
        let supervisor = BackendSupervisor::new(
            SupervisorConfig {
                max_attempts: 3,
                retry_backoff: Duration::from_secs(30),
                strategies: vec![shell_strategy("exit 1")],
            },
            state.clone(),
        );
        let task = tokio::spawn(supervisor.run());

        // let the first attempt fail and enter backoff
        tokio::time::sleep(Duration::from_millis(500)).await;
        state.shutdown();

        timeout(Duration::from_secs(5), task)
            .await
            .expect("no retry timer may fire after shutdown")
            .expect("supervisor task");
        assert_eq!(state.status_snapshot().attempts, 1);
    }
}
