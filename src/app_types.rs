use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend_config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum SupervisorPhase {
    Idle,
    Launching,
    AwaitingReadiness,
    Ready,
    Failed,
    Exhausted,
}

/// Snapshot of the supervisor state machine, published through a watch
/// channel and forwarded to the webview on every transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BackendStatus {
    pub(crate) phase: SupervisorPhase,
    pub(crate) attempts: u32,
    pub(crate) strategy: Option<String>,
}

impl Default for BackendStatus {
    fn default() -> Self {
        Self {
            phase: SupervisorPhase::Idle,
            attempts: 0,
            strategy: None,
        }
    }
}

/// Mutated only by the connectivity poller; everything else reads snapshots.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConnectivityState {
    pub(crate) online: bool,
    pub(crate) last_checked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub(crate) active_endpoint: Option<String>,
}

/// Combined shell status for the webview status bar.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BackendBridgeState {
    pub(crate) running: bool,
    pub(crate) phase: SupervisorPhase,
    pub(crate) attempts: u32,
    pub(crate) online: bool,
    pub(crate) active_endpoint: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BackendBridgeResult {
    pub(crate) ok: bool,
    pub(crate) reason: Option<String>,
}

/// Explicit shared state for the whole shell: the single live child handle,
/// supervisor status, connectivity state, and the shutdown token. Owned by
/// the Tauri app and passed by handle to collaborators; no ambient globals.
pub(crate) struct ShellState {
    pub(crate) api_candidates: Vec<String>,
    pub(crate) http: reqwest::Client,
    pub(crate) status_tx: watch::Sender<BackendStatus>,
    pub(crate) connectivity: Mutex<ConnectivityState>,
    pub(crate) active_kill: Mutex<Option<CancellationToken>>,
    pub(crate) backend_pid: Mutex<Option<u32>>,
    pub(crate) shutdown: CancellationToken,
}

impl Default for ShellState {
    fn default() -> Self {
        let (status_tx, _) = watch::channel(BackendStatus::default());
        Self {
            api_candidates: backend_config::api_candidates_from_env(),
            http: reqwest::Client::new(),
            status_tx,
            connectivity: Mutex::new(ConnectivityState::default()),
            active_kill: Mutex::new(None),
            backend_pid: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }
}

impl ShellState {
    pub(crate) fn subscribe_status(&self) -> watch::Receiver<BackendStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) fn status_snapshot(&self) -> BackendStatus {
        self.status_tx.borrow().clone()
    }

    pub(crate) fn connectivity_snapshot(&self) -> ConnectivityState {
        self.connectivity
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// The base URL query commands should talk to: the endpoint that answered
    /// the last probe, falling back to the first candidate.
    pub(crate) fn query_base(&self) -> String {
        self.connectivity_snapshot()
            .active_endpoint
            .or_else(|| self.api_candidates.first().cloned())
            .unwrap_or_else(|| crate::DEFAULT_API_BASE.to_string())
    }

    /// Records the live child for this attempt, replacing the previous
    /// registration. Only one handle is ever live; the supervisor kills the
    /// old process before launching a replacement.
    pub(crate) fn register_child(&self, pid: Option<u32>, kill_token: CancellationToken) {
        if let Ok(mut guard) = self.active_kill.lock() {
            *guard = Some(kill_token);
        }
        if let Ok(mut guard) = self.backend_pid.lock() {
            *guard = pid;
        }
    }

    pub(crate) fn clear_child(&self) {
        if let Ok(mut guard) = self.active_kill.lock() {
            *guard = None;
        }
        if let Ok(mut guard) = self.backend_pid.lock() {
            *guard = None;
        }
    }

    pub(crate) fn backend_running(&self) -> bool {
        self.backend_pid
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Kills the live backend process, if any. Synchronous so the Tauri exit
    /// handler can call it; the waiter task does the actual reaping.
    pub(crate) fn stop_backend(&self) {
        let token = self
            .active_kill
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(token) = token {
            token.cancel();
        }
        if let Ok(mut guard) = self.backend_pid.lock() {
            *guard = None;
        }
    }

    /// Application shutdown: cancels pending retries and poll timers, then
    /// kills the live child. No retry timer fires after this.
    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
        self.stop_backend();
    }

    pub(crate) fn bridge_state(&self) -> BackendBridgeState {
        let status = self.status_snapshot();
        let connectivity = self.connectivity_snapshot();
        BackendBridgeState {
            running: self.backend_running(),
            phase: status.phase,
            attempts: status.attempts,
            online: connectivity.online,
            active_endpoint: connectivity.active_endpoint,
        }
    }
}
