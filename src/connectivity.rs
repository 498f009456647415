use std::{sync::Arc, time::Duration};

use crate::{ConnectivityState, ShellState, PROBE_TIMEOUT};

#[derive(Debug, Clone, Copy)]
pub(crate) struct ProbeReport {
    pub(crate) online: bool,
    pub(crate) transitioned: bool,
}

/// Client-side reachability checks, independent of the process supervisor: a
/// backend may be supervised but not yet serving, or reachable without ever
/// having been launched by us.
pub(crate) struct ConnectivityPoller {
    http: reqwest::Client,
    candidates: Vec<String>,
    probe_timeout: Duration,
}

impl ConnectivityPoller {
    pub(crate) fn new(http: reqwest::Client, candidates: Vec<String>) -> Self {
        Self {
            http,
            candidates,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub(crate) fn for_state(state: &ShellState) -> Self {
        Self::new(state.http.clone(), state.api_candidates.clone())
    }

    #[cfg(test)]
    fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Probe each candidate in order and return the first that answers the
    /// health endpoint with a success status. A timed-out or refused probe
    /// just moves on to the next candidate; `None` means all failed.
    pub(crate) async fn check_once(&self) -> Option<String> {
        for base in &self.candidates {
            let url = format!("{base}/");
            match self
                .http
                .get(&url)
                .timeout(self.probe_timeout)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(endpoint = %base, "connectivity probe succeeded");
                    return Some(base.clone());
                }
                Ok(response) => {
                    tracing::debug!(endpoint = %base, status = %response.status(), "connectivity probe rejected");
                }
                Err(error) => {
                    tracing::debug!(endpoint = %base, %error, "connectivity probe failed");
                }
            }
        }
        None
    }

    /// One check cycle: probe, then publish the result. `active_endpoint` is
    /// only valid for this cycle; the next one retries from the top.
    pub(crate) async fn check_and_update(&self, state: &ShellState) -> ProbeReport {
        let active_endpoint = self.check_once().await;
        let online = active_endpoint.is_some();

        let mut transitioned = false;
        if let Ok(mut guard) = state.connectivity.lock() {
            transitioned = guard.online != online;
            guard.online = online;
            guard.last_checked_at = Some(chrono::Utc::now());
            guard.active_endpoint = active_endpoint;
        }
        if transitioned {
            tracing::info!(online, "connectivity state changed");
        }
        ProbeReport {
            online,
            transitioned,
        }
    }

    /// Fixed-interval poll schedule with an immediate startup check. Stops
    /// deterministically when the shell's shutdown token is cancelled; no
    /// cycle runs afterwards.
    pub(crate) async fn run_schedule<F>(
        self,
        state: Arc<ShellState>,
        interval: Duration,
        mut on_transition: F,
    ) where
        F: FnMut(&ConnectivityState) + Send,
    {
        loop {
            let report = self.check_and_update(&state).await;
            if report.transitioned {
                on_transition(&state.connectivity_snapshot());
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = state.shutdown.cancelled() => return,
            }
        }
    }
}

/// Flip the shared state offline after a failed query, without waiting for
/// the next poll cycle. Returns whether this was an online→offline
/// transition.
pub(crate) fn mark_offline(state: &ShellState) -> bool {
    if let Ok(mut guard) = state.connectivity.lock() {
        let transitioned = guard.online;
        guard.online = false;
        guard.last_checked_at = Some(chrono::Utc::now());
        guard.active_endpoint = None;
        return transitioned;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal responder: answers every connection with HTTP 200.
    async fn spawn_http_ok() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                        )
                        .await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://127.0.0.1:{}/api", addr.port())
    }

    /// Accepts connections but never responds, so probes run into their
    /// timeout instead of a fast refusal.
    async fn spawn_http_silent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        format!("http://127.0.0.1:{}/api", addr.port())
    }

    #[tokio::test]
    async fn first_timeout_falls_through_to_second_candidate() {
        let silent = spawn_http_silent().await;
        let live = spawn_http_ok().await;
        let poller = ConnectivityPoller::new(reqwest::Client::new(), vec![silent, live.clone()])
            .with_probe_timeout(Duration::from_millis(300));

        let started = std::time::Instant::now();
        let active = poller.check_once().await;
        assert_eq!(active, Some(live));
        // bounded by the first candidate's timeout plus the second's response
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn all_candidates_failing_reports_offline() {
        let poller = ConnectivityPoller::new(
            reqwest::Client::new(),
            vec!["http://127.0.0.1:1/api".to_string()],
        );
        assert_eq!(poller.check_once().await, None);
    }

    #[tokio::test]
    async fn check_and_update_records_the_active_endpoint() {
        let live = spawn_http_ok().await;
        let state = ShellState::default();
        let poller = ConnectivityPoller::new(reqwest::Client::new(), vec![live.clone()]);

        let report = poller.check_and_update(&state).await;
        assert!(report.online);
        assert!(report.transitioned, "offline -> online is a transition");

        let snapshot = state.connectivity_snapshot();
        assert!(snapshot.online);
        assert_eq!(snapshot.active_endpoint, Some(live));
        assert!(snapshot.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn check_once_is_idempotent_between_state_changes() {
        let live = spawn_http_ok().await;
        let state = ShellState::default();
        let poller = ConnectivityPoller::new(reqwest::Client::new(), vec![live]);

        let first = poller.check_and_update(&state).await;
        let second = poller.check_and_update(&state).await;
        assert_eq!(first.online, second.online);
        assert!(!second.transitioned);
    }

    #[tokio::test]
    async fn offline_endpoint_is_not_sticky_across_cycles() {
        let state = ShellState::default();
        if let Ok(mut guard) = state.connectivity.lock() {
            guard.online = true;
            guard.active_endpoint = Some("http://127.0.0.1:9/api".to_string());
        }

        let poller = ConnectivityPoller::new(
            reqwest::Client::new(),
            vec!["http://127.0.0.1:1/api".to_string()],
        );
        let report = poller.check_and_update(&state).await;
        assert!(!report.online);
        assert!(report.transitioned);
        assert_eq!(state.connectivity_snapshot().active_endpoint, None);
    }

    #[tokio::test]
    async fn mark_offline_reports_the_transition_once() {
        let state = ShellState::default();
        if let Ok(mut guard) = state.connectivity.lock() {
            guard.online = true;
        }
        assert!(mark_offline(&state));
        assert!(!mark_offline(&state));
    }
}
