use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tauri::{AppHandle, Manager};

use crate::{
    backend_config,
    connectivity::{mark_offline, ConnectivityPoller},
    sample_data::{self, ChartData},
    BackendBridgeResult, BackendBridgeState, ShellState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryTablesResult {
    pub(crate) online: bool,
    pub(crate) rows: Vec<Value>,
    pub(crate) reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChartDataResult {
    pub(crate) online: bool,
    pub(crate) chart: ChartData,
    pub(crate) reason: Option<String>,
}

#[tauri::command]
pub(crate) fn desktop_bridge_is_desktop_runtime() -> bool {
    true
}

#[tauri::command]
pub(crate) fn desktop_bridge_get_backend_state(app_handle: AppHandle) -> BackendBridgeState {
    let state = app_handle.state::<Arc<ShellState>>();
    state.bridge_state()
}

/// Manual reconnect from the UI: re-probe immediately instead of waiting for
/// the next poll cycle. Never relaunches the backend process.
#[tauri::command]
pub(crate) async fn desktop_bridge_check_connection(app_handle: AppHandle) -> BackendBridgeResult {
    let state = app_handle.state::<Arc<ShellState>>().inner().clone();
    let poller = ConnectivityPoller::for_state(&state);
    let report = poller.check_and_update(&state).await;
    BackendBridgeResult {
        ok: report.online,
        reason: (!report.online).then(|| "No backend endpoint is reachable.".to_string()),
    }
}

#[tauri::command]
pub(crate) fn desktop_bridge_stop_backend(app_handle: AppHandle) -> BackendBridgeResult {
    let state = app_handle.state::<Arc<ShellState>>();
    if !state.backend_running() {
        return BackendBridgeResult {
            ok: false,
            reason: Some("No supervised backend process is running.".to_string()),
        };
    }
    state.stop_backend();
    BackendBridgeResult {
        ok: true,
        reason: None,
    }
}

#[tauri::command]
pub(crate) async fn desktop_bridge_query_tables(
    app_handle: AppHandle,
    tables: Vec<String>,
) -> QueryTablesResult {
    let state = app_handle.state::<Arc<ShellState>>().inner().clone();

    match forward_query(&state, "query", &tables).await {
        Ok(body) => QueryTablesResult {
            online: true,
            rows: rows_from_body(body),
            reason: None,
        },
        Err(reason) => {
            let dataset = sample_data::substitute_dataset(&tables);
            QueryTablesResult {
                online: false,
                rows: dataset.rows,
                reason: Some(reason),
            }
        }
    }
}

#[tauri::command]
pub(crate) async fn desktop_bridge_chart_data(
    app_handle: AppHandle,
    tables: Vec<String>,
) -> ChartDataResult {
    let state = app_handle.state::<Arc<ShellState>>().inner().clone();

    match forward_query(&state, "chart", &tables).await {
        Ok(body) => match serde_json::from_value::<ChartData>(body) {
            Ok(chart) => ChartDataResult {
                online: true,
                chart,
                reason: None,
            },
            Err(error) => {
                tracing::warn!(%error, "chart response had an unexpected shape");
                ChartDataResult {
                    online: true,
                    chart: sample_data::substitute_dataset(&tables).chart,
                    reason: Some(format!("Malformed chart response: {error}")),
                }
            }
        },
        Err(reason) => ChartDataResult {
            online: false,
            chart: sample_data::substitute_dataset(&tables).chart,
            reason: Some(reason),
        },
    }
}

/// POSTs `{base}/{path}` with the table list. Checks connectivity first so an
/// offline backend is answered from substitute data instead of a hung
/// request, and flips the shared state offline when a forwarded request
/// fails mid-session.
async fn forward_query(
    state: &ShellState,
    path: &str,
    tables: &[String],
) -> Result<Value, String> {
    let poller = ConnectivityPoller::for_state(state);
    let report = poller.check_and_update(state).await;
    if !report.online {
        return Err("Backend is offline; serving substitute data.".to_string());
    }

    let url = format!("{}/{path}", state.query_base());
    let response = state
        .http
        .post(&url)
        .timeout(backend_config::query_timeout())
        .json(&serde_json::json!({ "tables": tables }))
        .send()
        .await
        .map_err(|error| {
            mark_offline(state);
            tracing::warn!(%url, %error, "backend query failed");
            format!("Backend request failed: {error}")
        })?;

    if !response.status().is_success() {
        let status = response.status();
        tracing::warn!(%url, %status, "backend query rejected");
        return Err(format!("Backend returned {status}."));
    }

    response.json::<Value>().await.map_err(|error| {
        tracing::warn!(%url, %error, "backend response was not valid JSON");
        format!("Backend response was not valid JSON: {error}")
    })
}

fn rows_from_body(body: Value) -> Vec<Value> {
    match body {
        Value::Array(rows) => rows,
        // some handlers wrap the rows in an object
        Value::Object(mut map) => match map.remove("rows") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn rows_are_accepted_bare_or_wrapped() {
        let bare = json!([{"AlbumId": 1}]);
        assert_eq!(rows_from_body(bare).len(), 1);

        let wrapped = json!({"rows": [{"AlbumId": 1}, {"AlbumId": 2}]});
        assert_eq!(rows_from_body(wrapped).len(), 2);

        assert!(rows_from_body(json!("nonsense")).is_empty());
        assert!(rows_from_body(json!({"other": 1})).is_empty());
    }

    /// Answers health probes with 200 but drops every POST mid-request, the
    /// shape of a backend dying between the probe and the query.
    async fn spawn_flaky_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if buf[..n].starts_with(b"GET") {
                        let _ = stream
                            .write_all(
                                b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                            )
                            .await;
                    }
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://127.0.0.1:{}/api", addr.port())
    }

    #[tokio::test]
    async fn failed_forward_degrades_and_flips_the_state_offline() {
        let base = spawn_flaky_backend().await;
        let mut state = ShellState::default();
        state.api_candidates = vec![base.clone()];

        let result = forward_query(&state, "query", &["albums".to_string()]).await;
        assert!(result.is_err(), "a dropped request must not look online");

        let snapshot = state.connectivity_snapshot();
        assert!(!snapshot.online, "send failure flips the state offline");
        assert_eq!(snapshot.active_endpoint, None);
    }

    #[tokio::test]
    async fn offline_backend_is_rejected_before_any_query_is_sent() {
        let mut state = ShellState::default();
        state.api_candidates = vec!["http://127.0.0.1:1/api".to_string()];

        let result = forward_query(&state, "chart", &["artists".to_string()]).await;
        assert!(result.is_err());
        assert!(!state.connectivity_snapshot().online);
    }
}
