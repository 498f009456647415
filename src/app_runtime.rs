use std::sync::Arc;

use tauri::{AppHandle, Emitter, Manager, RunEvent};

use crate::{
    backend_config,
    connectivity::ConnectivityPoller,
    launch_strategy::{strategy_candidates, ExecutionStrategy},
    runtime_paths,
    supervisor::{BackendSupervisor, SupervisorConfig},
    ShellState, BACKEND_STATUS_EVENT, CONNECTIVITY_EVENT, CONNECTIVITY_INTERVAL,
};

pub(crate) fn run() {
    let _log_guard = crate::logging::init();
    let state = Arc::new(ShellState::default());

    tauri::Builder::default()
        .manage(state.clone())
        .invoke_handler(tauri::generate_handler![
            crate::desktop_bridge_commands::desktop_bridge_is_desktop_runtime,
            crate::desktop_bridge_commands::desktop_bridge_get_backend_state,
            crate::desktop_bridge_commands::desktop_bridge_check_connection,
            crate::desktop_bridge_commands::desktop_bridge_stop_backend,
            crate::desktop_bridge_commands::desktop_bridge_query_tables,
            crate::desktop_bridge_commands::desktop_bridge_chart_data,
        ])
        .setup(move |app| {
            let app_handle = app.handle().clone();
            spawn_status_forwarder(app_handle.clone(), state.clone());
            spawn_connectivity_schedule(app_handle.clone(), state.clone());

            if backend_config::auto_start_enabled() {
                match launch_strategies(&app_handle) {
                    Ok(strategies) => {
                        let supervisor =
                            BackendSupervisor::new(SupervisorConfig::new(strategies), state.clone());
                        tauri::async_runtime::spawn(supervisor.run());
                    }
                    Err(error) => {
                        tracing::error!(%error, "no usable backend launch strategy; connectivity polling continues");
                    }
                }
            } else {
                tracing::info!("backend auto-start disabled, expecting an externally managed backend");
            }
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| match event {
            RunEvent::ExitRequested { .. } | RunEvent::Exit => {
                let state = app_handle.state::<Arc<ShellState>>();
                state.shutdown();
            }
            _ => {}
        });
}

/// Resolve the ordered launch strategies for this installation. The
/// `CHINOOK_BACKEND_CMD` override wins outright; otherwise packaged builds
/// probe the bundled executable locations and everything degrades to running
/// from the backend source tree.
///
/// When no source tree exists at all, the list is built from the existing
/// packaged executables only. `RunFromSource` cannot terminate the list in
/// that case; there is no directory to run from, and an empty result is
/// reported as an error instead.
fn launch_strategies(app_handle: &AppHandle) -> Result<Vec<ExecutionStrategy>, String> {
    if let Some(custom) = backend_config::custom_launch_command() {
        let (program, args) = custom?;
        tracing::info!(%program, "using custom backend launch command");
        return Ok(vec![ExecutionStrategy::RunExecutable {
            program: program.into(),
            args,
            working_dir: runtime_paths::workspace_root_dir(),
        }]);
    }

    let resource_dir = app_handle.path().resource_dir().ok();
    let executable_candidates =
        runtime_paths::packaged_executable_candidates(resource_dir.as_deref());

    let release_build = !cfg!(debug_assertions);
    let packaged_resources_present = resource_dir
        .as_deref()
        .map(|dir| dir.join("backend").is_dir())
        .unwrap_or(false);
    let installed_location = std::env::current_exe()
        .map(|exe| !exe.starts_with(runtime_paths::workspace_root_dir()))
        .unwrap_or(false);
    let packaged = backend_config::is_packaged_build(
        release_build,
        packaged_resources_present,
        installed_location,
    );

    let strategies = match runtime_paths::detect_backend_source_root() {
        Some(source_dir) => strategy_candidates(
            packaged,
            &source_dir,
            &executable_candidates,
            |path| path.is_file(),
        ),
        // No source tree; only built executables can serve.
        None => executable_candidates
            .iter()
            .filter(|path| path.is_file())
            .map(|path| ExecutionStrategy::executable(path.clone()))
            .collect(),
    };

    if strategies.is_empty() {
        return Err("no backend source tree or packaged executable found".to_string());
    }
    tracing::info!(packaged, count = strategies.len(), "resolved backend launch strategies");
    Ok(strategies)
}

/// Forwards every supervisor status transition to the webview.
fn spawn_status_forwarder(app_handle: AppHandle, state: Arc<ShellState>) {
    let mut status_rx = state.subscribe_status();
    tauri::async_runtime::spawn(async move {
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => return,
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let status = status_rx.borrow_and_update().clone();
                    if let Err(error) = app_handle.emit(BACKEND_STATUS_EVENT, &status) {
                        tracing::warn!(%error, "failed to emit backend status");
                    }
                }
            }
        }
    });
}

fn spawn_connectivity_schedule(app_handle: AppHandle, state: Arc<ShellState>) {
    let poller = ConnectivityPoller::for_state(&state);
    tauri::async_runtime::spawn(async move {
        poller
            .run_schedule(state, CONNECTIVITY_INTERVAL, move |snapshot| {
                if let Err(error) = app_handle.emit(CONNECTIVITY_EVENT, snapshot) {
                    tracing::warn!(%error, "failed to emit connectivity status");
                }
            })
            .await;
    });
}
