#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app_constants;
mod app_runtime;
mod app_types;
mod backend_config;
mod connectivity;
mod desktop_bridge_commands;
mod error;
mod launch_strategy;
mod logging;
mod process_launcher;
mod runtime_paths;
mod sample_data;
mod supervisor;

pub(crate) use app_constants::*;
pub(crate) use app_types::{
    BackendBridgeResult, BackendBridgeState, BackendStatus, ConnectivityState, ShellState,
    SupervisorPhase,
};
pub(crate) use error::SupervisorError;

fn main() {
    app_runtime::run();
}
