use std::{
    env,
    path::{Path, PathBuf},
};

use crate::BACKEND_SOURCE_DIR_ENV;

#[cfg(target_os = "windows")]
const BACKEND_EXECUTABLE_NAME: &str = "main.exe";
#[cfg(not(target_os = "windows"))]
const BACKEND_EXECUTABLE_NAME: &str = "main";

fn is_backend_source_root(candidate: &Path) -> bool {
    candidate.join("app").join("main.py").is_file()
}

pub(crate) fn workspace_root_dir() -> PathBuf {
    let candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    candidate
        .canonicalize()
        .unwrap_or_else(|_| candidate.clone())
}

/// Locate the backend source tree for `RunFromSource` strategies:
/// `CHINOOK_BACKEND_SOURCE_DIR` first, then well-known locations relative to
/// the workspace. Missing paths are reported as absence, never an error.
pub(crate) fn detect_backend_source_root() -> Option<PathBuf> {
    if let Ok(source_dir) = env::var(BACKEND_SOURCE_DIR_ENV) {
        let candidate = PathBuf::from(source_dir.trim());
        if is_backend_source_root(&candidate) {
            return Some(candidate.canonicalize().unwrap_or(candidate));
        }
    }

    let workspace_root = workspace_root_dir();
    let candidates = [workspace_root.join("backend"), workspace_root];
    for candidate in candidates {
        if is_backend_source_root(&candidate) {
            return Some(candidate.canonicalize().unwrap_or(candidate));
        }
    }
    None
}

/// Ordered packaged-executable candidates: the installed copy under the
/// resource directory first, then a copy co-located with the shell binary.
pub(crate) fn packaged_executable_candidates(resource_dir: Option<&Path>) -> Vec<PathBuf> {
    let relative: PathBuf = ["backend", "dist", "main", BACKEND_EXECUTABLE_NAME]
        .iter()
        .collect();

    let mut candidates = Vec::new();
    if let Some(resource_dir) = resource_dir {
        candidates.push(resource_dir.join(&relative));
    }
    if let Some(exe_dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let co_located = exe_dir.join(&relative);
        if !candidates.contains(&co_located) {
            candidates.push(co_located);
        }
    }
    candidates
}

/// Per-user data directory for desktop logs, a dot directory under the home
/// directory.
pub(crate) fn default_data_dir() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".chinook-explorer"))
}
