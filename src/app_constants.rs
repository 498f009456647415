use std::time::Duration;

pub(crate) const DEFAULT_API_BASE: &str = "http://localhost:8000/api";

/// Candidate API bases tried in order during a connectivity probe. Both the
/// loopback hostname and the numeric form are listed because some
/// environments resolve one but not the other.
pub(crate) const API_CANDIDATES: [&str; 2] = [
    "http://localhost:8000/api",
    "http://127.0.0.1:8000/api",
];

/// Phrases uvicorn prints to stdout once the backend accepts requests.
pub(crate) const READINESS_MARKERS: [&str; 2] =
    ["Uvicorn running on", "Application startup complete"];

pub(crate) const MAX_BACKEND_ATTEMPTS: u32 = 3;
pub(crate) const RETRY_BACKOFF: Duration = Duration::from_secs(2);

pub(crate) const CONNECTIVITY_INTERVAL: Duration = Duration::from_secs(30);
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub(crate) const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) const BACKEND_URL_ENV: &str = "CHINOOK_BACKEND_URL";
pub(crate) const BACKEND_CMD_ENV: &str = "CHINOOK_BACKEND_CMD";
pub(crate) const BACKEND_AUTO_START_ENV: &str = "CHINOOK_BACKEND_AUTO_START";
pub(crate) const BACKEND_SOURCE_DIR_ENV: &str = "CHINOOK_BACKEND_SOURCE_DIR";
pub(crate) const BACKEND_TIMEOUT_ENV: &str = "CHINOOK_BACKEND_TIMEOUT_MS";
pub(crate) const PACKAGED_ENV: &str = "CHINOOK_PACKAGED";

pub(crate) const BACKEND_STATUS_EVENT: &str = "backend-status";
pub(crate) const CONNECTIVITY_EVENT: &str = "connectivity-status";
