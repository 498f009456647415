use std::{env, time::Duration};

use url::Url;

use crate::{
    API_CANDIDATES, BACKEND_AUTO_START_ENV, BACKEND_CMD_ENV, BACKEND_TIMEOUT_ENV, BACKEND_URL_ENV,
    DEFAULT_API_BASE, PACKAGED_ENV, QUERY_TIMEOUT,
};

/// Normalize a user-supplied API base: must parse as an http(s) URL, and the
/// trailing slash is stripped so paths can be appended uniformly. Invalid
/// input falls back to `fallback` rather than failing startup.
pub(crate) fn normalize_api_base(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }

    match Url::parse(trimmed) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            parsed.to_string().trim_end_matches('/').to_string()
        }
        _ => fallback.to_string(),
    }
}

/// Ordered candidate API bases: an environment override (if any) first, then
/// the built-in loopback pair. Each probe cycle retries from the top.
pub(crate) fn api_candidates_from_env() -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    if let Ok(raw) = env::var(BACKEND_URL_ENV) {
        let base = normalize_api_base(&raw, DEFAULT_API_BASE);
        candidates.push(base);
    }
    for default in API_CANDIDATES {
        if !candidates.iter().any(|candidate| candidate == default) {
            candidates.push(default.to_string());
        }
    }
    candidates
}

pub(crate) fn auto_start_enabled() -> bool {
    env::var(BACKEND_AUTO_START_ENV).unwrap_or_else(|_| "1".to_string()) != "0"
}

/// Per-request timeout for forwarded queries. `CHINOOK_BACKEND_TIMEOUT_MS`
/// overrides the default; anything unparseable keeps it.
pub(crate) fn query_timeout() -> Duration {
    env::var(BACKEND_TIMEOUT_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
        .unwrap_or(QUERY_TIMEOUT)
}

/// Parse `CHINOOK_BACKEND_CMD` into a program plus arguments. An unset or
/// blank variable means "no override"; an unparseable one is an error so the
/// caller can log it instead of silently launching the wrong thing.
pub(crate) fn custom_launch_command() -> Option<Result<(String, Vec<String>), String>> {
    let raw = env::var(BACKEND_CMD_ENV).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Some(mut pieces) = shlex::split(trimmed) else {
        return Some(Err(format!("invalid {BACKEND_CMD_ENV}: {trimmed}")));
    };
    if pieces.is_empty() {
        return Some(Err(format!("{BACKEND_CMD_ENV} is empty")));
    }
    let program = pieces.remove(0);
    Some(Ok((program, pieces)))
}

/// Combine independent packaging signals. Any one signal can be wrong in some
/// packaging configuration, so a build counts as packaged only when at least
/// two agree; `CHINOOK_PACKAGED=1`/`0` overrides the vote entirely.
pub(crate) fn is_packaged_build(
    release_build: bool,
    packaged_resources_present: bool,
    installed_location: bool,
) -> bool {
    if let Ok(value) = env::var(PACKAGED_ENV) {
        match value.trim() {
            "1" => return true,
            "0" => return false,
            _ => {}
        }
    }

    [release_build, packaged_resources_present, installed_location]
        .iter()
        .filter(|signal| **signal)
        .count()
        >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_api_base_strips_trailing_slash() {
        assert_eq!(
            normalize_api_base("http://localhost:9000/api/", DEFAULT_API_BASE),
            "http://localhost:9000/api"
        );
    }

    #[test]
    fn normalize_api_base_rejects_garbage_and_non_http() {
        assert_eq!(normalize_api_base("", DEFAULT_API_BASE), DEFAULT_API_BASE);
        assert_eq!(
            normalize_api_base("not a url", DEFAULT_API_BASE),
            DEFAULT_API_BASE
        );
        assert_eq!(
            normalize_api_base("file:///etc/passwd", DEFAULT_API_BASE),
            DEFAULT_API_BASE
        );
    }

    #[test]
    fn packaged_detection_requires_two_signals() {
        assert!(!is_packaged_build(true, false, false));
        assert!(!is_packaged_build(false, true, false));
        assert!(is_packaged_build(true, true, false));
        assert!(is_packaged_build(false, true, true));
        assert!(is_packaged_build(true, true, true));
    }
}
