/// Failure taxonomy of a single backend launch attempt. `AttemptsExhausted`
/// is terminal for the supervisor; it is surfaced to the webview as a
/// persistent offline signal, never propagated as a crash.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SupervisorError {
    #[error("failed to spawn backend process: {0}")]
    Spawn(String),

    #[error("backend process exited before becoming ready (code {code:?})")]
    EarlyExit { code: Option<i32> },

    #[error("all backend launch attempts exhausted after {attempts} tries")]
    AttemptsExhausted { attempts: u32 },
}
