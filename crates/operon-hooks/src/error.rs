use serde::Serialize;
use thiserror::Error;

/// Everything that can go wrong around a hook. None of these ever reach the
/// caller of `fire`. Failures are logged and carried in `AggregatedHookResult::errors`;
/// `Protocol` only annotates the single hook result since the hook still succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HookError {
    /// Malformed hook definition, discarded at registry ingestion
    #[error("invalid hook configuration: {0}")]
    Config(String),

    /// Hook stdout was not a hook output document
    #[error("unparseable hook output: {0}")]
    Protocol(String),

    /// Hook ran but did not exit cleanly
    #[error("hook `{command}` failed: {detail}")]
    Execution { command: String, detail: String },

    /// Failure inside the engine itself
    #[error("hook infrastructure error: {0}")]
    Infrastructure(String),
}
