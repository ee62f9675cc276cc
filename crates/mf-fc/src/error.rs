use std::time::Duration;
use thiserror::Error;

/// Typed link failures. Everything else travels as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum FcError {
    #[error("bad connection string {0:?}: {1}")]
    BadConnectionString(String, &'static str),

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("parameter {name} not confirmed (wanted {wanted}, last seen {seen:?})")]
    ParamNotConfirmed { name: String, wanted: f32, seen: Option<f32> },

    #[error("unknown flight mode {0:?}")]
    UnknownMode(String),

    #[error("link closed")]
    Closed,
}
