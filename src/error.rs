//! Typed error taxonomy (spec.md §7). Tool and startup errors are
//! caller-distinguishable; everything else bubbles up through `anyhow`.
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error on '{0}': {1}")]
    Io(String, #[source] io::Error),

    #[error("{0}")]
    Rejected(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("command timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transient remote error: {0}")]
    TransientRemote(String),

    #[error("remote API error: {0}")]
    Remote(String),

    #[error("context window exceeded even after compaction")]
    ContextExhausted,

    #[error("tool call budget exhausted ({0} calls)")]
    ToolBudgetExhausted(usize),

    #[error("turn cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("config error: {0}")]
    Config(String),

    #[error("no such session '{0}'")]
    NoSuchSession(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
