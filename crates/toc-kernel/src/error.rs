//! Crate-wide error taxonomy (spec §7).
//!
//! Every variant carries a stable `tag()` used in wire-visible error
//! reporting (`Plan.errors[]`, `isError:true` tool-call bodies, dead-letter
//! reasons). The taxonomy is a single enum rather than per-crate enums
//! because the tags themselves are a cross-component contract: a
//! `ToolRuntime` raised inside the Worker must still read as `ToolRuntime`
//! once it reaches the Planner over the bus.

use thiserror::Error;

/// A stable, reportable error kind shared by every component.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoreError {
    /// Input rejected before any side effect (URL, selector, message size,
    /// component id, plan structure).
    #[error("validation error: {0}")]
    Validation(String),

    /// Source exceeded its token-bucket rate.
    #[error("rate limited")]
    RateLimited,

    /// Message could not be delivered to its target.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Security scan rejected a tool, or the module failed to load.
    #[error("tool load error: {0}")]
    ToolLoad(String),

    /// A tool handler panicked or returned an application error.
    #[error("tool runtime error: {0}")]
    ToolRuntime(String),

    /// A call exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// A plan exhausted its retries or hit an unrecoverable step.
    #[error("plan failure: {0}")]
    PlanFailure(String),

    /// The Worker child process exited; handled internally by the Supervisor.
    #[error("worker crashed: {0}")]
    WorkerCrash(String),

    /// Unrecoverable: the process should exit non-zero.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Stable tag used in `{tag, message}` pairs surfaced to callers (§7,
    /// §8 "errors[] is a list of stable-tag + human message pairs").
    pub fn tag(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "ValidationError",
            CoreError::RateLimited => "RateLimited",
            CoreError::Transport(_) => "Transport",
            CoreError::ToolLoad(_) => "ToolLoad",
            CoreError::ToolRuntime(_) => "ToolRuntime",
            CoreError::Timeout(_) => "Timeout",
            CoreError::PlanFailure(_) => "PlanFailure",
            CoreError::WorkerCrash(_) => "WorkerCrash",
            CoreError::Fatal(_) => "Fatal",
        }
    }

    /// A timeout is treated as a `ToolRuntime` for retry-accounting purposes
    /// (§7: "Timeout ... treated as ToolRuntime for retry purposes").
    pub fn retry_tag(&self) -> &'static str {
        match self {
            CoreError::Timeout(_) => "ToolRuntime",
            other => other.tag(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
