//! Error types for the acquisition engine.
//!
//! Two tiers: [`AcquireError`] for hard failures that escape to the caller
//! (invalid session, blocked account, browser launch problems), and
//! [`FailureRecord`] for soft per-strategy failures that are classified and
//! swallowed by the pipeline's fallback chain.

use thiserror::Error;

use crate::session::VerdictReason;

/// Hard errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Session verification failed before or during a batch. Carries the
    /// verifier's reason and a human-actionable remediation string.
    #[error("session invalid ({reason:?}): {action}")]
    SessionInvalid {
        reason: VerdictReason,
        action: String,
    },

    /// The platform served a CAPTCHA or block page. Continuing risks the
    /// account, so the batch is aborted.
    #[error("blocked by platform: {0}")]
    Blocked(String),

    /// Browser engine missing or refused to start. A configuration problem,
    /// never retried by the core.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// The fingerprint defense script was already applied to this session.
    /// Re-applying mid-session is itself a detectable signal.
    #[error("fingerprint defense already applied to this session")]
    FingerprintAlreadyApplied,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("browser protocol error: {0}")]
    Cdp(String),
}

/// Result type alias for acquisition operations.
pub type AcquireResult<T> = Result<T, AcquireError>;

/// Classification of a soft strategy-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Network,
    Timeout,
    Blocked,
    NoData,
    ParseError,
    LoginRequired,
    RateLimited,
    Unknown,
}

/// A classified strategy failure. Attached to stage attempts for telemetry;
/// never persisted beyond the current run.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub reason: FailureReason,
    pub detail: String,
}

impl FailureRecord {
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    /// Whether this failure must abort the whole batch instead of falling
    /// through to the next strategy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.reason,
            FailureReason::Blocked | FailureReason::LoginRequired
        )
    }
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.reason, self.detail)
    }
}
