//! Nichewatch — market-signal acquisition engine for RedNote and Goofish.

pub mod browser;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod rate;
pub mod session;
pub mod strategies;
pub mod types;

#[doc(hidden)]
pub mod testing;

pub use browser::{BrowserSession, CookieRecord, PageDriver};
pub use config::{resolve_profile_dir, Platform, PlatformSpec, SpiderConfig};
pub use error::{AcquireError, AcquireResult, FailureReason, FailureRecord};
pub use fingerprint::{FingerprintPolicy, FingerprintProfile};
pub use pipeline::{AcquisitionPipeline, BatchOutcome};
pub use rate::{ActionClass, RateController, TokenBucket};
pub use session::{
    HealthLevel, HealthReport, ProfileStatus, SessionHealthMonitor, SessionStore, SessionVerdict,
    SessionVerifier, VerdictReason,
};
pub use strategies::Strategy;
pub use types::*;
