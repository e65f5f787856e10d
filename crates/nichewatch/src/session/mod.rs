//! Session lifecycle: profile store, validity verification, health scoring.

mod health;
mod store;
mod verify;

pub use health::{HealthLevel, HealthReport, SessionHealthMonitor};
pub use store::{ProfileStatus, SessionStore};
pub use verify::{SessionVerdict, SessionVerifier, VerdictReason};
