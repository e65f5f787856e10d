//! Session health scoring.
//!
//! Produces a 0-100 composite score from cookie inventory, expiry horizon,
//! and local-storage presence. Reports are advisory: they never gate
//! extraction directly, the verifier does that.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::PageDriver;
use crate::config::{Platform, PlatformSpec};

/// Reports kept in the in-memory history ring.
const HISTORY_CAP: usize = 100;

/// A cookie expiring within this window counts as "expiring soon".
const EXPIRY_HORIZON: Duration = Duration::from_secs(7 * 24 * 3600);

/// Severity band derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Excellent,
    Good,
    Warning,
    Critical,
}

impl HealthLevel {
    fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthLevel::Excellent
        } else if score >= 70.0 {
            HealthLevel::Good
        } else if score >= 50.0 {
            HealthLevel::Warning
        } else {
            HealthLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Excellent => "excellent",
            HealthLevel::Good => "good",
            HealthLevel::Warning => "warning",
            HealthLevel::Critical => "critical",
        }
    }
}

/// One health snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub platform: Platform,
    /// Composite score, one decimal place, clamped to `[0, 100]`.
    pub score: f64,
    pub level: HealthLevel,
    pub cookie_count: usize,
    /// Required cookies found present (any validity).
    pub critical_cookies_present: Vec<String>,
    pub missing_cookies: Vec<String>,
    /// Cookies expiring within seven days: `(name, days_left)`.
    pub expiring_soon: Vec<(String, i64)>,
    /// Cookies already past expiry.
    pub expired: Vec<String>,
    /// Approximate localStorage payload. `None` when the probe failed.
    pub storage_kb: Option<f64>,
    pub recommendations: Vec<String>,
}

/// Scores session health for one platform and keeps a bounded history.
pub struct SessionHealthMonitor {
    spec: PlatformSpec,
    history: VecDeque<HealthReport>,
}

impl SessionHealthMonitor {
    pub fn new(spec: PlatformSpec) -> Self {
        Self {
            spec,
            history: VecDeque::new(),
        }
    }

    /// Take one health snapshot. Contributions: cookie inventory up to 40,
    /// critical cookie coverage up to 30, expiry horizon up to 20, storage
    /// presence up to 10.
    pub async fn check_health(&mut self, driver: &dyn PageDriver) -> HealthReport {
        let now = Utc::now();
        let now_epoch = now.timestamp() as f64;

        let cookies = driver.cookies().await.unwrap_or_default();

        let present: Vec<String> = self
            .spec
            .required_cookies
            .iter()
            .filter(|name| cookies.iter().any(|c| c.name == **name))
            .map(|name| name.to_string())
            .collect();

        // Expiry horizon covers every cookie, not just the required set; an
        // expiring tracker cookie still degrades the session.
        let mut expiring_soon = Vec::new();
        let mut expired = Vec::new();
        for cookie in &cookies {
            if let Some(expires) = cookie.expires {
                if expires <= now_epoch {
                    expired.push(cookie.name.clone());
                } else if expires <= now_epoch + EXPIRY_HORIZON.as_secs_f64() {
                    let days_left = ((expires - now_epoch) / 86_400.0).floor() as i64;
                    expiring_soon.push((cookie.name.clone(), days_left));
                }
            }
        }
        let missing: Vec<String> = self
            .spec
            .required_cookies
            .iter()
            .filter(|name| !present.contains(&name.to_string()))
            .map(|name| name.to_string())
            .collect();

        let storage_kb = self.probe_storage(driver).await;

        let score = if cookies.is_empty() {
            0.0
        } else {
            let valid_ratio = {
                let valid = cookies
                    .iter()
                    .filter(|c| c.is_valid(now_epoch, Duration::ZERO))
                    .count();
                valid as f64 / cookies.len() as f64
            };
            let cookie_health =
                50.0 + (cookies.len() as f64 / 20.0 * 20.0).min(20.0) + valid_ratio * 30.0;
            let critical_ratio = present.len() as f64 / self.spec.required_cookies.len() as f64;
            let expiry_term = if !expired.is_empty() {
                0.0
            } else if !expiring_soon.is_empty() {
                10.0
            } else {
                20.0
            };
            let storage_term = match storage_kb {
                Some(kb) if kb > 0.0 => 10.0,
                Some(_) => 5.0,
                None => 0.0,
            };
            let raw =
                0.4 * cookie_health + 0.3 * critical_ratio * 100.0 + expiry_term + storage_term;
            ((raw * 10.0).round() / 10.0).clamp(0.0, 100.0)
        };

        let level = HealthLevel::from_score(score);
        let recommendations =
            recommendations(score, &missing, &expiring_soon, &expired, storage_kb);

        debug!(
            platform = self.spec.platform.as_str(),
            score,
            level = level.as_str(),
            "health snapshot"
        );

        let report = HealthReport {
            timestamp: now,
            platform: self.spec.platform,
            score,
            level,
            cookie_count: cookies.len(),
            critical_cookies_present: present,
            missing_cookies: missing,
            expiring_soon,
            expired,
            storage_kb,
            recommendations,
        };

        if self.history.len() == HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(report.clone());
        report
    }

    async fn probe_storage(&self, driver: &dyn PageDriver) -> Option<f64> {
        let js = r#"(() => {
    let total = 0;
    for (let i = 0; i < localStorage.length; i++) {
        const k = localStorage.key(i);
        total += k.length + (localStorage.getItem(k) || '').length;
    }
    return total;
})()"#;
        let bytes = driver.eval(js).await.ok()?.as_f64()?;
        Some((bytes / 1024.0 * 10.0).round() / 10.0)
    }

    /// Whether the most recent snapshot calls for operator attention.
    pub fn needs_maintenance(&self) -> bool {
        self.history
            .back()
            .map(|r| r.score < 70.0 || !r.missing_cookies.is_empty())
            .unwrap_or(false)
    }

    /// Snapshots taken this session, oldest first. Capped at 100.
    pub fn history(&self) -> impl Iterator<Item = &HealthReport> {
        self.history.iter()
    }
}

fn recommendations(
    score: f64,
    missing: &[String],
    expiring_soon: &[(String, i64)],
    expired: &[String],
    storage_kb: Option<f64>,
) -> Vec<String> {
    let mut out = Vec::new();
    if !missing.is_empty() {
        out.push(format!(
            "re-run the login flow to restore missing cookies: {}",
            missing.join(", ")
        ));
    }
    if !expired.is_empty() {
        out.push(format!(
            "expired cookies detected ({}); re-login recommended",
            expired.join(", ")
        ));
    }
    if !expiring_soon.is_empty() {
        out.push("cookies expire within seven days; refresh the session soon".to_string());
    }
    match storage_kb {
        Some(kb) if kb > 0.0 => {}
        _ => out.push("local storage is empty or unreadable; session may be incomplete".to_string()),
    }
    if score < 50.0 {
        out.push("session health is critical; repair before running extraction".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::CookieRecord;
    use crate::testing::StubDriver;
    use serde_json::json;

    fn cookie(name: &str, expires: Option<f64>) -> CookieRecord {
        CookieRecord {
            name: name.to_string(),
            value: "v".to_string(),
            expires,
        }
    }

    #[tokio::test]
    async fn zero_cookies_scores_exactly_zero() {
        let mut monitor = SessionHealthMonitor::new(PlatformSpec::rednote());
        let driver = StubDriver::new().with_eval_rule("localStorage", json!(0));
        let report = monitor.check_health(&driver).await;
        assert_eq!(report.score, 0.0);
        assert_eq!(report.level, HealthLevel::Critical);
        assert!(monitor.needs_maintenance());
    }

    #[tokio::test]
    async fn full_session_scores_excellent() {
        let spec = PlatformSpec::rednote();
        let far = Utc::now().timestamp() as f64 + 365.0 * 86_400.0;
        let cookies: Vec<CookieRecord> = spec
            .required_cookies
            .iter()
            .map(|n| cookie(n, Some(far)))
            .chain((0..16).map(|i| cookie(&format!("extra{i}"), Some(far))))
            .collect();
        let mut monitor = SessionHealthMonitor::new(spec);
        let driver = StubDriver::new()
            .with_cookies(cookies)
            .with_eval_rule("localStorage", json!(8192));
        let report = monitor.check_health(&driver).await;
        assert!(report.score >= 90.0, "score was {}", report.score);
        assert_eq!(report.level, HealthLevel::Excellent);
        assert!(report.missing_cookies.is_empty());
        assert!(!monitor.needs_maintenance());
    }

    #[tokio::test]
    async fn expired_critical_cookie_zeroes_expiry_term() {
        let now = Utc::now().timestamp() as f64;
        let mut monitor = SessionHealthMonitor::new(PlatformSpec::goofish());
        let driver = StubDriver::new()
            .with_cookies(vec![
                cookie("_m_h5_tk", Some(now - 100.0)),
                cookie("cookie2", None),
            ])
            .with_eval_rule("localStorage", json!(1024));
        let report = monitor.check_health(&driver).await;
        assert_eq!(report.expired, vec!["_m_h5_tk".to_string()]);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("re-login")));
    }

    #[tokio::test]
    async fn expiring_soon_is_reported_with_days_left() {
        let now = Utc::now().timestamp() as f64;
        let mut monitor = SessionHealthMonitor::new(PlatformSpec::rednote());
        let driver = StubDriver::new()
            .with_cookies(vec![cookie("a1", Some(now + 3.0 * 86_400.0 + 60.0))])
            .with_eval_rule("localStorage", json!(1024));
        let report = monitor.check_health(&driver).await;
        assert_eq!(report.expiring_soon.len(), 1);
        assert_eq!(report.expiring_soon[0].0, "a1");
        assert_eq!(report.expiring_soon[0].1, 3);
    }

    #[tokio::test]
    async fn non_required_cookie_expiry_degrades_the_session() {
        let now = Utc::now().timestamp() as f64;
        let far = now + 365.0 * 86_400.0;
        let spec = PlatformSpec::rednote();
        let cookies: Vec<CookieRecord> = spec
            .required_cookies
            .iter()
            .map(|n| cookie(n, Some(far)))
            .chain(std::iter::once(cookie("tracker", Some(now + 2.0 * 86_400.0))))
            .collect();
        let mut monitor = SessionHealthMonitor::new(spec);
        let driver = StubDriver::new()
            .with_cookies(cookies)
            .with_eval_rule("localStorage", json!(2048));
        let report = monitor.check_health(&driver).await;
        assert_eq!(report.expiring_soon.len(), 1);
        assert_eq!(report.expiring_soon[0].0, "tracker");
        // Halved expiry term keeps the session out of the excellent band.
        assert!(report.score < 90.0, "score was {}", report.score);
    }

    #[tokio::test]
    async fn history_is_capped() {
        let mut monitor = SessionHealthMonitor::new(PlatformSpec::rednote());
        let driver = StubDriver::new().with_eval_rule("localStorage", json!(0));
        for _ in 0..105 {
            monitor.check_health(&driver).await;
        }
        assert_eq!(monitor.history().count(), 100);
    }
}
