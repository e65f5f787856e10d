//! Session validity verification.
//!
//! Checks run in increasing cost order and short-circuit on the first
//! conclusive signal: profile size, then cookies, then a DOM heuristic (the
//! only check that navigates). A check that errors is inconclusive: it falls
//! through to the next check, or hard-fails under `strict`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::browser::PageDriver;
use crate::config::PlatformSpec;
use crate::session::store::{ProfileStatus, SessionStore};

/// Expiry safety margin: a cookie expiring within this window counts as
/// already invalid.
const COOKIE_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Settle time after the home-page navigation before reading the DOM.
const DOM_SETTLE: Duration = Duration::from_secs(2);

/// Why the verifier reached its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    ProfileMissing,
    ProfileEmptyOrCorrupt,
    CookiesOk,
    CookieCheckFailed,
    DomOk,
    CaptchaOrBlocked,
    NotLoggedIn,
}

/// Result of one verification call. Produced fresh each time; not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionVerdict {
    pub ok: bool,
    pub reason: VerdictReason,
    /// Human-actionable remediation text.
    pub action: String,
    pub evidence: serde_json::Map<String, serde_json::Value>,
}

impl SessionVerdict {
    fn pass(reason: VerdictReason, evidence: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            ok: true,
            reason,
            action: String::new(),
            evidence,
        }
    }

    fn fail(
        reason: VerdictReason,
        action: &str,
        evidence: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            ok: false,
            reason,
            action: action.to_string(),
            evidence,
        }
    }
}

fn evidence(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Session verifier for one platform.
pub struct SessionVerifier {
    store: SessionStore,
    spec: PlatformSpec,
}

impl SessionVerifier {
    pub fn new(store: SessionStore, spec: PlatformSpec) -> Self {
        Self { store, spec }
    }

    /// Verify the session. `strict` is used before paid extraction work and
    /// turns inconclusive checks into hard failures; `strict = false` is for
    /// advisory status display.
    ///
    /// The DOM check performs one navigation; callers must expect that side
    /// effect even from a "read-only" verification.
    pub async fn verify(&self, driver: &dyn PageDriver, strict: bool) -> SessionVerdict {
        // 1. Profile existence and size: hard regardless of strict.
        match self.store.status() {
            ProfileStatus::Missing => {
                return SessionVerdict::fail(
                    VerdictReason::ProfileMissing,
                    "run the login flow to create a session profile",
                    evidence(&[(
                        "profile_dir",
                        json!(self.store.profile_dir().display().to_string()),
                    )]),
                );
            }
            ProfileStatus::Undersized(bytes) => {
                return SessionVerdict::fail(
                    VerdictReason::ProfileEmptyOrCorrupt,
                    "profile is empty or corrupt; re-run the login flow",
                    evidence(&[("size_bytes", json!(bytes))]),
                );
            }
            ProfileStatus::Populated(_) => {}
        }

        // 2. Cookie validity.
        match driver.cookies().await {
            Ok(cookies) => {
                let now = chrono::Utc::now().timestamp() as f64;
                let valid_required = cookies
                    .iter()
                    .filter(|c| self.spec.required_cookies.contains(&c.name.as_str()))
                    .filter(|c| c.is_valid(now, COOKIE_MARGIN))
                    .count();
                if valid_required >= self.spec.min_valid_cookies {
                    info!(
                        platform = self.spec.platform.as_str(),
                        valid_required, "session verified via cookies"
                    );
                    return SessionVerdict::pass(
                        VerdictReason::CookiesOk,
                        evidence(&[
                            ("valid_required_cookies", json!(valid_required)),
                            ("cookie_count", json!(cookies.len())),
                        ]),
                    );
                }
                // Not enough valid cookies is inconclusive: the platform may
                // authenticate via storage. Fall through to the DOM check.
            }
            Err(e) => {
                warn!(error = %e, "cookie lookup failed during verification");
                if strict {
                    return SessionVerdict::fail(
                        VerdictReason::CookieCheckFailed,
                        "cookie check failed; restart the browser session and retry",
                        evidence(&[("error", json!(e.to_string()))]),
                    );
                }
            }
        }

        // 3. DOM heuristic, the expensive check: one navigation.
        self.verify_dom(driver, strict).await
    }

    async fn verify_dom(&self, driver: &dyn PageDriver, strict: bool) -> SessionVerdict {
        if let Err(e) = driver.navigate(self.spec.home_url).await {
            warn!(error = %e, "home navigation failed during verification");
            let ev = evidence(&[("error", json!(e.to_string()))]);
            return if strict {
                SessionVerdict::fail(
                    VerdictReason::CookieCheckFailed,
                    "could not reach the platform; check network and retry",
                    ev,
                )
            } else {
                SessionVerdict::fail(
                    VerdictReason::NotLoggedIn,
                    "verification inconclusive; run the login flow if this persists",
                    ev,
                )
            };
        }
        tokio::time::sleep(DOM_SETTLE).await;

        // Block/CAPTCHA markers are a hard failure regardless of strict:
        // continuing risks the account.
        if let Ok(text) = driver.page_text().await {
            if let Some(marker) = self
                .spec
                .blocked_markers
                .iter()
                .find(|m| text.contains(**m))
            {
                return SessionVerdict::fail(
                    VerdictReason::CaptchaOrBlocked,
                    "platform is serving a verification wall; pause runs and solve it manually",
                    evidence(&[("marker", json!(marker))]),
                );
            }
        }

        let probe = format!(
            r#"(() => {{
    const identity = [{identity}].some(sel => !!document.querySelector(sel));
    const login = [{login}].some(sel => !!document.querySelector(sel));
    return {{ identity, login }};
}})()"#,
            identity = selector_list(self.spec.identity_markers),
            login = selector_list(self.spec.login_markers),
        );

        match driver.eval(&probe).await {
            Ok(value) => {
                let identity = value["identity"].as_bool().unwrap_or(false);
                let login = value["login"].as_bool().unwrap_or(false);
                if identity && !login {
                    info!(
                        platform = self.spec.platform.as_str(),
                        "session verified via DOM markers"
                    );
                    SessionVerdict::pass(
                        VerdictReason::DomOk,
                        evidence(&[("identity", json!(true)), ("login_affordance", json!(false))]),
                    )
                } else {
                    SessionVerdict::fail(
                        VerdictReason::NotLoggedIn,
                        "re-run the login flow",
                        evidence(&[
                            ("identity", json!(identity)),
                            ("login_affordance", json!(login)),
                        ]),
                    )
                }
            }
            Err(e) => {
                let ev = evidence(&[("error", json!(e.to_string()))]);
                if strict {
                    SessionVerdict::fail(
                        VerdictReason::CookieCheckFailed,
                        "DOM probe failed; restart the browser session and retry",
                        ev,
                    )
                } else {
                    SessionVerdict::fail(VerdictReason::NotLoggedIn, "re-run the login flow", ev)
                }
            }
        }
    }
}

fn selector_list(selectors: &[&str]) -> String {
    selectors
        .iter()
        .map(|s| format!("{s:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}
