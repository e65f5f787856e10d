//! Browser session management and the page-driver seam.
//!
//! [`PageDriver`] is the narrow interface the verifier, health monitor, and
//! extraction strategies talk to. [`BrowserSession`] implements it over a
//! chromiumoxide persistent-profile Chrome session; tests implement it with
//! scripted fakes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::GetResponseBodyParams;
use chromiumoxide::cdp::browser_protocol::network::EventResponseReceived;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SpiderConfig;
use crate::error::{AcquireError, AcquireResult, FailureReason, FailureRecord};
use crate::fingerprint::{defense_script, FingerprintPolicy, FingerprintProfile};

/// A browser cookie, reduced to what session checks need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    /// Unix-epoch seconds. `None` for session cookies.
    pub expires: Option<f64>,
}

impl CookieRecord {
    /// Valid = non-empty value, and either no expiry or an expiry more than
    /// `margin` in the future.
    pub fn is_valid(&self, now_epoch: f64, margin: Duration) -> bool {
        if self.value.is_empty() {
            return false;
        }
        match self.expires {
            None => true,
            Some(expires) => expires > now_epoch + margin.as_secs_f64(),
        }
    }
}

/// The page operations the acquisition engine relies on.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL, bounded by the session's navigation timeout.
    async fn navigate(&self, url: &str) -> Result<(), FailureRecord>;

    /// Evaluate a JavaScript expression in the page and return its JSON
    /// value. Promises are awaited.
    async fn eval(&self, js: &str) -> Result<serde_json::Value, FailureRecord>;

    /// Cookies for the current browser context.
    async fn cookies(&self) -> Result<Vec<CookieRecord>, FailureRecord>;

    /// Register a response listener for the platform's internal API, then
    /// navigate and race the first matching JSON body against `window`.
    /// `Ok(None)` means no capture, not an error.
    async fn navigate_and_sniff(
        &self,
        url: &str,
        host_hint: &str,
        path_hint: &str,
        window: Duration,
    ) -> Result<Option<serde_json::Value>, FailureRecord>;

    /// Scroll the page by `pixels` (one step of a gesture).
    async fn scroll_by(&self, pixels: f64) -> Result<(), FailureRecord>;

    /// Visible text of the current page.
    async fn page_text(&self) -> Result<String, FailureRecord> {
        let value = self
            .eval("document.body ? document.body.innerText : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

/// One live Chrome session bound to a persistent profile directory.
///
/// The profile directory is owned by the external login flow; this struct
/// only reads it. Closing the session releases the driver handle and leaves
/// the profile intact for the next run.
pub struct BrowserSession {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    page: Page,
    profile: FingerprintProfile,
    nav_timeout: Duration,
    defense_applied: bool,
}

impl BrowserSession {
    /// Launch Chrome on the configured profile, inject the fingerprint
    /// defense before any site script can run, and open a single page.
    ///
    /// A missing browser executable is a fatal configuration error and is
    /// never retried here.
    pub async fn launch(
        config: &SpiderConfig,
        policy: &mut FingerprintPolicy,
    ) -> AcquireResult<Self> {
        let chrome = find_chrome().ok_or_else(|| {
            AcquireError::BrowserLaunch(
                "Chrome/Chromium not found; install it or set NICHEWATCH_CHROME".to_string(),
            )
        })?;

        let profile = policy.generate();
        info!(
            gpu = %profile.gpu_vendor,
            screen = format!("{}x{}", profile.screen_width, profile.screen_height),
            cores = profile.cpu_cores,
            "sampled fingerprint profile"
        );

        let viewport = chromiumoxide::handler::viewport::Viewport {
            width: profile.viewport_width,
            height: profile.viewport_height,
            ..Default::default()
        };
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome)
            .user_data_dir(&config.profile_dir)
            .viewport(viewport)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-infobars")
            .arg("--disable-sync");
        if config.lightweight {
            builder = builder.arg("--disable-dev-shm-usage").arg("--disable-gpu");
        }
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder
            .build()
            .map_err(AcquireError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| AcquireError::BrowserLaunch(e.to_string()))?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AcquireError::BrowserLaunch(e.to_string()))?;

        page.set_user_agent(profile.user_agent.as_str())
            .await
            .map_err(|e| AcquireError::Cdp(e.to_string()))?;

        let mut session = Self {
            browser,
            handler_task,
            page,
            profile,
            nav_timeout: config.nav_timeout,
            defense_applied: false,
        };
        session.apply_defense().await?;
        Ok(session)
    }

    /// Inject the defense script so it runs before any site script on every
    /// navigation. Allowed exactly once per session; re-sampling or
    /// re-applying mid-session is a detectable signal.
    async fn apply_defense(&mut self) -> AcquireResult<()> {
        if self.defense_applied {
            return Err(AcquireError::FingerprintAlreadyApplied);
        }
        let script = defense_script(&self.profile);
        let params = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(script)
            .build()
            .map_err(AcquireError::Cdp)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| AcquireError::Cdp(e.to_string()))?;
        self.defense_applied = true;
        info!("fingerprint defense injected");
        Ok(())
    }

    /// The profile sampled for this session's lifetime.
    pub fn fingerprint(&self) -> &FingerprintProfile {
        &self.profile
    }

    /// Release the automation handle. The on-disk profile is untouched so
    /// the persisted login survives into the next run.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "browser close");
        }
        self.handler_task.abort();
        info!("browser session released (profile preserved)");
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<(), FailureRecord> {
        debug!(url, "navigating");
        match tokio::time::timeout(self.nav_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(FailureRecord::new(FailureReason::Network, e.to_string())),
            Err(_) => Err(FailureRecord::new(
                FailureReason::Timeout,
                format!("navigation to {url} exceeded {:?}", self.nav_timeout),
            )),
        }
    }

    async fn eval(&self, js: &str) -> Result<serde_json::Value, FailureRecord> {
        let result = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| FailureRecord::new(FailureReason::Network, e.to_string()))?;
        result
            .into_value()
            .map_err(|e| FailureRecord::new(FailureReason::ParseError, e.to_string()))
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>, FailureRecord> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| FailureRecord::new(FailureReason::Network, e.to_string()))?;
        Ok(cookies
            .into_iter()
            .map(|c| CookieRecord {
                name: c.name,
                value: c.value,
                expires: (c.expires > 0.0).then_some(c.expires),
            })
            .collect())
    }

    async fn navigate_and_sniff(
        &self,
        url: &str,
        host_hint: &str,
        path_hint: &str,
        window: Duration,
    ) -> Result<Option<serde_json::Value>, FailureRecord> {
        // Listener first: the API response may arrive during the initial
        // document load.
        let mut events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| FailureRecord::new(FailureReason::Network, e.to_string()))?;

        self.navigate(url).await?;

        let capture = tokio::time::timeout(window, async {
            while let Some(event) = events.next().await {
                let response_url = event.response.url.as_str();
                if !(response_url.contains(host_hint) && response_url.contains(path_hint)) {
                    continue;
                }
                debug!(url = response_url, "sniffed matching API response");
                let body = match self
                    .page
                    .execute(GetResponseBodyParams::new(event.request_id.clone()))
                    .await
                {
                    Ok(body) => body,
                    Err(e) => {
                        // Body already evicted from the network cache; keep
                        // waiting for another match inside the window.
                        warn!(error = %e, "response body unavailable");
                        continue;
                    }
                };
                let raw = if body.base64_encoded {
                    match base64::engine::general_purpose::STANDARD.decode(&body.body) {
                        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                        Err(_) => continue,
                    }
                } else {
                    body.body.clone()
                };
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(&raw) {
                    return Some(json);
                }
            }
            None
        })
        .await;

        // Listener is deregistered when the stream drops.
        drop(events);

        match capture {
            Ok(found) => Ok(found),
            // Window elapsed with no capture: not an error by contract.
            Err(_) => Ok(None),
        }
    }

    async fn scroll_by(&self, pixels: f64) -> Result<(), FailureRecord> {
        self.eval(&format!("window.scrollBy(0, {pixels})")).await?;
        Ok(())
    }
}

/// Locate a Chrome/Chromium executable: env override first, then PATH
/// lookups, then well-known install locations.
fn find_chrome() -> Option<String> {
    if let Ok(path) = std::env::var("NICHEWATCH_CHROME") {
        if Path::new(&path).exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser", "msedge"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    for candidate in [
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
        "C:\\Program Files\\Microsoft\\Edge\\Application\\msedge.exe",
    ] {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
    }

    None
}
