//! Direct API strategy: call the platform's search endpoint with an in-page
//! `fetch`, riding on the session's own cookies.
//!
//! Runs inside the page so the request carries first-party credentials and
//! the site's TLS/HTTP2 fingerprint. Relies on the page already sitting on
//! the platform origin from the sniffer's navigation.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::browser::PageDriver;
use crate::config::PlatformSpec;
use crate::error::{FailureReason, FailureRecord};
use crate::strategies::payload::extract_items;
use crate::strategies::Strategy;
use crate::types::{ExtractionResult, Source};

/// Outcome envelope produced by the in-page fetch wrapper. Tagged so a
/// malformed page response can never be confused with a transport error.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum FetchOutcome {
    Ok { payload: serde_json::Value },
    HttpError { code: u16 },
    Exception { message: String },
}

#[derive(Default)]
pub struct DirectApiStrategy;

impl DirectApiStrategy {
    pub fn new() -> Self {
        Self
    }

    fn fetch_script(url: &str) -> String {
        format!(
            r#"(async () => {{
    try {{
        const resp = await fetch({url:?}, {{
            credentials: 'include',
            headers: {{ accept: 'application/json' }}
        }});
        if (!resp.ok) return {{ status: 'http_error', code: resp.status }};
        return {{ status: 'ok', payload: await resp.json() }};
    }} catch (e) {{
        return {{ status: 'exception', message: String(e) }};
    }}
}})()"#
        )
    }
}

#[async_trait]
impl Strategy for DirectApiStrategy {
    fn name(&self) -> &'static str {
        "direct_api"
    }

    async fn attempt(
        &self,
        driver: &dyn PageDriver,
        spec: &PlatformSpec,
        key: &str,
    ) -> Result<Option<ExtractionResult>, FailureRecord> {
        let url = spec.api_url_for(key);
        let raw = driver.eval(&Self::fetch_script(&url)).await?;
        let outcome: FetchOutcome = serde_json::from_value(raw)
            .map_err(|e| FailureRecord::new(FailureReason::ParseError, e.to_string()))?;

        match outcome {
            FetchOutcome::Ok { payload } => {
                let items = extract_items(&payload, spec.top_n);
                if items.is_empty() {
                    debug!(key, "direct API response held no mappable items");
                    return Ok(None);
                }
                info!(key, count = items.len(), "extracted via direct API");
                Ok(Some(ExtractionResult::new(key, items, Source::DirectApi)))
            }
            FetchOutcome::HttpError { code: 429 } => Err(FailureRecord::new(
                FailureReason::RateLimited,
                "search API returned 429",
            )),
            FetchOutcome::HttpError { code } => {
                // Auth and signature failures are routine here; the DOM
                // strategies still have a shot.
                debug!(key, code, "direct API rejected");
                Ok(None)
            }
            FetchOutcome::Exception { message } => {
                warn!(key, message = %message, "in-page fetch threw");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubDriver;
    use serde_json::json;

    fn spec() -> PlatformSpec {
        PlatformSpec::rednote()
    }

    #[tokio::test]
    async fn ok_payload_with_items_succeeds() {
        let driver = StubDriver::new().with_eval_rule(
            "fetch",
            json!({
                "status": "ok",
                "payload": { "items": [ { "title": "mechanical keyboard", "likes": 12 } ] }
            }),
        );
        let result = DirectApiStrategy::new()
            .attempt(&driver, &spec(), "keyboard")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.source, Source::DirectApi);
        assert_eq!(result.items[0].engagement, 12);
    }

    #[tokio::test]
    async fn empty_payload_is_a_clean_miss() {
        let driver = StubDriver::new().with_eval_rule(
            "fetch",
            json!({ "status": "ok", "payload": { "items": [] } }),
        );
        let result = DirectApiStrategy::new()
            .attempt(&driver, &spec(), "keyboard")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn rate_limit_is_a_classified_failure() {
        let driver = StubDriver::new()
            .with_eval_rule("fetch", json!({ "status": "http_error", "code": 429 }));
        let err = DirectApiStrategy::new()
            .attempt(&driver, &spec(), "keyboard")
            .await
            .unwrap_err();
        assert_eq!(err.reason, FailureReason::RateLimited);
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn auth_rejection_falls_through() {
        let driver = StubDriver::new()
            .with_eval_rule("fetch", json!({ "status": "http_error", "code": 403 }));
        let result = DirectApiStrategy::new()
            .attempt(&driver, &spec(), "keyboard")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn fetch_exception_falls_through() {
        let driver = StubDriver::new().with_eval_rule(
            "fetch",
            json!({ "status": "exception", "message": "TypeError: failed to fetch" }),
        );
        let result = DirectApiStrategy::new()
            .attempt(&driver, &spec(), "keyboard")
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
