//! Network-sniffing strategy: navigate the search page and capture the
//! platform's own API response in flight.
//!
//! The preferred strategy: the payload is exactly what the site's frontend
//! consumes, unthrottled by DOM rendering.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::browser::PageDriver;
use crate::config::PlatformSpec;
use crate::error::FailureRecord;
use crate::strategies::payload::extract_items;
use crate::strategies::Strategy;
use crate::types::{ExtractionResult, Source};

pub struct SnifferStrategy {
    window: Duration,
}

impl SnifferStrategy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

#[async_trait]
impl Strategy for SnifferStrategy {
    fn name(&self) -> &'static str {
        "sniffer"
    }

    async fn attempt(
        &self,
        driver: &dyn PageDriver,
        spec: &PlatformSpec,
        key: &str,
    ) -> Result<Option<ExtractionResult>, FailureRecord> {
        let url = spec.search_url_for(key);
        let captured = driver
            .navigate_and_sniff(&url, spec.api_host_hint, spec.api_path_hint, self.window)
            .await?;

        let Some(payload) = captured else {
            debug!(key, window_ms = self.window.as_millis() as u64, "sniff window elapsed");
            return Ok(None);
        };

        let items = extract_items(&payload, spec.top_n);
        if items.is_empty() {
            debug!(key, "sniffed payload held no mappable items");
            return Ok(None);
        }

        info!(key, count = items.len(), "extracted via network sniff");
        Ok(Some(ExtractionResult::new(key, items, Source::SniffedApi)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;
    use crate::testing::StubDriver;
    use serde_json::json;

    fn spec() -> PlatformSpec {
        PlatformSpec::rednote()
    }

    #[tokio::test]
    async fn capture_with_items_succeeds() {
        let driver = StubDriver::new().with_sniff_capture(json!({
            "data": { "items": [ { "note_card": {
                "display_title": "keyboard build log",
                "interact_info": { "liked_count": 88 }
            } } ] }
        }));
        let strategy = SnifferStrategy::new(Duration::from_secs(10));
        let result = strategy
            .attempt(&driver, &spec(), "keyboard")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.source, Source::SniffedApi);
        assert_eq!(result.count, 1);
        assert!(driver.navigations()[0].contains("keyword=keyboard"));
    }

    #[tokio::test]
    async fn timeout_is_a_clean_miss() {
        let driver = StubDriver::new();
        let strategy = SnifferStrategy::new(Duration::from_secs(10));
        let result = strategy.attempt(&driver, &spec(), "keyboard").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn unmappable_payload_is_a_clean_miss() {
        let driver = StubDriver::new().with_sniff_capture(json!({ "code": -1 }));
        let strategy = SnifferStrategy::new(Duration::from_secs(10));
        let result = strategy.attempt(&driver, &spec(), "keyboard").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn navigation_failure_propagates() {
        let driver = StubDriver::new().with_sniff_error(FailureReason::Timeout, "nav timeout");
        let strategy = SnifferStrategy::new(Duration::from_secs(10));
        let err = strategy
            .attempt(&driver, &spec(), "keyboard")
            .await
            .unwrap_err();
        assert_eq!(err.reason, FailureReason::Timeout);
    }
}
