//! Extraction strategies, in fallback order.
//!
//! The pipeline tries each strategy in turn: network sniffing, direct API,
//! text-pattern fallback, and weighted DOM scraping. `Ok(None)` means
//! "nothing found, try the next one"; `Err(FailureRecord)` is classified and
//! may abort the batch when fatal. Synthetic generation is not a rung: it is
//! the pipeline's floor, engaged only after the whole ladder misses so the
//! last real failure can still be reported alongside the fabricated data.

mod direct_api;
mod dom_scrape;
mod payload;
mod sniffer;
mod synthetic;
mod text_fallback;

use async_trait::async_trait;

use crate::browser::PageDriver;
use crate::config::PlatformSpec;
use crate::error::FailureRecord;
use crate::types::ExtractionResult;

pub use direct_api::DirectApiStrategy;
pub use dom_scrape::DomScrapeStrategy;
pub use sniffer::SnifferStrategy;
pub use synthetic::SyntheticStrategy;
pub use text_fallback::TextFallbackStrategy;

/// One rung of the fallback ladder.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether an attempt consumes network budget. The pipeline inserts a
    /// request-class delay and a token before network-touching attempts.
    fn touches_network(&self) -> bool {
        true
    }

    /// Try to produce a result for `key`. `Ok(None)` is a clean miss.
    async fn attempt(
        &self,
        driver: &dyn PageDriver,
        spec: &PlatformSpec,
        key: &str,
    ) -> Result<Option<ExtractionResult>, FailureRecord>;
}

/// The standard ladder of real-data strategies in fallback order.
pub fn default_ladder(
    sniff_window: std::time::Duration,
    rate: std::sync::Arc<crate::rate::RateController>,
) -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(SnifferStrategy::new(sniff_window)),
        Box::new(DirectApiStrategy::new()),
        Box::new(TextFallbackStrategy::new()),
        Box::new(DomScrapeStrategy::new(rate)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn default_ladder_holds_only_real_strategies() {
        let ladder = default_ladder(
            Duration::from_secs(8),
            Arc::new(crate::rate::RateController::default()),
        );
        let names: Vec<&str> = ladder.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            ["sniffer", "direct_api", "text_fallback", "dom_scrape"]
        );
    }
}
