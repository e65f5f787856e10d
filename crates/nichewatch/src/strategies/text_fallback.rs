//! Text-pattern fallback: scan the rendered page for elements whose text
//! mentions the key and that look like content cards (carry an image or a
//! price).
//!
//! Cheaper and cruder than the weighted DOM scraper; it catches layouts
//! where the known selector tiers have all drifted.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::browser::PageDriver;
use crate::config::PlatformSpec;
use crate::error::{FailureReason, FailureRecord};
use crate::strategies::Strategy;
use crate::types::{ExtractionResult, Item, Source};

#[derive(Debug, Deserialize)]
struct TextHit {
    title: String,
    #[serde(default)]
    price: Option<String>,
}

#[derive(Default)]
pub struct TextFallbackStrategy;

impl TextFallbackStrategy {
    pub fn new() -> Self {
        Self
    }

    fn scan_script(key: &str, top_n: usize) -> String {
        format!(
            r#"(() => {{
    const key = {key:?}.toLowerCase();
    const seen = new Set();
    const out = [];
    for (const el of document.querySelectorAll('section, article, a, div')) {{
        if (out.length >= {top_n}) break;
        const text = (el.innerText || '').trim();
        if (!text || text.length > 400) continue;
        if (!text.toLowerCase().includes(key)) continue;
        const hasImage = !!el.querySelector('img');
        const priceMatch = text.match(/[¥￥]\s*[\d.,]+/);
        if (!hasImage && !priceMatch) continue;
        const title = text.split('\n')[0].trim().slice(0, 120);
        if (title.length < 4 || seen.has(title)) continue;
        seen.add(title);
        out.push({{ title, price: priceMatch ? priceMatch[0] : null }});
    }}
    return out;
}})()"#
        )
    }
}

#[async_trait]
impl Strategy for TextFallbackStrategy {
    fn name(&self) -> &'static str {
        "text_fallback"
    }

    // Reads the already-rendered page.
    fn touches_network(&self) -> bool {
        false
    }

    async fn attempt(
        &self,
        driver: &dyn PageDriver,
        spec: &PlatformSpec,
        key: &str,
    ) -> Result<Option<ExtractionResult>, FailureRecord> {
        let raw = driver.eval(&Self::scan_script(key, spec.top_n)).await?;
        let hits: Vec<TextHit> = serde_json::from_value(raw)
            .map_err(|e| FailureRecord::new(FailureReason::ParseError, e.to_string()))?;

        if hits.is_empty() {
            debug!(key, "no text-pattern hits on the page");
            return Ok(None);
        }

        let items: Vec<Item> = hits
            .into_iter()
            .map(|hit| Item {
                title: hit.title,
                author: None,
                // Engagement is not recoverable from a text scan.
                engagement: 0,
                price: hit.price,
            })
            .collect();

        info!(key, count = items.len(), "extracted via text fallback");
        Ok(Some(ExtractionResult::new(
            key,
            items,
            Source::XpathFallback,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubDriver;
    use serde_json::json;

    #[tokio::test]
    async fn hits_become_items() {
        let driver = StubDriver::new().with_eval_rule(
            "querySelectorAll",
            json!([
                { "title": "胶片相机 95新", "price": "¥ 450" },
                { "title": "vintage camera strap", "price": null }
            ]),
        );
        let result = TextFallbackStrategy::new()
            .attempt(&driver, &PlatformSpec::goofish(), "相机")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.source, Source::XpathFallback);
        assert_eq!(result.count, 2);
        assert_eq!(result.items[0].price.as_deref(), Some("¥ 450"));
    }

    #[tokio::test]
    async fn empty_scan_is_a_clean_miss() {
        let driver = StubDriver::new().with_eval_rule("querySelectorAll", json!([]));
        let result = TextFallbackStrategy::new()
            .attempt(&driver, &PlatformSpec::rednote(), "相机")
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
