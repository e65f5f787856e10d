//! Shared data model: extraction results, items, and run statistics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Provenance of an extraction result. Downstream consumers discount
/// synthetic data by inspecting this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    SniffedApi,
    DirectApi,
    XpathFallback,
    DomScrape,
    Synthetic,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::SniffedApi => "sniffed_api",
            Source::DirectApi => "direct_api",
            Source::XpathFallback => "xpath_fallback",
            Source::DomScrape => "dom_scrape",
            Source::Synthetic => "synthetic",
        }
    }
}

/// One extracted content item: a RedNote post or a Goofish listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Engagement count: likes for posts, want-count for listings.
    pub engagement: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

/// The result produced for one requested key. Immutable once returned.
///
/// Invariant: `count == items.len()` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub key: String,
    pub items: Vec<Item>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn new(key: impl Into<String>, items: Vec<Item>, source: Source) -> Self {
        let count = items.len();
        Self {
            key: key.into(),
            items,
            count,
            quality_score: None,
            source,
            error: None,
        }
    }

    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Aggregate statistics for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total_keys: usize,
    /// Keys answered by a real strategy.
    pub succeeded: usize,
    /// Keys that fell all the way to the synthetic floor.
    pub degraded: usize,
    pub retries: usize,
    /// Result count per provenance tag.
    pub per_source: HashMap<String, usize>,
}

impl RunStats {
    pub fn record(&mut self, source: Source) {
        self.total_keys += 1;
        if source == Source::Synthetic {
            self.degraded += 1;
        } else {
            self.succeeded += 1;
        }
        *self.per_source.entry(source.as_str().to_string()).or_insert(0) += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    /// Share of keys answered by real (non-synthetic) data, in percent.
    pub fn real_data_rate(&self) -> f64 {
        if self.total_keys == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total_keys as f64 * 100.0
    }
}
