//! Batch orchestration: verify once, then run every key down the strategy
//! ladder.
//!
//! Keys are processed sequentially in input order; parallel extraction
//! against one logged-in profile is exactly the traffic shape the platforms
//! flag. Each key is guaranteed a result: if every real strategy misses, the
//! synthetic floor answers.

use std::sync::Arc;

use tracing::{info, warn};

use crate::browser::PageDriver;
use crate::config::{PlatformSpec, SpiderConfig};
use crate::error::{AcquireError, AcquireResult, FailureReason, FailureRecord};
use crate::rate::{ActionClass, RateController};
use crate::session::{SessionStore, SessionVerifier, VerdictReason};
use crate::strategies::{default_ladder, Strategy, SyntheticStrategy};
use crate::types::{ExtractionResult, RunStats, Source};

/// Same-strategy retries allowed on a rate-limit response.
const MAX_RATE_LIMIT_RETRIES: u32 = 2;

/// Everything a finished batch produced.
#[derive(Debug)]
pub struct BatchOutcome {
    /// One result per requested key, in input order.
    pub results: Vec<ExtractionResult>,
    pub stats: RunStats,
}

/// The acquisition pipeline for one platform and one browser session.
pub struct AcquisitionPipeline {
    spec: PlatformSpec,
    verifier: SessionVerifier,
    rate: Arc<RateController>,
    ladder: Vec<Box<dyn Strategy>>,
    floor: SyntheticStrategy,
}

impl AcquisitionPipeline {
    pub fn new(spec: PlatformSpec, config: &SpiderConfig) -> Self {
        let store = SessionStore::new(&config.profile_dir, config.min_profile_bytes);
        let verifier = SessionVerifier::new(store, spec.clone());
        let rate = Arc::new(RateController::default());
        let ladder = default_ladder(config.sniff_timeout, rate.clone());
        Self {
            spec,
            verifier,
            rate,
            ladder,
            floor: SyntheticStrategy::new(),
        }
    }

    /// Replace the strategy ladder. The synthetic floor stays in place
    /// regardless of what the ladder contains.
    pub fn with_strategies(mut self, ladder: Vec<Box<dyn Strategy>>) -> Self {
        self.ladder = ladder;
        self
    }

    /// Verify the session, then extract every key. Fails fast before any
    /// per-key work when the session is invalid, and aborts the remainder of
    /// the batch on a fatal failure (block page, forced logout).
    pub async fn run(
        &self,
        driver: &dyn PageDriver,
        keys: &[String],
    ) -> AcquireResult<BatchOutcome> {
        let verdict = self.verifier.verify(driver, true).await;
        if !verdict.ok {
            return Err(AcquireError::SessionInvalid {
                reason: verdict.reason,
                action: verdict.action,
            });
        }
        info!(
            platform = self.spec.platform.as_str(),
            keys = keys.len(),
            "session verified, starting batch"
        );

        let mut results = Vec::with_capacity(keys.len());
        let mut stats = RunStats::default();

        for key in keys {
            let result = self.extract_key(driver, key, &mut stats).await?;
            stats.record(result.source);
            results.push(result);
        }

        info!(
            total = stats.total_keys,
            real_rate = stats.real_data_rate(),
            "batch finished"
        );
        Ok(BatchOutcome { results, stats })
    }

    async fn extract_key(
        &self,
        driver: &dyn PageDriver,
        key: &str,
        stats: &mut RunStats,
    ) -> AcquireResult<ExtractionResult> {
        let mut last_failure: Option<FailureRecord> = None;

        for strategy in &self.ladder {
            if strategy.touches_network() {
                self.rate.acquire(1.0).await;
                self.rate.delay(ActionClass::Request).await;
            }

            let mut retry = 0u32;
            let outcome = loop {
                match strategy.attempt(driver, &self.spec, key).await {
                    Ok(found) => break Ok(found),
                    Err(record)
                        if record.reason == FailureReason::RateLimited
                            && retry < MAX_RATE_LIMIT_RETRIES =>
                    {
                        warn!(key, strategy = strategy.name(), retry, "rate limited, backing off");
                        stats.record_retry();
                        self.rate.backoff(retry).await;
                        retry += 1;
                    }
                    Err(record) => break Err(record),
                }
            };

            match outcome {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => {}
                Err(record) if record.is_fatal() => {
                    warn!(key, strategy = strategy.name(), failure = %record, "fatal failure, aborting batch");
                    return Err(match record.reason {
                        FailureReason::LoginRequired => AcquireError::SessionInvalid {
                            reason: VerdictReason::NotLoggedIn,
                            action: "re-run the login flow".to_string(),
                        },
                        _ => AcquireError::Blocked(record.detail),
                    });
                }
                Err(record) => {
                    warn!(key, strategy = strategy.name(), failure = %record, "strategy failed, falling through");
                    last_failure = Some(record);
                }
            }
        }

        // Synthetic floor: the batch never returns an empty answer for a key.
        let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let mut result = self.floor.generate(&self.spec, key, &date);
        debug_assert_eq!(result.source, Source::Synthetic);
        result.error = last_failure.map(|f| f.to_string());
        info!(key, "all real strategies missed, synthetic floor engaged");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::testing::StubDriver;
    use crate::types::Item;

    /// Strategy that replays a fixed script of outcomes, one per call.
    struct Scripted {
        name: &'static str,
        outcomes: std::sync::Mutex<Vec<Result<Option<usize>, FailureRecord>>>,
    }

    impl Scripted {
        fn new(
            name: &'static str,
            outcomes: Vec<Result<Option<usize>, FailureRecord>>,
        ) -> Box<Self> {
            Box::new(Self {
                name,
                outcomes: std::sync::Mutex::new(outcomes),
            })
        }
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn touches_network(&self) -> bool {
            false
        }

        async fn attempt(
            &self,
            _driver: &dyn PageDriver,
            _spec: &PlatformSpec,
            key: &str,
        ) -> Result<Option<ExtractionResult>, FailureRecord> {
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                return Ok(None);
            }
            match outcomes.remove(0) {
                Ok(Some(n)) => {
                    let items = (0..n)
                        .map(|i| Item {
                            title: format!("{key} item {i}"),
                            author: None,
                            engagement: 10,
                            price: None,
                        })
                        .collect();
                    Ok(Some(ExtractionResult::new(key, items, Source::DomScrape)))
                }
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            }
        }
    }

    fn pipeline_with(
        dir: &std::path::Path,
        ladder: Vec<Box<dyn Strategy>>,
    ) -> AcquisitionPipeline {
        let mut config = SpiderConfig::default().with_profile_dir(dir);
        config.min_profile_bytes = 16;
        AcquisitionPipeline::new(PlatformSpec::rednote(), &config).with_strategies(ladder)
    }

    fn populated_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cookies"), vec![0u8; 4096]).unwrap();
        dir
    }

    fn logged_in_driver() -> StubDriver {
        StubDriver::new().with_cookies(vec![crate::browser::CookieRecord {
            name: "a1".to_string(),
            value: "v".to_string(),
            expires: None,
        }])
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_session_fails_before_any_key_work() {
        let dir = tempfile::tempdir().unwrap(); // empty profile
        let ladder = vec![Scripted::new("real", vec![Ok(Some(3))]) as Box<dyn Strategy>];
        let pipeline = pipeline_with(dir.path(), ladder);
        let driver = StubDriver::new();
        let err = pipeline.run(&driver, &keys(&["A"])).await.unwrap_err();
        assert!(matches!(
            err,
            AcquireError::SessionInvalid {
                reason: VerdictReason::ProfileEmptyOrCorrupt,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_answered_in_input_order() {
        let dir = populated_dir();
        let ladder = vec![Scripted::new("real", vec![Ok(Some(2)), Ok(Some(1))]) as Box<dyn Strategy>];
        let pipeline = pipeline_with(dir.path(), ladder);
        let outcome = pipeline
            .run(&logged_in_driver(), &keys(&["first", "second"]))
            .await
            .unwrap();
        assert_eq!(outcome.results[0].key, "first");
        assert_eq!(outcome.results[1].key, "second");
        assert_eq!(outcome.stats.succeeded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn misses_fall_to_the_synthetic_floor() {
        let dir = populated_dir();
        let ladder = vec![
            Scripted::new("miss", vec![Ok(None)]) as Box<dyn Strategy>,
            Scripted::new(
                "fail",
                vec![Err(FailureRecord::new(FailureReason::Timeout, "slow"))],
            ) as Box<dyn Strategy>,
        ];
        let pipeline = pipeline_with(dir.path(), ladder);
        let outcome = pipeline.run(&logged_in_driver(), &keys(&["B"])).await.unwrap();
        let result = &outcome.results[0];
        assert_eq!(result.source, Source::Synthetic);
        assert!(result.count > 0);
        assert!(result.error.as_ref().unwrap().contains("slow"));
        assert_eq!(outcome.stats.degraded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_aborts_the_batch() {
        let dir = populated_dir();
        let ladder = vec![Scripted::new(
            "blocked",
            vec![
                Ok(Some(1)),
                Err(FailureRecord::new(FailureReason::Blocked, "captcha wall")),
            ],
        ) as Box<dyn Strategy>];
        let pipeline = pipeline_with(dir.path(), ladder);
        let err = pipeline
            .run(&logged_in_driver(), &keys(&["ok", "walled", "never-reached"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::Blocked(detail) if detail.contains("captcha")));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_then_falls_through() {
        let dir = populated_dir();
        let limited = || Err(FailureRecord::new(FailureReason::RateLimited, "429"));
        let ladder = vec![
            Scripted::new("limited", vec![limited(), limited(), limited()]) as Box<dyn Strategy>,
        ];
        let pipeline = pipeline_with(dir.path(), ladder);
        let outcome = pipeline.run(&logged_in_driver(), &keys(&["C"])).await.unwrap();
        assert_eq!(outcome.results[0].source, Source::Synthetic);
        assert_eq!(outcome.stats.retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_split_real_from_degraded() {
        let dir = populated_dir();
        let ladder =
            vec![Scripted::new("real", vec![Ok(Some(3)), Ok(None)]) as Box<dyn Strategy>];
        let pipeline = pipeline_with(dir.path(), ladder);
        let outcome = pipeline
            .run(&logged_in_driver(), &keys(&["hit", "miss"]))
            .await
            .unwrap();
        assert_eq!(outcome.stats.total_keys, 2);
        assert_eq!(outcome.stats.succeeded, 1);
        assert_eq!(outcome.stats.degraded, 1);
        assert!((outcome.stats.real_data_rate() - 50.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_page_during_verification_stops_the_run() {
        let dir = populated_dir();
        let pipeline = pipeline_with(dir.path(), Vec::new());
        // No valid cookies, and the home page shows a verification wall.
        let driver = StubDriver::new().with_eval_rule("innerText", json!("请完成人机验证"));
        let err = pipeline.run(&driver, &keys(&["A"])).await.unwrap_err();
        assert!(matches!(
            err,
            AcquireError::SessionInvalid {
                reason: VerdictReason::CaptchaOrBlocked,
                ..
            }
        ));
    }
}
