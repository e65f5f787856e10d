//! Scripted [`PageDriver`] fake for unit and integration tests.
//!
//! Not part of the public API surface.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{CookieRecord, PageDriver};
use crate::error::{FailureReason, FailureRecord};

/// A `PageDriver` whose responses are scripted up front. Builder methods
/// configure behavior; accessor methods expose what the code under test did.
pub struct StubDriver {
    cookies: Mutex<Result<Vec<CookieRecord>, String>>,
    navigate_error: Option<FailureRecord>,
    /// `(substring, values)` rules tried in order against the evaluated JS.
    /// Values are consumed per match; the last one is sticky.
    eval_rules: Vec<(String, Mutex<VecDeque<serde_json::Value>>)>,
    sniff_result: Mutex<Result<Option<serde_json::Value>, FailureRecord>>,
    navigations: Mutex<Vec<String>>,
    cookie_reads: Mutex<usize>,
    scrolls: Mutex<usize>,
    evals: Mutex<Vec<String>>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self {
            cookies: Mutex::new(Ok(Vec::new())),
            navigate_error: None,
            eval_rules: Vec::new(),
            sniff_result: Mutex::new(Ok(None)),
            navigations: Mutex::new(Vec::new()),
            cookie_reads: Mutex::new(0),
            scrolls: Mutex::new(0),
            evals: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cookies(self, cookies: Vec<CookieRecord>) -> Self {
        *self.cookies.lock().unwrap() = Ok(cookies);
        self
    }

    pub fn with_cookie_error(self, detail: &str) -> Self {
        *self.cookies.lock().unwrap() = Err(detail.to_string());
        self
    }

    pub fn with_navigate_error(mut self, reason: FailureReason, detail: &str) -> Self {
        self.navigate_error = Some(FailureRecord::new(reason, detail));
        self
    }

    /// When evaluated JS contains `fragment`, return `value`. First match
    /// wins; unmatched JS evaluates to JSON null.
    pub fn with_eval_rule(self, fragment: &str, value: serde_json::Value) -> Self {
        self.with_eval_sequence(fragment, vec![value])
    }

    /// Like [`with_eval_rule`](Self::with_eval_rule), but successive matches
    /// consume successive values. The final value repeats once the sequence
    /// is exhausted.
    pub fn with_eval_sequence(mut self, fragment: &str, values: Vec<serde_json::Value>) -> Self {
        self.eval_rules
            .push((fragment.to_string(), Mutex::new(values.into())));
        self
    }

    pub fn with_sniff_capture(self, payload: serde_json::Value) -> Self {
        *self.sniff_result.lock().unwrap() = Ok(Some(payload));
        self
    }

    pub fn with_sniff_error(self, reason: FailureReason, detail: &str) -> Self {
        *self.sniff_result.lock().unwrap() = Err(FailureRecord::new(reason, detail));
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn cookie_reads(&self) -> usize {
        *self.cookie_reads.lock().unwrap()
    }

    pub fn scrolls(&self) -> usize {
        *self.scrolls.lock().unwrap()
    }

    pub fn evals(&self) -> Vec<String> {
        self.evals.lock().unwrap().clone()
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for StubDriver {
    async fn navigate(&self, url: &str) -> Result<(), FailureRecord> {
        self.navigations.lock().unwrap().push(url.to_string());
        match &self.navigate_error {
            Some(record) => Err(record.clone()),
            None => Ok(()),
        }
    }

    async fn eval(&self, js: &str) -> Result<serde_json::Value, FailureRecord> {
        self.evals.lock().unwrap().push(js.to_string());
        for (fragment, values) in &self.eval_rules {
            if js.contains(fragment.as_str()) {
                let mut queue = values.lock().unwrap();
                let value = if queue.len() > 1 {
                    queue.pop_front().unwrap_or(serde_json::Value::Null)
                } else {
                    queue.front().cloned().unwrap_or(serde_json::Value::Null)
                };
                return Ok(value);
            }
        }
        Ok(serde_json::Value::Null)
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>, FailureRecord> {
        *self.cookie_reads.lock().unwrap() += 1;
        self.cookies
            .lock()
            .unwrap()
            .clone()
            .map_err(|detail| FailureRecord::new(FailureReason::Network, detail))
    }

    async fn navigate_and_sniff(
        &self,
        url: &str,
        _host_hint: &str,
        _path_hint: &str,
        _window: Duration,
    ) -> Result<Option<serde_json::Value>, FailureRecord> {
        self.navigations.lock().unwrap().push(url.to_string());
        self.sniff_result.lock().unwrap().clone()
    }

    async fn scroll_by(&self, _pixels: f64) -> Result<(), FailureRecord> {
        *self.scrolls.lock().unwrap() += 1;
        Ok(())
    }
}
