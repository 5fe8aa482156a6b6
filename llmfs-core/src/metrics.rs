//! Process-wide request metrics.
//!
//! One collector is built at startup and shared by reference: the backend
//! feeds it through its metrics callback and the `/metrics` file reports it.

use chrono::{DateTime, SecondsFormat, Utc};
use llmfs_backend::MetricsCallback;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default, Clone)]
struct MetricsState {
    requests: u64,
    input_tokens: i64,
    output_tokens: i64,
    total_latency_ms: u64,
    last_latency_ms: u64,
    min_latency_ms: Option<u64>,
    max_latency_ms: u64,
    last_request: Option<DateTime<Utc>>,
}

/// Aggregated backend usage.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    state: RwLock<MetricsState>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed backend call.
    pub fn record(&self, input_tokens: i64, output_tokens: i64, latency_ms: u64) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.requests += 1;
        state.input_tokens += input_tokens;
        state.output_tokens += output_tokens;
        state.total_latency_ms += latency_ms;
        state.last_latency_ms = latency_ms;
        state.min_latency_ms = Some(
            state
                .min_latency_ms
                .map_or(latency_ms, |min| min.min(latency_ms)),
        );
        state.max_latency_ms = state.max_latency_ms.max(latency_ms);
        state.last_request = Some(Utc::now());
    }

    /// Callback to register with a backend.
    pub fn callback(self: &Arc<Self>) -> MetricsCallback {
        let collector = Arc::clone(self);
        Arc::new(move |input, output, latency_ms| collector.record(input, output, latency_ms))
    }

    pub fn requests(&self) -> u64 {
        self.state.read().unwrap_or_else(|e| e.into_inner()).requests
    }

    /// Plain-text `key: value` report.
    pub fn report(&self) -> String {
        let state = self
            .state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        if state.requests == 0 {
            return "requests: 0\n".to_string();
        }

        let total_tokens = state.input_tokens + state.output_tokens;
        let last_request = state
            .last_request
            .map(|at| format!("last_request: {}\n", at.to_rfc3339_opts(SecondsFormat::Secs, true)))
            .unwrap_or_default();

        format!(
            "requests: {}\n\
             input_tokens: {}\n\
             output_tokens: {}\n\
             total_tokens: {}\n\
             avg_tokens_per_request: {}\n\
             last_latency_ms: {}\n\
             avg_latency_ms: {}\n\
             min_latency_ms: {}\n\
             max_latency_ms: {}\n\
             {}",
            state.requests,
            state.input_tokens,
            state.output_tokens,
            total_tokens,
            total_tokens / state.requests as i64,
            state.last_latency_ms,
            state.total_latency_ms / state.requests,
            state.min_latency_ms.unwrap_or(0),
            state.max_latency_ms,
            last_request,
        )
    }
}
