// Metrics module - Prometheus-compatible counters for the image pipeline

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Keep at most this many duration samples for percentiles
const MAX_DURATION_SAMPLES: usize = 10_000;

/// Percentile statistics for latency measurements
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Histogram {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}

/// Service counters. Thread-safe via atomics and mutexes.
pub struct Metrics {
    request_count: AtomicU64,
    reentrant_requests: AtomicU64,
    response_cache_hits: AtomicU64,
    response_cache_misses: AtomicU64,
    resolver_fallbacks: AtomicU64,

    // Keyed by status code / strategy name; BTreeMap keeps export order stable
    status_counts: Mutex<BTreeMap<u16, u64>>,
    strategy_success: Mutex<BTreeMap<String, u64>>,
    strategy_failure: Mutex<BTreeMap<String, u64>>,

    // Milliseconds
    durations: Mutex<VecDeque<f64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            request_count: AtomicU64::new(0),
            reentrant_requests: AtomicU64::new(0),
            response_cache_hits: AtomicU64::new(0),
            response_cache_misses: AtomicU64::new(0),
            resolver_fallbacks: AtomicU64::new(0),
            status_counts: Mutex::new(BTreeMap::new()),
            strategy_success: Mutex::new(BTreeMap::new()),
            strategy_failure: Mutex::new(BTreeMap::new()),
            durations: Mutex::new(VecDeque::with_capacity(MAX_DURATION_SAMPLES)),
        }
    }

    pub fn increment_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_status_count(&self, status_code: u16) {
        if let Ok(mut counts) = self.status_counts.lock() {
            *counts.entry(status_code).or_insert(0) += 1;
        }
    }

    pub fn increment_reentrant_request(&self) {
        self.reentrant_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_response_cache_hit(&self) {
        self.response_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_response_cache_miss(&self) {
        self.response_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_resolver_fallback(&self) {
        self.resolver_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_strategy_success(&self, strategy: &str) {
        if let Ok(mut counts) = self.strategy_success.lock() {
            *counts.entry(strategy.to_string()).or_insert(0) += 1;
        }
    }

    pub fn increment_strategy_failure(&self, strategy: &str) {
        if let Ok(mut counts) = self.strategy_failure.lock() {
            *counts.entry(strategy.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_duration(&self, duration_ms: f64) {
        if let Ok(mut durations) = self.durations.lock() {
            if durations.len() >= MAX_DURATION_SAMPLES {
                durations.pop_front();
            }
            durations.push_back(duration_ms);
        }
    }

    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn get_status_count(&self, status_code: u16) -> u64 {
        self.status_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(&status_code).copied())
            .unwrap_or(0)
    }

    pub fn get_reentrant_requests(&self) -> u64 {
        self.reentrant_requests.load(Ordering::Relaxed)
    }

    pub fn get_response_cache_hits(&self) -> u64 {
        self.response_cache_hits.load(Ordering::Relaxed)
    }

    pub fn get_response_cache_misses(&self) -> u64 {
        self.response_cache_misses.load(Ordering::Relaxed)
    }

    pub fn get_resolver_fallbacks(&self) -> u64 {
        self.resolver_fallbacks.load(Ordering::Relaxed)
    }

    pub fn get_strategy_success(&self, strategy: &str) -> u64 {
        self.strategy_success
            .lock()
            .ok()
            .and_then(|counts| counts.get(strategy).copied())
            .unwrap_or(0)
    }

    pub fn get_strategy_failure(&self, strategy: &str) -> u64 {
        self.strategy_failure
            .lock()
            .ok()
            .and_then(|counts| counts.get(strategy).copied())
            .unwrap_or(0)
    }

    pub fn get_duration_histogram(&self) -> Histogram {
        let mut samples: Vec<f64> = self
            .durations
            .lock()
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default();
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        Histogram {
            p50: calculate_percentile(&samples, 50.0),
            p90: calculate_percentile(&samples, 90.0),
            p99: calculate_percentile(&samples, 99.0),
        }
    }

    /// Export in Prometheus text exposition format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP kagami_requests_total Total number of image requests received\n");
        output.push_str("# TYPE kagami_requests_total counter\n");
        output.push_str(&format!("kagami_requests_total {}\n", self.get_request_count()));

        output.push_str("\n# HELP kagami_responses_total Responses by status code\n");
        output.push_str("# TYPE kagami_responses_total counter\n");
        if let Ok(counts) = self.status_counts.lock() {
            for (status, count) in counts.iter() {
                output.push_str(&format!(
                    "kagami_responses_total{{status=\"{}\"}} {}\n",
                    status, count
                ));
            }
        }

        output.push_str("\n# HELP kagami_strategy_attempts_total Strategy attempts by outcome\n");
        output.push_str("# TYPE kagami_strategy_attempts_total counter\n");
        for (outcome, map) in [
            ("success", &self.strategy_success),
            ("failure", &self.strategy_failure),
        ] {
            if let Ok(counts) = map.lock() {
                for (strategy, count) in counts.iter() {
                    output.push_str(&format!(
                        "kagami_strategy_attempts_total{{strategy=\"{}\",outcome=\"{}\"}} {}\n",
                        strategy, outcome, count
                    ));
                }
            }
        }

        output.push_str(
            "\n# HELP kagami_reentrant_requests_total Callbacks from the resizing service\n",
        );
        output.push_str("# TYPE kagami_reentrant_requests_total counter\n");
        output.push_str(&format!(
            "kagami_reentrant_requests_total {}\n",
            self.get_reentrant_requests()
        ));

        output.push_str("\n# HELP kagami_response_cache_total Response cache lookups\n");
        output.push_str("# TYPE kagami_response_cache_total counter\n");
        output.push_str(&format!(
            "kagami_response_cache_total{{result=\"hit\"}} {}\n",
            self.get_response_cache_hits()
        ));
        output.push_str(&format!(
            "kagami_response_cache_total{{result=\"miss\"}} {}\n",
            self.get_response_cache_misses()
        ));

        output.push_str(
            "\n# HELP kagami_option_resolver_fallbacks_total Requests served with empty options\n",
        );
        output.push_str("# TYPE kagami_option_resolver_fallbacks_total counter\n");
        output.push_str(&format!(
            "kagami_option_resolver_fallbacks_total {}\n",
            self.get_resolver_fallbacks()
        ));

        let histogram = self.get_duration_histogram();
        output.push_str("\n# HELP kagami_request_duration_ms Request duration percentiles\n");
        output.push_str("# TYPE kagami_request_duration_ms summary\n");
        for (quantile, value) in [("0.5", histogram.p50), ("0.9", histogram.p90), ("0.99", histogram.p99)] {
            output.push_str(&format!(
                "kagami_request_duration_ms{{quantile=\"{}\"}} {}\n",
                quantile, value
            ));
        }

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest-rank percentile over sorted samples; 0.0 when empty
fn calculate_percentile(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
