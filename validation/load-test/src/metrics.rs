//! Metrics collection and statistics.

use std::collections::BTreeMap;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

use crate::outcome::{OutcomeKind, RequestOutcome};
use crate::scheduler::RunSummary;
use crate::session::AuthStatus;

fn new_histogram() -> Histogram<u64> {
    Histogram::new(3).expect("3 significant figures is a valid precision")
}

fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

/// Per-task counters.
struct TaskMetrics {
    histogram: Histogram<u64>,
    requests: u64,
    failures: u64,
}

impl TaskMetrics {
    fn new() -> Self {
        Self {
            histogram: new_histogram(),
            requests: 0,
            failures: 0,
        }
    }
}

/// Collects metrics during load test execution.
pub struct MetricsCollector {
    histogram: Histogram<u64>,
    requests_total: u64,
    requests_success: u64,
    requests_failed: u64,
    timeouts: u64,
    transport_errors: u64,
    failure_reasons: BTreeMap<String, u64>,
    tasks: BTreeMap<String, TaskMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            histogram: new_histogram(),
            requests_total: 0,
            requests_success: 0,
            requests_failed: 0,
            timeouts: 0,
            transport_errors: 0,
            failure_reasons: BTreeMap::new(),
            tasks: BTreeMap::new(),
        }
    }

    /// Record one request outcome.
    ///
    /// Latency is recorded for every outcome that got an HTTP answer, so
    /// slow 500s still show up in the percentiles. Timeouts and transport
    /// errors carry no meaningful latency.
    pub fn record(&mut self, outcome: &RequestOutcome) {
        let latency_us = outcome.latency_us();
        let task = self
            .tasks
            .entry(outcome.task.clone())
            .or_insert_with(TaskMetrics::new);

        self.requests_total += 1;
        task.requests += 1;

        if let OutcomeKind::Status(_) = outcome.kind {
            self.histogram.record(latency_us).ok();
            task.histogram.record(latency_us).ok();
        }

        if outcome.is_success() {
            self.requests_success += 1;
            return;
        }

        self.requests_failed += 1;
        task.failures += 1;
        match outcome.kind {
            OutcomeKind::Timeout => self.timeouts += 1,
            OutcomeKind::Transport(_) => self.transport_errors += 1,
            OutcomeKind::Status(_) => {}
        }
        *self
            .failure_reasons
            .entry(outcome.kind.label())
            .or_insert(0) += 1;
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total
    }

    pub fn failed_requests(&self) -> u64 {
        self.requests_failed
    }

    /// Generate final test results.
    pub fn results(&self, scenario_name: &str, base_url: &str, run: &RunSummary) -> TestResults {
        let duration_secs = run.elapsed.as_secs_f64();
        let rps = if duration_secs > 0.0 {
            self.requests_total as f64 / duration_secs
        } else {
            0.0
        };

        let tasks = self
            .tasks
            .iter()
            .map(|(name, t)| TaskResults {
                name: name.clone(),
                requests: t.requests,
                failures: t.failures,
                latency_p50: us_to_ms(t.histogram.value_at_percentile(50.0)),
                latency_p95: us_to_ms(t.histogram.value_at_percentile(95.0)),
                latency_max: us_to_ms(t.histogram.max()),
            })
            .collect();

        TestResults {
            timestamp: chrono::Utc::now().to_rfc3339(),
            run_id: run.run_id.to_string(),
            scenario_name: scenario_name.to_string(),
            base_url: base_url.to_string(),
            duration_secs,
            target_concurrency: run.target,
            users_spawned: run.spawned(),
            peak_concurrency: run.peak_active,
            users_abandoned: run.abandoned,
            users_authenticated: run.count_auth(AuthStatus::Authenticated),
            users_auth_failed: run.count_auth(AuthStatus::Failed),
            iterations: run.total_iterations(),
            total_requests: self.requests_total,
            successful_requests: self.requests_success,
            failed_requests: self.requests_failed,
            timeouts: self.timeouts,
            transport_errors: self.transport_errors,
            requests_per_second: rps,
            latency_p50: us_to_ms(self.histogram.value_at_percentile(50.0)),
            latency_p75: us_to_ms(self.histogram.value_at_percentile(75.0)),
            latency_p90: us_to_ms(self.histogram.value_at_percentile(90.0)),
            latency_p95: us_to_ms(self.histogram.value_at_percentile(95.0)),
            latency_p99: us_to_ms(self.histogram.value_at_percentile(99.0)),
            latency_min: us_to_ms(self.histogram.min()),
            latency_max: us_to_ms(self.histogram.max()),
            latency_avg: self.histogram.mean() / 1000.0,
            failure_reasons: self.failure_reasons.clone(),
            tasks,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-task slice of the results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResults {
    pub name: String,
    pub requests: u64,
    pub failures: u64,
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_max: f64,
}

/// Final test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResults {
    pub timestamp: String,
    pub run_id: String,
    pub scenario_name: String,
    pub base_url: String,
    pub duration_secs: f64,

    // Population
    pub target_concurrency: u32,
    pub users_spawned: usize,
    pub peak_concurrency: usize,
    pub users_abandoned: usize,
    pub users_authenticated: usize,
    pub users_auth_failed: usize,
    pub iterations: u64,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    pub requests_per_second: f64,

    // Latency percentiles (ms)
    pub latency_p50: f64,
    pub latency_p75: f64,
    pub latency_p90: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub latency_min: f64,
    pub latency_max: f64,
    pub latency_avg: f64,

    pub failure_reasons: BTreeMap<String, u64>,
    pub tasks: Vec<TaskResults>,
}

impl TestResults {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }
}
