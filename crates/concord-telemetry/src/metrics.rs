//! Cohort and engine metrics

use concord_core::Cohort;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-process counters for rollout monitoring.
///
/// Every recording also goes to the `metrics` facade so an installed
/// exporter sees the same numbers.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    legacy: CohortCounters,
    new: CohortCounters,
    engine_failures: AtomicU64,
    stage_window: Mutex<StageAssignments>,
}

#[derive(Default)]
struct CohortCounters {
    assignments: AtomicU64,
    requests: AtomicU64,
    errors: AtomicU64,
    empty_results: AtomicU64,
    total_latency_us: AtomicU64,
}

impl CohortCounters {
    fn snapshot(&self) -> CohortStats {
        CohortStats {
            assignments: self.assignments.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            empty_results: self.empty_results.load(Ordering::Relaxed),
            total_latency_us: self.total_latency_us.load(Ordering::Relaxed),
        }
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, cohort: Cohort) -> &CohortCounters {
        match cohort {
            Cohort::Legacy => &self.inner.legacy,
            Cohort::New => &self.inner.new,
        }
    }

    /// Record a cohort assignment made under `stage_version`.
    ///
    /// The per-stage window restarts when a newer version shows up;
    /// assignments from an older version only count toward the totals.
    pub fn record_assignment(&self, cohort: Cohort, stage_version: u64) {
        self.counters(cohort)
            .assignments
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("concord_cohort_assignments_total", "cohort" => cohort.as_str())
            .increment(1);

        let mut window = self.inner.stage_window.lock();
        if stage_version > window.stage_version {
            *window = StageAssignments {
                stage_version,
                ..StageAssignments::default()
            };
        }
        if stage_version == window.stage_version {
            match cohort {
                Cohort::Legacy => window.legacy += 1,
                Cohort::New => window.new += 1,
            }
        }
    }

    /// Record a finished request
    pub fn record_request(&self, cohort: Cohort, latency_us: u64, span_count: usize) {
        let counters = self.counters(cohort);
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters
            .total_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);
        if span_count == 0 {
            counters.empty_results.fetch_add(1, Ordering::Relaxed);
        }

        metrics::counter!("concord_requests_total", "cohort" => cohort.as_str()).increment(1);
        metrics::histogram!("concord_request_latency_us", "cohort" => cohort.as_str())
            .record(latency_us as f64);
    }

    /// Record a request that returned an error
    pub fn record_error(&self, cohort: Cohort) {
        let counters = self.counters(cohort);
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters.errors.fetch_add(1, Ordering::Relaxed);

        metrics::counter!("concord_request_errors_total", "cohort" => cohort.as_str())
            .increment(1);
    }

    /// Record failed engine invocations
    pub fn record_engine_failures(&self, count: u64) {
        if count > 0 {
            self.inner
                .engine_failures
                .fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> CohortMetrics {
        CohortMetrics {
            legacy: self.inner.legacy.snapshot(),
            new: self.inner.new.snapshot(),
            current_stage: self.inner.stage_window.lock().clone(),
            engine_failures: self.inner.engine_failures.load(Ordering::Relaxed),
        }
    }
}

/// Counters for one cohort since process start
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortStats {
    pub assignments: u64,
    pub requests: u64,
    pub errors: u64,
    pub empty_results: u64,
    pub total_latency_us: u64,
}

impl CohortStats {
    /// Average latency per successful request
    pub fn avg_latency_us(&self) -> u64 {
        let ok = self.requests.saturating_sub(self.errors);
        if ok == 0 {
            0
        } else {
            self.total_latency_us / ok
        }
    }

    /// Share of requests that failed
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.requests as f64
        }
    }
}

/// Assignments made under the current stage version
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageAssignments {
    pub stage_version: u64,
    pub legacy: u64,
    pub new: u64,
}

impl StageAssignments {
    /// Observed share of the new cohort, in percent
    pub fn new_percentage(&self) -> f64 {
        let total = self.legacy + self.new;
        if total == 0 {
            0.0
        } else {
            self.new as f64 * 100.0 / total as f64
        }
    }
}

/// Snapshot of cohort metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortMetrics {
    pub legacy: CohortStats,
    pub new: CohortStats,
    pub current_stage: StageAssignments,
    pub engine_failures: u64,
}

impl CohortMetrics {
    /// Observed share of the new cohort since process start, in percent
    pub fn new_percentage(&self) -> f64 {
        let total = self.legacy.assignments + self.new.assignments;
        if total == 0 {
            0.0
        } else {
            self.new.assignments as f64 * 100.0 / total as f64
        }
    }
}
