//! Daily aggregation
//!
//! `Aggregator::aggregate` takes raw results newest first, keeps the first
//! `sample_size` of them and reduces them to a [`DailyMetrics`] for the UTC
//! date of `now`:
//!
//! - `pass_rate = passed / (passed + failed)`, 0 when nothing ran
//! - `reliability = 1 - failed / total`, 1 when nothing ran
//! - `error_rate = failed / total`, 0 when nothing ran
//! - `avg_latency` is the mean of run latencies, rounded to whole ms
//! - `p95_latency` is the nearest-rank 95th percentile of run latencies
//! - `regression_count` counts unique regressions; the first
//!   `max_regressions` of them are kept in first-seen order
//! - `top_fail_cases` lists the most frequent failing cases, ties in
//!   first-seen order
//!
//! Rates are rounded to three decimals.

use crate::stats::{mean, percentile, round3};
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;
use vigil_core::{DailyMetrics, RawResult, TelemetryConfig};

/// Reduces raw results to daily metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregator {
    sample_size: usize,
    top_fail_cases: usize,
    max_regressions: usize,
}

impl Aggregator {
    /// Create aggregator from configuration
    #[must_use]
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            sample_size: config.sample_size.max(1),
            top_fail_cases: config.top_fail_cases,
            max_regressions: config.max_regressions,
        }
    }

    /// Number of most recent records reduced per run
    #[inline]
    #[must_use]
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Reduce `results` (newest first); `None` when there is nothing to reduce
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn aggregate(&self, results: &[RawResult], now: DateTime<Utc>) -> Option<DailyMetrics> {
        let sample = &results[..results.len().min(self.sample_size)];
        if sample.is_empty() {
            tracing::debug!("No raw results to aggregate for {}", now.date_naive());
            return None;
        }

        let passed: u64 = sample.iter().map(|r| r.tests_passed).sum();
        let failed: u64 = sample.iter().map(|r| r.tests_failed).sum();
        let total = passed + failed;
        let (pass_rate, error_rate, reliability_score) = if total == 0 {
            (0.0, 0.0, 1.0)
        } else {
            let total = total as f64;
            (
                round3(passed as f64 / total),
                round3(failed as f64 / total),
                round3(1.0 - failed as f64 / total),
            )
        };

        let latencies: Vec<f64> = sample.iter().map(|r| r.avg_latency_ms).collect();
        let avg_latency = mean(&latencies).map_or(0.0, f64::round);
        let p95_latency = percentile(&latencies, 0.95).map(f64::round);

        let regressions: IndexSet<&str> = sample
            .iter()
            .flat_map(|r| r.regressions.iter().map(String::as_str))
            .collect();

        Some(DailyMetrics {
            date: now.date_naive(),
            pass_rate,
            avg_latency,
            p95_latency,
            error_rate,
            regression_count: regressions.len() as u64,
            top_fail_cases: self.top_fail_cases(sample),
            reliability_score,
            test_count: total,
            tests_passed: passed,
            tests_failed: failed,
            regressions: regressions
                .iter()
                .take(self.max_regressions)
                .map(|s| (*s).to_string())
                .collect(),
            last_updated: now,
            extra: BTreeMap::new(),
        })
    }

    fn top_fail_cases(&self, sample: &[RawResult]) -> Vec<String> {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for case in sample.iter().flat_map(|r| r.fail_cases.iter()) {
            *counts.entry(case.as_str()).or_default() += 1;
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        // stable: equal counts keep first-seen order
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
            .into_iter()
            .take(self.top_fail_cases)
            .map(|(case, _)| case.to_string())
            .collect()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(&TelemetryConfig::default())
    }
}
