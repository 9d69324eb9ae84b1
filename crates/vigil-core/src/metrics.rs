//! Telemetry documents
//!
//! `RawResult` is one QA/usage run as reported by a build or a synthetic check.
//! `DailyMetrics` is the per-day reduction written by the aggregator and read
//! by the policy evaluator. Field names follow the stored document layout
//! (`passRate`, `copilotReliability`, ...).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One raw QA result record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResult {
    /// When the run finished
    pub timestamp: DateTime<Utc>,
    /// Passed test count
    #[serde(default)]
    pub tests_passed: u64,
    /// Failed test count
    #[serde(default)]
    pub tests_failed: u64,
    /// Mean latency observed by the run
    #[serde(default)]
    pub avg_latency_ms: f64,
    /// Regression identifiers detected by the run
    #[serde(default)]
    pub regressions: Vec<String>,
    /// Failing case identifiers
    #[serde(default)]
    pub fail_cases: Vec<String>,
}

impl RawResult {
    /// Create a record with counts only
    #[inline]
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, tests_passed: u64, tests_failed: u64) -> Self {
        Self {
            timestamp,
            tests_passed,
            tests_failed,
            avg_latency_ms: 0.0,
            regressions: Vec::new(),
            fail_cases: Vec::new(),
        }
    }

    /// With latency
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, avg_latency_ms: f64) -> Self {
        self.avg_latency_ms = avg_latency_ms;
        self
    }

    /// With regressions
    #[inline]
    #[must_use]
    pub fn with_regressions<I, S>(mut self, regressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regressions = regressions.into_iter().map(Into::into).collect();
        self
    }

    /// With failing cases
    #[inline]
    #[must_use]
    pub fn with_fail_cases<I, S>(mut self, fail_cases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_cases = fail_cases.into_iter().map(Into::into).collect();
        self
    }
}

/// Daily summary statistics, keyed by date
///
/// Equality compares content only: `last_updated` records when the document
/// was computed and is ignored, so re-running a day at a later time yields an
/// equal document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetrics {
    /// Day the document covers
    pub date: NaiveDate,
    /// passed / (passed + failed)
    pub pass_rate: f64,
    /// Mean latency in ms, rounded
    pub avg_latency: f64,
    /// 95th percentile of run latencies in ms
    #[serde(default)]
    pub p95_latency: Option<f64>,
    /// failed / total
    #[serde(default)]
    pub error_rate: f64,
    /// Number of unique regressions
    pub regression_count: u64,
    /// Most frequent failing cases, most frequent first
    #[serde(default)]
    pub top_fail_cases: Vec<String>,
    /// 1 - failed / total; 1.0 when nothing ran
    #[serde(rename = "copilotReliability")]
    pub reliability_score: f64,
    /// passed + failed
    pub test_count: u64,
    /// Passed test count
    #[serde(default)]
    pub tests_passed: u64,
    /// Failed test count
    #[serde(default)]
    pub tests_failed: u64,
    /// First unique regressions, capped
    #[serde(default)]
    pub regressions: Vec<String>,
    /// When the document was last computed
    pub last_updated: DateTime<Utc>,
    /// Fields written by other producers (custom metrics, annotations)
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PartialEq for DailyMetrics {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date
            && self.pass_rate == other.pass_rate
            && self.avg_latency == other.avg_latency
            && self.p95_latency == other.p95_latency
            && self.error_rate == other.error_rate
            && self.regression_count == other.regression_count
            && self.top_fail_cases == other.top_fail_cases
            && self.reliability_score == other.reliability_score
            && self.test_count == other.test_count
            && self.tests_passed == other.tests_passed
            && self.tests_failed == other.tests_failed
            && self.regressions == other.regressions
            && self.extra == other.extra
    }
}

impl DailyMetrics {
    /// Store key for this document
    #[inline]
    #[must_use]
    pub fn key(&self) -> String {
        self.date.to_string()
    }

    /// Observed value of a metric, if the document carries it
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(&self, metric: &Metric) -> Option<f64> {
        match metric {
            Metric::PassRate => Some(self.pass_rate),
            Metric::AvgLatency => Some(self.avg_latency),
            Metric::P95Latency => self.p95_latency,
            Metric::ErrorRate => Some(self.error_rate),
            Metric::RegressionCount => Some(self.regression_count as f64),
            Metric::Reliability => Some(self.reliability_score),
            Metric::TestCount => Some(self.test_count as f64),
            Metric::Custom(name) => self.extra.get(name).and_then(serde_json::Value::as_f64),
        }
    }

    /// Merge a freshly computed document onto the stored one for the same day
    ///
    /// Computed fields come from `self`; fields other producers wrote to the
    /// stored document survive unless `self` carries the same key. Applying
    /// the same fresh document twice gives the same result.
    #[must_use]
    pub fn merged_onto(self, existing: Option<DailyMetrics>) -> DailyMetrics {
        let Some(existing) = existing else {
            return self;
        };
        if existing.date != self.date {
            return self;
        }
        let mut extra = existing.extra;
        extra.extend(self.extra);
        DailyMetrics { extra, ..self }
    }
}

/// Metric a rule can reference
///
/// Known metrics map to typed fields of [`DailyMetrics`]; anything else is
/// looked up in its extra map and may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Metric {
    /// `passRate`
    PassRate,
    /// `avgLatency`
    AvgLatency,
    /// `p95Latency`
    P95Latency,
    /// `errorRate`
    ErrorRate,
    /// `regressionCount`
    RegressionCount,
    /// `copilotReliability`
    Reliability,
    /// `testCount`
    TestCount,
    /// Any other numeric field
    Custom(String),
}

impl Metric {
    /// Stored field name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PassRate => "passRate",
            Self::AvgLatency => "avgLatency",
            Self::P95Latency => "p95Latency",
            Self::ErrorRate => "errorRate",
            Self::RegressionCount => "regressionCount",
            Self::Reliability => "copilotReliability",
            Self::TestCount => "testCount",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for Metric {
    fn from(value: String) -> Self {
        match value.as_str() {
            "passRate" => Self::PassRate,
            "avgLatency" => Self::AvgLatency,
            "p95Latency" => Self::P95Latency,
            "errorRate" => Self::ErrorRate,
            "regressionCount" => Self::RegressionCount,
            "copilotReliability" | "reliabilityScore" => Self::Reliability,
            "testCount" => Self::TestCount,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for Metric {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Metric> for String {
    fn from(value: Metric) -> Self {
        match value {
            Metric::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
