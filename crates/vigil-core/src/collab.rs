//! Collaborator seams for side effects
//!
//! The governance jobs compute what should happen; delivering a notification
//! or kicking off a follow-up job is delegated to these traits. The logging
//! implementations are the defaults when nothing else is wired in.

use crate::error::BoxError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Threshold crossed, no operations blocked
    Medium,
    /// Risky operations blocked
    High,
    /// Everything blocked or escalated to humans
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Delivery channels requested by a policy's alert action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertChannels {
    /// Post to the team chat webhook
    pub notify_slack: bool,
    /// Send an email
    pub notify_email: bool,
}

/// Formatted notification payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity of the triggering evaluation
    pub severity: Severity,
    /// Human readable text
    pub text: String,
    /// Requested channels
    pub channels: AlertChannels,
}

/// Receives notification payloads
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification
    ///
    /// # Errors
    /// Any delivery failure; callers log it and carry on.
    async fn notify(&self, notification: &Notification) -> Result<(), BoxError>;
}

/// Schedules follow-up jobs (e.g. a tuning loop)
#[async_trait::async_trait]
pub trait FollowUpScheduler: Send + Sync {
    /// Request that `job` runs soon
    ///
    /// # Errors
    /// Any scheduling failure; callers log it and carry on.
    async fn schedule(&self, job: &str) -> Result<(), BoxError>;
}

/// Notifier that writes to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), BoxError> {
        tracing::warn!(
            severity = %notification.severity,
            slack = notification.channels.notify_slack,
            email = notification.channels.notify_email,
            "{}",
            notification.text
        );
        Ok(())
    }
}

/// Scheduler that only records the request in the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogScheduler;

#[async_trait::async_trait]
impl FollowUpScheduler for LogScheduler {
    async fn schedule(&self, job: &str) -> Result<(), BoxError> {
        tracing::info!("Follow-up job requested: {}", job);
        Ok(())
    }
}
