// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry policy with linear backoff for whole-job retries.
//
// Classifies errors into Transient (auto-retry), UserAction (wait for user),
// and Permanent (give up). Only transient errors trigger automatic retries.
// A retry always restarts the whole job: fresh channel, full re-write.

use std::time::Duration;

use tracing::{debug, info, warn};

use tinta_core::config::RetryConfig;
use tinta_core::error::TintaError;
use tinta_core::types::ErrorClass;

/// Bound and backoff for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait before attempt `n + 1` is `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry; the error is permanent or needs the user.
    GiveUp(ErrorClass),
    /// Attempt bound reached.
    Exhausted,
}

/// Classify a `TintaError` into an `ErrorClass` for retry decisions.
pub fn classify_error(err: &TintaError) -> ErrorClass {
    match err {
        // Link blips
        TintaError::TransientIo(_) | TintaError::Timeout { .. } | TintaError::Busy => {
            ErrorClass::Transient
        }

        // User action needed
        TintaError::PermissionDenied(_)
        | TintaError::AdapterDisabled
        | TintaError::NoPrinterSelected
        | TintaError::EmptyText => ErrorClass::UserAction,

        // Permanent: addressing, encoding, platform, internal
        TintaError::AdapterUnavailable
        | TintaError::PlatformUnavailable
        | TintaError::InvalidAddress(_)
        | TintaError::EndpointNotFound(_)
        | TintaError::ImageTooWide { .. }
        | TintaError::InvalidPixelBuffer(_)
        | TintaError::Image(_)
        | TintaError::Config(_)
        | TintaError::Serialization(_)
        | TintaError::InvalidTransition { .. }
        | TintaError::WorkerLost
        | TintaError::RetriesExhausted { .. } => ErrorClass::Permanent,

        // IO errors depend on the kind
        TintaError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::WriteZero
            | std::io::ErrorKind::Interrupted => ErrorClass::Transient,
            std::io::ErrorKind::PermissionDenied => ErrorClass::UserAction,
            _ => ErrorClass::Permanent,
        },
    }
}

/// Decide what happens after attempt number `attempt` (1-based) failed.
pub fn should_retry(err: &TintaError, attempt: u32, policy: &RetryPolicy) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Permanent => {
            info!(error = %err, "permanent error, not retrying");
            RetryDecision::GiveUp(ErrorClass::Permanent)
        }
        ErrorClass::UserAction => {
            info!(error = %err, "user action required, not retrying");
            RetryDecision::GiveUp(ErrorClass::UserAction)
        }
        ErrorClass::Transient => {
            if attempt >= policy.max_attempts {
                warn!(attempt, max = policy.max_attempts, "retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                let delay = compute_delay(attempt, policy);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling retry");
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

/// Linear backoff: `attempt * base_delay`.
pub fn compute_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    policy.base_delay.saturating_mul(attempt.max(1))
}
