// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connection manager: drives one job over one freshly opened channel.
//
// Per attempt the state machine walks
//
//   Idle -> Connecting -> Open -> Writing -> Closing -> Idle
//
// with Connecting able to fall back to Idle and Writing able to fail into
// Closing. Channels are never pooled: each attempt opens its own and always
// closes it. Transient failures restart the whole job after a linear backoff.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use tinta_bridge::traits::{Channel, PlatformBridge};
use tinta_core::config::TimeoutConfig;
use tinta_core::error::{Result, TintaError};
use tinta_core::types::{AdapterState, Capability, ConnectionState, Endpoint, JobId};

use crate::retry::{RetryDecision, RetryPolicy, should_retry};

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connect,
    ChannelOpened,
    OpenFailed,
    BeginWrite,
    WriteCompleted,
    WriteFailed,
    Closed,
}

impl ConnectionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::ChannelOpened => "channel-opened",
            Self::OpenFailed => "open-failed",
            Self::BeginWrite => "begin-write",
            Self::WriteCompleted => "write-completed",
            Self::WriteFailed => "write-failed",
            Self::Closed => "closed",
        }
    }
}

/// Transition table. `None` means the event is not valid in `from`.
pub fn next_state(from: ConnectionState, event: ConnectionEvent) -> Option<ConnectionState> {
    use ConnectionEvent as E;
    use ConnectionState as S;

    match (from, event) {
        (S::Idle, E::Connect) => Some(S::Connecting),
        (S::Connecting, E::ChannelOpened) => Some(S::Open),
        (S::Connecting, E::OpenFailed) => Some(S::Idle),
        (S::Open, E::BeginWrite) => Some(S::Writing),
        (S::Writing, E::WriteCompleted | E::WriteFailed) => Some(S::Closing),
        (S::Closing, E::Closed) => Some(S::Idle),
        _ => None,
    }
}

/// The live state of a job's state machine. Dropping it always leaves the
/// shared state at `Idle`.
struct StateMachine {
    cell: Arc<RwLock<ConnectionState>>,
}

impl StateMachine {
    fn new(cell: Arc<RwLock<ConnectionState>>) -> Self {
        *cell.write().unwrap_or_else(PoisonError::into_inner) = ConnectionState::Idle;
        Self { cell }
    }

    fn fire(&mut self, event: ConnectionEvent) -> Result<ConnectionState> {
        let mut state = self.cell.write().unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        let next = next_state(from, event).ok_or(TintaError::InvalidTransition {
            from,
            event: event.name(),
        })?;
        debug!(?from, ?next, event = event.name(), "connection transition");
        *state = next;
        Ok(next)
    }

    fn force_idle(&mut self) {
        *self.cell.write().unwrap_or_else(PoisonError::into_inner) = ConnectionState::Idle;
    }
}

impl Drop for StateMachine {
    fn drop(&mut self) {
        self.force_idle();
    }
}

/// One attempt as recorded in a job report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Backoff waited before this attempt started.
    pub delay_before_ms: u64,
    /// Failure text, `None` when the attempt succeeded.
    pub error: Option<String>,
}

/// Outcome of a successful job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub endpoint: Endpoint,
    pub attempts: Vec<AttemptRecord>,
    pub bytes_sent: usize,
    /// Failure while releasing the channel. Never changes the outcome.
    pub close_error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Owns the connection state and runs jobs against the platform transport.
#[derive(Clone)]
pub struct ConnectionManager {
    bridge: Arc<dyn PlatformBridge>,
    policy: RetryPolicy,
    timeouts: TimeoutConfig,
    state: Arc<RwLock<ConnectionState>>,
}

impl ConnectionManager {
    pub fn new(bridge: Arc<dyn PlatformBridge>, policy: RetryPolicy, timeouts: TimeoutConfig) -> Self {
        Self {
            bridge,
            policy,
            timeouts,
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
        }
    }

    /// Current state of the connection state machine.
    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `bytes` to `endpoint`, retrying the whole job on transient
    /// failures. Returns exactly once, after the state machine is back at
    /// `Idle`.
    #[instrument(skip(self, endpoint, bytes), fields(job = %job_id, address = %endpoint.address, bytes = bytes.len()))]
    pub async fn run_job(&self, job_id: JobId, endpoint: &Endpoint, bytes: &[u8]) -> Result<JobReport> {
        let mut machine = StateMachine::new(Arc::clone(&self.state));
        let mut attempts = Vec::new();
        let mut attempt = 1;
        let mut delay = Duration::ZERO;

        loop {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let (result, close_error) = self.attempt(&mut machine, endpoint, bytes).await;
            match result {
                Ok(bytes_sent) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        delay_before_ms: delay.as_millis() as u64,
                        error: None,
                    });
                    info!(attempt, bytes_sent, "job delivered");
                    return Ok(JobReport {
                        job_id,
                        endpoint: endpoint.clone(),
                        attempts,
                        bytes_sent,
                        close_error,
                        finished_at: Utc::now(),
                    });
                }
                Err(err) => {
                    warn!(attempt, error = %err, "print attempt failed");
                    attempts.push(AttemptRecord {
                        attempt,
                        delay_before_ms: delay.as_millis() as u64,
                        error: Some(err.to_string()),
                    });

                    match should_retry(&err, attempt, &self.policy) {
                        RetryDecision::RetryAfter(next) => {
                            delay = next;
                            attempt += 1;
                        }
                        RetryDecision::GiveUp(_) => return Err(err),
                        RetryDecision::Exhausted => {
                            return Err(TintaError::RetriesExhausted {
                                attempts: attempt,
                                last: Box::new(err),
                            });
                        }
                    }
                }
            }
        }
    }

    /// One pass through the state machine. The channel, once opened, is
    /// always closed; a close failure is returned separately.
    async fn attempt(
        &self,
        machine: &mut StateMachine,
        endpoint: &Endpoint,
        bytes: &[u8],
    ) -> (Result<usize>, Option<String>) {
        if let Err(e) = self.preflight() {
            return (Err(e), None);
        }

        let mut channel = match self.open(machine, endpoint).await {
            Ok(channel) => channel,
            Err(e) => return (Err(e), None),
        };

        let written = self.write(machine, channel.as_mut(), bytes).await;
        let close_error = self.close(machine, channel.as_mut()).await;
        (written, close_error)
    }

    /// Adapter and permission checks. Failures here never reach the
    /// transport and leave the state at `Idle`.
    fn preflight(&self) -> Result<()> {
        match self.bridge.adapter_state() {
            AdapterState::Unavailable => return Err(TintaError::AdapterUnavailable),
            AdapterState::Disabled => return Err(TintaError::AdapterDisabled),
            AdapterState::Enabled => {}
        }
        if !self.bridge.permission_granted(Capability::Connect) {
            return Err(TintaError::PermissionDenied(Capability::Connect));
        }
        Ok(())
    }

    async fn open(&self, machine: &mut StateMachine, endpoint: &Endpoint) -> Result<Box<dyn Channel>> {
        machine.fire(ConnectionEvent::Connect)?;
        match timed("open", self.timeouts.open(), self.bridge.open_channel(endpoint)).await {
            Ok(channel) => {
                machine.fire(ConnectionEvent::ChannelOpened)?;
                Ok(channel)
            }
            Err(e) => {
                machine.fire(ConnectionEvent::OpenFailed)?;
                Err(e)
            }
        }
    }

    async fn write(&self, machine: &mut StateMachine, channel: &mut dyn Channel, bytes: &[u8]) -> Result<usize> {
        machine.fire(ConnectionEvent::BeginWrite)?;
        let result = timed("write", self.timeouts.write(), channel.write(bytes))
            .await
            .and_then(|accepted| {
                if accepted < bytes.len() {
                    Err(TintaError::TransientIo(format!(
                        "short write: {accepted} of {} bytes accepted",
                        bytes.len()
                    )))
                } else {
                    Ok(accepted)
                }
            });
        let event = if result.is_ok() {
            ConnectionEvent::WriteCompleted
        } else {
            ConnectionEvent::WriteFailed
        };
        machine.fire(event)?;
        result
    }

    async fn close(&self, machine: &mut StateMachine, channel: &mut dyn Channel) -> Option<String> {
        let result = timed("close", self.timeouts.close(), channel.close()).await;
        if machine.fire(ConnectionEvent::Closed).is_err() {
            machine.force_idle();
        }
        match result {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "closing channel failed");
                Some(e.to_string())
            }
        }
    }
}

/// Run `fut` under an optional deadline.
async fn timed<T>(
    operation: &'static str,
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TintaError::Timeout {
                operation,
                after_ms: limit.as_millis() as u64,
            })?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinta_bridge::memory::{Fault, MemoryBridge};
    use tinta_core::types::Address;

    use ConnectionEvent as E;
    use ConnectionState as S;

    fn printer() -> Endpoint {
        Endpoint::paired(Address::parse("00:11:62:AA:BB:CC").unwrap(), "Counter")
    }

    fn manager(bridge: &MemoryBridge, max_attempts: u32) -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(bridge.clone()),
            RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(5),
            },
            TimeoutConfig {
                open_ms: 200,
                write_ms: 200,
                close_ms: 200,
            },
        )
    }

    #[test]
    fn happy_path_cycles_back_to_idle() {
        let mut state = S::Idle;
        for event in [E::Connect, E::ChannelOpened, E::BeginWrite, E::WriteCompleted, E::Closed] {
            state = next_state(state, event).unwrap();
        }
        assert_eq!(state, S::Idle);
    }

    #[test]
    fn failure_edges() {
        assert_eq!(next_state(S::Connecting, E::OpenFailed), Some(S::Idle));
        assert_eq!(next_state(S::Writing, E::WriteFailed), Some(S::Closing));
    }

    #[test]
    fn no_resting_connected_state() {
        assert_eq!(next_state(S::Open, E::Connect), None);
        assert_eq!(next_state(S::Idle, E::BeginWrite), None);
        assert_eq!(next_state(S::Closing, E::BeginWrite), None);
        assert_eq!(next_state(S::Writing, E::Closed), None);
    }

    #[test]
    fn machine_rejects_invalid_events() {
        let cell = Arc::new(RwLock::new(S::Idle));
        let mut machine = StateMachine::new(Arc::clone(&cell));
        assert!(matches!(
            machine.fire(E::BeginWrite),
            Err(TintaError::InvalidTransition { from: S::Idle, .. })
        ));
        machine.fire(E::Connect).unwrap();
        assert_eq!(*cell.read().unwrap(), S::Connecting);
        drop(machine);
        assert_eq!(*cell.read().unwrap(), S::Idle);
    }

    #[tokio::test]
    async fn delivers_bytes_in_one_attempt() {
        let bridge = MemoryBridge::new();
        let manager = manager(&bridge, 3);
        let report = manager.run_job(JobId::new(), &printer(), b"abc").await.unwrap();

        assert_eq!(report.bytes_sent, 3);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(bridge.written(), vec![b"abc".to_vec()]);
        assert_eq!(manager.state(), S::Idle);
        assert_eq!(bridge.open_channels(), 0);
    }

    #[tokio::test]
    async fn two_failed_writes_then_success() {
        let bridge = MemoryBridge::new();
        bridge.fail_next_write(Fault::Transient);
        bridge.fail_next_write(Fault::ShortWrite);
        let manager = manager(&bridge, 3);
        let base = manager.policy().base_delay;

        let started = tokio::time::Instant::now();
        let report = manager.run_job(JobId::new(), &printer(), b"receipt").await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.attempts.len(), 3);
        let delays: Vec<u64> = report.attempts.iter().map(|a| a.delay_before_ms).collect();
        let base_ms = base.as_millis() as u64;
        assert_eq!(delays, vec![0, base_ms, 2 * base_ms]);
        // The backoff really waited between attempts.
        assert!(elapsed >= base * 3, "finished after {elapsed:?}");
        assert_eq!(bridge.write_calls(), 3);
        assert!(report.attempts[0].error.is_some());
        assert!(report.attempts[2].error.is_none());
        // Each attempt used its own channel, and each was closed.
        assert_eq!(bridge.opens(), 3);
        assert_eq!(bridge.closes(), 3);
        assert_eq!(bridge.written(), vec![b"receipt".to_vec()]);
    }

    #[tokio::test]
    async fn every_attempt_failing_exhausts_retries() {
        let bridge = MemoryBridge::new();
        for _ in 0..3 {
            bridge.fail_next_open(Fault::Transient);
        }
        let manager = manager(&bridge, 3);

        let err = manager.run_job(JobId::new(), &printer(), b"x").await.unwrap_err();
        match err {
            TintaError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, TintaError::TransientIo(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(bridge.opens(), 3);
        assert_eq!(manager.state(), S::Idle);
    }

    #[tokio::test]
    async fn permission_denied_on_open_is_not_retried() {
        let bridge = MemoryBridge::new();
        bridge.fail_next_open(Fault::PermissionDenied);
        let manager = manager(&bridge, 3);

        let err = manager.run_job(JobId::new(), &printer(), b"x").await.unwrap_err();
        assert!(matches!(err, TintaError::PermissionDenied(Capability::Connect)));
        assert_eq!(bridge.opens(), 1);
    }

    #[tokio::test]
    async fn vanished_endpoint_is_not_retried() {
        let bridge = MemoryBridge::new();
        bridge.fail_next_open(Fault::NotFound);
        let manager = manager(&bridge, 3);

        let err = manager.run_job(JobId::new(), &printer(), b"x").await.unwrap_err();
        assert!(matches!(err, TintaError::EndpointNotFound(_)));
        assert_eq!(bridge.opens(), 1);
        assert_eq!(bridge.write_calls(), 0);
    }

    #[tokio::test]
    async fn missing_permission_never_reaches_transport() {
        let bridge = MemoryBridge::new();
        bridge.revoke(Capability::Connect);
        let manager = manager(&bridge, 3);

        let err = manager.run_job(JobId::new(), &printer(), b"x").await.unwrap_err();
        assert!(matches!(err, TintaError::PermissionDenied(_)));
        assert_eq!(bridge.opens(), 0);
    }

    #[tokio::test]
    async fn disabled_adapter_fails_fast() {
        let bridge = MemoryBridge::new();
        bridge.set_adapter_state(AdapterState::Disabled);
        let manager = manager(&bridge, 3);

        let err = manager.run_job(JobId::new(), &printer(), b"x").await.unwrap_err();
        assert!(matches!(err, TintaError::AdapterDisabled));
        assert_eq!(bridge.opens(), 0);
    }

    #[tokio::test]
    async fn hung_write_times_out_and_closes_channel() {
        let bridge = MemoryBridge::new();
        bridge.fail_next_write(Fault::Hang);
        let manager = manager(&bridge, 1);

        let err = manager.run_job(JobId::new(), &printer(), b"x").await.unwrap_err();
        match err {
            TintaError::RetriesExhausted { last, .. } => {
                assert!(matches!(*last, TintaError::Timeout { operation: "write", .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(bridge.open_channels(), 0);
    }

    #[tokio::test]
    async fn close_failure_does_not_override_success() {
        let bridge = MemoryBridge::new();
        bridge.set_fail_close(true);
        let manager = manager(&bridge, 3);

        let report = manager.run_job(JobId::new(), &printer(), b"x").await.unwrap();
        assert!(report.close_error.is_some());
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(manager.state(), S::Idle);
    }
}
