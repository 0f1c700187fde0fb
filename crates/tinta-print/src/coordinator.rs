// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print job coordinator: at most one job in flight, no queue.
//
// A submission is accepted only when the busy flag can be taken. The job is
// then encoded on the caller's task (so an oversized image is rejected
// before any I/O) and handed to a worker task that drives the connection
// manager. The flag is released by a guard as soon as the worker finishes,
// whatever the outcome, and before the result is delivered.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;
use tracing::{error, info};

use tinta_bridge::traits::PlatformBridge;
use tinta_core::config::AppConfig;
use tinta_core::error::{Result, TintaError};
use tinta_core::types::{ConnectionState, Endpoint, JobId, PrintJob};

use crate::connection::{ConnectionManager, JobReport};
use crate::escpos::Encoder;
use crate::retry::RetryPolicy;

/// Holds the busy flag for the lifetime of one job.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TintaError::Busy)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to an accepted job. Resolves once, with the terminal result.
#[derive(Debug)]
pub struct JobTicket {
    job_id: JobId,
    result: oneshot::Receiver<Result<JobReport>>,
}

impl JobTicket {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> Result<JobReport> {
        self.result.await.unwrap_or(Err(TintaError::WorkerLost))
    }
}

pub struct PrintCoordinator {
    encoder: Encoder,
    manager: ConnectionManager,
    busy: Arc<AtomicBool>,
}

impl PrintCoordinator {
    pub fn new(bridge: Arc<dyn PlatformBridge>, config: &AppConfig) -> Self {
        Self {
            encoder: Encoder::new(config.profile, config.encoder),
            manager: ConnectionManager::new(bridge, RetryPolicy::from(&config.retry), config.timeouts),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// State of the connection state machine.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Accept a job and start it on a worker task. Fails immediately with
    /// `Busy` while another job is in flight, or with an encoding error.
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, endpoint: Endpoint, job: PrintJob) -> Result<JobTicket> {
        let guard = BusyGuard::acquire(&self.busy)?;
        let bytes = self.encoder.encode(job.payload())?;

        let job_id = job.id();
        info!(
            job = %job_id,
            kind = job.kind(),
            address = %endpoint.address,
            bytes = bytes.len(),
            "job accepted"
        );

        let manager = self.manager.clone();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = manager.run_job(job_id, &endpoint, &bytes).await;
            drop(guard);
            if let Err(e) = &result {
                error!(job = %job_id, error = %e, "job failed");
            }
            let _ = tx.send(result);
        });

        Ok(JobTicket {
            job_id,
            result: rx,
        })
    }

    /// Dispatch and wait for the terminal result.
    pub async fn submit(&self, endpoint: Endpoint, job: PrintJob) -> Result<JobReport> {
        self.dispatch(endpoint, job)?.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tinta_bridge::memory::{Fault, MemoryBridge};
    use tinta_core::types::{Address, PixelBuffer};

    fn printer() -> Endpoint {
        Endpoint::paired(Address::parse("00:11:62:AA:BB:CC").unwrap(), "Counter")
    }

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.retry.base_delay_ms = 5;
        config.timeouts.write_ms = 1_000;
        config
    }

    #[tokio::test]
    async fn second_submission_while_busy_is_rejected() {
        let bridge = MemoryBridge::new();
        bridge.set_write_latency(Duration::from_millis(100));
        let coordinator = PrintCoordinator::new(Arc::new(bridge.clone()), &fast_config());

        let first = coordinator.dispatch(printer(), PrintJob::text("one")).unwrap();
        assert!(coordinator.is_busy());
        assert!(matches!(
            coordinator.dispatch(printer(), PrintJob::text("two")),
            Err(TintaError::Busy)
        ));

        first.wait().await.unwrap();
        assert!(!coordinator.is_busy());
        assert_eq!(bridge.opens(), 1);
        assert_eq!(bridge.peak_open_channels(), 1);
    }

    #[tokio::test]
    async fn busy_clears_after_exhausted_retries() {
        let bridge = MemoryBridge::new();
        for _ in 0..3 {
            bridge.fail_next_write(Fault::Transient);
        }
        let coordinator = PrintCoordinator::new(Arc::new(bridge.clone()), &fast_config());

        let err = coordinator
            .submit(printer(), PrintJob::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, TintaError::RetriesExhausted { attempts: 3, .. }));
        assert!(!coordinator.is_busy());
        assert_eq!(coordinator.state(), ConnectionState::Idle);

        // The slot is free again.
        assert!(coordinator.submit(printer(), PrintJob::text("y")).await.is_ok());
    }

    #[tokio::test]
    async fn oversized_image_is_rejected_before_io() {
        let bridge = MemoryBridge::new();
        let coordinator = PrintCoordinator::new(Arc::new(bridge.clone()), &fast_config());
        let wide = PixelBuffer::filled(400, 2, [0, 0, 0, 255]).unwrap();

        assert!(matches!(
            coordinator.dispatch(printer(), PrintJob::image(wide)),
            Err(TintaError::ImageTooWide { .. })
        ));
        assert!(!coordinator.is_busy());
        assert_eq!(bridge.opens(), 0);
    }

    #[tokio::test]
    async fn text_job_sends_encoded_bytes() {
        let bridge = MemoryBridge::new();
        let coordinator = PrintCoordinator::new(Arc::new(bridge.clone()), &fast_config());

        let job = PrintJob::text("HELLO");
        let job_id = job.id();
        let ticket = coordinator.dispatch(printer(), job).unwrap();
        assert_eq!(ticket.job_id(), job_id);
        let report = ticket.wait().await.unwrap();
        assert_eq!(report.job_id, job_id);

        let expected = coordinator.encoder().encode_text("HELLO");
        assert_eq!(report.bytes_sent, expected.len());
        assert_eq!(bridge.written(), vec![expected]);
    }
}
