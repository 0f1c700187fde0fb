// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bluetooth printer discovery.
//
// A scan resets the registry, seeds it with the paired printers, and asks the
// platform to start an inquiry. The platform reports devices on a channel
// from whatever thread it likes; a listener task merges them into the
// registry and forwards the new ones to the caller until the platform says
// the scan is finished.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tinta_bridge::traits::PlatformBridge;
use tinta_core::error::{Result, TintaError};
use tinta_core::types::{AdapterState, Capability, DiscoveryEvent, Endpoint};

use crate::registry::DeviceRegistry;

/// What a finished scan found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Devices added by this scan (not counting paired ones).
    pub discovered: usize,
    /// Registry size when the scan ended.
    pub total: usize,
}

impl ScanSummary {
    /// One-line status for the front end.
    pub fn message(&self) -> String {
        match self.discovered {
            0 => "No new devices found".to_owned(),
            1 => "Found 1 new device".to_owned(),
            n => format!("Found {n} new devices"),
        }
    }
}

/// A running scan.
///
/// New devices can be read as they arrive with [`next_device`]; the final
/// summary comes from [`finished`]. Dropping the handle leaves the scan
/// running in the background.
///
/// [`next_device`]: ScanHandle::next_device
/// [`finished`]: ScanHandle::finished
#[derive(Debug)]
pub struct ScanHandle {
    new_devices: mpsc::UnboundedReceiver<Endpoint>,
    summary: oneshot::Receiver<ScanSummary>,
    listener: JoinHandle<()>,
}

impl ScanHandle {
    /// The next device this scan added to the registry, or `None` once the
    /// scan has ended.
    pub async fn next_device(&mut self) -> Option<Endpoint> {
        self.new_devices.recv().await
    }

    /// Wait for the platform to finish the scan.
    pub async fn finished(self) -> Result<ScanSummary> {
        self.summary.await.map_err(|_| TintaError::WorkerLost)
    }

    /// Stop merging results. The platform scan itself is cancelled through
    /// [`Discovery::cancel`].
    pub fn abort(self) {
        self.listener.abort();
    }
}

/// Drives platform discovery into a shared registry.
#[derive(Clone)]
pub struct Discovery {
    bridge: Arc<dyn PlatformBridge>,
    registry: Arc<DeviceRegistry>,
}

impl Discovery {
    pub fn new(bridge: Arc<dyn PlatformBridge>, registry: Arc<DeviceRegistry>) -> Self {
        Self { bridge, registry }
    }

    fn require_adapter(&self) -> Result<()> {
        match self.bridge.adapter_state() {
            AdapterState::Enabled => Ok(()),
            AdapterState::Disabled => Err(TintaError::AdapterDisabled),
            AdapterState::Unavailable => Err(TintaError::AdapterUnavailable),
        }
    }

    /// Add the platform's paired printers to the registry without clearing
    /// it. Returns how many were new.
    pub fn refresh_paired(&self) -> Result<usize> {
        self.require_adapter()?;
        let paired = self.bridge.list_paired_endpoints()?;
        let added = self.registry.seed_paired(paired);
        debug!(added, "paired printers loaded");
        Ok(added)
    }

    /// Start a fresh scan. Must be called from within a Tokio runtime.
    pub fn start_scan(&self) -> Result<ScanHandle> {
        self.require_adapter()?;

        if !self.bridge.permission_granted(Capability::Scan) {
            self.bridge.request_permissions(&[Capability::Scan])?;
            if !self.bridge.permission_granted(Capability::Scan) {
                return Err(TintaError::PermissionDenied(Capability::Scan));
            }
        }

        if self.bridge.is_discovering() {
            debug!("cancelling scan already in progress");
            self.bridge.cancel_discovery()?;
        }

        self.registry.reset();
        let paired = self.registry.seed_paired(self.bridge.list_paired_endpoints()?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.bridge.start_discovery(events_tx)?;
        info!(paired, "printer scan started");

        let (devices_tx, devices_rx) = mpsc::unbounded_channel();
        let (summary_tx, summary_rx) = oneshot::channel();
        let listener = spawn_listener(events_rx, Arc::clone(&self.registry), devices_tx, summary_tx);

        Ok(ScanHandle {
            new_devices: devices_rx,
            summary: summary_rx,
            listener,
        })
    }

    /// Stop a running platform scan.
    pub fn cancel(&self) -> Result<()> {
        self.bridge.cancel_discovery()
    }
}

/// Merge platform events into the registry until the scan ends.
fn spawn_listener(
    mut events: mpsc::UnboundedReceiver<DiscoveryEvent>,
    registry: Arc<DeviceRegistry>,
    new_devices: mpsc::UnboundedSender<Endpoint>,
    summary: oneshot::Sender<ScanSummary>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut discovered = 0;
        let mut finished = false;

        while let Some(event) = events.recv().await {
            match event {
                DiscoveryEvent::DeviceFound(endpoint) => {
                    if registry.add_discovered(endpoint.clone()) {
                        discovered += 1;
                        let _ = new_devices.send(endpoint);
                    }
                }
                DiscoveryEvent::DiscoveryFinished => {
                    finished = true;
                    break;
                }
            }
        }

        if !finished {
            warn!("platform stopped reporting before the scan finished");
        }

        let result = ScanSummary {
            discovered,
            total: registry.len(),
        };
        info!(discovered, total = result.total, "{}", result.message());
        let _ = summary.send(result);
    })
}
