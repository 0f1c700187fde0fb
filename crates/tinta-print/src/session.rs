// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print session: the one context object a front end holds.
//
// Owns the registry, discovery, the coordinator, and the selected printer
// for the lifetime of an application session. There is no global state;
// callers share the session by reference or `Arc`.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, instrument};

use tinta_bridge::traits::PlatformBridge;
use tinta_core::config::AppConfig;
use tinta_core::error::{Result, TintaError};
use tinta_core::types::{Endpoint, Origin, PixelBuffer, PrintJob, PrintStatus};

use crate::connection::JobReport;
use crate::coordinator::{JobTicket, PrintCoordinator};
use crate::discovery::{Discovery, ScanHandle};
use crate::escpos::Encoder;
use crate::registry::DeviceRegistry;

/// Where a job should go: a known endpoint or a typed address.
#[derive(Debug, Clone)]
pub enum PrintTarget {
    Endpoint(Endpoint),
    Address(String),
}

impl From<Endpoint> for PrintTarget {
    fn from(endpoint: Endpoint) -> Self {
        Self::Endpoint(endpoint)
    }
}

impl From<&str> for PrintTarget {
    fn from(address: &str) -> Self {
        Self::Address(address.to_owned())
    }
}

pub struct PrintSession {
    config: AppConfig,
    bridge: Arc<dyn PlatformBridge>,
    registry: Arc<DeviceRegistry>,
    discovery: Discovery,
    coordinator: PrintCoordinator,
    selection: RwLock<Option<Endpoint>>,
}

impl PrintSession {
    /// Build a session and seed the registry with the paired printers. An
    /// adapter that is off or missing leaves the registry empty; the same
    /// error comes back from the first scan or print.
    pub fn new(bridge: Arc<dyn PlatformBridge>, config: AppConfig) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let discovery = Discovery::new(Arc::clone(&bridge), Arc::clone(&registry));
        if let Err(e) = discovery.refresh_paired() {
            debug!(error = %e, "paired printers not loaded at startup");
        }
        Self {
            discovery,
            coordinator: PrintCoordinator::new(Arc::clone(&bridge), &config),
            registry,
            bridge,
            config,
            selection: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn platform_name(&self) -> &str {
        self.bridge.platform_name()
    }

    pub fn encoder(&self) -> &Encoder {
        self.coordinator.encoder()
    }

    /// Known printers in the order they were found.
    pub fn devices(&self) -> Vec<Endpoint> {
        self.registry.snapshot()
    }

    // -- Discovery --

    pub fn refresh_paired(&self) -> Result<usize> {
        self.discovery.refresh_paired()
    }

    pub fn start_scan(&self) -> Result<ScanHandle> {
        self.discovery.start_scan()
    }

    pub fn cancel_scan(&self) -> Result<()> {
        self.discovery.cancel()
    }

    // -- Selection --

    /// Resolve an address to an endpoint without changing the selection.
    /// Unknown addresses become `Manual` endpoints, named by the platform
    /// when it recognises them.
    pub fn lookup(&self, address: &str) -> Result<Endpoint> {
        let endpoint = self.registry.select(address)?;
        if endpoint.origin != Origin::Manual {
            return Ok(endpoint);
        }
        match self.bridge.resolve_address(&endpoint.address) {
            Ok(known) => Ok(Endpoint::new(
                endpoint.address,
                Some(known.display_name),
                Origin::Manual,
            )),
            Err(e) => {
                debug!(address = %endpoint.address, error = %e, "platform has no name for address");
                Ok(endpoint)
            }
        }
    }

    /// Make `address` the active print target.
    pub fn select(&self, address: &str) -> Result<Endpoint> {
        let endpoint = self.lookup(address)?;
        info!(printer = %endpoint, "printer selected");
        *self.selection.write().unwrap_or_else(PoisonError::into_inner) = Some(endpoint.clone());
        Ok(endpoint)
    }

    pub fn selected(&self) -> Option<Endpoint> {
        self.selection.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn selected_name(&self) -> Option<String> {
        self.selected().map(|ep| ep.display_name)
    }

    pub fn clear_selection(&self) {
        *self.selection.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    // -- Printing --

    pub fn is_busy(&self) -> bool {
        self.coordinator.is_busy()
    }

    fn resolve(&self, target: PrintTarget) -> Result<Endpoint> {
        match target {
            PrintTarget::Endpoint(endpoint) => Ok(endpoint),
            PrintTarget::Address(address) => self.lookup(&address),
        }
    }

    /// Start a job on `target` without waiting for it.
    pub fn dispatch(&self, target: impl Into<PrintTarget>, job: PrintJob) -> Result<JobTicket> {
        let endpoint = self.resolve(target.into())?;
        self.coordinator.dispatch(endpoint, job)
    }

    /// Run a job on `target` and wait for the outcome.
    pub async fn submit(&self, target: impl Into<PrintTarget>, job: PrintJob) -> Result<JobReport> {
        self.dispatch(target, job)?.wait().await
    }

    /// Run a job on the selected printer.
    #[instrument(skip(self, job), fields(job = %job.id(), kind = job.kind()))]
    pub async fn print(&self, job: PrintJob) -> Result<JobReport> {
        let endpoint = self.selected().ok_or(TintaError::NoPrinterSelected)?;
        self.submit(endpoint, job).await
    }

    /// Print left-aligned text on the selected printer.
    pub async fn print_text(&self, body: &str) -> PrintStatus {
        if body.trim().is_empty() {
            return PrintStatus::failure(&TintaError::EmptyText);
        }
        status_of(&self.print(PrintJob::text(body)).await)
    }

    /// Print a centred image on the selected printer.
    pub async fn print_image(&self, pixels: PixelBuffer) -> PrintStatus {
        status_of(&self.print(PrintJob::image(pixels)).await)
    }
}

/// The `{ok, message}` payload for a finished job.
pub fn status_of(result: &Result<JobReport>) -> PrintStatus {
    match result {
        Ok(report) => PrintStatus::success(format!("Printed on {}", report.endpoint.display_name)),
        Err(err) => PrintStatus::failure(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tinta_bridge::memory::{Fault, MemoryBridge};
    use tinta_core::types::{AdapterState, Address};

    const PRINTER: &str = "00:11:62:AA:BB:CC";

    fn session(bridge: &MemoryBridge) -> PrintSession {
        let mut config = AppConfig::default();
        config.retry.base_delay_ms = 5;
        PrintSession::new(Arc::new(bridge.clone()), config)
    }

    fn paired_bridge() -> MemoryBridge {
        let bridge = MemoryBridge::new();
        bridge.add_paired(Endpoint::paired(Address::parse(PRINTER).unwrap(), "Counter"));
        bridge
    }

    #[tokio::test]
    async fn hello_reaches_the_printer_verbatim() {
        let bridge = paired_bridge();
        let session = session(&bridge);
        session.refresh_paired().unwrap();
        let endpoint = session.devices()[0].clone();

        let result = session.submit(endpoint, PrintJob::text("HELLO")).await;
        let status = status_of(&result);
        assert!(status.ok, "{}", status.message);
        assert_eq!(status.message, "Printed on Counter");

        let enc = session.encoder();
        let mut expected = enc.header();
        expected.extend_from_slice(b"HELLO");
        expected.extend_from_slice(&enc.trailer());
        assert_eq!(bridge.written(), vec![expected]);
    }

    #[test]
    fn paired_printers_are_known_at_startup() {
        let session = session(&paired_bridge());
        let devices = session.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].origin, Origin::Paired);
        assert_eq!(devices[0].display_name, "Counter");
    }

    #[test]
    fn disabled_adapter_still_builds_a_session() {
        let bridge = paired_bridge();
        bridge.set_adapter_state(AdapterState::Disabled);
        let session = session(&bridge);
        assert!(session.devices().is_empty());
        assert!(matches!(session.refresh_paired(), Err(TintaError::AdapterDisabled)));
    }

    #[tokio::test]
    async fn permission_denied_reports_failure_without_retry() {
        let bridge = MemoryBridge::new();
        bridge.fail_next_open(Fault::PermissionDenied);
        let session = session(&bridge);

        let status = status_of(&session.submit(PRINTER, PrintJob::text("HELLO")).await);
        assert!(!status.ok);
        assert!(status.message.contains("permission"), "{}", status.message);
        assert_eq!(bridge.opens(), 1);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn print_without_selection_fails() {
        let session = session(&paired_bridge());
        let status = session.print_text("hi").await;
        assert!(!status.ok);
        assert_eq!(status.message, TintaError::NoPrinterSelected.to_string());
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_selection_check() {
        let bridge = paired_bridge();
        let session = session(&bridge);
        let status = session.print_text("  \n ").await;
        assert!(!status.ok);
        assert_eq!(status.message, TintaError::EmptyText.to_string());
        assert_eq!(bridge.opens(), 0);
    }

    #[tokio::test]
    async fn selected_printer_receives_image() {
        let bridge = paired_bridge();
        let session = session(&bridge);
        session.refresh_paired().unwrap();
        session.select(PRINTER).unwrap();

        let pixels = PixelBuffer::filled(16, 4, [0, 0, 0, 255]).unwrap();
        let status = session.print_image(pixels).await;
        assert!(status.ok, "{}", status.message);
        assert_eq!(bridge.written().len(), 1);
    }

    #[tokio::test]
    async fn typed_address_is_named_by_the_platform() {
        let bridge = MemoryBridge::new();
        bridge.add_nearby(Endpoint::discovered(
            Address::parse(PRINTER).unwrap(),
            Some("MPT-II".into()),
        ));
        let session = session(&bridge);

        let selected = session.select("00:11:62:aa:bb:cc").unwrap();
        assert_eq!(selected.origin, Origin::Manual);
        assert_eq!(selected.display_name, "MPT-II");
        assert_eq!(session.selected_name().as_deref(), Some("MPT-II"));
        assert!(session.devices().is_empty());

        session.clear_selection();
        assert!(session.selected().is_none());
    }

    #[tokio::test]
    async fn unknown_address_still_selects() {
        let session = session(&MemoryBridge::new());
        let selected = session.select("66:55:44:33:22:11").unwrap();
        assert_eq!(selected.display_name, "66:55:44:33:22:11");
        assert!(matches!(session.select("printer"), Err(TintaError::InvalidAddress(_))));
        // A bad address leaves the previous selection in place.
        assert_eq!(session.selected(), Some(selected));
    }

    #[tokio::test]
    async fn busy_session_rejects_second_job() {
        let bridge = paired_bridge();
        bridge.set_write_latency(Duration::from_millis(100));
        let session = session(&bridge);

        let ticket = session.dispatch(PRINTER, PrintJob::text("one")).unwrap();
        assert!(matches!(
            session.submit(PRINTER, PrintJob::text("two")).await,
            Err(TintaError::Busy)
        ));
        assert!(ticket.wait().await.is_ok());
        assert_eq!(bridge.opens(), 1);
    }
}
