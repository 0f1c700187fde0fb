// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory bridge: a simulated printer for offline mode and tests.
//
// Every job written to it is recorded. Faults can be queued per operation so
// the retry path can be driven deterministically: the next open or write pops
// one fault off its queue, and an empty queue means success.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use tinta_core::error::{Result, TintaError};
use tinta_core::types::{Address, AdapterState, Capability, DiscoveryEvent, Endpoint};

use crate::traits::*;

/// Address of the printer that offline mode pretends to own.
pub const OFFLINE_PRINTER_ADDRESS: &str = "00:00:00:00:00:01";

/// A scripted failure for the next open or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Link dropped mid-operation.
    Transient,
    /// Write accepts only half of the bytes.
    ShortWrite,
    /// The platform refuses the connect permission.
    PermissionDenied,
    /// The address is unknown to the platform.
    NotFound,
    /// The operation never completes.
    Hang,
}

#[derive(Debug)]
struct MemoryState {
    adapter: AdapterState,
    paired: Vec<Endpoint>,
    nearby: Vec<Endpoint>,
    granted: HashSet<Capability>,
    grant_on_request: bool,
    discovering: bool,
    open_faults: VecDeque<Fault>,
    write_faults: VecDeque<Fault>,
    fail_close: bool,
    write_latency: Duration,
    opens: u32,
    closes: u32,
    open_channels: u32,
    peak_open_channels: u32,
    write_calls: u32,
    written: Vec<Vec<u8>>,
}

/// Simulated Bluetooth platform. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryBridge {
    state: Arc<Mutex<MemoryState>>,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBridge {
    /// An enabled adapter with every permission granted and nothing paired.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                adapter: AdapterState::Enabled,
                paired: Vec::new(),
                nearby: Vec::new(),
                granted: [Capability::Scan, Capability::Connect].into_iter().collect(),
                grant_on_request: true,
                discovering: false,
                open_faults: VecDeque::new(),
                write_faults: VecDeque::new(),
                fail_close: false,
                write_latency: Duration::ZERO,
                opens: 0,
                closes: 0,
                open_channels: 0,
                peak_open_channels: 0,
                write_calls: 0,
                written: Vec::new(),
            })),
        }
    }

    /// Offline mode: one paired printer that accepts every job.
    pub fn offline() -> Self {
        let bridge = Self::new();
        if let Ok(address) = Address::parse(OFFLINE_PRINTER_ADDRESS) {
            bridge.add_paired(Endpoint::paired(address, "Offline Printer"));
        }
        bridge
    }

    // -- Setup ---------------------------------------------------------------

    pub fn add_paired(&self, endpoint: Endpoint) {
        lock(&self.state).paired.push(endpoint);
    }

    /// A device that the next discovery scan will report.
    pub fn add_nearby(&self, endpoint: Endpoint) {
        lock(&self.state).nearby.push(endpoint);
    }

    pub fn set_adapter_state(&self, adapter: AdapterState) {
        lock(&self.state).adapter = adapter;
    }

    pub fn revoke(&self, capability: Capability) {
        lock(&self.state).granted.remove(&capability);
    }

    /// Whether `request_permissions` grants what is asked for.
    pub fn set_grant_on_request(&self, grant: bool) {
        lock(&self.state).grant_on_request = grant;
    }

    pub fn fail_next_open(&self, fault: Fault) {
        lock(&self.state).open_faults.push_back(fault);
    }

    pub fn fail_next_write(&self, fault: Fault) {
        lock(&self.state).write_faults.push_back(fault);
    }

    pub fn set_fail_close(&self, fail: bool) {
        lock(&self.state).fail_close = fail;
    }

    /// Delay applied to every write before it completes.
    pub fn set_write_latency(&self, latency: Duration) {
        lock(&self.state).write_latency = latency;
    }

    // -- Inspection ----------------------------------------------------------

    /// Number of `open_channel` calls, successful or not.
    pub fn opens(&self) -> u32 {
        lock(&self.state).opens
    }

    pub fn closes(&self) -> u32 {
        lock(&self.state).closes
    }

    /// Channels opened and not yet closed.
    pub fn open_channels(&self) -> u32 {
        lock(&self.state).open_channels
    }

    /// Most channels ever open at the same time.
    pub fn peak_open_channels(&self) -> u32 {
        lock(&self.state).peak_open_channels
    }

    /// Number of `Channel::write` calls, successful or not.
    pub fn write_calls(&self) -> u32 {
        lock(&self.state).write_calls
    }

    /// Byte streams of every fully accepted write, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.state).written.clone()
    }
}

impl PlatformBridge for MemoryBridge {
    fn platform_name(&self) -> &str {
        "Offline (in-memory)"
    }
}

impl BluetoothAdapter for MemoryBridge {
    fn adapter_state(&self) -> AdapterState {
        lock(&self.state).adapter
    }

    fn list_paired_endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(lock(&self.state).paired.clone())
    }

    fn resolve_address(&self, address: &Address) -> Result<Endpoint> {
        let state = lock(&self.state);
        state
            .paired
            .iter()
            .chain(state.nearby.iter())
            .find(|ep| &ep.address == address)
            .cloned()
            .ok_or_else(|| TintaError::EndpointNotFound(address.to_string()))
    }

    fn start_discovery(&self, events: UnboundedSender<DiscoveryEvent>) -> Result<()> {
        let nearby = {
            let mut state = lock(&self.state);
            state.discovering = true;
            state.nearby.clone()
        };
        let state = Arc::clone(&self.state);

        // Deliver from a foreign thread, as a real platform callback would.
        std::thread::Builder::new()
            .name("memory-discovery".into())
            .spawn(move || {
                for endpoint in nearby {
                    if events.send(DiscoveryEvent::DeviceFound(endpoint)).is_err() {
                        break;
                    }
                }
                lock(&state).discovering = false;
                let _ = events.send(DiscoveryEvent::DiscoveryFinished);
            })?;
        Ok(())
    }

    fn cancel_discovery(&self) -> Result<()> {
        lock(&self.state).discovering = false;
        Ok(())
    }

    fn is_discovering(&self) -> bool {
        lock(&self.state).discovering
    }
}

impl PermissionGate for MemoryBridge {
    fn permission_granted(&self, capability: Capability) -> bool {
        lock(&self.state).granted.contains(&capability)
    }

    fn request_permissions(&self, capabilities: &[Capability]) -> Result<()> {
        let mut state = lock(&self.state);
        if state.grant_on_request {
            state.granted.extend(capabilities.iter().copied());
        }
        Ok(())
    }
}

#[async_trait]
impl SerialTransport for MemoryBridge {
    async fn open_channel(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>> {
        let fault = {
            let mut state = lock(&self.state);
            state.opens += 1;
            state.open_faults.pop_front()
        };

        match fault {
            None | Some(Fault::ShortWrite) => {}
            Some(Fault::Transient) => {
                return Err(TintaError::TransientIo(format!(
                    "simulated connect failure to {}",
                    endpoint.address
                )));
            }
            Some(Fault::PermissionDenied) => {
                return Err(TintaError::PermissionDenied(Capability::Connect));
            }
            Some(Fault::NotFound) => {
                return Err(TintaError::EndpointNotFound(endpoint.address.to_string()));
            }
            Some(Fault::Hang) => return std::future::pending().await,
        }

        let mut state = lock(&self.state);
        state.open_channels += 1;
        state.peak_open_channels = state.peak_open_channels.max(state.open_channels);
        debug!(address = %endpoint.address, "memory channel opened");
        Ok(Box::new(MemoryChannel {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

/// Channel into the simulated printer.
struct MemoryChannel {
    state: Arc<Mutex<MemoryState>>,
    closed: bool,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let (fault, latency) = {
            let mut state = lock(&self.state);
            state.write_calls += 1;
            (state.write_faults.pop_front(), state.write_latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match fault {
            None => {
                lock(&self.state).written.push(bytes.to_vec());
                info!(bytes = bytes.len(), "memory printer accepted job");
                Ok(bytes.len())
            }
            Some(Fault::ShortWrite) => Ok(bytes.len() / 2),
            Some(Fault::Transient) => {
                Err(TintaError::TransientIo("simulated link drop during write".into()))
            }
            Some(Fault::PermissionDenied) => Err(TintaError::PermissionDenied(Capability::Connect)),
            Some(Fault::NotFound) => Err(TintaError::TransientIo("simulated device vanished".into())),
            Some(Fault::Hang) => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if !self.closed {
            self.closed = true;
            state.closes += 1;
            state.open_channels = state.open_channels.saturating_sub(1);
        }
        if state.fail_close {
            return Err(TintaError::TransientIo("simulated close failure".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer() -> Endpoint {
        Endpoint::paired(Address::parse("00:11:62:AA:BB:CC").unwrap(), "Counter")
    }

    #[tokio::test]
    async fn records_accepted_writes() {
        let bridge = MemoryBridge::new();
        let mut channel = bridge.open_channel(&printer()).await.unwrap();
        assert_eq!(channel.write(b"abc").await.unwrap(), 3);
        channel.close().await.unwrap();

        assert_eq!(bridge.written(), vec![b"abc".to_vec()]);
        assert_eq!(bridge.opens(), 1);
        assert_eq!(bridge.closes(), 1);
        assert_eq!(bridge.open_channels(), 0);
    }

    #[tokio::test]
    async fn queued_faults_apply_once() {
        let bridge = MemoryBridge::new();
        bridge.fail_next_open(Fault::Transient);

        assert!(matches!(
            bridge.open_channel(&printer()).await,
            Err(TintaError::TransientIo(_))
        ));
        assert!(bridge.open_channel(&printer()).await.is_ok());
    }

    #[tokio::test]
    async fn short_write_reports_partial_count() {
        let bridge = MemoryBridge::new();
        bridge.fail_next_write(Fault::ShortWrite);
        let mut channel = bridge.open_channel(&printer()).await.unwrap();
        assert_eq!(channel.write(&[0u8; 10]).await.unwrap(), 5);
        assert!(bridge.written().is_empty());
    }

    #[tokio::test]
    async fn discovery_reports_nearby_then_finishes() {
        let bridge = MemoryBridge::new();
        bridge.add_nearby(Endpoint::discovered(
            Address::parse("00:11:62:00:00:09").unwrap(),
            None,
        ));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bridge.start_discovery(tx).unwrap();

        assert!(matches!(rx.recv().await, Some(DiscoveryEvent::DeviceFound(_))));
        assert_eq!(rx.recv().await, Some(DiscoveryEvent::DiscoveryFinished));
    }

    #[test]
    fn resolve_unknown_address_is_not_found() {
        let bridge = MemoryBridge::offline();
        let known = Address::parse(OFFLINE_PRINTER_ADDRESS).unwrap();
        assert_eq!(bridge.resolve_address(&known).unwrap().display_name, "Offline Printer");

        let unknown = Address::parse("00:11:62:AA:BB:CC").unwrap();
        assert!(matches!(
            bridge.resolve_address(&unknown),
            Err(TintaError::EndpointNotFound(_))
        ));
    }
}
