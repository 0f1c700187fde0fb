// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for the Bluetooth collaborator.
//
// The engine never talks to the operating system directly. Adapter state,
// the pairing list, permissions, discovery, and serial channels all come in
// through these traits so the same engine runs against a phone, a Linux box
// with RFCOMM, or an in-memory printer.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use tinta_core::error::Result;
use tinta_core::types::{Address, AdapterState, Capability, DiscoveryEvent, Endpoint};

/// Unified bridge that groups everything the engine consumes.
pub trait PlatformBridge: BluetoothAdapter + PermissionGate + SerialTransport + Send + Sync {
    /// Human-readable platform name (e.g. "Linux RFCOMM", "Offline").
    fn platform_name(&self) -> &str;
}

/// The local Bluetooth adapter.
pub trait BluetoothAdapter {
    /// Whether the adapter exists and is switched on.
    fn adapter_state(&self) -> AdapterState;

    /// Printers already bonded with this device.
    fn list_paired_endpoints(&self) -> Result<Vec<Endpoint>>;

    /// Resolve an address to an endpoint the transport can open.
    /// Returns `EndpointNotFound` when the platform has never heard of it.
    fn resolve_address(&self, address: &Address) -> Result<Endpoint>;

    /// Begin a discovery scan. Results arrive on `events` from whichever
    /// thread the platform uses, ending with `DiscoveryFinished`.
    fn start_discovery(&self, events: UnboundedSender<DiscoveryEvent>) -> Result<()>;

    /// Stop a running scan. A no-op when nothing is running.
    fn cancel_discovery(&self) -> Result<()>;

    /// Whether a scan is currently running.
    fn is_discovering(&self) -> bool;
}

/// Runtime permission checks.
pub trait PermissionGate {
    /// Whether the capability has been granted.
    fn permission_granted(&self, capability: Capability) -> bool;

    /// Ask the user for the given capabilities. Returns once the platform
    /// has answered; check `permission_granted` afterwards.
    fn request_permissions(&self, capabilities: &[Capability]) -> Result<()>;
}

/// Opens exclusive byte-stream channels to printers.
#[async_trait]
pub trait SerialTransport {
    /// Open a channel to the endpoint.
    async fn open_channel(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>>;
}

/// An open serial channel to one printer, owned by one job.
#[async_trait]
pub trait Channel: Send {
    /// Write `bytes`, returning how many the transport accepted. A count
    /// lower than `bytes.len()` is a short write.
    async fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Flush and release the channel.
    async fn close(&mut self) -> Result<()>;
}
