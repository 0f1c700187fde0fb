// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tinta: platform Bluetooth bridges.
//
// The print engine reaches the adapter, the permission system, and serial
// channels only through the traits in `traits`. Each platform supplies one
// implementation; `MemoryBridge` stands in for a real printer in offline mode
// and in tests.

pub mod memory;
pub mod stub;
pub mod traits;

#[cfg(unix)]
pub mod rfcomm;

use std::sync::Arc;

use tinta_core::config::AppConfig;

pub use memory::{Fault, MemoryBridge};
pub use traits::{BluetoothAdapter, Channel, PermissionGate, PlatformBridge, SerialTransport};

/// The bridge for the platform this binary was built for.
pub fn platform_bridge(config: &AppConfig) -> Arc<dyn PlatformBridge> {
    #[cfg(unix)]
    {
        Arc::new(rfcomm::RfcommBridge::new(&config.devices))
    }
    #[cfg(not(unix))]
    {
        let _ = config;
        Arc::new(stub::StubBridge)
    }
}
