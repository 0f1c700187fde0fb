// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub bridge for builds where no Bluetooth stack is available.
//
// The adapter reports `Unavailable` and every operation fails with
// `AdapterUnavailable`.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use tinta_core::error::{Result, TintaError};
use tinta_core::types::{Address, AdapterState, Capability, DiscoveryEvent, Endpoint};

use crate::traits::*;

/// No-op bridge returned on platforms without Bluetooth support.
pub struct StubBridge;

impl PlatformBridge for StubBridge {
    fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }
}

impl BluetoothAdapter for StubBridge {
    fn adapter_state(&self) -> AdapterState {
        AdapterState::Unavailable
    }

    fn list_paired_endpoints(&self) -> Result<Vec<Endpoint>> {
        tracing::warn!("BluetoothAdapter::list_paired_endpoints called on stub bridge");
        Err(TintaError::AdapterUnavailable)
    }

    fn resolve_address(&self, _address: &Address) -> Result<Endpoint> {
        Err(TintaError::AdapterUnavailable)
    }

    fn start_discovery(&self, _events: UnboundedSender<DiscoveryEvent>) -> Result<()> {
        tracing::warn!("BluetoothAdapter::start_discovery called on stub bridge");
        Err(TintaError::AdapterUnavailable)
    }

    fn cancel_discovery(&self) -> Result<()> {
        Ok(())
    }

    fn is_discovering(&self) -> bool {
        false
    }
}

impl PermissionGate for StubBridge {
    fn permission_granted(&self, _capability: Capability) -> bool {
        false
    }

    fn request_permissions(&self, _capabilities: &[Capability]) -> Result<()> {
        Err(TintaError::PlatformUnavailable)
    }
}

#[async_trait]
impl SerialTransport for StubBridge {
    async fn open_channel(&self, _endpoint: &Endpoint) -> Result<Box<dyn Channel>> {
        tracing::warn!("SerialTransport::open_channel called on stub bridge");
        Err(TintaError::AdapterUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_no_adapter() {
        let bridge = StubBridge;
        assert_eq!(bridge.adapter_state(), AdapterState::Unavailable);
        assert!(!bridge.permission_granted(Capability::Connect));
        assert!(matches!(
            bridge.list_paired_endpoints(),
            Err(TintaError::AdapterUnavailable)
        ));
    }

    #[tokio::test]
    async fn open_fails_without_adapter() {
        let endpoint = Endpoint::manual(Address::parse("00:11:62:AA:BB:CC").unwrap());
        assert!(matches!(
            StubBridge.open_channel(&endpoint).await,
            Err(TintaError::AdapterUnavailable)
        ));
    }
}
