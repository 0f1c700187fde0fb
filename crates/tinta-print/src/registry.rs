// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device registry: the known printers, in the order they were found.
//
// Entries are unique by address. Paired printers are seeded first, then
// discovery appends as devices report in. The registry is mutated from the
// discovery task while the front end reads snapshots, so the list sits
// behind a lock and every accessor copies out.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use tinta_core::error::Result;
use tinta_core::types::{Address, Endpoint};

/// Insertion-ordered set of endpoints keyed by address.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    endpoints: RwLock<Vec<Endpoint>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Endpoint>> {
        self.endpoints.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Endpoint>> {
        self.endpoints.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget every entry.
    pub fn reset(&self) {
        self.write().clear();
    }

    /// Add paired printers, skipping addresses already present. Returns how
    /// many were added.
    pub fn seed_paired(&self, paired: impl IntoIterator<Item = Endpoint>) -> usize {
        let mut endpoints = self.write();
        let mut added = 0;
        for endpoint in paired {
            if !endpoints.contains(&endpoint) {
                endpoints.push(endpoint);
                added += 1;
            }
        }
        added
    }

    /// Append a discovered printer. Returns `false` when the address is
    /// already known, so callers can skip refreshing their display.
    pub fn add_discovered(&self, endpoint: Endpoint) -> bool {
        let mut endpoints = self.write();
        if endpoints.contains(&endpoint) {
            return false;
        }
        debug!(address = %endpoint.address, name = %endpoint.display_name, "registry: new device");
        endpoints.push(endpoint);
        true
    }

    /// Copy of the current entries, in insertion order.
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.read().clone()
    }

    pub fn get(&self, address: &Address) -> Option<Endpoint> {
        self.read().iter().find(|ep| &ep.address == address).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Resolve a typed address to something the connection manager can
    /// open. A known address returns its entry; an unknown but well-formed
    /// one yields a fresh `Manual` endpoint. Never touches the platform.
    pub fn select(&self, address: &str) -> Result<Endpoint> {
        let address = Address::parse(address)?;
        Ok(self
            .get(&address)
            .unwrap_or_else(|| Endpoint::manual(address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinta_core::error::TintaError;
    use tinta_core::types::Origin;

    fn ep(addr: &str, name: &str) -> Endpoint {
        Endpoint::paired(Address::parse(addr).unwrap(), name)
    }

    fn found(addr: &str) -> Endpoint {
        Endpoint::discovered(Address::parse(addr).unwrap(), None)
    }

    #[test]
    fn add_discovered_dedupes_by_address() {
        let registry = DeviceRegistry::new();
        assert!(registry.add_discovered(found("00:11:62:AA:00:01")));
        assert!(!registry.add_discovered(found("00:11:62:AA:00:01")));
        assert!(!registry.add_discovered(found("00:11:62:aa:00:01")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reset_then_seed_preserves_order() {
        let registry = DeviceRegistry::new();
        registry.add_discovered(found("00:11:62:00:00:09"));

        let paired = vec![
            ep("00:11:62:00:00:03", "C"),
            ep("00:11:62:00:00:01", "A"),
            ep("00:11:62:00:00:02", "B"),
        ];
        registry.reset();
        assert_eq!(registry.seed_paired(paired.clone()), 3);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot, paired);
        let names: Vec<_> = snapshot.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, ["C", "A", "B"]);
    }

    #[test]
    fn seed_skips_duplicates() {
        let registry = DeviceRegistry::new();
        let added = registry.seed_paired(vec![
            ep("00:11:62:00:00:01", "A"),
            ep("00:11:62:00:00:01", "A again"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(registry.snapshot()[0].display_name, "A");
    }

    #[test]
    fn discovered_after_paired_keeps_paired_entry() {
        let registry = DeviceRegistry::new();
        registry.seed_paired(vec![ep("00:11:62:00:00:01", "Kitchen")]);
        assert!(!registry.add_discovered(found("00:11:62:00:00:01")));
        assert_eq!(registry.snapshot()[0].origin, Origin::Paired);
    }

    #[test]
    fn select_known_address_returns_entry() {
        let registry = DeviceRegistry::new();
        registry.seed_paired(vec![ep("00:11:62:00:00:01", "Kitchen")]);
        let selected = registry.select("00:11:62:00:00:01").unwrap();
        assert_eq!(selected.display_name, "Kitchen");
    }

    #[test]
    fn select_unknown_address_synthesizes_manual_endpoint() {
        let registry = DeviceRegistry::new();
        let selected = registry.select("00:11:62:aa:bb:cc").unwrap();
        assert_eq!(selected.origin, Origin::Manual);
        assert_eq!(selected.display_name, "00:11:62:AA:BB:CC");
        assert!(registry.is_empty());
    }

    #[test]
    fn select_rejects_malformed_address() {
        let registry = DeviceRegistry::new();
        assert!(matches!(
            registry.select("printer-1"),
            Err(TintaError::InvalidAddress(_))
        ));
    }
}
