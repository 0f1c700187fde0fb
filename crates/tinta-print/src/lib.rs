// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tinta Print: device registry, discovery, ESC/POS encoding, the per-job
// connection state machine with retry, and the single-slot job coordinator.
// `PrintSession` ties them together for a front end.

pub mod connection;
pub mod coordinator;
pub mod discovery;
pub mod escpos;
pub mod registry;
pub mod retry;
pub mod session;

pub use connection::{ConnectionManager, JobReport};
pub use coordinator::{JobTicket, PrintCoordinator};
pub use discovery::{Discovery, ScanHandle, ScanSummary};
pub use escpos::Encoder;
pub use registry::DeviceRegistry;
pub use session::{PrintSession, PrintTarget};
