// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Tinta.

use thiserror::Error;

use crate::types::{Capability, ConnectionState};

/// Top-level error type for all Tinta operations.
#[derive(Debug, Error)]
pub enum TintaError {
    // -- Platform / adapter --
    #[error("permission denied: the \"{0}\" Bluetooth permission has not been granted")]
    PermissionDenied(Capability),

    #[error("Bluetooth adapter not available on this device")]
    AdapterUnavailable,

    #[error("Bluetooth adapter is disabled")]
    AdapterDisabled,

    #[error("feature not available on this platform")]
    PlatformUnavailable,

    // -- Addressing --
    #[error("invalid printer address: {0:?}")]
    InvalidAddress(String),

    #[error("printer not found: {0}")]
    EndpointNotFound(String),

    #[error("no printer selected")]
    NoPrinterSelected,

    // -- Transport --
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<TintaError>,
    },

    #[error("invalid connection transition from {from:?} on {event}")]
    InvalidTransition {
        from: ConnectionState,
        event: &'static str,
    },

    // -- Coordinator --
    #[error("printer is busy with another job")]
    Busy,

    #[error("print worker stopped before reporting a result")]
    WorkerLost,

    // -- Encoding --
    #[error("nothing to print: text is empty")]
    EmptyText,

    #[error("image is {width}px wide but the printer only fits {max}px")]
    ImageTooWide { width: u32, max: u32 },

    #[error("invalid pixel buffer: {0}")]
    InvalidPixelBuffer(String),

    #[error("image processing failed: {0}")]
    Image(String),

    // -- Configuration / persistence --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TintaError>;
