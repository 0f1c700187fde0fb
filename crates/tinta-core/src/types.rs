// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Tinta printing engine.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TintaError};

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bluetooth hardware address of a printer (`XX:XX:XX:XX:XX:XX`).
///
/// Stored upper-case so that two spellings of the same address compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address. Rejects anything that is not six
    /// colon-separated hex octets.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let parts: Vec<&str> = trimmed.split(':').collect();
        let valid = parts.len() == 6
            && parts
                .iter()
                .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(TintaError::InvalidAddress(raw.to_owned()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = TintaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = TintaError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// How an endpoint came to be known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Bonded with this device before the current session.
    Paired,
    /// Reported by an active discovery scan.
    Discovered,
    /// Typed in directly by address; not seen by pairing or discovery.
    Manual,
}

/// A printer reachable over the Bluetooth serial transport.
///
/// Identity is the address alone: two endpoints with the same address are the
/// same printer even if their display names differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: Address,
    pub display_name: String,
    pub origin: Origin,
}

impl Endpoint {
    /// Build an endpoint, falling back to the address when no name is known.
    pub fn new(address: Address, name: Option<String>, origin: Origin) -> Self {
        let display_name = name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| address.to_string());
        Self {
            address,
            display_name,
            origin,
        }
    }

    pub fn paired(address: Address, name: impl Into<String>) -> Self {
        Self::new(address, Some(name.into()), Origin::Paired)
    }

    pub fn discovered(address: Address, name: Option<String>) -> Self {
        Self::new(address, name, Origin::Discovered)
    }

    pub fn manual(address: Address) -> Self {
        Self::new(address, None, Origin::Manual)
    }

    /// Whether the display name is a real name rather than the address.
    pub fn has_name(&self) -> bool {
        self.display_name != self.address.as_str()
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_name() {
            write!(f, "{} ({})", self.display_name, self.address)
        } else {
            write!(f, "{}", self.address)
        }
    }
}

/// Platform permissions the engine relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Run a discovery scan.
    Scan,
    /// Open a serial channel to a printer.
    Connect,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => f.write_str("scan"),
            Self::Connect => f.write_str("connect"),
        }
    }
}

/// State of the local Bluetooth adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterState {
    Unavailable,
    Disabled,
    Enabled,
}

/// Event delivered by the platform while a discovery scan runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    DeviceFound(Endpoint),
    DiscoveryFinished,
}

/// An RGBA8 pixel buffer handed over by the image decoding layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA8 bytes. The length must be exactly `width * height * 4`.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(TintaError::InvalidPixelBuffer(format!(
                "image has no pixels ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(TintaError::InvalidPixelBuffer(format!(
                "expected {expected} bytes for {width}x{height} RGBA, got {}",
                rgba.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// A buffer where every pixel has the same colour.
    pub fn filled(width: u32, height: u32, pixel: [u8; 4]) -> Result<Self> {
        let rgba = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, rgba)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA components of the pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.rgba[i],
            self.rgba[i + 1],
            self.rgba[i + 2],
            self.rgba[i + 3],
        ]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rgba
    }
}

/// What a print job carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Image(PixelBuffer),
}

/// One indivisible unit of print work. Immutable once built.
#[derive(Debug, Clone)]
pub struct PrintJob {
    id: JobId,
    payload: Payload,
}

impl PrintJob {
    pub fn new(payload: Payload) -> Self {
        Self {
            id: JobId::new(),
            payload,
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(Payload::Text(body.into()))
    }

    pub fn image(pixels: PixelBuffer) -> Self {
        Self::new(Payload::Image(pixels))
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            Payload::Text(_) => "text",
            Payload::Image(_) => "image",
        }
    }
}

/// Fixed characteristics of the target printer class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrinterProfile {
    /// Print head resolution in dots per inch.
    pub dpi: u32,
    /// Printable width in millimetres.
    pub width_mm: f32,
    /// Characters per line in the default font.
    pub chars_per_line: u32,
}

impl PrinterProfile {
    /// Printable width in dots (384 for 48 mm at 203 dpi).
    pub fn printable_width_px(&self) -> u32 {
        (self.width_mm * self.dpi as f32 / 25.4).round() as u32
    }
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self {
            dpi: 203,
            width_mm: 48.0,
            chars_per_line: 32,
        }
    }
}

/// States of the per-job connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Writing,
    Closing,
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Link blip or timeout. Safe to retry automatically.
    Transient,
    /// User must act (grant permission, switch Bluetooth on).
    UserAction,
    /// Retrying cannot help, e.g. an oversized image.
    Permanent,
}

/// Terminal status of a submitted job, as surfaced to the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintStatus {
    pub ok: bool,
    pub message: String,
}

impl PrintStatus {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(err: &TintaError) -> Self {
        Self {
            ok: false,
            message: err.to_string(),
        }
    }
}
