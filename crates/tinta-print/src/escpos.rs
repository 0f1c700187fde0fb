// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ESC/POS encoder for 58 mm Bluetooth thermal printers.
//
// Turns a print job into the byte stream the printer consumes. Encoding is
// pure: no I/O, no clock, no randomness, so the same job always produces the
// same bytes. Oversized images are rejected here, before a channel is opened.
//
// Text stream:
//   [ESC @] ESC t n ESC a 0 <body, Windows-1252> LF*n [GS V 'A' 0]
//
// Image stream:
//   [ESC @] ESC t n ESC a 0 ESC a 1 (GS v 0 0 xL xH yL yH <rows>)* ESC a 0 LF
//   LF*n [GS V 'A' 0]

use encoding_rs::WINDOWS_1252;
use tracing::debug;

use tinta_core::config::EncoderOptions;
use tinta_core::error::{Result, TintaError};
use tinta_core::types::{Payload, PixelBuffer, PrinterProfile};

// -- Command bytes --

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;
pub const LF: u8 = 0x0A;

/// `ESC @`: reset the printer to power-on defaults.
pub const INIT: [u8; 2] = [ESC, b'@'];

/// `GS V 'A' 0`: feed to the cutter and perform a full cut.
pub const CUT: [u8; 4] = [GS, b'V', b'A', 0x00];

/// Text that cannot be shown in the printer's code page.
const REPLACEMENT: u8 = b'?';

/// Fewest line feeds after a body: one ends the last text line, two more
/// leave the blank lines the text needs to clear the tear bar.
const MIN_FEED_LINES: u8 = 3;

/// Header bytes of one `GS v 0` raster band.
pub const BAND_HEADER_LEN: usize = 8;

/// `ESC a n`: justification (0 = left, 1 = centre).
fn align(n: u8) -> [u8; 3] {
    [ESC, b'a', n]
}

/// `ESC t n`: select character code table.
fn code_table(n: u8) -> [u8; 3] {
    [ESC, b't', n]
}

/// Deterministic job encoder bound to one printer profile.
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    profile: PrinterProfile,
    options: EncoderOptions,
}

impl Encoder {
    pub fn new(profile: PrinterProfile, options: EncoderOptions) -> Self {
        Self { profile, options }
    }

    /// Encode any payload.
    pub fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        match payload {
            Payload::Text(body) => Ok(self.encode_text(body)),
            Payload::Image(pixels) => self.encode_image(pixels),
        }
    }

    /// Bytes sent before any job body: optional reset, code page, left
    /// alignment.
    pub fn header(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        if self.options.reset_on_start {
            out.extend_from_slice(&INIT);
        }
        out.extend_from_slice(&code_table(self.options.code_table));
        out.extend_from_slice(&align(0));
        out
    }

    /// Bytes sent after any job body: blank feed lines, then the cut.
    pub fn trailer(&self) -> Vec<u8> {
        let lines = self.options.feed_lines.max(MIN_FEED_LINES) as usize;
        let mut out = vec![LF; lines];
        if self.options.cut {
            out.extend_from_slice(&CUT);
        }
        out
    }

    /// Left-aligned text in Windows-1252. Characters outside the code page
    /// print as `?`; stray control characters are dropped to `?` too so a
    /// body can never smuggle in printer commands.
    pub fn encode_text(&self, body: &str) -> Vec<u8> {
        let body = body.replace("\r\n", "\n");
        let body = if self.options.wrap_text {
            wrap_lines(&body, self.profile.chars_per_line as usize)
        } else {
            body
        };

        let mut out = self.header();
        out.reserve(body.len() + 8);
        push_cp1252(&mut out, &body);
        out.extend_from_slice(&self.trailer());
        out
    }

    /// Centred 1-bit raster. Fails with `ImageTooWide` when the image is
    /// wider than the printable width.
    pub fn encode_image(&self, pixels: &PixelBuffer) -> Result<Vec<u8>> {
        let max = self.profile.printable_width_px();
        if pixels.width() > max {
            return Err(TintaError::ImageTooWide {
                width: pixels.width(),
                max,
            });
        }

        let row_bytes = row_bytes(pixels.width());
        let raster = rasterize(pixels, self.options.threshold);
        let band_rows = self.options.band_height.max(1) as usize;
        let bands = (pixels.height() as usize).div_ceil(band_rows);

        let mut out = self.header();
        out.reserve(raster.len() + bands * BAND_HEADER_LEN + 16);
        out.extend_from_slice(&align(1));

        for band in raster.chunks(band_rows * row_bytes) {
            let rows = band.len() / row_bytes;
            out.extend_from_slice(&[
                GS,
                b'v',
                b'0',
                0x00,
                (row_bytes & 0xFF) as u8,
                (row_bytes >> 8) as u8,
                (rows & 0xFF) as u8,
                (rows >> 8) as u8,
            ]);
            out.extend_from_slice(band);
        }

        out.extend_from_slice(&align(0));
        out.push(LF);
        out.extend_from_slice(&self.trailer());

        debug!(
            width = pixels.width(),
            height = pixels.height(),
            bands,
            bytes = out.len(),
            "encoded image"
        );
        Ok(out)
    }
}

/// Bytes per raster row for a given pixel width.
pub fn row_bytes(width: u32) -> usize {
    (width as usize).div_ceil(8)
}

/// Pack the buffer into 1-bit rows, MSB = leftmost pixel, 1 = ink. Each row
/// is padded with no-ink bits to a whole byte.
pub fn rasterize(pixels: &PixelBuffer, threshold: u8) -> Vec<u8> {
    let width = pixels.width();
    let stride = row_bytes(width);
    let mut raster = vec![0u8; stride * pixels.height() as usize];

    for y in 0..pixels.height() {
        let row = &mut raster[y as usize * stride..(y as usize + 1) * stride];
        for x in 0..width {
            if is_ink(pixels.pixel(x, y), threshold) {
                row[x as usize / 8] |= 0x80 >> (x % 8);
            }
        }
    }
    raster
}

/// Luma of the pixel composited over white paper, compared to `threshold`.
fn is_ink([r, g, b, a]: [u8; 4], threshold: u8) -> bool {
    let over_white = |c: u8| (c as u32 * a as u32 + 255 * (255 - a as u32)) / 255;
    let luma = (299 * over_white(r) + 587 * over_white(g) + 114 * over_white(b)) / 1000;
    luma < threshold as u32
}

fn push_cp1252(out: &mut Vec<u8>, body: &str) {
    let mut buf = [0u8; 4];
    for c in body.chars() {
        if c.is_control() && c != '\n' && c != '\t' {
            out.push(REPLACEMENT);
            continue;
        }
        if c.is_ascii() {
            out.push(c as u8);
            continue;
        }
        let (bytes, _, unmappable) = WINDOWS_1252.encode(c.encode_utf8(&mut buf));
        if unmappable {
            out.push(REPLACEMENT);
        } else {
            out.extend_from_slice(&bytes);
        }
    }
}

/// Hard-wrap every line at `width` characters.
fn wrap_lines(body: &str, width: usize) -> String {
    if width == 0 {
        return body.to_owned();
    }
    let mut out = String::with_capacity(body.len() + body.len() / width.max(1));
    for (i, line) in body.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for (j, c) in line.chars().enumerate() {
            if j > 0 && j % width == 0 {
                out.push('\n');
            }
            out.push(c);
        }
    }
    out
}
