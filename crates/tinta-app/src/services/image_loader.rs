// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image file decoding into the RGBA pixel buffers the encoder consumes.

use std::path::Path;

use image::DynamicImage;
use image::imageops::FilterType;
use tracing::debug;

use tinta_core::error::{Result, TintaError};
use tinta_core::types::{PixelBuffer, PrinterProfile};

/// Decode `path` (PNG, JPEG, or anything else `image` recognises).
///
/// With `fit`, images wider than the printable width are scaled down to it,
/// keeping the aspect ratio. Without it the encoder rejects them.
pub fn load_pixels(path: &Path, profile: &PrinterProfile, fit: bool) -> Result<PixelBuffer> {
    let img = image::open(path).map_err(|e| TintaError::Image(format!("{}: {e}", path.display())))?;
    to_pixels(img, profile, fit)
}

fn to_pixels(img: DynamicImage, profile: &PrinterProfile, fit: bool) -> Result<PixelBuffer> {
    let max = profile.printable_width_px();
    let img = if fit && img.width() > max {
        let height = scaled_height(img.width(), img.height(), max);
        debug!(from = img.width(), to = max, height, "scaling image to paper width");
        img.resize_exact(max, height, FilterType::Triangle)
    } else {
        img
    };

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    PixelBuffer::new(width, height, rgba.into_raw())
}

fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = (height as u64 * target_width as u64).div_ceil(width as u64);
    scaled.max(1) as u32
}
