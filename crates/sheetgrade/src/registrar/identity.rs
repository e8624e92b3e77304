//! Identifier code strip encoding and decoding.
//!
//! Each generated sheet carries a 32-cell binary strip along its top edge:
//! `[layout fingerprint: 8][sheet code: 16][checksum: 8]`, most significant
//! bit first. The fingerprint covers the layout revision and the
//! item/choice counts (see [`crate::layout::SheetLayout::fingerprint`]);
//! the checksum is an XOR fold with a fixed mask, which also rejects an
//! all-empty (or all-filled) strip. Cells are read by measuring fill
//! through the fitted transform, so the strip needs no detection pass of
//! its own.

use image::GrayImage;

use crate::layout::{SheetLayout, CODE_CELLS};
use crate::registrar::transform::SheetTransform;
use crate::sampling::region_fill_score;

const CHECKSUM_MASK: u8 = 0xA5;

/// Configuration for code strip reading.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Fill fraction above which a cell reads as a set bit.
    /// Default: [`IdentityConfig::DEFAULT_BIT_FILL_THRESHOLD`].
    pub bit_fill_threshold: f32,
    /// Sample grid side per cell.
    /// Default: [`IdentityConfig::DEFAULT_SAMPLES_PER_CELL`].
    pub samples_per_cell: usize,
}

impl IdentityConfig {
    pub const DEFAULT_BIT_FILL_THRESHOLD: f32 = 0.5;
    pub const DEFAULT_SAMPLES_PER_CELL: usize = 5;
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            bit_fill_threshold: Self::DEFAULT_BIT_FILL_THRESHOLD,
            samples_per_cell: Self::DEFAULT_SAMPLES_PER_CELL,
        }
    }
}

/// A successfully decoded code strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DecodedIdentity {
    /// Fingerprint of the layout the sheet was generated with.
    pub fingerprint: u8,
    /// Sheet code assigned at generation time.
    pub code: u16,
}

/// Checksum byte over the fingerprint and code fields.
pub fn checksum(fingerprint: u8, code: u16) -> u8 {
    fingerprint ^ (code >> 8) as u8 ^ (code & 0xFF) as u8 ^ CHECKSUM_MASK
}

/// Pack fingerprint, code, and checksum into the strip word (MSB = cell 0).
pub fn encode_word(fingerprint: u8, code: u16) -> u32 {
    ((fingerprint as u32) << 24) | ((code as u32) << 8) | checksum(fingerprint, code) as u32
}

/// Bits of the strip word in cell order.
pub fn word_bits(word: u32) -> [bool; CODE_CELLS] {
    let mut bits = [false; CODE_CELLS];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (word >> (CODE_CELLS - 1 - i)) & 1 == 1;
    }
    bits
}

/// Read and verify the code strip.
///
/// Returns `None` when the checksum fails — an unreadable strip is not a
/// registration error; the manual-identifier path covers it downstream.
pub fn read_identity(
    binary: &GrayImage,
    transform: &SheetTransform,
    layout: &SheetLayout,
    config: &IdentityConfig,
) -> Option<DecodedIdentity> {
    let mut word: u32 = 0;
    for i in 0..CODE_CELLS {
        let region = layout.code_cell_region(i);
        let fill = region_fill_score(binary, transform, &region, config.samples_per_cell);
        word <<= 1;
        if fill >= config.bit_fill_threshold {
            word |= 1;
        }
    }

    let fingerprint = (word >> 24) as u8;
    let code = (word >> 8) as u16;
    let check = (word & 0xFF) as u8;
    if check != checksum(fingerprint, code) {
        return None;
    }
    Some(DecodedIdentity { fingerprint, code })
}
