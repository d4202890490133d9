use anyhow::{ensure, Result};
use log::{info, warn};
use std::path::Path;

use super::DEFAULT_BASE_FREQUENCY;

/// Entries per color channel; the table covers the full (0..=255)^3 cube.
pub const LUT_SIZE: usize = 256;

const LUT_VOLUME: usize = LUT_SIZE * LUT_SIZE * LUT_SIZE;

/// Precomputed color -> base frequency table, row-major over (R, G, B).
///
/// Lookup is exact integer indexing, no interpolation; the `u8` channel
/// arguments make the clamp to table bounds inherent. An unloaded table is a
/// valid state: every lookup degrades to [`DEFAULT_BASE_FREQUENCY`] so a
/// slow resource load never fails a frame.
pub struct FrequencyLut {
    table: Option<Vec<f32>>,
}

impl FrequencyLut {
    /// A table that has not finished loading; all lookups return the
    /// neutral default frequency.
    pub fn empty() -> Self {
        Self { table: None }
    }

    /// Load the table from a binary blob of `256^3` little-endian f32s.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let expected = LUT_VOLUME * std::mem::size_of::<f32>();
        ensure!(
            bytes.len() == expected,
            "frequency LUT size mismatch: expected {} bytes, got {}",
            expected,
            bytes.len()
        );

        let mut table = Vec::with_capacity(LUT_VOLUME);
        let mut repaired = 0usize;
        for chunk in bytes.chunks_exact(4) {
            let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            // Entries must be usable as positive base frequencies.
            if value.is_finite() && value > 0.0 {
                table.push(value);
            } else {
                table.push(DEFAULT_BASE_FREQUENCY);
                repaired += 1;
            }
        }

        if repaired > 0 {
            warn!("frequency LUT: replaced {} invalid entries with {} Hz", repaired, DEFAULT_BASE_FREQUENCY);
        }
        info!("frequency LUT loaded: {} entries from {:?}", table.len(), path);

        Ok(Self { table: Some(table) })
    }

    /// Build a table from an already materialized entry vector.
    pub fn from_table(table: Vec<f32>) -> Result<Self> {
        ensure!(
            table.len() == LUT_VOLUME,
            "frequency LUT must have {} entries, got {}",
            LUT_VOLUME,
            table.len()
        );
        Ok(Self { table: Some(table) })
    }

    pub fn is_loaded(&self) -> bool {
        self.table.is_some()
    }

    /// Base frequency for one quantized color.
    pub fn lookup(&self, r: u8, g: u8, b: u8) -> f32 {
        match &self.table {
            Some(table) => {
                let index = r as usize * LUT_SIZE * LUT_SIZE + g as usize * LUT_SIZE + b as usize;
                table[index]
            }
            None => DEFAULT_BASE_FREQUENCY,
        }
    }
}
