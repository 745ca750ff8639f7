//! Per-flag pixel statistics of a flag band.
//!
//! Pixel data is read through `zarrs` (see [`crate::values`]); counting runs
//! in parallel over fixed-size slices of the decoded values.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flags::resolve_flag_band;
use crate::store::CubeStore;
use crate::values::read_flag_values;

/// Number of pixels tallied per parallel work item.
const TALLY_SLICE_LEN: usize = 64 * 1024;

/// How many pixels have one flag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCount {
    pub meaning: String,
    pub mask: i64,
    pub count: u64,
}

/// Flag statistics of one band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagStatistics {
    /// Array path of the band.
    pub variable: String,
    /// Flag coding of the band.
    pub coding: String,
    /// Number of pixels read.
    pub total: u64,
    /// Number of pixels with no flag of the coding set.
    pub unflagged: u64,
    /// Counts in descriptor order.
    pub counts: Vec<FlagCount>,
}

impl FlagStatistics {
    /// Count of the named flag.
    pub fn count(&self, meaning: &str) -> Option<u64> {
        self.counts
            .iter()
            .find(|c| c.meaning == meaning)
            .map(|c| c.count)
    }

    /// Fraction of pixels with the named flag set.
    pub fn fraction(&self, meaning: &str) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        self.count(meaning).map(|c| c as f64 / self.total as f64)
    }
}

/// Read every pixel of the flag band `variable` and count flags.
pub fn flag_statistics(store: &CubeStore, variable: &str) -> Result<FlagStatistics> {
    let band = resolve_flag_band(store, variable)?;
    let values = read_flag_values(store, &band.name)?;

    let coding = &band.coding;
    let any_flag = coding
        .flags()
        .iter()
        .fold(0u64, |acc, f| acc | f.mask.bits());

    let zero = || (vec![0u64; coding.len()], 0u64);
    let (counts, unflagged) = values
        .par_chunks(TALLY_SLICE_LEN)
        .map(|slice| {
            let unflagged = slice
                .iter()
                .filter(|&&v| (v as u64) & any_flag == 0)
                .count() as u64;
            (coding.tally(slice), unflagged)
        })
        .reduce(zero, |(mut a, ua), (b, ub)| {
            for (x, y) in a.iter_mut().zip(b) {
                *x += y;
            }
            (a, ua + ub)
        });

    tracing::info!(
        band = %band.name,
        pixels = values.len(),
        unflagged,
        "Computed flag statistics"
    );

    Ok(FlagStatistics {
        variable: band.name,
        coding: coding.name().to_string(),
        total: values.len() as u64,
        unflagged,
        counts: coding
            .flags()
            .iter()
            .zip(counts)
            .map(|(flag, count)| FlagCount {
                meaning: flag.meaning.clone(),
                mask: flag.mask.value(),
                count,
            })
            .collect(),
    })
}
