//! # Zeta Reticula Apache 2.0 License
//! Copyright (c) 2025-present The Zeta Reticula Authors.
//! Licensed under the Apache License, Version 2.0 (the "License");
//! you may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!     http://www.apache.org/licenses/LICENSE-2.0
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! Magnitude histograms with additive, lock-protected accumulation
//!
//! Each tensor owns one fixed-length count array whose bin width is set from
//! that tensor's max magnitude when the array is first created. Later batches
//! only add to it. Exact zeros are never binned.

use dashmap::DashMap;
use ndarray::ArrayViewD;
use rayon::prelude::*;
use std::collections::HashMap;

use crate::dataset::CalibrationDataset;
use crate::types::{Histogram, TensorStats};
use crate::{CalibrationError, Result};

/// Bin width for a tensor with the given max magnitude
pub fn bin_width(max_abs: f32, bin_count: usize) -> f32 {
    max_abs / (bin_count - 1) as f32
}

/// Bin the non-zero magnitudes of `data`, rounding to the nearest bin
pub fn bin_magnitudes(data: &ArrayViewD<f32>, bin_width: f32, bin_count: usize) -> Vec<u64> {
    let mut counts = vec![0u64; bin_count];
    if bin_width <= 0.0 {
        return counts;
    }
    let last = (bin_count - 1) as f32;
    for &x in data.iter() {
        let magnitude = x.abs();
        if magnitude == 0.0 || magnitude.is_nan() {
            continue;
        }
        let bin = (magnitude / bin_width + 0.5).floor().clamp(0.0, last);
        counts[bin as usize] += 1;
    }
    counts
}

/// Accumulates per-tensor histograms, possibly from concurrent batches
#[derive(Debug)]
pub struct HistogramBuilder {
    bin_count: usize,
    histograms: DashMap<String, Histogram>,
}

impl HistogramBuilder {
    pub fn new(bin_count: usize) -> Self {
        Self {
            bin_count,
            histograms: DashMap::new(),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Build histograms for a single dataset
    pub fn build(
        dataset: &CalibrationDataset,
        stats: &HashMap<String, TensorStats>,
        bin_count: usize,
    ) -> Result<HashMap<String, Histogram>> {
        let builder = Self::new(bin_count);
        builder.observe(dataset, stats)?;
        Ok(builder.into_histograms())
    }

    /// Accumulate one tensor's data
    pub fn accumulate(&self, name: &str, data: &ArrayViewD<f32>, stats: &TensorStats) {
        let width = match self.histograms.get(name) {
            Some(existing) => existing.bin_width,
            None => bin_width(stats.max_abs, self.bin_count),
        };
        // Count outside the shard lock; only the merge is serialized.
        let counts = bin_magnitudes(data, width, self.bin_count);

        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(self.bin_count, width))
            .merge(&counts);
    }

    /// Accumulate every tensor of a batch, one task per tensor
    pub fn observe(
        &self,
        dataset: &CalibrationDataset,
        stats: &HashMap<String, TensorStats>,
    ) -> Result<()> {
        dataset
            .entries()
            .par_iter()
            .try_for_each(|(name, data)| {
                let tensor_stats = stats
                    .get(name)
                    .ok_or_else(|| CalibrationError::MissingStats(name.clone()))?;
                self.accumulate(name, &data.view(), tensor_stats);
                Ok(())
            })
    }

    /// Snapshot of one tensor's histogram
    pub fn get(&self, name: &str) -> Option<Histogram> {
        self.histograms.get(name).map(|h| h.value().clone())
    }

    pub fn into_histograms(self) -> HashMap<String, Histogram> {
        self.histograms.into_iter().collect()
    }
}
