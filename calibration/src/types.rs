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

use serde::{Deserialize, Serialize};
use std::fmt;

/// Max magnitude substituted for a tensor whose values are all zero
pub const ZERO_TENSOR_EPSILON: f32 = 1e-5;

/// Magnitude statistics for one tensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensorStats {
    /// Largest absolute value seen, or the epsilon for an all-zero tensor
    pub max_abs: f32,
    /// Smallest signed value seen; never above zero
    pub min: f32,
    pub element_count: usize,
    /// Set when the tensor had elements and every one of them was zero
    pub all_zero: bool,
}

impl Default for TensorStats {
    fn default() -> Self {
        Self {
            max_abs: 0.0,
            min: 0.0,
            element_count: 0,
            all_zero: false,
        }
    }
}

impl TensorStats {
    /// True when no element was ever observed for this tensor
    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }
}

/// Fixed-width histogram of non-zero absolute magnitudes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub counts: Vec<u64>,
    /// Zero when the tensor had no elements
    pub bin_width: f32,
}

impl Histogram {
    /// Create an all-zero histogram
    pub fn new(bin_count: usize, bin_width: f32) -> Self {
        Self {
            counts: vec![0; bin_count],
            bin_width,
        }
    }

    /// Number of bins
    pub fn bin_count(&self) -> usize {
        self.counts.len()
    }

    /// Total number of samples binned so far
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// True when nothing has been binned
    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    /// Add another batch's counts into this histogram
    pub fn merge(&mut self, counts: &[u64]) {
        debug_assert_eq!(counts.len(), self.counts.len());
        for (acc, &c) in self.counts.iter_mut().zip(counts) {
            *acc += c;
        }
    }

    /// Upper edge of the histogram range, i.e. the tensor's max magnitude
    pub fn range_max(&self) -> f32 {
        self.bin_width * self.counts.len().saturating_sub(1) as f32
    }
}

/// Calibrated clipping magnitude for one tensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f32,
    /// Level count the search ran with; unknown for tables read from disk
    pub quant_levels: Option<usize>,
}

impl Threshold {
    pub fn new(value: f32, quant_levels: usize) -> Self {
        Self {
            value,
            quant_levels: Some(quant_levels),
        }
    }

    /// Scale that maps the clipped range onto the quantization levels
    pub fn scale(&self) -> Option<f32> {
        let levels = self.quant_levels?;
        if self.value > 0.0 {
            Some(self.value / levels.saturating_sub(1).max(1) as f32)
        } else {
            None
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.value)
    }
}
