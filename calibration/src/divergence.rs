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

//! KL-divergence threshold search
//!
//! For every candidate truncation `i` in `quant_levels..bin_count` the
//! histogram is cut to its first `i` bins with the clipped tail folded into
//! the last one (reference distribution P). The unclipped first `i` bins are
//! merged into `quant_levels` groups and spread back evenly over the bins
//! that are non-zero in P (candidate distribution Q). The candidate with the
//! smallest `KL(P || Q)` wins; ties keep the earliest candidate.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_QUANT_LEVELS;
use crate::types::Histogram;

/// Divergence charged when Q has no mass where P does
pub const DISQUALIFIED: f64 = f64::INFINITY;

/// Outcome of a search over one histogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Winning truncation index, `None` when no candidate was evaluated
    pub bin: Option<usize>,
    pub divergence: f64,
    pub threshold: f32,
}

/// Stateless search parameterised by the number of quantization levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivergenceSearch {
    quant_levels: usize,
}

impl Default for DivergenceSearch {
    fn default() -> Self {
        Self::new(DEFAULT_QUANT_LEVELS)
    }
}

impl DivergenceSearch {
    pub fn new(quant_levels: usize) -> Self {
        assert!(quant_levels > 0, "quant_levels must be at least 1");
        Self { quant_levels }
    }

    pub fn quant_levels(&self) -> usize {
        self.quant_levels
    }

    /// Candidate truncation indices for a histogram of `bin_count` bins
    pub fn candidates(&self, bin_count: usize) -> std::ops::Range<usize> {
        self.quant_levels..bin_count.max(self.quant_levels)
    }

    /// Clipping threshold for `counts` binned at `bin_width`
    pub fn threshold(&self, counts: &[u64], bin_width: f32) -> f32 {
        self.search(counts, bin_width).threshold
    }

    /// Run the search on an accumulated histogram
    pub fn search_histogram(&self, hist: &Histogram) -> SearchResult {
        self.search(&hist.counts, hist.bin_width)
    }

    /// Full search, reporting the winning bin and its divergence
    pub fn search(&self, counts: &[u64], bin_width: f32) -> SearchResult {
        let range_max = bin_width * counts.len().saturating_sub(1) as f32;
        let full_range = SearchResult {
            bin: None,
            divergence: 0.0,
            threshold: range_max,
        };
        if counts.iter().all(|&c| c == 0) {
            return full_range;
        }

        let mut best: Option<(usize, f64)> = None;
        for i in self.candidates(counts.len()) {
            let divergence = self.divergence_at(counts, i);
            match best {
                Some((_, min)) if divergence >= min => {}
                _ => best = Some((i, divergence)),
            }
        }

        match best {
            Some((bin, divergence)) => SearchResult {
                bin: Some(bin),
                divergence,
                threshold: ((bin as f32 + 0.5) * bin_width).min(range_max),
            },
            None => full_range,
        }
    }

    /// `KL(P || Q)` for truncation at `i` bins
    ///
    /// # Panics
    ///
    /// If `i` is smaller than the level count or larger than the histogram.
    pub fn divergence_at(&self, counts: &[u64], i: usize) -> f64 {
        assert!(
            i >= self.quant_levels && i <= counts.len(),
            "truncation {} outside {}..={}",
            i,
            self.quant_levels,
            counts.len()
        );

        let sliced = &counts[..i];
        let mut reference: Vec<f64> = sliced.iter().map(|&c| c as f64).collect();
        let outliers: u64 = counts[i..].iter().sum();
        reference[i - 1] += outliers as f64;

        let reference_total: f64 = reference.iter().sum();
        if reference_total == 0.0 {
            return 0.0;
        }

        let candidate = self.expand_quantized(sliced, &reference);
        let candidate_total: f64 = sliced.iter().map(|&c| c as f64).sum();

        let mut divergence = 0.0f64;
        for (&p, &q) in reference.iter().zip(&candidate) {
            if p == 0.0 {
                continue;
            }
            if q == 0.0 || candidate_total == 0.0 {
                return DISQUALIFIED;
            }
            let p = p / reference_total;
            let q = q / candidate_total;
            divergence += p * (p / q).ln();
        }
        divergence
    }

    /// Merge `sliced` into level groups and spread each group's mass over
    /// the bins of that group that are non-zero in `reference`
    fn expand_quantized(&self, sliced: &[u64], reference: &[f64]) -> Vec<f64> {
        let len = sliced.len();
        let group_width = len / self.quant_levels;
        let mut expanded = vec![0.0f64; len];

        for level in 0..self.quant_levels {
            let start = level * group_width;
            let end = if level + 1 == self.quant_levels {
                len
            } else {
                start + group_width
            };

            let mass: u64 = sliced[start..end].iter().sum();
            let nonzero = reference[start..end].iter().filter(|&&p| p != 0.0).count();
            if nonzero == 0 {
                continue;
            }
            let share = mass as f64 / nonzero as f64;
            for (q, &p) in expanded[start..end].iter_mut().zip(&reference[start..end]) {
                if p != 0.0 {
                    *q = share;
                }
            }
        }
        expanded
    }
}
