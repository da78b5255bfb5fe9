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

//! Per-tensor magnitude scan: max |x|, signed min, all-zero detection

use ndarray::ArrayViewD;
use rayon::prelude::*;
use std::collections::HashMap;

use crate::dataset::CalibrationDataset;
use crate::types::{TensorStats, ZERO_TENSOR_EPSILON};

/// Folds magnitude statistics over one or more calibration batches
#[derive(Debug, Default)]
pub struct MagnitudeScanner {
    stats: HashMap<String, TensorStats>,
}

/// Raw extrema of a single array, before the zero-tensor substitution
fn extrema(data: &ArrayViewD<f32>) -> (f32, f32) {
    data.iter().fold((0.0f32, 0.0f32), |(max_abs, min), &x| {
        (max_abs.max(x.abs()), min.min(x))
    })
}

impl MagnitudeScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a single dataset
    pub fn scan(dataset: &CalibrationDataset) -> HashMap<String, TensorStats> {
        let mut scanner = Self::new();
        scanner.observe(dataset);
        scanner.finish()
    }

    /// Fold another batch into the running statistics
    pub fn observe(&mut self, dataset: &CalibrationDataset) {
        let batch: Vec<(&str, usize, f32, f32)> = dataset
            .entries()
            .par_iter()
            .map(|(name, data)| {
                let (max_abs, min) = extrema(&data.view());
                (name.as_str(), data.len(), max_abs, min)
            })
            .collect();

        for (name, len, max_abs, min) in batch {
            let entry = self.stats.entry(name.to_string()).or_default();
            entry.max_abs = entry.max_abs.max(max_abs);
            entry.min = entry.min.min(min);
            entry.element_count += len;
        }
    }

    /// Finalize, flagging tensors that had data but no non-zero value
    pub fn finish(self) -> HashMap<String, TensorStats> {
        self.stats
            .into_iter()
            .map(|(name, mut stats)| {
                if !stats.is_empty() && stats.max_abs == 0.0 {
                    tracing::warn!(
                        tensor = %name,
                        "tensor is all zeros, check the input data; using max magnitude {}",
                        ZERO_TENSOR_EPSILON
                    );
                    stats.max_abs = ZERO_TENSOR_EPSILON;
                    stats.all_zero = true;
                }
                (name, stats)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, ArrayD, IxDyn};

    fn dataset(entries: Vec<(&str, ArrayD<f32>)>) -> CalibrationDataset {
        let mut dataset = CalibrationDataset::new();
        for (name, data) in entries {
            dataset.insert(name, data).unwrap();
        }
        dataset
    }

    #[test]
    fn test_scan_records_max_abs_and_min() {
        let data = dataset(vec![("conv1", array![[-3.0, 1.0], [2.0, 0.5]].into_dyn())]);
        let stats = MagnitudeScanner::scan(&data);

        let conv1 = stats["conv1"];
        assert_eq!(conv1.max_abs, 3.0);
        assert_eq!(conv1.min, -3.0);
        assert_eq!(conv1.element_count, 4);
        assert!(!conv1.all_zero);
    }

    #[test]
    fn test_min_never_exceeds_zero_baseline() {
        let data = dataset(vec![("relu", array![0.5, 1.5, 2.5].into_dyn())]);
        let stats = MagnitudeScanner::scan(&data);
        assert_eq!(stats["relu"].min, 0.0);
        assert_eq!(stats["relu"].max_abs, 2.5);
    }

    #[test]
    fn test_all_zero_tensor_gets_epsilon() {
        let data = dataset(vec![("dead", ArrayD::zeros(IxDyn(&[2, 3])))]);
        let stats = MagnitudeScanner::scan(&data);

        assert!(stats["dead"].all_zero);
        assert_eq!(stats["dead"].max_abs, ZERO_TENSOR_EPSILON);
    }

    #[test]
    fn test_empty_tensor_stays_at_baseline() {
        let data = dataset(vec![("empty", ArrayD::zeros(IxDyn(&[0])))]);
        let stats = MagnitudeScanner::scan(&data);

        assert!(stats["empty"].is_empty());
        assert!(!stats["empty"].all_zero);
        assert_eq!(stats["empty"].max_abs, 0.0);
    }

    #[test]
    fn test_observe_folds_batches() {
        let mut scanner = MagnitudeScanner::new();
        scanner.observe(&dataset(vec![("fc", array![0.0, -1.0].into_dyn())]));
        scanner.observe(&dataset(vec![("fc", array![4.0, 0.0].into_dyn())]));
        let stats = scanner.finish();

        assert_eq!(stats["fc"].max_abs, 4.0);
        assert_eq!(stats["fc"].min, -1.0);
        assert_eq!(stats["fc"].element_count, 4);
    }

    #[test]
    fn test_zero_batch_then_data_is_not_degenerate() {
        let mut scanner = MagnitudeScanner::new();
        scanner.observe(&dataset(vec![("fc", ArrayD::zeros(IxDyn(&[3])))]));
        scanner.observe(&dataset(vec![("fc", array![0.25].into_dyn())]));
        let stats = scanner.finish();

        assert!(!stats["fc"].all_zero);
        assert_eq!(stats["fc"].max_abs, 0.25);
    }
}
