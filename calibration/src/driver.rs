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

//! End-to-end calibration: scan → histogram → divergence search → table

use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::config::{CalibrationConfig, ZeroTensorPolicy};
use crate::dataset::CalibrationDataset;
use crate::divergence::DivergenceSearch;
use crate::histogram::HistogramBuilder;
use crate::scan::MagnitudeScanner;
use crate::table::ThresholdTable;
use crate::types::{Histogram, TensorStats, Threshold};
use crate::{archive, CalibrationError, Result};

/// Runs the per-tensor calibration pipeline
#[derive(Debug, Clone)]
pub struct Calibrator {
    config: CalibrationConfig,
    search: DivergenceSearch,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig) -> Result<Self> {
        config.validate()?;
        let search = DivergenceSearch::new(config.quant_levels);
        Ok(Self { config, search })
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Calibrate one dataset, optionally persisting the table
    pub fn calibrate(
        &self,
        dataset: &CalibrationDataset,
        output_path: Option<&Path>,
    ) -> Result<ThresholdTable> {
        self.calibrate_batches(std::slice::from_ref(dataset), output_path)
    }

    /// Load an archive, calibrate it and write the table
    pub fn calibrate_file(&self, blobs: &Path, output_path: &Path) -> Result<ThresholdTable> {
        let dataset = archive::load(blobs)?;
        self.calibrate(&dataset, Some(output_path))
    }

    /// Calibrate over several batches of the same tensors.
    ///
    /// Statistics are folded over every batch before any histogram is built,
    /// so each tensor's bin width reflects its global max magnitude. The table
    /// is complete in memory before the output file is opened.
    pub fn calibrate_batches(
        &self,
        batches: &[CalibrationDataset],
        output_path: Option<&Path>,
    ) -> Result<ThresholdTable> {
        let table = match self.config.num_threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()?
                .install(|| self.run(batches))?,
            None => self.run(batches)?,
        };

        if let Some(path) = output_path {
            table.write_to(path)?;
        }
        Ok(table)
    }

    fn run(&self, batches: &[CalibrationDataset]) -> Result<ThresholdTable> {
        let order = first_seen_order(batches);
        if let Some(expected) = self.config.input_num {
            if expected != order.len() {
                tracing::warn!(
                    expected,
                    found = order.len(),
                    "number of tensors differs from input_num"
                );
            }
        }

        let mut scanner = MagnitudeScanner::new();
        for batch in batches {
            scanner.observe(batch);
        }
        let stats = scanner.finish();

        let builder = HistogramBuilder::new(self.config.histogram_bin_num);
        batches
            .par_iter()
            .try_for_each(|batch| builder.observe(batch, &stats))?;
        let histograms = builder.into_histograms();

        let entries = order
            .par_iter()
            .map(|name| self.threshold_for(name, &stats, &histograms))
            .collect::<Result<Vec<_>>>()?;
        let table = ThresholdTable::from_entries(entries.into_iter().flatten().collect());

        tracing::info!(
            tensors = table.len(),
            quant_levels = self.config.quant_levels,
            bins = self.config.histogram_bin_num,
            "calibration finished"
        );
        Ok(table)
    }

    fn threshold_for(
        &self,
        name: &str,
        stats: &HashMap<String, TensorStats>,
        histograms: &HashMap<String, Histogram>,
    ) -> Result<Option<(String, Threshold)>> {
        let tensor_stats = stats
            .get(name)
            .ok_or_else(|| CalibrationError::MissingStats(name.to_string()))?;
        if tensor_stats.all_zero && self.config.zero_tensor_policy == ZeroTensorPolicy::Exclude {
            tracing::warn!(tensor = %name, "excluding all-zero tensor from threshold table");
            return Ok(None);
        }
        if tensor_stats.is_empty() {
            tracing::debug!(tensor = %name, "no data, threshold is 0");
        }

        let histogram = histograms
            .get(name)
            .ok_or_else(|| CalibrationError::MissingStats(name.to_string()))?;
        let result = self.search.search_histogram(histogram);
        tracing::debug!(
            tensor = %name,
            bin = ?result.bin,
            divergence = result.divergence,
            threshold = result.threshold,
            max_abs = tensor_stats.max_abs,
            "selected threshold"
        );

        Ok(Some((
            name.to_string(),
            Threshold::new(result.threshold, self.config.quant_levels),
        )))
    }
}

/// Tensor names in the order they first appear across batches
fn first_seen_order(batches: &[CalibrationDataset]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    batches
        .iter()
        .flat_map(|batch| batch.names())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, ArrayD, IxDyn};
    use proptest::prelude::*;

    fn config(bins: usize, levels: usize) -> CalibrationConfig {
        CalibrationConfig {
            histogram_bin_num: bins,
            quant_levels: levels,
            ..Default::default()
        }
    }

    fn dataset(entries: Vec<(&str, Vec<f32>)>) -> CalibrationDataset {
        let mut dataset = CalibrationDataset::new();
        for (name, values) in entries {
            let len = values.len();
            dataset
                .insert(name, ArrayD::from_shape_vec(IxDyn(&[len]), values).unwrap())
                .unwrap();
        }
        dataset
    }

    /// Values whose histogram over 8 bins of width 0.5 is [10, 0, 5, 0, 0, 0, 3, 1]
    fn scenario_values() -> Vec<f32> {
        let mut values = vec![0.1f32; 10];
        values.extend(vec![-1.0f32; 5]);
        values.extend(vec![3.0f32; 3]);
        values.push(3.5);
        values
    }

    #[test]
    fn test_concrete_scenario() {
        let data = dataset(vec![("conv1", scenario_values())]);
        let calibrator = Calibrator::new(config(8, 2)).unwrap();
        let table = calibrator.calibrate(&data, None).unwrap();

        let threshold = table.get("conv1").unwrap();
        assert_eq!(threshold.value, 1.75);
        assert_eq!(threshold.quant_levels, Some(2));
    }

    #[test]
    fn test_output_order_follows_input() {
        let data = dataset(vec![
            ("b", vec![1.0, 2.0, 3.0]),
            ("a", vec![0.5, -4.0]),
        ]);
        let table = Calibrator::new(config(16, 4))
            .unwrap()
            .calibrate(&data, None)
            .unwrap();
        let names: Vec<_> = table.names().collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_empty_dataset_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.txt");
        let table = Calibrator::new(CalibrationConfig::default())
            .unwrap()
            .calibrate(&CalibrationDataset::new(), Some(&path))
            .unwrap();

        assert!(table.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_degenerate_tensors_do_not_abort() {
        let mut data = dataset(vec![("dead", vec![0.0; 6]), ("live", vec![0.3, -0.9])]);
        data.insert("empty", ArrayD::zeros(IxDyn(&[0]))).unwrap();
        let table = Calibrator::new(config(64, 8))
            .unwrap()
            .calibrate(&data, None)
            .unwrap();

        assert_eq!(table.len(), 3);
        assert!((table.get("dead").unwrap().value - 1e-5).abs() < 1e-9);
        assert_eq!(table.get("empty").unwrap().value, 0.0);
        assert!(table.get("live").unwrap().value > 0.0);
    }

    #[test]
    fn test_exclude_policy_drops_all_zero_tensors() {
        let data = dataset(vec![("dead", vec![0.0; 6]), ("live", vec![0.3, -0.9])]);
        let cfg = CalibrationConfig {
            zero_tensor_policy: ZeroTensorPolicy::Exclude,
            ..config(64, 8)
        };
        let table = Calibrator::new(cfg).unwrap().calibrate(&data, None).unwrap();

        let names: Vec<_> = table.names().collect();
        assert_eq!(names, vec!["live"]);
    }

    #[test]
    fn test_batches_match_single_concatenated_dataset() {
        let values = scenario_values();
        let (head, tail) = values.split_at(7);
        let batches = vec![
            dataset(vec![("conv1", head.to_vec())]),
            dataset(vec![("conv1", tail.to_vec()), ("fc", vec![2.0])]),
        ];
        let calibrator = Calibrator::new(config(8, 2)).unwrap();

        let batched = calibrator.calibrate_batches(&batches, None).unwrap();
        let single = calibrator
            .calibrate(&dataset(vec![("conv1", values.clone()), ("fc", vec![2.0])]), None)
            .unwrap();
        assert_eq!(batched.render(), single.render());
    }

    #[test]
    fn test_dedicated_pool_is_deterministic() {
        let values: Vec<f32> = (0..5000).map(|i| ((i * 37 % 1000) as f32 - 500.0) / 97.0).collect();
        let data = dataset(vec![("x", values.clone()), ("y", values)]);

        let global = Calibrator::new(config(512, 32)).unwrap();
        let pooled = Calibrator::new(CalibrationConfig {
            num_threads: Some(2),
            ..config(512, 32)
        })
        .unwrap();

        let a = global.calibrate(&data, None).unwrap().render();
        let b = pooled.calibrate(&data, None).unwrap().render();
        let c = pooled.calibrate(&data, None).unwrap().render();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_unwritable_output_fails() {
        let data = dataset(vec![("conv1", vec![1.0])]);
        let err = Calibrator::new(config(16, 4))
            .unwrap()
            .calibrate(&data, Some(Path::new("/nonexistent/dir/thresholds.txt")))
            .unwrap_err();
        assert!(matches!(err, CalibrationError::OutputWrite { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Calibrator::new(config(8, 8)).is_err());
    }

    #[test]
    fn test_shape_does_not_matter() {
        let mut data = CalibrationDataset::new();
        data.insert("chw", array![[[0.5f32, 1.0], [-2.0, 0.0]]].into_dyn())
            .unwrap();
        let flat = dataset(vec![("chw", vec![0.5, 1.0, -2.0, 0.0])]);
        let calibrator = Calibrator::new(config(32, 4)).unwrap();

        assert_eq!(
            calibrator.calibrate(&data, None).unwrap().render(),
            calibrator.calibrate(&flat, None).unwrap().render()
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        #[test]
        fn prop_threshold_within_max_abs(values in proptest::collection::vec(-10.0f32..10.0, 1..300)) {
            let max_abs = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            prop_assume!(max_abs > 0.0);
            let data = dataset(vec![("t", values)]);
            let table = Calibrator::new(config(256, 16)).unwrap().calibrate(&data, None).unwrap();
            let threshold = table.get("t").unwrap().value;
            prop_assert!(threshold >= 0.0);
            prop_assert!(threshold <= max_abs * (1.0 + 1e-6));
        }
    }
}
