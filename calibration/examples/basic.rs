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

//! Basic example of calibrating activation thresholds

use calibration::prelude::*;
use ndarray::{Array1, ArrayD, IxDyn};

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Two fake activation tensors: a bell curve and a post-ReLU ramp
    let bell: Array1<f32> = Array1::linspace(-3.0, 3.0, 6001).mapv(|x: f32| x * (-0.5 * x * x).exp());
    let relu: Array1<f32> = Array1::linspace(-1.0, 5.0, 6001).mapv(|x: f32| x.max(0.0).powi(2));

    let mut dataset = CalibrationDataset::new();
    dataset.insert("conv1", bell.into_dyn())?;
    dataset.insert("relu1", relu.into_dyn())?;
    dataset.insert("dead", ArrayD::zeros(IxDyn(&[16])))?;

    // Stage by stage
    let stats = MagnitudeScanner::scan(&dataset);
    let config = CalibrationConfig::default();
    let hists = HistogramBuilder::build(&dataset, &stats, config.histogram_bin_num)?;
    let search = DivergenceSearch::new(config.quant_levels);

    for name in dataset.names() {
        let result = search.search_histogram(&hists[name]);
        println!(
            "{:>6}: max |x| = {:.4}, bin = {:?}, KL = {:.6}, threshold = {:.4}",
            name, stats[name].max_abs, result.bin, result.divergence, result.threshold
        );
    }

    // Or all at once
    let table = Calibrator::new(config)?.calibrate(&dataset, None)?;
    println!("\nThreshold table:\n{}", table.render());

    Ok(())
}
