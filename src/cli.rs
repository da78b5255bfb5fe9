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

//! Command-line interface for threshold calibration

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use calibration::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "kld-calib")]
#[command(author = "The Zeta Reticula Authors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compute int8 activation thresholds by KL-divergence calibration")]
#[command(long_about = None)]
pub struct Cli {
    /// Calibration blobs (.npz or .safetensors)
    #[arg(long = "blobs_file", value_name = "PATH")]
    pub blobs_file: PathBuf,

    /// Destination threshold table
    #[arg(long = "output_file", value_name = "PATH")]
    pub output_file: PathBuf,

    /// JSON calibration config; flags below override it
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Histogram bins per tensor [default: 2048]
    #[arg(long = "histogram_bin_num")]
    pub histogram_bin_num: Option<usize>,

    /// Quantization levels the threshold is searched for [default: 128]
    #[arg(long = "quant_levels")]
    pub quant_levels: Option<usize>,

    /// Expected number of tensors (advisory)
    #[arg(long = "input_num")]
    pub input_num: Option<usize>,

    /// Leave all-zero tensors out of the table instead of using 1e-5
    #[arg(long = "exclude_zero")]
    pub exclude_zero: bool,

    /// Worker threads [default: all cores]
    #[arg(long)]
    pub threads: Option<usize>,
}

impl Cli {
    /// Defaults, then the config file, then explicit flags
    pub fn calibration_config(&self) -> anyhow::Result<CalibrationConfig> {
        let mut config = match &self.config {
            Some(path) => CalibrationConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => CalibrationConfig::default(),
        };

        if let Some(bins) = self.histogram_bin_num {
            config.histogram_bin_num = bins;
        }
        if let Some(levels) = self.quant_levels {
            config.quant_levels = levels;
        }
        if self.input_num.is_some() {
            config.input_num = self.input_num;
        }
        if self.exclude_zero {
            config.zero_tensor_policy = ZeroTensorPolicy::Exclude;
        }
        if self.threads.is_some() {
            config.num_threads = self.threads;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Load blobs, calibrate, write the table
pub fn run(cli: &Cli) -> anyhow::Result<ThresholdTable> {
    let config = cli.calibration_config()?;
    let start = Instant::now();

    let dataset = archive::load(&cli.blobs_file)
        .with_context(|| format!("failed to load blobs file {}", cli.blobs_file.display()))?;
    let table = Calibrator::new(config)?
        .calibrate(&dataset, Some(&cli.output_file))
        .with_context(|| format!("failed to calibrate into {}", cli.output_file.display()))?;

    tracing::info!(
        tensors = table.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        output = %cli.output_file.display(),
        "done"
    );
    Ok(table)
}
