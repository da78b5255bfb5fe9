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

//! Calibration configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{CalibrationError, Result};

/// Default number of histogram bins per tensor
pub const DEFAULT_HISTOGRAM_BINS: usize = 2048;

/// Default number of quantization levels (positive half of int8)
pub const DEFAULT_QUANT_LEVELS: usize = 128;

/// What to do with a tensor whose every captured value is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZeroTensorPolicy {
    /// Substitute a small max magnitude and keep the tensor in the table
    #[default]
    Epsilon,
    /// Leave the tensor out of the threshold table
    Exclude,
}

/// Configuration for a calibration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub histogram_bin_num: usize,
    pub quant_levels: usize,
    /// Expected number of tensors. Advisory only.
    pub input_num: Option<usize>,
    pub zero_tensor_policy: ZeroTensorPolicy,
    /// Size of a dedicated worker pool; `None` uses the global rayon pool.
    pub num_threads: Option<usize>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            histogram_bin_num: DEFAULT_HISTOGRAM_BINS,
            quant_levels: DEFAULT_QUANT_LEVELS,
            input_num: None,
            zero_tensor_policy: ZeroTensorPolicy::Epsilon,
            num_threads: None,
        }
    }
}

impl CalibrationConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the search has at least one candidate threshold to evaluate
    pub fn validate(&self) -> Result<()> {
        if self.quant_levels == 0 {
            return Err(CalibrationError::InvalidConfig(
                "quant_levels must be at least 1".to_string(),
            ));
        }
        if self.histogram_bin_num <= self.quant_levels {
            return Err(CalibrationError::InvalidConfig(format!(
                "histogram_bin_num ({}) must exceed quant_levels ({})",
                self.histogram_bin_num, self.quant_levels
            )));
        }
        if self.num_threads == Some(0) {
            return Err(CalibrationError::InvalidConfig(
                "num_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
