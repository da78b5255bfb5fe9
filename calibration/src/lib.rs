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

//! Activation threshold calibration for int8 inference
//!
//! This crate computes one clipping threshold per activation tensor from
//! captured calibration data. Magnitudes are histogrammed per tensor and the
//! threshold whose clipped, re-quantized distribution loses the least
//! information (KL divergence) is selected.

#![warn(missing_docs)]
#![allow(clippy::needless_doctest_main)]

pub mod archive;
pub mod config;
pub mod dataset;
pub mod divergence;
pub mod driver;
pub mod error;
pub mod histogram;
pub mod scan;
pub mod table;
pub mod types;

pub use config::{CalibrationConfig, ZeroTensorPolicy};
pub use dataset::CalibrationDataset;
pub use divergence::{DivergenceSearch, SearchResult};
pub use driver::Calibrator;
pub use error::CalibrationError;
pub use histogram::HistogramBuilder;
pub use scan::MagnitudeScanner;
pub use table::ThresholdTable;
pub use types::{Histogram, TensorStats, Threshold};

/// Result type for calibration operations
pub type Result<T> = std::result::Result<T, CalibrationError>;

/// Re-export common types for convenience
pub mod prelude {
    pub use super::{
        archive,
        CalibrationConfig,
        CalibrationDataset,
        CalibrationError,
        Calibrator,
        DivergenceSearch,
        Histogram,
        HistogramBuilder,
        MagnitudeScanner,
        Result,
        TensorStats,
        Threshold,
        ThresholdTable,
        ZeroTensorPolicy,
    };
}
