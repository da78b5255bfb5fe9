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


use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while calibrating activation thresholds
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("invalid calibration archive {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("unsupported archive format: {0} (expected .npz or .safetensors)")]
    UnsupportedFormat(PathBuf),

    #[error("tensor {tensor} has unsupported element type {dtype}")]
    UnsupportedDtype { tensor: String, dtype: String },

    #[error("duplicate tensor name in dataset: {0}")]
    DuplicateTensor(String),

    #[error("no magnitude statistics for tensor {0}")]
    MissingStats(String),

    #[error("failed to write threshold table {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid threshold table at line {line}: {reason}")]
    InvalidTable { line: usize, reason: String },

    #[error("Invalid calibration config: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CalibrationError {
    fn from(err: serde_json::Error) -> Self {
        CalibrationError::Serialization(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for CalibrationError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        CalibrationError::ThreadPool(err.to_string())
    }
}
