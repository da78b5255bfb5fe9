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

//! In-memory calibration data: named activation tensors in a stable order

use ndarray::{ArrayD, ArrayViewD};
use std::collections::HashMap;

use crate::{CalibrationError, Result};

/// Ordered collection of named activation tensors ("blobs")
#[derive(Debug, Clone, Default)]
pub struct CalibrationDataset {
    entries: Vec<(String, ArrayD<f32>)>,
    index: HashMap<String, usize>,
}

impl CalibrationDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tensor. Names must be unique within a dataset.
    pub fn insert(&mut self, name: impl Into<String>, data: ArrayD<f32>) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(CalibrationError::DuplicateTensor(name));
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, data));
        Ok(())
    }

    /// Look up a tensor by name
    pub fn get(&self, name: &str) -> Option<ArrayViewD<'_, f32>> {
        self.index.get(name).map(|&i| self.entries[i].1.view())
    }

    /// Iterate `(name, data)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, ArrayViewD<'_, f32>)> {
        self.entries.iter().map(|(name, data)| (name.as_str(), data.view()))
    }

    /// Entries in insertion order, for parallel iteration
    pub fn entries(&self) -> &[(String, ArrayD<f32>)] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
