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

//! Threshold table: the tensor-name → threshold mapping consumed by the
//! int8 inference path
//!
//! Text form is one line per tensor, `<name> [<threshold>]`, in calibration
//! order with no header or trailer.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::types::Threshold;
use crate::{CalibrationError, Result};

/// Ordered, immutable tensor-name → threshold mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    entries: Vec<(String, Threshold)>,
}

impl ThresholdTable {
    pub(crate) fn from_entries(entries: Vec<(String, Threshold)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Threshold> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, threshold)| threshold)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Threshold)> {
        self.entries.iter().map(|(name, t)| (name.as_str(), t))
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

    /// Text form of the whole table
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, threshold) in &self.entries {
            // Writing into a String cannot fail.
            let _ = writeln!(out, "{} {}", name, threshold);
        }
        out
    }

    /// Render fully in memory, then write the file in one go
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = self.render();
        std::fs::write(path, text).map_err(|source| CalibrationError::OutputWrite {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), tensors = self.len(), "wrote threshold table");
        Ok(())
    }

    /// Parse the text form. Each line must carry exactly one threshold.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let invalid = |reason: &str| CalibrationError::InvalidTable {
                line: line_no,
                reason: reason.to_string(),
            };

            let (name, values) = line
                .rsplit_once(" [")
                .ok_or_else(|| invalid("expected `<name> [<threshold>]`"))?;
            let values = values
                .trim_end()
                .strip_suffix(']')
                .ok_or_else(|| invalid("missing closing `]`"))?;
            if values.contains(',') {
                return Err(invalid("expected a single threshold value"));
            }
            let value: f32 = values
                .trim()
                .parse()
                .map_err(|_| invalid("threshold is not a number"))?;
            if name.is_empty() {
                return Err(invalid("empty tensor name"));
            }

            entries.push((
                name.to_string(),
                Threshold {
                    value,
                    quant_levels: None,
                },
            ));
        }
        Ok(Self { entries })
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
