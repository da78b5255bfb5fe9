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

//! Loading captured activation blobs from named-array containers
//!
//! Two containers are understood:
//! - `.npz` NumPy archives, iterated in archive order
//! - `.safetensors` files, iterated in on-disk data order

use half::{bf16, f16};
use ndarray::{ArrayD, IxDyn, OwnedRepr};
use ndarray_npy::NpzReader;
use safetensors::{Dtype, SafeTensors};
use std::fs::File;
use std::path::Path;

use crate::dataset::CalibrationDataset;
use crate::{CalibrationError, Result};

/// Supported on-disk containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Npz,
    SafeTensors,
}

impl ArchiveFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "npz" => Some(Self::Npz),
            "safetensors" => Some(Self::SafeTensors),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

fn invalid(path: &Path, reason: impl ToString) -> CalibrationError {
    CalibrationError::InvalidArchive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Load a whole calibration archive into memory
pub fn load(path: impl AsRef<Path>) -> Result<CalibrationDataset> {
    let path = path.as_ref();
    let format = ArchiveFormat::from_path(path)
        .ok_or_else(|| CalibrationError::UnsupportedFormat(path.to_path_buf()))?;

    let dataset = match format {
        ArchiveFormat::Npz => load_npz(path)?,
        ArchiveFormat::SafeTensors => load_safetensors(path)?,
    };
    tracing::info!(
        path = %path.display(),
        tensors = dataset.len(),
        "loaded calibration archive"
    );
    Ok(dataset)
}

/// Read a `.npz` archive. float32 arrays are taken as-is, float64 narrowed.
pub fn load_npz(path: &Path) -> Result<CalibrationDataset> {
    let file = File::open(path).map_err(|e| invalid(path, e))?;
    let mut npz = NpzReader::new(file).map_err(|e| invalid(path, e))?;
    let names = npz.names().map_err(|e| invalid(path, e))?;

    let mut dataset = CalibrationDataset::new();
    for (index, raw_name) in names.iter().enumerate() {
        let name = raw_name.strip_suffix(".npy").unwrap_or(raw_name);
        let data = match npz.by_index::<OwnedRepr<f32>, IxDyn>(index) {
            Ok(array) => array,
            Err(_) => npz
                .by_index::<OwnedRepr<f64>, IxDyn>(index)
                .map(|array| array.mapv(|x| x as f32))
                .map_err(|e| CalibrationError::UnsupportedDtype {
                    tensor: name.to_string(),
                    dtype: e.to_string(),
                })?,
        };
        dataset.insert(name, data)?;
    }
    Ok(dataset)
}

/// Read a `.safetensors` file, ordering tensors by their data offset
pub fn load_safetensors(path: &Path) -> Result<CalibrationDataset> {
    let buffer = std::fs::read(path).map_err(|e| invalid(path, e))?;
    let tensors = SafeTensors::deserialize(&buffer).map_err(|e| invalid(path, format!("{:?}", e)))?;
    let (_, metadata) =
        SafeTensors::read_metadata(&buffer).map_err(|e| invalid(path, format!("{:?}", e)))?;

    let mut ordered: Vec<(String, usize)> = metadata
        .tensors()
        .into_iter()
        .map(|(name, info)| (name, info.data_offsets.0))
        .collect();
    ordered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let mut dataset = CalibrationDataset::new();
    for (name, _) in ordered {
        let view = tensors
            .tensor(&name)
            .map_err(|e| invalid(path, format!("{:?}", e)))?;
        let values = decode_floats(&name, view.dtype(), view.data())?;
        let data = ArrayD::from_shape_vec(IxDyn(view.shape()), values)
            .map_err(|e| invalid(path, e))?;
        dataset.insert(name, data)?;
    }
    Ok(dataset)
}

/// Little-endian float payload to f32
fn decode_floats(name: &str, dtype: Dtype, bytes: &[u8]) -> Result<Vec<f32>> {
    let values = match dtype {
        Dtype::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F64 => bytes
            .chunks_exact(8)
            .map(|c| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(c);
                f64::from_le_bytes(raw) as f32
            })
            .collect(),
        Dtype::F16 => bytes
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::BF16 => bytes
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        other => {
            return Err(CalibrationError::UnsupportedDtype {
                tensor: name.to_string(),
                dtype: format!("{:?}", other),
            })
        }
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_npy::NpzWriter;

    /// Hand-built safetensors payload: 8-byte header length, JSON header, data
    fn safetensors_bytes(header: &str, data: &[u8]) -> Vec<u8> {
        let mut header = header.to_string();
        while header.len() % 8 != 0 {
            header.push(' ');
        }
        let mut out = (header.len() as u64).to_le_bytes().to_vec();
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        out
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ArchiveFormat::from_path(Path::new("blobs.npz")),
            Some(ArchiveFormat::Npz)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("blobs.SafeTensors")),
            Some(ArchiveFormat::SafeTensors)
        );
        assert_eq!(ArchiveFormat::from_path(Path::new("blobs.bin")), None);
    }

    #[test]
    fn test_load_npz_keeps_archive_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobs.npz");
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("b", &array![[1.0f32, -2.0], [0.0, 4.0]]).unwrap();
            npz.add_array("a", &array![0.5f64, 0.25]).unwrap();
            npz.finish().unwrap();
        }

        let dataset = load(&path).unwrap();
        let names: Vec<_> = dataset.names().collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(dataset.get("b").unwrap().shape(), &[2, 2]);
        let a: Vec<f32> = dataset.get("a").unwrap().iter().copied().collect();
        assert_eq!(a, vec![0.5, 0.25]);
    }

    #[test]
    fn test_load_safetensors_in_data_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobs.safetensors");
        let header = r#"{"b":{"dtype":"F32","shape":[2],"data_offsets":[0,8]},"a":{"dtype":"F32","shape":[1,2],"data_offsets":[8,16]}}"#;
        let data = f32_bytes(&[1.0, -3.0, 0.5, 2.0]);
        std::fs::write(&path, safetensors_bytes(header, &data)).unwrap();

        let dataset = load(&path).unwrap();
        let names: Vec<_> = dataset.names().collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(dataset.get("a").unwrap().shape(), &[1, 2]);
        let b: Vec<f32> = dataset.get("b").unwrap().iter().copied().collect();
        assert_eq!(b, vec![1.0, -3.0]);
    }

    #[test]
    fn test_decode_half_precision() {
        let bytes: Vec<u8> = [f16::from_f32(1.5), f16::from_f32(-0.25)]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let values = decode_floats("t", Dtype::F16, &bytes).unwrap();
        assert_eq!(values, vec![1.5, -0.25]);

        let err = decode_floats("t", Dtype::I32, &[0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, CalibrationError::UnsupportedDtype { .. }));
    }

    #[test]
    fn test_missing_file_is_invalid_archive() {
        let err = load("/nonexistent/blobs.npz").unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidArchive { .. }));
    }

    #[test]
    fn test_garbage_file_is_invalid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobs.npz");
        std::fs::write(&path, b"definitely not a zip archive").unwrap();
        assert!(matches!(
            load(&path).unwrap_err(),
            CalibrationError::InvalidArchive { .. }
        ));
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            load("blobs.pickle").unwrap_err(),
            CalibrationError::UnsupportedFormat(_)
        ));
    }
}
