//! `SafeTensors` reading and writing.
//!
//! ```text
//! [8-byte header: u64 metadata length (little-endian)]
//! [JSON metadata: __metadata__ strings, tensor dtypes, shapes, data_offsets]
//! [Raw tensor data: F32 values in little-endian]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CharCnnError, Result};
use crate::nn::Tensor;

/// Metadata for a single tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorMetadata {
    /// Data type of the tensor (e.g., "F32").
    pub dtype: String,
    /// Shape of the tensor.
    pub shape: Vec<usize>,
    /// Data offsets `[start, end]` in the raw data section.
    pub data_offsets: [usize; 2],
}

/// Tensor entries of a header, sorted by name.
pub type SafeTensorsMetadata = BTreeMap<String, TensorMetadata>;

/// String pairs stored under the `__metadata__` header key.
pub type UserMetadata = BTreeMap<String, String>;

/// Write `tensors` (name → (data, shape)) with `user_metadata`.
///
/// An empty `user_metadata` omits the `__metadata__` key.
///
/// # Errors
///
/// Returns [`CharCnnError::FormatError`] if a tensor's data does not match
/// its shape, or an I/O or serialization error if writing fails.
pub fn save_safetensors<P: AsRef<Path>>(
    path: P,
    tensors: &BTreeMap<String, (Vec<f32>, Vec<usize>)>,
    user_metadata: &UserMetadata,
) -> Result<()> {
    let path = path.as_ref();
    let mut header = serde_json::Map::new();

    if !user_metadata.is_empty() {
        let meta_obj: serde_json::Map<String, serde_json::Value> = user_metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        header.insert("__metadata__".to_string(), serde_json::Value::Object(meta_obj));
    }

    let mut raw_data = Vec::new();
    for (name, (data, shape)) in tensors {
        if data.len() != shape.iter().product::<usize>() {
            return Err(format_error(
                path,
                format!("tensor '{name}' has {} values for shape {shape:?}", data.len()),
            ));
        }
        let start = raw_data.len();
        for &value in data {
            raw_data.extend_from_slice(&value.to_le_bytes());
        }
        let meta = TensorMetadata {
            dtype: "F32".to_string(),
            shape: shape.clone(),
            data_offsets: [start, raw_data.len()],
        };
        header.insert(name.clone(), serde_json::to_value(meta)?);
    }

    let metadata_json = serde_json::to_string(&header)?;
    let metadata_bytes = metadata_json.as_bytes();

    let mut output = Vec::with_capacity(8 + metadata_bytes.len() + raw_data.len());
    output.extend_from_slice(&(metadata_bytes.len() as u64).to_le_bytes());
    output.extend_from_slice(metadata_bytes);
    output.extend_from_slice(&raw_data);

    fs::write(path, output)?;
    Ok(())
}

/// A `SafeTensors` file read into memory.
#[derive(Debug, Clone)]
pub struct SafeTensors {
    path: PathBuf,
    metadata: SafeTensorsMetadata,
    user_metadata: UserMetadata,
    data: Vec<u8>,
}

impl SafeTensors {
    /// Read and validate the header of `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read and
    /// [`CharCnnError::FormatError`] if the header is malformed.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let metadata_len =
            validate_and_read_header(&bytes).map_err(|message| format_error(path, message))?;
        let (metadata, user_metadata) =
            parse_metadata(&bytes, metadata_len).map_err(|message| format_error(path, message))?;
        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            user_metadata,
            data: bytes[8 + metadata_len..].to_vec(),
        })
    }

    /// Tensor names, sorted.
    #[must_use]
    pub fn tensor_names(&self) -> Vec<&str> {
        self.metadata.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn get_metadata(&self, name: &str) -> Option<&TensorMetadata> {
        self.metadata.get(name)
    }

    /// The `__metadata__` strings.
    #[must_use]
    pub fn user_metadata(&self) -> &UserMetadata {
        &self.user_metadata
    }

    /// Decode one tensor.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::FormatError`] if the tensor is missing, is
    /// not F32, or its offsets disagree with its shape or the data section.
    pub fn tensor(&self, name: &str) -> Result<Tensor> {
        let meta = self
            .metadata
            .get(name)
            .ok_or_else(|| format_error(&self.path, format!("tensor '{name}' not found")))?;
        let values =
            extract_tensor(&self.data, meta).map_err(|message| format_error(&self.path, message))?;
        Tensor::new(values, &meta.shape).map_err(|e| format_error(&self.path, e.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

fn format_error(path: &Path, message: impl Into<String>) -> CharCnnError {
    CharCnnError::FormatError {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

#[path = "safetensors_reader.rs"]
mod reader;
use reader::{extract_tensor, parse_metadata, validate_and_read_header};

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BTreeMap<String, (Vec<f32>, Vec<usize>)> {
        BTreeMap::from([
            ("dense/kernel".to_string(), (vec![1.0, -2.0, 3.5, 0.25], vec![2, 2])),
            ("dense/bias".to_string(), (vec![0.5, -0.5], vec![2])),
        ])
    }

    #[test]
    fn test_roundtrip_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let meta = UserMetadata::from([("input_len".to_string(), "250".to_string())]);
        save_safetensors(&path, &sample(), &meta).unwrap();

        let file = SafeTensors::read(&path).unwrap();
        assert_eq!(file.len(), 2);
        assert_eq!(file.tensor_names(), vec!["dense/bias", "dense/kernel"]);
        assert_eq!(file.user_metadata()["input_len"], "250");

        let kernel = file.tensor("dense/kernel").unwrap();
        assert_eq!(kernel.shape(), &[2, 2]);
        assert_eq!(kernel.data(), &[1.0, -2.0, 3.5, 0.25]);
        assert_eq!(file.get_metadata("dense/bias").unwrap().data_offsets, [0, 8]);
    }

    #[test]
    fn test_header_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.safetensors");
        save_safetensors(&path, &sample(), &UserMetadata::new()).unwrap();

        let bytes = fs::read(&path).unwrap();
        let len = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        let header: serde_json::Value = serde_json::from_slice(&bytes[8..8 + len]).unwrap();
        assert!(header.get("__metadata__").is_none());
        assert_eq!(header["dense/kernel"]["dtype"], "F32");
        assert_eq!(bytes.len(), 8 + len + 6 * 4);
    }

    #[test]
    fn test_shape_mismatch_is_rejected_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let bad = BTreeMap::from([("w".to_string(), (vec![1.0; 3], vec![2, 2]))]);
        let err = save_safetensors(dir.path().join("x"), &bad, &UserMetadata::new()).unwrap_err();
        assert!(matches!(err, CharCnnError::FormatError { .. }));
    }

    #[test]
    fn test_truncated_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.safetensors");
        fs::write(&path, [1, 2, 3]).unwrap();
        assert!(matches!(
            SafeTensors::read(&path),
            Err(CharCnnError::FormatError { .. })
        ));
    }

    #[test]
    fn test_missing_tensor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.safetensors");
        save_safetensors(&path, &sample(), &UserMetadata::new()).unwrap();
        let file = SafeTensors::read(&path).unwrap();
        let err = file.tensor("conv1d/kernel").unwrap_err();
        assert!(err.to_string().contains("conv1d/kernel"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SafeTensors::read(dir.path().join("absent")),
            Err(CharCnnError::Io(_))
        ));
    }
}
