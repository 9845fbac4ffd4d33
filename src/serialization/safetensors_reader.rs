use super::{SafeTensorsMetadata, TensorMetadata, UserMetadata};

pub(super) fn validate_and_read_header(bytes: &[u8]) -> Result<usize, String> {
    if bytes.len() < 8 {
        return Err(format!(
            "file is {} bytes, need at least 8 bytes for header",
            bytes.len()
        ));
    }

    let header_bytes: [u8; 8] = bytes[0..8]
        .try_into()
        .map_err(|_| "failed to read header bytes".to_string())?;
    let metadata_len = usize::try_from(u64::from_le_bytes(header_bytes))
        .map_err(|_| "metadata length does not fit in memory".to_string())?;

    if metadata_len == 0 {
        return Err("metadata length is 0".to_string());
    }

    if metadata_len > bytes.len() - 8 {
        return Err(format!("metadata length {metadata_len} exceeds file size"));
    }

    Ok(metadata_len)
}

pub(super) fn parse_metadata(
    bytes: &[u8],
    metadata_len: usize,
) -> Result<(SafeTensorsMetadata, UserMetadata), String> {
    let metadata_str = std::str::from_utf8(&bytes[8..8 + metadata_len])
        .map_err(|e| format!("metadata is not valid UTF-8: {e}"))?;

    let raw_metadata: serde_json::Value =
        serde_json::from_str(metadata_str).map_err(|e| format!("JSON parsing failed: {e}"))?;

    let serde_json::Value::Object(map) = raw_metadata else {
        return Err("header is not a JSON object".to_string());
    };

    let mut metadata = SafeTensorsMetadata::new();
    let mut user_metadata = UserMetadata::new();

    for (key, value) in map {
        if key == "__metadata__" {
            extract_user_metadata(value, &mut user_metadata);
            continue;
        }
        if key.starts_with("__") {
            continue;
        }
        let tensor_meta = serde_json::from_value::<TensorMetadata>(value)
            .map_err(|e| format!("tensor '{key}': {e}"))?;
        metadata.insert(key, tensor_meta);
    }

    Ok((metadata, user_metadata))
}

/// Keeps the string-valued entries of a `__metadata__` object.
fn extract_user_metadata(value: serde_json::Value, user_metadata: &mut UserMetadata) {
    let serde_json::Value::Object(meta_map) = value else {
        return;
    };
    for (mk, mv) in meta_map {
        if let serde_json::Value::String(s) = mv {
            user_metadata.insert(mk, s);
        }
    }
}

pub(super) fn extract_tensor(raw_data: &[u8], tensor_meta: &TensorMetadata) -> Result<Vec<f32>, String> {
    let [start, end] = tensor_meta.data_offsets;

    if end > raw_data.len() {
        return Err(format!(
            "invalid data offset: end={end} exceeds data size={}",
            raw_data.len()
        ));
    }
    if start > end {
        return Err(format!("invalid data offset: start={start} > end={end}"));
    }
    if tensor_meta.dtype != "F32" {
        return Err(format!("unsupported dtype: {}. Supported: F32", tensor_meta.dtype));
    }

    let tensor_bytes = &raw_data[start..end];
    if tensor_bytes.len() % 4 != 0 {
        return Err(format!(
            "F32 data length {} is not a multiple of 4",
            tensor_bytes.len()
        ));
    }
    Ok(tensor_bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
