use crate::ipc::error::HandlerErr;
use std::path::{Path, PathBuf};

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match get_optional_str(params, key) {
        Some(s) => Ok(s),
        None => Err(HandlerErr::new("bad_params", format!("missing {}", key))),
    }
}

/// Trimmed string param; blank counts as absent.
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_optional_usize(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<usize>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(|n| Some(n as usize)).ok_or_else(|| {
            HandlerErr::new(
                "bad_params",
                format!("{} must be a non-negative integer", key),
            )
        }),
    }
}

/// Rejects files over `max_bytes` before anything reads them.
pub fn check_file_size(
    path: &Path,
    max_bytes: u64,
    missing_code: &'static str,
) -> Result<u64, HandlerErr> {
    let meta = std::fs::metadata(path).map_err(|e| {
        HandlerErr::new(missing_code, e.to_string())
            .with_details(serde_json::json!({ "path": path.to_string_lossy() }))
    })?;
    if !meta.is_file() {
        return Err(HandlerErr::new(missing_code, "not a regular file")
            .with_details(serde_json::json!({ "path": path.to_string_lossy() })));
    }
    if meta.len() > max_bytes {
        return Err(HandlerErr::new(
            "file_too_large",
            format!("file is {} bytes; limit is {}", meta.len(), max_bytes),
        )
        .with_details(serde_json::json!({
            "path": path.to_string_lossy(),
            "size": meta.len(),
            "maxBytes": max_bytes
        })));
    }
    Ok(meta.len())
}

pub fn path_param(params: &serde_json::Value, key: &str) -> Result<PathBuf, HandlerErr> {
    get_required_str(params, key).map(PathBuf::from)
}
