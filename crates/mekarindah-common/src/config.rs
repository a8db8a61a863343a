//! JSON configuration loading.

use crate::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

/// Read and deserialize a JSON config file.
pub fn load_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = raw.len(), "Loaded config file");
    load_json_str(&raw)
}

/// Deserialize config from an in-memory JSON string.
pub fn load_json_str<T: DeserializeOwned>(raw: &str) -> Result<T, ConfigError> {
    Ok(serde_json::from_str(raw)?)
}
