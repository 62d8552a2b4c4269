//! JSON file helpers shared by the local registry and artifact writers.
//!
//! Writes land in a `.tmp` sibling that is renamed over the target, so a
//! reader never observes a half-written document.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::Path;

/// Serialize `data` as pretty JSON and atomically replace `path`.
///
/// Parent directories are created as needed.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

/// Read and deserialize `path`. A missing file is `Ok(None)`; malformed JSON
/// is an [`io::ErrorKind::InvalidData`] error.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("aliases.json");
        let aliases = BTreeMap::from([("Champion".to_string(), 3u64)]);

        atomic_write_json(&path, &aliases).unwrap();
        let loaded: Option<BTreeMap<String, u64>> = load_json(&path).unwrap();

        assert_eq!(loaded, Some(aliases));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Vec<u64>> = load_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_malformed_file_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[1, 2").unwrap();
        let err = load_json::<Vec<u64>>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
