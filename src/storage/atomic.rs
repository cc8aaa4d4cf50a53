use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use super::PersistenceError;

/// Reads and deserializes a JSON file. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| PersistenceError::Json {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Serializes `value` and replaces `path` atomically.
///
/// The record is written to a uniquely named sibling temp file, synced, then
/// renamed over the destination, so readers never see a partial record. The
/// parent directory is created if absent.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }
    }

    let content = serde_json::to_vec_pretty(value).map_err(|e| PersistenceError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;

    // Unpredictable temp name so a stale or planted file cannot be reused.
    use std::time::{SystemTime, UNIX_EPOCH};
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", suffix));

    let result = (|| {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(&content)?;
        file.sync_all()?;
        drop(file);

        // rename does not replace an existing file on Windows
        #[cfg(windows)]
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        std::fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(PersistenceError::io(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<BTreeMap<String, bool>> = read_json(&dir.path().join("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_write_creates_parent_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("record.json");
        let record = BTreeMap::from([("a".to_string(), true)]);

        write_json_atomic(&path, &record).unwrap();
        let back: BTreeMap<String, bool> = read_json(&path).unwrap().unwrap();
        assert_eq!(back, record);

        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not valid json {{").unwrap();
        let result: Result<Option<BTreeMap<String, bool>>, _> = read_json(&path);
        assert!(matches!(result, Err(PersistenceError::Json { .. })));
    }
}
