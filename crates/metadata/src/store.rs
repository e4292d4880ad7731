use std::fs;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::cache::CacheEntry;

#[derive(Debug)]
pub enum CacheError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Format(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "io error: {}", err),
            CacheError::Json(err) => write!(f, "json error: {}", err),
            CacheError::Format(message) => write!(f, "cache format error: {}", message),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Json(err)
    }
}

/// Entries in file order, least recently used first.
pub(crate) fn load_entries(path: &Path) -> Result<Vec<(PathBuf, CacheEntry)>, CacheError> {
    let bytes = fs::read(path)?;
    let dump: Map<String, Value> = match serde_json::from_slice::<Value>(&bytes)? {
        Value::Object(map) => map,
        other => {
            return Err(CacheError::Format(format!(
                "expected an object, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut entries = Vec::with_capacity(dump.len());
    for (key, value) in dump {
        // One bad record should not cost the rest of the store.
        if let Ok(entry) = serde_json::from_value::<CacheEntry>(value) {
            entries.push((PathBuf::from(key), entry));
        }
    }
    Ok(entries)
}

pub(crate) async fn write_entries(
    path: &Path,
    entries: &[(String, CacheEntry)],
) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let bytes = serde_json::to_vec(&StoreDump(entries))?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

struct StoreDump<'a>(&'a [(String, CacheEntry)]);

impl Serialize for StoreDump<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(key, entry)| (key, entry)))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{load_entries, write_entries};
    use crate::cache::CacheEntry;
    use common::MinifiedMetadata;

    fn entry(mtime: u64, title: &str) -> CacheEntry {
        CacheEntry {
            mtime,
            data: MinifiedMetadata {
                title: Some(title.to_string()),
                ..MinifiedMetadata::default()
            },
        }
    }

    #[tokio::test]
    async fn preserves_entry_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let entries = vec![
            ("/lib/z.info.json".to_string(), entry(3, "z")),
            ("/lib/a.info.json".to_string(), entry(1, "a")),
            ("/lib/m.info.json".to_string(), entry(2, "m")),
        ];
        write_entries(&path, &entries).await.unwrap();

        let loaded = load_entries(&path).unwrap();
        let keys: Vec<String> = loaded
            .iter()
            .map(|(k, _)| k.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            keys,
            vec!["/lib/z.info.json", "/lib/a.info.json", "/lib/m.info.json"]
        );
        assert_eq!(loaded[1].1, entry(1, "a"));
        assert!(!path.with_file_name("store.json.tmp").exists());
    }

    #[test]
    fn skips_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"/a.info.json": {"mtime": 1, "data": {"id": "a"}}, "/b.info.json": {"nope": true}}"#,
        )
        .unwrap();
        let loaded = load_entries(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1.data.id.as_deref(), Some("a"));
    }

    #[test]
    fn rejects_non_object_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(load_entries(&path).is_err());
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_entries(&path).is_err());
    }
}
