//! `storage.kind = local_fs` — blobs are plain files under a root directory,
//! keys map directly to relative paths (slashes become path separators).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use super::{BackendError, BackendResult, ListPage, StorageBackend};

pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn map_io_err(key: &str, err: std::io::Error) -> BackendError {
        if err.kind() == std::io::ErrorKind::NotFound {
            BackendError::NotFound(key.to_string())
        } else {
            BackendError::from_message(format!("io error on {key}: {err}"))
        }
    }
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn init(&self) -> BackendResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Self::map_io_err("<root>", e))
    }

    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> BackendResult<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io_err(key, e))?;
        }
        // Write to a temp file then rename, so a crash mid-write never leaves
        // a half-written blob for a concurrent reader to observe.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Self::map_io_err(key, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::map_io_err(key, e))
    }

    async fn get(&self, key: &str) -> BackendResult<Bytes> {
        let path = self.path_for(key);
        fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| Self::map_io_err(key, e))
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        let path = self.path_for(key);
        fs::remove_file(&path)
            .await
            .map_err(|e| Self::map_io_err(key, e))
    }

    async fn list(
        &self,
        prefix: &str,
        page_token: Option<&str>,
        max_keys: usize,
    ) -> BackendResult<ListPage> {
        let mut keys = Vec::new();
        collect_keys(&self.root, &self.root, prefix, &mut keys)
            .map_err(|e| Self::map_io_err(prefix, e))?;
        keys.sort();

        let start = page_token.unwrap_or("");
        let filtered: Vec<String> = keys
            .into_iter()
            .filter(|k| page_token.is_none() || k.as_str() > start)
            .take(max_keys + 1)
            .collect();

        if filtered.len() > max_keys {
            let next_token = filtered[max_keys - 1].clone();
            Ok(ListPage {
                keys: filtered[..max_keys].to_vec(),
                next_token: Some(next_token),
            })
        } else {
            Ok(ListPage {
                keys: filtered,
                next_token: None,
            })
        }
    }

    async fn exists_bucket(&self) -> BackendResult<bool> {
        Ok(self.root.is_dir())
    }
}

fn collect_keys(
    root: &Path,
    dir: &Path,
    prefix: &str,
    out: &mut Vec<String>,
) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_keys(root, &path, prefix, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            let key = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
            if key.starts_with(prefix) && !key.ends_with(".tmp") {
                out.push(key);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path());
        backend.init().await.unwrap();

        backend
            .put("entities/nouns/vectors/ab/id.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        let got = backend.get("entities/nouns/vectors/ab/id.json").await.unwrap();
        assert_eq!(got, Bytes::from_static(b"{}"));

        backend.delete("entities/nouns/vectors/ab/id.json").await.unwrap();
        assert!(backend.get("entities/nouns/vectors/ab/id.json").await.is_err());
    }

    #[tokio::test]
    async fn list_respects_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path());
        backend.init().await.unwrap();
        backend
            .put("entities/nouns/vectors/ab/1.json", Bytes::from_static(b"1"), "application/json")
            .await
            .unwrap();
        backend
            .put("entities/verbs/vectors/ab/2.json", Bytes::from_static(b"2"), "application/json")
            .await
            .unwrap();

        let page = backend.list("entities/nouns/", None, 10).await.unwrap();
        assert_eq!(page.keys.len(), 1);
        assert!(page.keys[0].starts_with("entities/nouns/"));
    }
}
