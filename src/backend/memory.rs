//! In-process backend — `storage.kind = memory`. First-class per spec §6, not
//! test-only scaffolding (SPEC_FULL §E): it's what `demos/quickstart.rs` and
//! the integration test suite both run against.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use super::{BackendError, BackendResult, ListPage, StorageBackend};

#[derive(Default)]
pub struct MemoryBackend {
    // BTreeMap keeps `list` deterministically ordered without extra sorting,
    // matching the "deterministic left-to-right sweep" cursor contract (§4.1).
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn init(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> BackendResult<()> {
        self.objects
            .write()
            .map_err(|_| BackendError::Unavailable("poisoned lock".into()))?
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> BackendResult<Bytes> {
        self.objects
            .read()
            .map_err(|_| BackendError::Unavailable("poisoned lock".into()))?
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        let mut guard = self
            .objects
            .write()
            .map_err(|_| BackendError::Unavailable("poisoned lock".into()))?;
        if guard.remove(key).is_none() {
            return Err(BackendError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        page_token: Option<&str>,
        max_keys: usize,
    ) -> BackendResult<ListPage> {
        let guard = self
            .objects
            .read()
            .map_err(|_| BackendError::Unavailable("poisoned lock".into()))?;
        let start = page_token.unwrap_or("");
        let keys: Vec<String> = guard
            .range(start.to_string()..)
            .map(|(k, _)| k.clone())
            .filter(|k| k.starts_with(prefix))
            .filter(|k| page_token.is_none() || k.as_str() > start)
            .take(max_keys + 1)
            .collect();

        if keys.len() > max_keys {
            let next_token = keys[max_keys - 1].clone();
            Ok(ListPage {
                keys: keys[..max_keys].to_vec(),
                next_token: Some(next_token),
            })
        } else {
            Ok(ListPage {
                keys,
                next_token: None,
            })
        }
    }

    async fn exists_bucket(&self) -> BackendResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let backend = MemoryBackend::new();
        backend
            .put("a/b.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        let got = backend.get("a/b.json").await.unwrap();
        assert_eq!(got, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.get("nope").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let backend = MemoryBackend::new();
        backend
            .put("k", Bytes::from_static(b"v"), "text/plain")
            .await
            .unwrap();
        backend.delete("k").await.unwrap();
        assert!(backend.get("k").await.is_err());
    }

    #[tokio::test]
    async fn list_paginates_deterministically() {
        let backend = MemoryBackend::new();
        for i in 0..5u8 {
            backend
                .put(&format!("p/{i}"), Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap();
        }
        let page1 = backend.list("p/", None, 2).await.unwrap();
        assert_eq!(page1.keys, vec!["p/0", "p/1"]);
        assert!(page1.next_token.is_some());

        let page2 = backend
            .list("p/", page1.next_token.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(page2.keys, vec!["p/2", "p/3"]);

        let page3 = backend
            .list("p/", page2.next_token.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(page3.keys, vec!["p/4"]);
        assert!(page3.next_token.is_none());
    }
}
