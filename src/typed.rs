// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Domain-typed read façade over a [`Mirror`] namespace.
//!
//! Every call goes through the [`Codec`]: keys are turned into fields before
//! the lookup, and returned fields/values are parsed and decoded before they
//! reach the caller. A field that is absent is just absent, but a field that
//! is present and fails to decode fails the whole call.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::codec::Codec;
use crate::mirror::traits::{Mirror, MirrorError};

/// One page of a [`TypedMirror::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedScanPage<K: Eq + Hash, V> {
    /// Cursor for the next call; `0` once the scan is complete.
    pub cursor: u64,
    pub entries: HashMap<K, V>,
}

pub struct TypedMirror<C> {
    mirror: Arc<dyn Mirror>,
    namespace: String,
    codec: C,
}

impl<C> TypedMirror<C>
where
    C: Codec,
    C::Key: Eq + Hash,
{
    pub fn new(mirror: Arc<dyn Mirror>, namespace: impl Into<String>, codec: C) -> Self {
        Self {
            mirror,
            namespace: namespace.into(),
            codec,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub async fn get(&self, key: &C::Key) -> Result<Option<C::Value>, MirrorError> {
        let field = self.codec.field(key)?;
        match self.mirror.get(&self.namespace, &field).await? {
            Some(raw) => Ok(Some(self.codec.decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Missing keys are omitted from the result.
    pub async fn mget(&self, keys: &[C::Key]) -> Result<HashMap<C::Key, C::Value>, MirrorError>
    where
        C::Key: Clone,
    {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut by_field = HashMap::with_capacity(keys.len());
        for key in keys {
            by_field.insert(self.codec.field(key)?, key);
        }
        let fields: Vec<String> = by_field.keys().cloned().collect();

        let raw = self.mirror.mget(&self.namespace, &fields).await?;
        let mut out = HashMap::with_capacity(raw.len());
        for (field, value) in raw {
            // a field we did not ask for is still parsed, never trusted blindly
            let key = match by_field.get(&field) {
                Some(key) => (*key).clone(),
                None => self.codec.parse_field(&field)?,
            };
            out.insert(key, self.codec.decode(&value)?);
        }
        Ok(out)
    }

    pub async fn get_all(&self) -> Result<HashMap<C::Key, C::Value>, MirrorError> {
        let raw = self.mirror.get_all(&self.namespace).await?;
        self.decode_entries(raw)
    }

    /// One page of a typed scan; loop until the returned cursor is `0`.
    pub async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<TypedScanPage<C::Key, C::Value>, MirrorError> {
        let page = self
            .mirror
            .scan(&self.namespace, cursor, pattern, count)
            .await?;
        Ok(TypedScanPage {
            cursor: page.cursor,
            entries: self.decode_entries(page.entries)?,
        })
    }

    fn decode_entries(
        &self,
        raw: HashMap<String, String>,
    ) -> Result<HashMap<C::Key, C::Value>, MirrorError> {
        raw.into_iter()
            .map(|(field, value)| -> Result<_, MirrorError> {
                Ok((self.codec.parse_field(&field)?, self.codec.decode(&value)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::mirror::file::FileMirror;
    use crate::mirror::traits::StateDiff;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct IndexerInfo {
        url: String,
        healthy: bool,
    }

    fn info(url: &str) -> IndexerInfo {
        IndexerInfo { url: url.to_string(), healthy: true }
    }

    async fn seeded(pairs: Vec<(&'static str, String)>) -> (TempDir, Arc<dyn Mirror>) {
        let dir = TempDir::new().unwrap();
        let mirror: Arc<dyn Mirror> = Arc::new(FileMirror::new(dir.path()));
        let desired: HashMap<String, String> =
            pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        mirror
            .upsert("IndexerInfos", &move |_ns: String| {
                let desired = desired.clone();
                async move { Ok::<_, MirrorError>(desired) }
            })
            .await
            .unwrap();
        (dir, mirror)
    }

    fn encoded(url: &str) -> String {
        serde_json::to_string(&info(url)).unwrap()
    }

    #[tokio::test]
    async fn test_get_decodes_value() {
        let (_dir, mirror) = seeded(vec![("1", encoded("http://a"))]).await;
        let typed = TypedMirror::new(mirror, "IndexerInfos", JsonCodec::<u64, IndexerInfo>::display());

        assert_eq!(typed.get(&1).await.unwrap(), Some(info("http://a")));
        assert_eq!(typed.get(&2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_decode_failure_is_error_not_absence() {
        let (_dir, mirror) = seeded(vec![("1", "not-json".to_string())]).await;
        let typed = TypedMirror::new(mirror, "IndexerInfos", JsonCodec::<u64, IndexerInfo>::display());

        let err = typed.get(&1).await.unwrap_err();
        assert!(matches!(err, MirrorError::Codec(_)));
    }

    #[tokio::test]
    async fn test_mget_omits_missing() {
        let (_dir, mirror) =
            seeded(vec![("1", encoded("http://a")), ("2", encoded("http://b"))]).await;
        let typed = TypedMirror::new(mirror, "IndexerInfos", JsonCodec::<u64, IndexerInfo>::display());

        let got = typed.mget(&[1, 3, 2]).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[&1], info("http://a"));
        assert_eq!(got[&2], info("http://b"));

        assert!(typed.mget(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mget_one_bad_value_poisons_batch() {
        let (_dir, mirror) = seeded(vec![("1", encoded("http://a")), ("2", "{".to_string())]).await;
        let typed = TypedMirror::new(mirror, "IndexerInfos", JsonCodec::<u64, IndexerInfo>::display());

        assert!(typed.mget(&[1, 2]).await.is_err());
        assert_eq!(typed.mget(&[1]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_all_parses_fields() {
        let (_dir, mirror) =
            seeded(vec![("10", encoded("http://a")), ("20", encoded("http://b"))]).await;
        let typed = TypedMirror::new(mirror, "IndexerInfos", JsonCodec::<u64, IndexerInfo>::display());

        let all = typed.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&10].url, "http://a");
        assert_eq!(all[&20].url, "http://b");
    }

    #[tokio::test]
    async fn test_get_all_bad_field_poisons_result() {
        let (_dir, mirror) =
            seeded(vec![("10", encoded("http://a")), ("ten", encoded("http://b"))]).await;
        let typed = TypedMirror::new(mirror, "IndexerInfos", JsonCodec::<u64, IndexerInfo>::display());

        let err = typed.get_all().await.unwrap_err();
        assert!(err.to_string().contains("ten"));
    }

    #[tokio::test]
    async fn test_scan_pages_to_completion() {
        let pairs: Vec<(&'static str, String)> = vec![
            ("user:1", encoded("http://1")),
            ("user:2", encoded("http://2")),
            ("user:3", encoded("http://3")),
            ("admin:1", encoded("http://x")),
        ];
        let (_dir, mirror) = seeded(pairs).await;
        let typed = TypedMirror::new(mirror, "IndexerInfos", JsonCodec::<u32, IndexerInfo>::prefixed("user:"));

        let mut cursor = 0;
        let mut all = HashMap::new();
        loop {
            let page = typed.scan(cursor, "user:*", 2).await.unwrap();
            all.extend(page.entries);
            if page.cursor == 0 {
                break;
            }
            cursor = page.cursor;
        }

        assert_eq!(all.len(), 3);
        assert_eq!(all[&2].url, "http://2");
    }

    #[tokio::test]
    async fn test_reads_follow_diffs() {
        let (_dir, mirror) = seeded(vec![("1", encoded("http://a"))]).await;
        let diff = StateDiff::new(
            HashMap::from([("2".to_string(), encoded("http://b"))]),
            vec!["1".to_string()],
        );
        mirror
            .apply("IndexerInfos", &move |_ns: String| {
                let diff = diff.clone();
                async move { Ok::<_, MirrorError>(Some(diff)) }
            })
            .await
            .unwrap();

        let typed = TypedMirror::new(mirror, "IndexerInfos", JsonCodec::<u64, IndexerInfo>::display());
        let all = typed.get_all().await.unwrap();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![2]);
    }
}
