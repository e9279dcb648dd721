// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Adapters from domain-typed sources to the mirror's string-keyed sources.
//!
//! Collaborators usually think in domain types (`u64 → Allocation`), while a
//! [`Mirror`](crate::Mirror) only stores strings. These adapters put a
//! [`Codec`] between the two:
//!
//! ```text
//! TypedSyncSource<K, V>   ──build_sync_fn──────────►  SyncSource
//! TypedStreamSource<K, V> ──build_streaming_sync_fn─►  StreamSource
//! TypedDiffSource<K, V>   ──build_diff_fn──────────►  DiffSource
//! ```
//!
//! Full-sync and diff adapters encode everything before returning, so a codec
//! failure aborts the operation before any write. The streaming adapter
//! encodes each pair just before it is emitted.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use async_trait::async_trait;

use crate::codec::Codec;
use crate::mirror::traits::{DiffSource, Emitter, MirrorError, StateDiff, StreamSource, SyncSource};

/// Domain-typed [`StateDiff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedDiff<K: Eq + Hash, V> {
    pub added: HashMap<K, V>,
    pub deleted: Vec<K>,
}

impl<K: Eq + Hash, V> Default for TypedDiff<K, V> {
    fn default() -> Self {
        Self {
            added: HashMap::new(),
            deleted: Vec::new(),
        }
    }
}

#[async_trait]
pub trait TypedSyncSource<K, V>: Send + Sync {
    async fn fetch(&self, namespace: &str) -> Result<HashMap<K, V>, MirrorError>;
}

#[async_trait]
pub trait TypedEmitter<K, V>: Send {
    async fn emit(&mut self, key: K, value: V) -> Result<(), MirrorError>;
}

#[async_trait]
pub trait TypedStreamSource<K, V>: Send + Sync {
    async fn stream(
        &self,
        namespace: &str,
        emit: &mut dyn TypedEmitter<K, V>,
    ) -> Result<(), MirrorError>;
}

/// `Ok(None)` is treated as "no changes".
#[async_trait]
pub trait TypedDiffSource<K: Eq + Hash, V>: Send + Sync {
    async fn diff(&self, namespace: &str) -> Result<Option<TypedDiff<K, V>>, MirrorError>;
}

#[async_trait]
impl<K, V, F, Fut> TypedSyncSource<K, V> for F
where
    K: 'static,
    V: 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HashMap<K, V>, MirrorError>> + Send + 'static,
{
    async fn fetch(&self, namespace: &str) -> Result<HashMap<K, V>, MirrorError> {
        (self)(namespace.to_string()).await
    }
}

#[async_trait]
impl<K, V, F, Fut> TypedDiffSource<K, V> for F
where
    K: Eq + Hash + 'static,
    V: 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<TypedDiff<K, V>>, MirrorError>> + Send + 'static,
{
    async fn diff(&self, namespace: &str) -> Result<Option<TypedDiff<K, V>>, MirrorError> {
        (self)(namespace.to_string()).await
    }
}

/// A [`SyncSource`] built by [`build_sync_fn`].
pub struct CodecSyncSource<C, S> {
    codec: C,
    source: S,
}

/// A [`StreamSource`] built by [`build_streaming_sync_fn`].
pub struct CodecStreamSource<C, S> {
    codec: C,
    source: S,
}

/// A [`DiffSource`] built by [`build_diff_fn`].
pub struct CodecDiffSource<C, S> {
    codec: C,
    source: S,
}

pub fn build_sync_fn<C, S>(codec: C, source: S) -> CodecSyncSource<C, S>
where
    C: Codec,
    S: TypedSyncSource<C::Key, C::Value>,
{
    CodecSyncSource { codec, source }
}

pub fn build_streaming_sync_fn<C, S>(codec: C, source: S) -> CodecStreamSource<C, S>
where
    C: Codec,
    S: TypedStreamSource<C::Key, C::Value>,
{
    CodecStreamSource { codec, source }
}

pub fn build_diff_fn<C, S>(codec: C, source: S) -> CodecDiffSource<C, S>
where
    C: Codec,
    C::Key: Eq + Hash,
    S: TypedDiffSource<C::Key, C::Value>,
{
    CodecDiffSource { codec, source }
}

#[async_trait]
impl<C, S> SyncSource for CodecSyncSource<C, S>
where
    C: Codec,
    S: TypedSyncSource<C::Key, C::Value>,
{
    async fn fetch(&self, namespace: &str) -> Result<HashMap<String, String>, MirrorError> {
        let typed = self.source.fetch(namespace).await?;
        let mut encoded = HashMap::with_capacity(typed.len());
        for (key, value) in &typed {
            encoded.insert(self.codec.field(key)?, self.codec.encode(value)?);
        }
        Ok(encoded)
    }
}

/// Encodes typed pairs and forwards them to the backend's emitter.
struct EncodingEmitter<'a, C> {
    codec: &'a C,
    inner: &'a mut dyn Emitter,
}

#[async_trait]
impl<'a, C> TypedEmitter<C::Key, C::Value> for EncodingEmitter<'a, C>
where
    C: Codec,
    C::Key: Send + 'static,
    C::Value: Send + 'static,
{
    async fn emit(&mut self, key: C::Key, value: C::Value) -> Result<(), MirrorError> {
        let field = self.codec.field(&key)?;
        let raw = self.codec.encode(&value)?;
        self.inner.emit(field, raw).await
    }
}

#[async_trait]
impl<C, S> StreamSource for CodecStreamSource<C, S>
where
    C: Codec,
    C::Key: Send + 'static,
    C::Value: Send + 'static,
    S: TypedStreamSource<C::Key, C::Value>,
{
    async fn stream(&self, namespace: &str, emit: &mut dyn Emitter) -> Result<(), MirrorError> {
        let mut typed = EncodingEmitter {
            codec: &self.codec,
            inner: emit,
        };
        self.source.stream(namespace, &mut typed).await
    }
}

#[async_trait]
impl<C, S> DiffSource for CodecDiffSource<C, S>
where
    C: Codec,
    C::Key: Eq + Hash,
    S: TypedDiffSource<C::Key, C::Value>,
{
    async fn diff(&self, namespace: &str) -> Result<Option<StateDiff>, MirrorError> {
        let Some(typed) = self.source.diff(namespace).await? else {
            return Ok(Some(StateDiff::default()));
        };

        let mut added = HashMap::with_capacity(typed.added.len());
        for (key, value) in &typed.added {
            added.insert(self.codec.field(key)?, self.codec.encode(value)?);
        }
        let deleted = typed
            .deleted
            .iter()
            .map(|key| self.codec.field(key))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(StateDiff::new(added, deleted)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecError, JsonCodec};

    struct VecEmitter(Vec<(String, String)>);

    #[async_trait]
    impl Emitter for VecEmitter {
        async fn emit(&mut self, field: String, value: String) -> Result<(), MirrorError> {
            self.0.push((field, value));
            Ok(())
        }
    }

    struct Counter {
        upto: u64,
    }

    #[async_trait]
    impl TypedStreamSource<u64, u64> for Counter {
        async fn stream(
            &self,
            _namespace: &str,
            emit: &mut dyn TypedEmitter<u64, u64>,
        ) -> Result<(), MirrorError> {
            for i in 1..=self.upto {
                emit.emit(i, i * 10).await?;
            }
            Ok(())
        }
    }

    fn strict_codec() -> JsonCodec<u64, u64> {
        JsonCodec::new(
            |key: &u64| {
                if *key == 13 {
                    Err(CodecError::Field("unlucky key".into()))
                } else {
                    Ok(key.to_string())
                }
            },
            |field: &str| {
                field.parse().map_err(|_| CodecError::ParseField {
                    field: field.to_string(),
                    reason: "not a number".into(),
                })
            },
        )
    }

    #[tokio::test]
    async fn test_sync_fn_encodes_every_entry() {
        let source = build_sync_fn(JsonCodec::<u64, String>::display(), |_ns: String| async {
            Ok::<_, MirrorError>(HashMap::from([(1u64, "one".to_string()), (2u64, "two".to_string())]))
        });

        let encoded = source.fetch("Numbers").await.unwrap();
        assert_eq!(encoded.len(), 2);
        assert_eq!(encoded["1"], "\"one\"");
        assert_eq!(encoded["2"], "\"two\"");
    }

    #[tokio::test]
    async fn test_sync_fn_fails_whole_fetch_on_one_bad_key() {
        let source = build_sync_fn(strict_codec(), |_ns: String| async {
            Ok::<_, MirrorError>(HashMap::from([(1u64, 1u64), (13u64, 2u64)]))
        });

        let err = source.fetch("Numbers").await.unwrap_err();
        assert!(matches!(err, MirrorError::Codec(CodecError::Field(_))));
    }

    #[tokio::test]
    async fn test_sync_fn_propagates_source_error() {
        let source = build_sync_fn(JsonCodec::<u64, u64>::display(), |_ns: String| async {
            Err::<HashMap<u64, u64>, _>(MirrorError::source("upstream down"))
        });

        let err = source.fetch("Numbers").await.unwrap_err();
        assert!(err.to_string().contains("upstream down"));
    }

    #[tokio::test]
    async fn test_streaming_fn_encodes_each_pair() {
        let source = build_streaming_sync_fn(JsonCodec::<u64, u64>::display(), Counter { upto: 3 });
        let mut sink = VecEmitter(Vec::new());

        source.stream("Numbers", &mut sink).await.unwrap();

        assert_eq!(
            sink.0,
            vec![
                ("1".to_string(), "10".to_string()),
                ("2".to_string(), "20".to_string()),
                ("3".to_string(), "30".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_streaming_fn_stops_at_codec_error() {
        let source = build_streaming_sync_fn(strict_codec(), Counter { upto: 20 });
        let mut sink = VecEmitter(Vec::new());

        let err = source.stream("Numbers", &mut sink).await.unwrap_err();

        assert!(matches!(err, MirrorError::Codec(_)));
        // pairs before the bad key were already emitted
        assert_eq!(sink.0.len(), 12);
    }

    #[tokio::test]
    async fn test_diff_fn_none_becomes_empty_diff() {
        let source = build_diff_fn(JsonCodec::<u64, u64>::display(), |_ns: String| async {
            Ok::<_, MirrorError>(None::<TypedDiff<u64, u64>>)
        });

        let diff = source.diff("Numbers").await.unwrap();
        assert_eq!(diff, Some(StateDiff::default()));
    }

    #[tokio::test]
    async fn test_diff_fn_encodes_added_and_deleted() {
        let source = build_diff_fn(JsonCodec::<u64, String>::display(), |_ns: String| async {
            Ok::<_, MirrorError>(Some(TypedDiff {
                added: HashMap::from([(5u64, "five".to_string())]),
                deleted: vec![6u64, 7u64],
            }))
        });

        let diff = source.diff("Numbers").await.unwrap().unwrap();
        assert_eq!(diff.added, HashMap::from([("5".to_string(), "\"five\"".to_string())]));
        assert_eq!(diff.deleted, vec!["6".to_string(), "7".to_string()]);
    }

    #[tokio::test]
    async fn test_diff_fn_codec_error_on_deleted_key() {
        let source = build_diff_fn(strict_codec(), |_ns: String| async {
            Ok::<_, MirrorError>(Some(TypedDiff {
                added: HashMap::new(),
                deleted: vec![13u64],
            }))
        });

        assert!(source.diff("Numbers").await.is_err());
    }
}
