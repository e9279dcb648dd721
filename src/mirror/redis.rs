// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis-backed mirror: one hash per namespace.
//!
//! ```text
//! HSET state-mirror:v1:ProcessorAllocations 1 "{...}" 2 "{...}"
//!      └──── prefix ──┘└──── namespace ───┘ └ field/value pairs ┘
//! ```
//!
//! Writes are pipelined so each batch costs one round trip:
//!
//! - `upsert`: `HKEYS`, then `HDEL <stale…>` + `HSET <desired…>`
//! - `upsert_streaming`: `HSET` per pair, flushed every `stream_batch_size`
//!   pairs, then an `HSCAN` sweep issuing `HDEL` for fields not emitted
//! - `apply`: `HDEL <deleted…>` + `HSET <added…>`
//!
//! The pipeline is not a transaction, and concurrent writers to the same
//! namespace are not serialized here. The connection is shared with the rest
//! of the process and is never closed by the mirror.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, pipe, AsyncCommands, Client, RedisError};
use tracing::{debug, info, instrument};

use super::traits::{
    DiffSource, Emitter, Mirror, MirrorError, ScanPage, StateDiff, StreamSource, SyncSource,
};
use crate::config::MirrorConfig;
use crate::metrics::{self, LatencyTimer};
use crate::resilience::retry::{retry, RetryConfig};

const BACKEND: &str = "redis";

pub struct RedisMirror {
    connection: ConnectionManager,
    prefix: String,
    scan_count: usize,
    stream_batch_size: usize,
}

impl RedisMirror {
    /// Wrap an existing connection. The caller keeps ownership of the server
    /// and may keep using the same connection elsewhere.
    #[must_use]
    pub fn new(connection: ConnectionManager, config: &MirrorConfig) -> Self {
        Self {
            connection,
            prefix: config.redis_prefix.clone(),
            scan_count: config.scan_count.max(1),
            stream_batch_size: config.stream_batch_size.max(1),
        }
    }

    /// Open a connection to `config.redis_url`.
    ///
    /// Uses the startup retry policy: a handful of attempts, then fail fast so
    /// a bad URL is reported instead of hanging.
    pub async fn connect(config: &MirrorConfig) -> Result<Self, MirrorError> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| MirrorError::Backend("redis mirror requires redis_url".into()))?;

        let client = Client::open(url).map_err(|e| MirrorError::Backend(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: RedisError| MirrorError::Backend(e.to_string()))?;

        Ok(Self::new(connection, config))
    }

    /// Get a clone of the connection manager
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Key prefix shared by every namespace hash
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Hash key holding `namespace`.
    #[must_use]
    pub fn hash_key(&self, namespace: &str) -> String {
        hash_key(&self.prefix, namespace)
    }

    async fn upsert_inner(&self, namespace: &str, source: &dyn SyncSource) -> Result<(), MirrorError> {
        let desired = source.fetch(namespace).await?;
        let key = self.hash_key(namespace);
        let mut conn = self.connection.clone();

        let current: Vec<String> = conn
            .hkeys(&key)
            .await
            .map_err(backend_err("HKEYS", namespace))?;
        let diff = StateDiff::reconcile(&current, desired);

        debug!(fields = diff.added.len(), stale = diff.deleted.len(), "Replacing namespace contents");
        self.write_diff(&mut conn, &key, namespace, &diff).await
    }

    async fn upsert_streaming_inner(
        &self,
        namespace: &str,
        source: &dyn StreamSource,
    ) -> Result<(), MirrorError> {
        let key = self.hash_key(namespace);
        let mut emitter = RedisEmitter {
            mirror: self,
            key: &key,
            namespace,
            pending: Vec::with_capacity(self.stream_batch_size),
            seen: HashSet::new(),
        };

        // On error buffered pairs are dropped and no sweep runs
        source.stream(namespace, &mut emitter).await?;
        emitter.flush().await?;

        let seen = emitter.seen;
        let swept = self.sweep_unseen(&key, namespace, &seen).await?;
        if swept > 0 {
            info!(stale = swept, kept = seen.len(), "Swept stale fields after streaming upsert");
        }
        Ok(())
    }

    /// Scan the hash and delete every field not in `seen`, page by page.
    async fn sweep_unseen(
        &self,
        key: &str,
        namespace: &str,
        seen: &HashSet<String>,
    ) -> Result<usize, MirrorError> {
        let mut conn = self.connection.clone();
        let mut cursor = 0u64;
        let mut swept = 0;

        loop {
            let (next, flat): (u64, Vec<String>) = cmd("HSCAN")
                .arg(key)
                .arg(cursor)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut conn)
                .await
                .map_err(backend_err("HSCAN", namespace))?;

            let stale: Vec<String> = flat
                .into_iter()
                .step_by(2)
                .filter(|field| !seen.contains(field))
                .collect();

            for chunk in stale.chunks(self.stream_batch_size) {
                let _: () = cmd("HDEL")
                    .arg(key)
                    .arg(chunk)
                    .query_async(&mut conn)
                    .await
                    .map_err(backend_err("HDEL", namespace))?;
            }
            swept += stale.len();

            if next == 0 {
                break;
            }
            cursor = next;
        }

        metrics::record_fields_deleted(BACKEND, swept);
        Ok(swept)
    }

    async fn apply_inner(&self, namespace: &str, source: &dyn DiffSource) -> Result<(), MirrorError> {
        let diff = source.diff(namespace).await?.ok_or_else(|| MirrorError::NilDiff {
            namespace: namespace.to_string(),
        })?;

        if diff.is_empty() {
            debug!("Empty diff, nothing to apply");
            return Ok(());
        }

        let key = self.hash_key(namespace);
        let mut conn = self.connection.clone();
        self.write_diff(&mut conn, &key, namespace, &diff).await?;
        debug!(written = diff.added.len(), deleted = diff.deleted.len(), "Applied diff");
        Ok(())
    }

    /// One pipelined round trip: `HDEL` the deleted fields, then `HSET` the added ones.
    async fn write_diff(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        namespace: &str,
        diff: &StateDiff,
    ) -> Result<(), MirrorError> {
        if diff.is_empty() {
            return Ok(());
        }

        let mut pipeline = pipe();
        if !diff.deleted.is_empty() {
            pipeline.cmd("HDEL").arg(key).arg(&diff.deleted).ignore();
        }
        if !diff.added.is_empty() {
            pipeline.cmd("HSET").arg(key);
            for (field, value) in &diff.added {
                pipeline.arg(field).arg(value);
            }
            pipeline.ignore();
        }

        pipeline
            .query_async::<()>(conn)
            .await
            .map_err(backend_err("pipeline", namespace))?;

        metrics::record_fields_written(BACKEND, diff.added.len());
        metrics::record_fields_deleted(BACKEND, diff.deleted.len());
        Ok(())
    }
}

/// `<prefix><namespace>`
pub(crate) fn hash_key(prefix: &str, namespace: &str) -> String {
    format!("{}{}", prefix, namespace)
}

/// Pair up a flat `HSCAN` reply (`[field, value, field, value, ...]`).
pub(crate) fn pairs(flat: Vec<String>) -> HashMap<String, String> {
    let mut out = HashMap::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        out.insert(field, value);
    }
    out
}

fn backend_err<'a>(
    op: &'static str,
    namespace: &'a str,
) -> impl FnOnce(RedisError) -> MirrorError + 'a {
    move |e| MirrorError::Backend(format!("{} failed for namespace '{}': {}", op, namespace, e))
}

/// Buffers emitted pairs and pipelines them to Redis every full batch.
struct RedisEmitter<'a> {
    mirror: &'a RedisMirror,
    key: &'a str,
    namespace: &'a str,
    pending: Vec<(String, String)>,
    seen: HashSet<String>,
}

impl RedisEmitter<'_> {
    async fn flush(&mut self) -> Result<(), MirrorError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut pipeline = pipe();
        for (field, value) in &self.pending {
            pipeline.cmd("HSET").arg(self.key).arg(field).arg(value).ignore();
        }

        let mut conn = self.mirror.connection.clone();
        pipeline
            .query_async::<()>(&mut conn)
            .await
            .map_err(backend_err("HSET", self.namespace))?;

        debug!(flushed = self.pending.len(), "Flushed streaming batch");
        metrics::record_fields_written(BACKEND, self.pending.len());
        metrics::record_stream_flush(BACKEND);
        self.pending.clear();
        Ok(())
    }
}

#[async_trait]
impl<'a> Emitter for RedisEmitter<'a> {
    async fn emit(&mut self, field: String, value: String) -> Result<(), MirrorError> {
        self.seen.insert(field.clone());
        self.pending.push((field, value));
        if self.pending.len() >= self.mirror.stream_batch_size {
            self.flush().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Mirror for RedisMirror {
    #[instrument(skip(self, source), fields(backend = BACKEND))]
    async fn upsert(&self, namespace: &str, source: &dyn SyncSource) -> Result<(), MirrorError> {
        let _timer = LatencyTimer::new(BACKEND, "upsert");
        let result = self.upsert_inner(namespace, source).await;
        metrics::record_result(BACKEND, "upsert", &result);
        result
    }

    #[instrument(skip(self, source), fields(backend = BACKEND))]
    async fn upsert_streaming(
        &self,
        namespace: &str,
        source: &dyn StreamSource,
    ) -> Result<(), MirrorError> {
        let _timer = LatencyTimer::new(BACKEND, "upsert_streaming");
        let result = self.upsert_streaming_inner(namespace, source).await;
        metrics::record_result(BACKEND, "upsert_streaming", &result);
        result
    }

    #[instrument(skip(self, source), fields(backend = BACKEND))]
    async fn apply(&self, namespace: &str, source: &dyn DiffSource) -> Result<(), MirrorError> {
        let _timer = LatencyTimer::new(BACKEND, "apply");
        let result = self.apply_inner(namespace, source).await;
        metrics::record_result(BACKEND, "apply", &result);
        result
    }

    async fn get(&self, namespace: &str, field: &str) -> Result<Option<String>, MirrorError> {
        let mut conn = self.connection.clone();
        let result = conn
            .hget(self.hash_key(namespace), field)
            .await
            .map_err(backend_err("HGET", namespace));
        metrics::record_result(BACKEND, "get", &result);
        result
    }

    async fn mget(
        &self,
        namespace: &str,
        fields: &[String],
    ) -> Result<HashMap<String, String>, MirrorError> {
        if fields.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.connection.clone();
        let result: Result<Vec<Option<String>>, MirrorError> = cmd("HMGET")
            .arg(self.hash_key(namespace))
            .arg(fields)
            .query_async(&mut conn)
            .await
            .map_err(backend_err("HMGET", namespace));
        metrics::record_result(BACKEND, "mget", &result);

        Ok(fields
            .iter()
            .zip(result?)
            .filter_map(|(field, value)| value.map(|v| (field.clone(), v)))
            .collect())
    }

    async fn get_all(&self, namespace: &str) -> Result<HashMap<String, String>, MirrorError> {
        let mut conn = self.connection.clone();
        let result = conn
            .hgetall(self.hash_key(namespace))
            .await
            .map_err(backend_err("HGETALL", namespace));
        metrics::record_result(BACKEND, "get_all", &result);
        result
    }

    async fn scan(
        &self,
        namespace: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<ScanPage, MirrorError> {
        let count = if count == 0 { self.scan_count } else { count };

        let mut command = cmd("HSCAN");
        command.arg(self.hash_key(namespace)).arg(cursor);
        if !pattern.is_empty() {
            command.arg("MATCH").arg(pattern);
        }
        command.arg("COUNT").arg(count);

        let mut conn = self.connection.clone();
        let result: Result<(u64, Vec<String>), MirrorError> = command
            .query_async(&mut conn)
            .await
            .map_err(backend_err("HSCAN", namespace));
        metrics::record_result(BACKEND, "scan", &result);

        let (cursor, flat) = result?;
        Ok(ScanPage {
            cursor,
            entries: pairs(flat),
        })
    }
}
