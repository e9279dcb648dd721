// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! File-backed mirror: one pretty-printed JSON object per namespace.
//!
//! ```text
//! <base_dir>/
//!   ProcessorAllocations.json   {"1": "...", "2": "..."}
//!   IndexerInfos.json
//! ```
//!
//! Intended for tests and single-node deployments. The instance owns its base
//! directory; files must not be edited while the mirror is in use.
//!
//! # Locking
//!
//! Each namespace file has its own async `RwLock` held in a lock table. Writes
//! hold it exclusively for the whole read-modify-write cycle, including the
//! call into the caller's source, so a source must not read back the
//! namespace it is producing. Reads share it. Unrelated namespaces never
//! block each other.
//!
//! # Scan cursors
//!
//! The cursor is an offset into the sorted field names of the namespace at
//! the time of the call. Writes between pages can shift offsets; an offset
//! past the end yields an empty final page.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::pattern;
use super::traits::{
    unseen, DiffSource, Emitter, Mirror, MirrorError, ScanCursor, ScanPage, StateDiff,
    StreamSource, SyncSource,
};
use crate::config::MirrorConfig;
use crate::metrics::{self, LatencyTimer};

const BACKEND: &str = "file";

pub struct FileMirror {
    base_dir: PathBuf,
    extension: String,
    scan_count: usize,
    stream_batch_size: usize,
    /// Keyed by file name so namespaces that sanitize to the same file share a lock
    locks: DashMap<String, Arc<RwLock<()>>>,
}

impl FileMirror {
    /// Create a file mirror rooted at `base_dir` with default settings.
    ///
    /// The directory is created on first write.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let defaults = MirrorConfig::default();
        Self {
            base_dir: base_dir.into(),
            extension: defaults.file_extension,
            scan_count: defaults.scan_count,
            stream_batch_size: defaults.stream_batch_size,
            locks: DashMap::new(),
        }
    }

    /// Build from config; `file_dir` is required.
    pub fn from_config(config: &MirrorConfig) -> Result<Self, MirrorError> {
        let base_dir = config
            .file_dir
            .clone()
            .ok_or_else(|| MirrorError::Backend("file mirror requires file_dir".into()))?;

        Ok(Self {
            base_dir,
            extension: config.file_extension.clone(),
            scan_count: config.scan_count.max(1),
            stream_batch_size: config.stream_batch_size.max(1),
            locks: DashMap::new(),
        })
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    #[must_use]
    pub fn with_stream_batch_size(mut self, size: usize) -> Self {
        self.stream_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file backing `namespace`.
    #[must_use]
    pub fn path_for(&self, namespace: &str) -> PathBuf {
        self.base_dir.join(self.file_name(namespace))
    }

    fn file_name(&self, namespace: &str) -> String {
        format!("{}{}", namespace.replace(['/', '\\'], "_"), self.extension)
    }

    fn lock_for(&self, namespace: &str) -> Arc<RwLock<()>> {
        self.locks
            .entry(self.file_name(namespace))
            .or_default()
            .clone()
    }

    /// Read a namespace; a missing file is an empty namespace.
    async fn load(&self, namespace: &str) -> Result<BTreeMap<String, String>, MirrorError> {
        let path = self.path_for(namespace);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(MirrorError::Io {
                    namespace: namespace.to_string(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| MirrorError::Corrupt {
            namespace: namespace.to_string(),
            source,
        })
    }

    /// Write a namespace via temp file + rename so readers never see a torn file.
    async fn persist(
        &self,
        namespace: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), MirrorError> {
        let io_err = |source| MirrorError::Io {
            namespace: namespace.to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.base_dir).await.map_err(io_err)?;

        let mut bytes = serde_json::to_vec_pretty(fields)
            .map_err(|e| MirrorError::Backend(format!("Failed to serialize namespace: {}", e)))?;
        bytes.push(b'\n');

        let path = self.path_for(namespace);
        let tmp = self.base_dir.join(format!(".{}.tmp", self.file_name(namespace)));
        tokio::fs::write(&tmp, &bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        Ok(())
    }

    async fn upsert_locked(
        &self,
        namespace: &str,
        source: &dyn SyncSource,
    ) -> Result<(), MirrorError> {
        let lock = self.lock_for(namespace);
        let _guard = lock.write().await;

        let desired = source.fetch(namespace).await?;
        let current = self.load(namespace).await?;
        let diff = StateDiff::reconcile(current.keys(), desired);

        debug!(fields = diff.added.len(), stale = diff.deleted.len(), "Replacing namespace contents");

        let written = diff.added.len();
        let stored: BTreeMap<String, String> = diff.added.into_iter().collect();
        self.persist(namespace, &stored).await?;

        metrics::record_fields_written(BACKEND, written);
        metrics::record_fields_deleted(BACKEND, diff.deleted.len());
        Ok(())
    }

    async fn upsert_streaming_locked(
        &self,
        namespace: &str,
        source: &dyn StreamSource,
    ) -> Result<(), MirrorError> {
        let lock = self.lock_for(namespace);
        let _guard = lock.write().await;

        let mut emitter = FileEmitter {
            mirror: self,
            namespace,
            stored: self.load(namespace).await?,
            seen: HashSet::new(),
            pending: 0,
        };

        // On error the unflushed tail is dropped and no sweep runs
        source.stream(namespace, &mut emitter).await?;

        let FileEmitter { mut stored, seen, pending, .. } = emitter;
        let stale = unseen(stored.keys(), &seen);
        for field in &stale {
            stored.remove(field);
        }
        self.persist(namespace, &stored).await?;

        if !stale.is_empty() {
            info!(stale = stale.len(), kept = stored.len(), "Swept stale fields after streaming upsert");
        }
        metrics::record_fields_written(BACKEND, pending);
        metrics::record_fields_deleted(BACKEND, stale.len());
        Ok(())
    }

    async fn apply_locked(&self, namespace: &str, source: &dyn DiffSource) -> Result<(), MirrorError> {
        let lock = self.lock_for(namespace);
        let _guard = lock.write().await;

        let diff = source.diff(namespace).await?.ok_or_else(|| MirrorError::NilDiff {
            namespace: namespace.to_string(),
        })?;

        if diff.is_empty() {
            debug!("Empty diff, nothing to apply");
            return Ok(());
        }

        let mut stored = self.load(namespace).await?;
        for field in &diff.deleted {
            stored.remove(field);
        }
        let (written, deleted) = (diff.added.len(), diff.deleted.len());
        stored.extend(diff.added);
        self.persist(namespace, &stored).await?;

        debug!(written, deleted, "Applied diff");
        metrics::record_fields_written(BACKEND, written);
        metrics::record_fields_deleted(BACKEND, deleted);
        Ok(())
    }

    async fn read_locked(&self, namespace: &str) -> Result<BTreeMap<String, String>, MirrorError> {
        let lock = self.lock_for(namespace);
        let _guard = lock.read().await;
        self.load(namespace).await
    }
}

/// Applies emitted pairs to the in-memory copy and persists every full batch.
struct FileEmitter<'a> {
    mirror: &'a FileMirror,
    namespace: &'a str,
    stored: BTreeMap<String, String>,
    seen: HashSet<String>,
    pending: usize,
}

#[async_trait]
impl<'a> Emitter for FileEmitter<'a> {
    async fn emit(&mut self, field: String, value: String) -> Result<(), MirrorError> {
        self.seen.insert(field.clone());
        self.stored.insert(field, value);
        self.pending += 1;

        if self.pending >= self.mirror.stream_batch_size {
            self.mirror.persist(self.namespace, &self.stored).await?;
            debug!(flushed = self.pending, "Flushed streaming batch");
            metrics::record_fields_written(BACKEND, self.pending);
            metrics::record_stream_flush(BACKEND);
            self.pending = 0;
        }
        Ok(())
    }
}

#[async_trait]
impl Mirror for FileMirror {
    #[instrument(skip(self, source), fields(backend = BACKEND))]
    async fn upsert(&self, namespace: &str, source: &dyn SyncSource) -> Result<(), MirrorError> {
        let _timer = LatencyTimer::new(BACKEND, "upsert");
        let result = self.upsert_locked(namespace, source).await;
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
        let result = self.upsert_streaming_locked(namespace, source).await;
        metrics::record_result(BACKEND, "upsert_streaming", &result);
        result
    }

    #[instrument(skip(self, source), fields(backend = BACKEND))]
    async fn apply(&self, namespace: &str, source: &dyn DiffSource) -> Result<(), MirrorError> {
        let _timer = LatencyTimer::new(BACKEND, "apply");
        let result = self.apply_locked(namespace, source).await;
        metrics::record_result(BACKEND, "apply", &result);
        result
    }

    async fn get(&self, namespace: &str, field: &str) -> Result<Option<String>, MirrorError> {
        let result = self
            .read_locked(namespace)
            .await
            .map(|mut stored| stored.remove(field));
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

        let result = self.read_locked(namespace).await.map(|mut stored| {
            fields
                .iter()
                .filter_map(|field| stored.remove_entry(field))
                .collect()
        });
        metrics::record_result(BACKEND, "mget", &result);
        result
    }

    async fn get_all(&self, namespace: &str) -> Result<HashMap<String, String>, MirrorError> {
        let result = self
            .read_locked(namespace)
            .await
            .map(|stored| stored.into_iter().collect());
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
        let stored = self.read_locked(namespace).await;
        metrics::record_result(BACKEND, "scan", &stored);
        let stored = stored?;

        let start = match ScanCursor::from_wire(cursor) {
            ScanCursor::Start => 0,
            ScanCursor::At(offset) => usize::try_from(offset).unwrap_or(usize::MAX),
        };
        let total = stored.len();
        if start >= total {
            return Ok(ScanPage::default());
        }

        let end = start.saturating_add(count).min(total);
        let entries = stored
            .into_iter()
            .skip(start)
            .take(end - start)
            .filter(|(field, _)| pattern::matches(pattern, field))
            .collect();
        let cursor = if end >= total { 0 } else { end as u64 };

        Ok(ScanPage { cursor, entries })
    }
}
