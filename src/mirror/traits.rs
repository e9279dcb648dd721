// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The backend-agnostic mirror contract.
//!
//! A [`Mirror`] stores one hash-like mapping (field → value, both strings) per
//! namespace. Writes are driven by caller-supplied sources:
//!
//! | Operation | Source | Semantics |
//! |-----------|--------|-----------|
//! | [`Mirror::upsert`] | [`SyncSource`] | storage becomes exactly the fetched map |
//! | [`Mirror::upsert_streaming`] | [`StreamSource`] | batched writes, then stale sweep |
//! | [`Mirror::apply`] | [`DiffSource`] | deletions first, then additions |
//!
//! Reads never treat absence as an error: a missing field is `Ok(None)` from
//! [`Mirror::get`] and simply omitted from [`Mirror::mget`].

use std::collections::{HashMap, HashSet};
use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("I/O error on namespace '{namespace}': {source}")]
    Io {
        namespace: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt mirror file for namespace '{namespace}': {source}")]
    Corrupt {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Diff source returned no diff for namespace '{namespace}'")]
    NilDiff { namespace: String },
    #[error("Source error: {0}")]
    Source(String),
}

impl MirrorError {
    /// Wrap a caller-side failure (fetch, stream or diff callback).
    pub fn source(err: impl std::fmt::Display) -> Self {
        MirrorError::Source(err.to_string())
    }
}

/// An incremental change set against one namespace.
///
/// A field listed in neither `added` nor `deleted` is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiff {
    pub added: HashMap<String, String>,
    pub deleted: Vec<String>,
}

impl StateDiff {
    #[must_use]
    pub fn new(added: HashMap<String, String>, deleted: Vec<String>) -> Self {
        Self { added, deleted }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }

    /// Build the diff that turns the `current` field set into exactly `desired`.
    ///
    /// Every desired field is (re)written; every current field missing from
    /// `desired` is deleted. Deleted fields come out sorted so backends issue
    /// deterministic commands.
    #[must_use]
    pub fn reconcile<'a, I>(current: I, desired: HashMap<String, String>) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut deleted: Vec<String> = current
            .into_iter()
            .filter(|field| !desired.contains_key(*field))
            .cloned()
            .collect();
        deleted.sort_unstable();
        deleted.dedup();
        Self { added: desired, deleted }
    }
}

/// Scan position.
///
/// On the wire a cursor is a plain `u64` where `0` means both "start a new
/// scan" (as a request) and "scan complete" (as a response). This type keeps
/// the request side explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCursor {
    Start,
    At(u64),
}

impl ScanCursor {
    #[must_use]
    pub fn from_wire(cursor: u64) -> Self {
        if cursor == 0 {
            ScanCursor::Start
        } else {
            ScanCursor::At(cursor)
        }
    }

    #[must_use]
    pub fn to_wire(self) -> u64 {
        match self {
            ScanCursor::Start => 0,
            ScanCursor::At(n) => n,
        }
    }
}

/// One page of a [`Mirror::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next call; `0` once the scan is complete.
    pub cursor: u64,
    pub entries: HashMap<String, String>,
}

impl ScanPage {
    /// True when this page is the last one.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cursor == 0
    }
}

/// Produces the complete desired map for a namespace.
#[async_trait]
pub trait SyncSource: Send + Sync {
    async fn fetch(&self, namespace: &str) -> Result<HashMap<String, String>, MirrorError>;
}

/// Receives pairs from a [`StreamSource`].
#[async_trait]
pub trait Emitter: Send {
    async fn emit(&mut self, field: String, value: String) -> Result<(), MirrorError>;
}

/// Pushes the desired state of a namespace pair by pair.
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn stream(&self, namespace: &str, emit: &mut dyn Emitter) -> Result<(), MirrorError>;
}

/// Computes an incremental diff for a namespace.
///
/// Returning `Ok(None)` is a contract violation and is rejected by
/// [`Mirror::apply`]; return an empty [`StateDiff`] for "no changes".
#[async_trait]
pub trait DiffSource: Send + Sync {
    async fn diff(&self, namespace: &str) -> Result<Option<StateDiff>, MirrorError>;
}

#[async_trait]
impl<F, Fut> SyncSource for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HashMap<String, String>, MirrorError>> + Send + 'static,
{
    async fn fetch(&self, namespace: &str) -> Result<HashMap<String, String>, MirrorError> {
        (self)(namespace.to_string()).await
    }
}

#[async_trait]
impl<F, Fut> DiffSource for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<StateDiff>, MirrorError>> + Send + 'static,
{
    async fn diff(&self, namespace: &str) -> Result<Option<StateDiff>, MirrorError> {
        (self)(namespace.to_string()).await
    }
}

/// Namespace-scoped, hash-like storage kept in sync with an external source of truth.
#[async_trait]
pub trait Mirror: Send + Sync {
    /// Replace the namespace with exactly the map returned by `source`.
    async fn upsert(&self, namespace: &str, source: &dyn SyncSource) -> Result<(), MirrorError>;

    /// Stream the desired state in, then delete every field that was not emitted.
    ///
    /// If the source fails (or this future is dropped) part-way through, batches
    /// already flushed stay written and the stale sweep does not run.
    async fn upsert_streaming(
        &self,
        namespace: &str,
        source: &dyn StreamSource,
    ) -> Result<(), MirrorError>;

    /// Apply a diff: deletions first, then additions/overwrites.
    async fn apply(&self, namespace: &str, source: &dyn DiffSource) -> Result<(), MirrorError>;

    async fn get(&self, namespace: &str, field: &str) -> Result<Option<String>, MirrorError>;

    /// Fetch the requested fields that exist; missing ones are omitted.
    async fn mget(
        &self,
        namespace: &str,
        fields: &[String],
    ) -> Result<HashMap<String, String>, MirrorError>;

    async fn get_all(&self, namespace: &str) -> Result<HashMap<String, String>, MirrorError>;

    /// One page of a cursor scan.
    ///
    /// Start with cursor `0` and call again with the returned cursor until it
    /// comes back `0`. `pattern` supports `*` wildcards (`""` matches all);
    /// `count` is a page-size hint, `0` selects the backend default.
    async fn scan(
        &self,
        namespace: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<ScanPage, MirrorError>;
}

/// Drive [`Mirror::scan`] to completion and merge every page.
pub async fn scan_all(
    mirror: &dyn Mirror,
    namespace: &str,
    pattern: &str,
    count: usize,
) -> Result<HashMap<String, String>, MirrorError> {
    let mut out = HashMap::new();
    let mut cursor = ScanCursor::Start;
    loop {
        let page = mirror.scan(namespace, cursor.to_wire(), pattern, count).await?;
        out.extend(page.entries);
        if page.cursor == 0 {
            return Ok(out);
        }
        cursor = ScanCursor::from_wire(page.cursor);
    }
}

/// Stored fields that were not emitted during a streaming upsert.
pub(crate) fn unseen<'a, I>(stored: I, seen: &HashSet<String>) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    stored
        .into_iter()
        .filter(|field| !seen.contains(*field))
        .cloned()
        .collect()
}
