//! # State Mirror
//!
//! Keeps a namespaced, hash-like store in sync with an external source of truth.
//!
//! ## Architecture
//!
//! A namespace is a flat `field → value` map of strings. Sources describe the
//! desired contents; a [`Mirror`] makes the stored namespace match them.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain sources                         │
//! │  • TypedSyncSource / TypedStreamSource / TypedDiffSource   │
//! │  • Work in domain types (u64 → Allocation, ...)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (Codec: key ⇄ field, value ⇄ string)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Mirror sources                           │
//! │  • SyncSource: full desired map                            │
//! │  • StreamSource: pair by pair, stale fields swept after    │
//! │  • DiffSource: incremental added/deleted                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Mirror backends                        │
//! │  • FileMirror: one pretty-printed JSON file per namespace  │
//! │  • RedisMirror: one hash per namespace, pipelined writes   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TypedMirror reads                       │
//! │  • get / mget / get_all / scan, decoded through the Codec  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use state_mirror::{build_sync_fn, FileMirror, JsonCodec, Mirror, MirrorError, TypedMirror};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MirrorError> {
//!     let mirror: Arc<dyn Mirror> = Arc::new(FileMirror::new("./mirror"));
//!     let codec = Arc::new(JsonCodec::<u64, String>::display());
//!
//!     // Replace the namespace with the desired state
//!     let source = build_sync_fn(codec.clone(), |_ns: String| async {
//!         Ok::<_, MirrorError>(HashMap::from([(1u64, "alice".to_string())]))
//!     });
//!     mirror.upsert("Users", &source).await?;
//!
//!     // Read it back in domain types
//!     let users = TypedMirror::new(mirror, "Users", codec);
//!     assert_eq!(users.get(&1).await?, Some("alice".to_string()));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Exact Upserts**: After an upsert the namespace holds exactly the desired map
//! - **Streaming Upserts**: Bounded memory, stale fields swept once the stream completes
//! - **Incremental Diffs**: Apply only what changed
//! - **Cursor Scans**: Paginated reads with glob-style field patterns
//! - **Typed Access**: Codecs bridge domain keys/values and stored strings
//!
//! ## Configuration
//!
//! See [`MirrorConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`mirror`]: The [`Mirror`] trait and its File and Redis backends
//! - [`codec`]: Key/value codecs
//! - [`adapters`]: Typed sources wrapped as mirror sources
//! - [`typed`]: Typed read façade
//! - [`resilience`]: Connection retry
//! - [`metrics`]: Operation counters and latency histograms

pub mod adapters;
pub mod codec;
pub mod config;
pub mod metrics;
pub mod mirror;
pub mod resilience;
pub mod typed;

pub use adapters::{
    build_diff_fn, build_streaming_sync_fn, build_sync_fn, CodecDiffSource, CodecStreamSource,
    CodecSyncSource, TypedDiff, TypedDiffSource, TypedEmitter, TypedStreamSource, TypedSyncSource,
};
pub use codec::{Codec, CodecError, JsonCodec};
pub use config::MirrorConfig;
pub use metrics::LatencyTimer;
pub use mirror::file::FileMirror;
pub use mirror::redis::RedisMirror;
pub use mirror::traits::{
    scan_all, DiffSource, Emitter, Mirror, MirrorError, ScanCursor, ScanPage, StateDiff,
    StreamSource, SyncSource,
};
pub use resilience::retry::RetryConfig;
pub use typed::{TypedMirror, TypedScanPage};
