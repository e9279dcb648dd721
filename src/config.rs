// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the mirror backends.
//!
//! # Example
//!
//! ```
//! use state_mirror::MirrorConfig;
//!
//! // Minimal config (uses defaults)
//! let config = MirrorConfig::default();
//! assert_eq!(config.file_extension, ".json");
//! assert_eq!(config.stream_batch_size, 256);
//!
//! // File-backed mirror rooted at ./mirror
//! let config = MirrorConfig {
//!     file_dir: Some("./mirror".into()),
//!     ..Default::default()
//! };
//! ```

use std::path::PathBuf;

use serde::Deserialize;

/// Default Redis key prefix. Versioned so a layout change can move to `v2`.
pub const DEFAULT_REDIS_PREFIX: &str = "state-mirror:v1:";

/// Configuration shared by [`FileMirror`](crate::FileMirror) and
/// [`RedisMirror`](crate::RedisMirror).
///
/// All fields have defaults; a file mirror needs `file_dir`, a Redis mirror
/// built with [`RedisMirror::connect`](crate::RedisMirror::connect) needs `redis_url`.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Base directory holding one file per namespace
    #[serde(default)]
    pub file_dir: Option<PathBuf>,

    /// Namespace file extension, including the dot (default: ".json")
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix for namespace hash keys (default: "state-mirror:v1:")
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,

    /// Page size used when `scan` is called with `count == 0`,
    /// and by the stale-field sweep
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,

    /// Pairs buffered per flush during streaming upserts
    #[serde(default = "default_stream_batch_size")]
    pub stream_batch_size: usize,
}

fn default_file_extension() -> String { ".json".to_string() }
fn default_redis_prefix() -> String { DEFAULT_REDIS_PREFIX.to_string() }
fn default_scan_count() -> usize { 100 }
fn default_stream_batch_size() -> usize { 256 }

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            file_dir: None,
            file_extension: default_file_extension(),
            redis_url: None,
            redis_prefix: default_redis_prefix(),
            scan_count: default_scan_count(),
            stream_batch_size: default_stream_batch_size(),
        }
    }
}
