// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mirror contract and its storage backends.
//!
//! - [`traits`]: the [`Mirror`](traits::Mirror) trait, sources and diff types
//! - [`file`]: one JSON file per namespace
//! - [`redis`]: one Redis hash per namespace
//! - [`pattern`]: `*`-only field matching used by the file backend

pub mod file;
pub mod pattern;
pub mod redis;
pub mod traits;

pub use traits::scan_all;
