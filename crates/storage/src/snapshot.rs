// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The re-exec runtime image.
//!
//! Before replacing its own binary, the supervisor serializes its complete
//! runtime state into a [`RuntimeImage`] on disk; the replacement reads it
//! back and resumes supervision of the same children. The format is
//! versioned and field-tolerant in both directions: unknown fields written
//! by a newer version are carried in `extra` maps and round-tripped
//! untouched, so a downgrade does not lose state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Current image format version.
pub const IMAGE_FORMAT: u32 = 1;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image format {found} is newer than supported ({supported})")]
    FormatTooNew { found: u32, supported: u32 },
}

/// A complete snapshot of supervisor runtime state.
///
/// The engine payload is carried as a JSON value: the daemon owns the typed
/// form, and passing it opaquely here keeps every field a newer engine
/// writes intact across a downgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeImage {
    /// Format version; readers refuse images from the future.
    pub format: u32,
    /// Configuration roots the catalog was built from, in priority order.
    pub catalog_roots: Vec<PathBuf>,
    /// Class name → content hash at snapshot time, for post-restore
    /// drift detection.
    pub class_hashes: BTreeMap<String, String>,
    /// Serialized engine state (instances, queue, environment, session).
    pub engine: serde_json::Value,
    /// Fields written by a newer supervisor version.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RuntimeImage {
    pub fn new(
        catalog_roots: Vec<PathBuf>,
        class_hashes: BTreeMap<String, String>,
        engine: serde_json::Value,
    ) -> Self {
        Self {
            format: IMAGE_FORMAT,
            catalog_roots,
            class_hashes,
            engine,
            extra: serde_json::Map::new(),
        }
    }

    /// Save the image atomically (write to .tmp, fsync, then rename).
    ///
    /// A crash mid-save leaves either the old image or none, never a
    /// truncated one.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load an image.
    ///
    /// Returns `Ok(None)` when no image exists. A corrupt image is moved
    /// aside to `.bak` so the supervisor can start fresh instead of crash
    /// looping on it.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let image: Self = match serde_json::from_reader(reader) {
            Ok(image) => image,
            Err(e) => {
                let bak_path = path.with_extension("bak");
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak_path.display(),
                    "corrupt runtime image, moving aside",
                );
                fs::rename(path, &bak_path)?;
                return Ok(None);
            }
        };

        if image.format > IMAGE_FORMAT {
            return Err(SnapshotError::FormatTooNew {
                found: image.format,
                supported: IMAGE_FORMAT,
            });
        }
        Ok(Some(image))
    }

    /// Load and delete: the normal restore path, so a stale image never
    /// resurrects state on a later boot.
    pub fn take(path: &Path) -> Result<Option<Self>, SnapshotError> {
        let image = Self::load(path)?;
        if image.is_some() {
            fs::remove_file(path)?;
        }
        Ok(image)
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
