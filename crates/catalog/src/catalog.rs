// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job configuration catalog: scanning, indexing, reload semantics.
//!
//! A catalog ingests one or more configuration roots in ascending priority
//! order; `foo/bar.conf` under a root defines class `foo/bar`. A file named
//! `@name.conf` is an override fragment applied on top of class `name` after
//! the winning base definition is chosen. Reload keeps byte-identical
//! classes untouched, swaps in changed definitions for future instances, and
//! retires removed classes once their last instance is gone.

use crate::class::JobClass;
use crate::parser::{parse_fragment, ClassBuilder, ParseError};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors from catalog loading
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Parse {
        path: PathBuf,
        source: ParseError,
    },

    #[error("{path}: override fragments may not define process stanzas")]
    OverrideProcess { path: PathBuf },
}

/// A class held by the catalog.
#[derive(Debug, Clone)]
pub struct LoadedClass {
    pub class: Arc<JobClass>,
    /// Content hash over the base file and every applied override.
    pub hash: String,
    /// Set when the backing file disappeared on reload; no new instances.
    pub deleted: bool,
}

/// Result of a `load_all` or `reload` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    /// Files that failed to parse, with rendered errors. A failing file
    /// never poisons the rest of the catalog.
    pub errors: Vec<(PathBuf, String)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The configuration catalog.
#[derive(Debug, Default)]
pub struct Catalog {
    roots: Vec<PathBuf>,
    classes: HashMap<String, LoadedClass>,
}

/// Source files contributing to one class: the winning base plus overrides,
/// in application order.
#[derive(Debug, Default)]
struct ClassSources {
    base: Option<PathBuf>,
    overrides: Vec<PathBuf>,
}

impl Catalog {
    /// A catalog over the given roots, in ascending priority order.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            classes: HashMap::new(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Scan every root and (re)build the class index.
    ///
    /// On first load every valid class is `added`. Subsequent calls behave
    /// as `reload`: unchanged classes keep their entries (bit-identical
    /// catalog for a no-op reload), changed definitions supersede, removed
    /// classes are marked deleted.
    pub fn load_all(&mut self) -> LoadReport {
        let mut report = LoadReport::default();
        let sources = self.scan(&mut report);

        // Build or refresh every discovered class
        let mut seen: Vec<String> = Vec::new();
        for (name, files) in &sources {
            seen.push(name.clone());
            match self.build_class(name, files, &mut report) {
                Some((class, hash)) => {
                    match self.classes.get_mut(name) {
                        Some(existing) if existing.hash == hash => {
                            // Unchanged: keep the entry (and its Arc) as-is,
                            // only clearing a stale deleted marker.
                            existing.deleted = false;
                        }
                        Some(existing) => {
                            existing.class = Arc::new(class);
                            existing.hash = hash;
                            existing.deleted = false;
                            report.changed.push(name.clone());
                        }
                        None => {
                            self.classes.insert(
                                name.clone(),
                                LoadedClass {
                                    class: Arc::new(class),
                                    hash,
                                    deleted: false,
                                },
                            );
                            report.added.push(name.clone());
                        }
                    }
                }
                None => {
                    // Parse failure: an already-loaded definition stays in
                    // service; a new file is skipped entirely.
                }
            }
        }

        // Mark classes whose files disappeared
        for (name, loaded) in self.classes.iter_mut() {
            if !seen.contains(name) && !loaded.deleted {
                loaded.deleted = true;
                report.removed.push(name.clone());
            }
        }

        report.added.sort();
        report.changed.sort();
        report.removed.sort();
        report
    }

    /// Class by exact name; deleted classes are not returned.
    pub fn lookup(&self, name: &str) -> Option<Arc<JobClass>> {
        self.classes
            .get(name)
            .filter(|loaded| !loaded.deleted)
            .map(|loaded| Arc::clone(&loaded.class))
    }

    /// Class by exact name, including deleted entries awaiting retirement.
    pub fn lookup_any(&self, name: &str) -> Option<&LoadedClass> {
        self.classes.get(name)
    }

    /// All live (non-deleted) classes, sorted by name.
    pub fn classes(&self) -> Vec<Arc<JobClass>> {
        let mut names: Vec<&String> = self
            .classes
            .iter()
            .filter(|(_, loaded)| !loaded.deleted)
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.lookup(name))
            .collect()
    }

    /// Name → content hash for every class, deleted included. Snapshot
    /// material for re-exec.
    pub fn hashes(&self) -> BTreeMap<String, String> {
        self.classes
            .iter()
            .map(|(name, loaded)| (name.clone(), loaded.hash.clone()))
            .collect()
    }

    /// Whether the named class is marked deleted.
    pub fn is_deleted(&self, name: &str) -> bool {
        self.classes
            .get(name)
            .map(|loaded| loaded.deleted)
            .unwrap_or(false)
    }

    /// Drop a deleted class once its last instance is destroyed.
    pub fn retire(&mut self, name: &str) {
        if self.is_deleted(name) {
            self.classes.remove(name);
        }
    }

    /// Discover the source files for every class name.
    ///
    /// Later roots override earlier ones wholly for the base file; override
    /// fragments accumulate across all roots in root order.
    fn scan(&self, report: &mut LoadReport) -> BTreeMap<String, ClassSources> {
        let mut sources: BTreeMap<String, ClassSources> = BTreeMap::new();
        for root in &self.roots {
            let mut files = Vec::new();
            collect_conf_files(root, root, &mut files, report);
            for (name, path, is_override) in files {
                let entry = sources.entry(name).or_default();
                if is_override {
                    entry.overrides.push(path);
                } else {
                    entry.base = Some(path);
                }
            }
        }
        // A pure override with no base anywhere defines nothing
        sources.retain(|name, files| {
            if files.base.is_none() {
                warn!(class = %name, "override fragment without base definition ignored");
                false
            } else {
                true
            }
        });
        sources
    }

    /// Parse base + overrides into a class and its content hash.
    fn build_class(
        &self,
        name: &str,
        files: &ClassSources,
        report: &mut LoadReport,
    ) -> Option<(JobClass, String)> {
        let base_path = files.base.as_ref()?;
        let base_content = match std::fs::read_to_string(base_path) {
            Ok(content) => content,
            Err(source) => {
                report.errors.push((
                    base_path.clone(),
                    CatalogError::Io {
                        path: base_path.clone(),
                        source,
                    }
                    .to_string(),
                ));
                return None;
            }
        };

        let mut builder = match parse_fragment(&base_content) {
            Ok(builder) => builder,
            Err(source) => {
                report.errors.push((
                    base_path.clone(),
                    CatalogError::Parse {
                        path: base_path.clone(),
                        source,
                    }
                    .to_string(),
                ));
                return None;
            }
        };

        let mut hasher = Sha256::new();
        hasher.update(base_content.as_bytes());

        for path in &files.overrides {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(source) => {
                    report.errors.push((
                        path.clone(),
                        CatalogError::Io {
                            path: path.clone(),
                            source,
                        }
                        .to_string(),
                    ));
                    continue;
                }
            };
            let fragment = match parse_fragment(&content) {
                Ok(fragment) => fragment,
                Err(source) => {
                    report.errors.push((
                        path.clone(),
                        CatalogError::Parse {
                            path: path.clone(),
                            source,
                        }
                        .to_string(),
                    ));
                    continue;
                }
            };
            if fragment.has_process_stanzas() {
                report.errors.push((
                    path.clone(),
                    CatalogError::OverrideProcess { path: path.clone() }.to_string(),
                ));
                // The override's other fields still apply
                let stripped = strip_processes(fragment);
                builder.merge_override(&stripped);
            } else {
                builder.merge_override(&fragment);
            }
            hasher.update([0u8]);
            hasher.update(content.as_bytes());
        }

        match builder.build(name) {
            Ok(class) => Some((class, format!("{:x}", hasher.finalize()))),
            Err(source) => {
                report.errors.push((
                    base_path.clone(),
                    CatalogError::Parse {
                        path: base_path.clone(),
                        source,
                    }
                    .to_string(),
                ));
                None
            }
        }
    }
}

/// Drop process stanzas from an override fragment.
fn strip_processes(fragment: ClassBuilder) -> ClassBuilder {
    // Rebuilding through merge keeps this future-proof against new fields:
    // merge_override never copies process stanzas.
    let mut stripped = ClassBuilder::default();
    stripped.merge_override(&fragment);
    stripped
}

/// Recursively collect `(class name, path, is_override)` for `.conf` files.
fn collect_conf_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, PathBuf, bool)>,
    report: &mut LoadReport,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) => {
            // A missing root is normal (empty catalog); anything else is
            // worth surfacing.
            if source.kind() != std::io::ErrorKind::NotFound {
                report
                    .errors
                    .push((dir.to_path_buf(), format!("cannot read directory: {source}")));
            }
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_conf_files(root, &path, out, report);
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = file_name.strip_suffix(".conf") else {
            continue;
        };
        let (stem, is_override) = match stem.strip_prefix('@') {
            Some(base) => (base, true),
            None => (stem, false),
        };
        if stem.is_empty() {
            continue;
        }
        let Ok(relative) = path
            .parent()
            .unwrap_or(dir)
            .strip_prefix(root)
        else {
            continue;
        };
        let name = if relative.as_os_str().is_empty() {
            stem.to_string()
        } else {
            format!("{}/{}", relative.display(), stem)
        };
        out.push((name, path, is_override));
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
