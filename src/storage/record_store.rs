//! One-file-per-record JSON store

use crate::record::Record;
use crate::storage::{StorageError, StorageResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Result of scanning the output directory at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Records with content, plus unreadable files (never retried automatically)
    pub complete: Vec<String>,

    /// Records without ingredients and steps
    pub incomplete: Vec<String>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.complete.is_empty() && self.incomplete.is_empty()
    }
}

/// File-backed record store rooted at the output directory
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the JSON file for a record identifier
    ///
    /// The identifier must be a plain file name: no separators, no leading
    /// dot, nothing that could resolve outside the store root.
    pub fn record_path(&self, id: &str) -> StorageResult<PathBuf> {
        if !is_plain_file_name(id) {
            return Err(StorageError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(format!("{}.json", id)))
    }

    /// Whether a record file exists; invalid identifiers never exist
    pub fn exists(&self, id: &str) -> bool {
        self.record_path(id).is_ok_and(|path| path.is_file())
    }

    /// Writes (or overwrites) the record file
    ///
    /// The JSON goes to `<id>.json.tmp` first and is renamed into place, so a
    /// crash mid-write never leaves a truncated `<id>.json` behind.
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Path of the written file
    /// * `Err(StorageError)` - Invalid identifier, or directory creation,
    ///   serialization or write failed
    pub fn save(&self, record: &Record) -> StorageResult<PathBuf> {
        let path = self.record_path(&record.id)?;

        fs::create_dir_all(&self.root).map_err(|source| StorageError::Io {
            path: self.root.clone(),
            source,
        })?;

        let json =
            serde_json::to_string_pretty(record).map_err(|source| StorageError::Serialization {
                path: path.clone(),
                source,
            })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::trace!("Saved record {} to {}", record.id, path.display());
        Ok(path)
    }

    /// Loads a record
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Record))` - The record was found and parsed
    /// * `Ok(None)` - No file exists for this identifier
    /// * `Err(StorageError)` - The file exists but could not be read or parsed
    pub fn load(&self, id: &str) -> StorageResult<Option<Record>> {
        let path = self.record_path(id)?;
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|source| StorageError::Serialization { path, source }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    /// Enumerates all stored records once and classifies them
    ///
    /// Dot-files (such as the recovery file) and leftover `*.json.tmp` files
    /// are ignored. A corrupt or
    /// unreadable record is reported as complete so that legacy data that cannot
    /// be parsed is not re-downloaded on every run.
    pub fn scan_existing(&self) -> StorageResult<ScanReport> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ScanReport::default()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut report = ScanReport::default();

        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();

            let Some(id) = record_id_from_path(&path) else {
                continue;
            };

            match self.load(&id) {
                Ok(Some(record)) if record.is_complete() => report.complete.push(id),
                Ok(Some(_)) => report.incomplete.push(id),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("Treating unreadable record {} as complete: {}", id, e);
                    report.complete.push(id);
                }
            }
        }

        report.complete.sort();
        report.incomplete.sort();

        if !report.is_empty() {
            tracing::info!(
                "Found {} complete, {} incomplete recipes",
                report.complete.len(),
                report.incomplete.len()
            );
        }

        Ok(report)
    }
}

fn is_plain_file_name(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\', '\0'])
        && Path::new(id).components().count() == 1
}

/// Extracts the record identifier from a `<id>.json` file path
fn record_id_from_path(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }

    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }

    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || stem.starts_with('.') {
        return None;
    }

    Some(stem.to_string())
}
