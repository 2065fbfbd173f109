//! Recovery file snapshot of the crawl state

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reading or writing the recovery file
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid state file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The four identifier sets plus a timestamp
///
/// Sets serialize as sorted arrays. Reading is order-independent and tolerant:
/// missing or `null` sets are empty, and a missing or unparsable timestamp
/// becomes the load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlState {
    #[serde(default, deserialize_with = "lenient_set")]
    pub discovered: BTreeSet<String>,

    #[serde(default, deserialize_with = "lenient_set")]
    pub pending: BTreeSet<String>,

    #[serde(default, deserialize_with = "lenient_set")]
    pub completed: BTreeSet<String>,

    #[serde(default, deserialize_with = "lenient_set")]
    pub failed: BTreeSet<String>,

    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub last_updated: DateTime<Utc>,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self {
            discovered: BTreeSet::new(),
            pending: BTreeSet::new(),
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
            last_updated: Utc::now(),
        }
    }
}

impl CrawlState {
    /// Reads a recovery file
    ///
    /// # Returns
    ///
    /// * `Ok(Some(CrawlState))` - The file exists and parsed
    /// * `Ok(None)` - There is no recovery file
    /// * `Err(StateError)` - The file exists but could not be read or parsed
    pub fn load(path: &Path) -> Result<Option<Self>, StateError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StateError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StateError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Writes the recovery file
    ///
    /// The snapshot goes to a sibling temp file first and is renamed into
    /// place, so an interrupted write never leaves a truncated recovery file.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    /// Deletes the recovery file; a missing file is not an error
    pub fn remove(path: &Path) -> Result<(), StateError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

fn lenient_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeSet<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now))
}

/// Parses RFC 3339, or a naive ISO-8601 timestamp taken as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".scraper_state.json");

        let state = CrawlState {
            discovered: set(&["r1", "r2", "r3", "r4"]),
            pending: set(&["r2"]),
            completed: set(&["r1", "r4"]),
            failed: set(&["r3"]),
            last_updated: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        };

        state.save(&path).unwrap();
        let loaded = CrawlState::load(&path).unwrap().unwrap();

        assert_eq!(loaded, state);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_sets_written_sorted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut state = CrawlState::default();
        state.discovered = set(&["r9", "r10", "r1"]);
        state.save(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["discovered"], serde_json::json!(["r1", "r10", "r9"]));
        assert!(value["last_updated"].is_string());
    }

    #[test]
    fn test_load_is_order_independent_and_lenient() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{
                "discovered": ["r3", "r1", "r2", "r1"],
                "pending": null,
                "failed": ["r2"],
                "last_updated": "2024-01-02T03:04:05.123456"
            }"#,
        )
        .unwrap();

        let state = CrawlState::load(&path).unwrap().unwrap();
        assert_eq!(state.discovered, set(&["r1", "r2", "r3"]));
        assert!(state.pending.is_empty());
        assert!(state.completed.is_empty());
        assert_eq!(state.failed, set(&["r2"]));
        assert_eq!(
            state.last_updated.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-01-02 03:04:05"
        );
    }

    #[test]
    fn test_bad_timestamp_falls_back_to_now() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"last_updated": "yesterday-ish"}"#).unwrap();

        let before = Utc::now();
        let state = CrawlState::load(&path).unwrap().unwrap();
        assert!(state.last_updated >= before);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(CrawlState::load(&dir.path().join("none.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "[[[").unwrap();
        assert!(matches!(
            CrawlState::load(&path),
            Err(StateError::Parse { .. })
        ));
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        CrawlState::default().save(&path).unwrap();

        CrawlState::remove(&path).unwrap();
        assert!(!path.exists());
        // Removing again is fine
        CrawlState::remove(&path).unwrap();
    }
}
