//! Resumable-run bookkeeping: a persistent per-file progress tracker and an
//! append-only error log.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use chrono::Utc;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Error,
}

/// One processed-file record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub status: FileStatus,
    /// Fingerprint of the input file at processing time.
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerSummary {
    success: usize,
    error: usize,
    total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackerData {
    files: Option<BTreeMap<String, FileEntry>>,
    #[serde(default)]
    updated: String,
    #[serde(default)]
    summary: TrackerSummary,
}

/// Quick content fingerprint: first 4 bytes of MD5 over "<size>_<mtime>".
/// Cheap enough to compute on every `is_processed` probe; any change to the
/// file flips it.
fn file_fingerprint(path: &Path) -> Option<String> {
    let meta = fs::metadata(path).ok()?;
    let mtime = meta
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_secs();
    let digest = Md5::digest(format!("{}_{}", meta.len(), mtime).as_bytes());
    Some(hex::encode(&digest[..4]))
}

/// Tracks per-file outcomes so interrupted runs can resume without
/// re-processing completed files. Single-process; mutations persist
/// immediately and persistence failures are non-fatal.
pub struct Tracker {
    progress_file: Option<PathBuf>,
    processed: Mutex<BTreeMap<String, FileEntry>>,
}

impl Tracker {
    pub fn new(progress_file: Option<&Path>) -> Tracker {
        let mut processed = BTreeMap::new();
        if let Some(path) = progress_file {
            if let Some(loaded) = load_entries(path) {
                processed = loaded;
            }
        }
        Tracker {
            progress_file: progress_file.map(Path::to_path_buf),
            processed: Mutex::new(processed),
        }
    }

    /// True iff the file was marked successful and is unchanged on disk.
    /// A missing file, a changed file, or an error entry all report false.
    pub fn is_processed(&self, path: &Path) -> bool {
        let processed = self.processed.lock().expect("tracker lock poisoned");

        let Some(entry) = processed.get(&path_key(path)) else {
            return false;
        };
        if entry.status != FileStatus::Success {
            return false;
        }
        match file_fingerprint(path) {
            Some(current) => entry.hash == current,
            None => false,
        }
    }

    pub fn mark_success(&self, path: &Path, output_path: &Path) {
        let mut processed = self.processed.lock().expect("tracker lock poisoned");
        processed.insert(
            path_key(path),
            FileEntry {
                status: FileStatus::Success,
                hash: file_fingerprint(path).unwrap_or_default(),
                output: Some(output_path.display().to_string()),
                error: None,
                timestamp: Utc::now().to_rfc3339(),
            },
        );
        self.save(&processed);
    }

    pub fn mark_error(&self, path: &Path, error_msg: &str) {
        let mut processed = self.processed.lock().expect("tracker lock poisoned");
        processed.insert(
            path_key(path),
            FileEntry {
                status: FileStatus::Error,
                hash: file_fingerprint(path).unwrap_or_default(),
                output: None,
                error: Some(error_msg.to_string()),
                timestamp: Utc::now().to_rfc3339(),
            },
        );
        self.save(&processed);
    }

    /// Drops every error entry so the next run retries those files.
    /// Returns the number removed.
    pub fn clear_failed(&self) -> usize {
        let mut processed = self.processed.lock().expect("tracker lock poisoned");
        let before = processed.len();
        processed.retain(|_, entry| entry.status != FileStatus::Error);
        let removed = before - processed.len();
        if removed > 0 {
            self.save(&processed);
        }
        removed
    }

    /// (success, error) counts.
    pub fn stats(&self) -> (usize, usize) {
        let processed = self.processed.lock().expect("tracker lock poisoned");
        let success = processed
            .values()
            .filter(|e| e.status == FileStatus::Success)
            .count();
        (success, processed.len() - success)
    }

    fn save(&self, processed: &BTreeMap<String, FileEntry>) {
        let Some(path) = &self.progress_file else {
            return;
        };

        let success = processed
            .values()
            .filter(|e| e.status == FileStatus::Success)
            .count();
        let data = TrackerData {
            files: Some(processed.clone()),
            updated: Utc::now().to_rfc3339(),
            summary: TrackerSummary {
                success,
                error: processed.len() - success,
                total: processed.len(),
            },
        };

        match serde_json::to_string_pretty(&data) {
            Ok(json) => {
                if let Err(err) = fs::write(path, json) {
                    tracing::warn!("could not save progress file: {err}");
                }
            }
            Err(err) => tracing::warn!("could not serialize progress data: {err}"),
        }
    }
}

fn path_key(path: &Path) -> String {
    path.display().to_string()
}

fn load_entries(path: &Path) -> Option<BTreeMap<String, FileEntry>> {
    let data = fs::read(path).ok()?;
    match serde_json::from_slice::<TrackerData>(&data) {
        Ok(parsed) => Some(parsed.files.unwrap_or_default()),
        Err(err) => {
            tracing::warn!("could not load progress file {}: {err}", path.display());
            None
        }
    }
}

/// Append-only error log: one `<timestamp> | <basename> | <message>` line
/// per failure, also retained in memory for the run summary.
pub struct ErrorLogger {
    log_file: Option<PathBuf>,
    inner: Mutex<LoggerInner>,
}

/// One in-memory error record, kept until the logger is dropped.
#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub file: String,
    pub error: String,
    pub timestamp: String,
}

struct LoggerInner {
    file: Option<File>,
    entries: Vec<ErrorEntry>,
}

impl ErrorLogger {
    pub fn new(log_file: Option<&Path>) -> anyhow::Result<ErrorLogger> {
        use anyhow::Context;

        let file = match log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).context("could not create log directory")?;
                }
                Some(
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .context("could not open log file")?,
                )
            }
            None => None,
        };

        Ok(ErrorLogger {
            log_file: log_file.map(Path::to_path_buf),
            inner: Mutex::new(LoggerInner {
                file,
                entries: Vec::new(),
            }),
        })
    }

    pub fn log(&self, path: &Path, error_msg: &str) {
        let mut inner = self.inner.lock().expect("error log lock poisoned");

        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let entry = ErrorEntry {
            file: basename,
            error: error_msg.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };

        if let Some(file) = inner.file.as_mut() {
            let line = format!("{} | {} | {}\n", entry.timestamp, entry.file, entry.error);
            if let Err(err) = file.write_all(line.as_bytes()) {
                tracing::warn!("could not append to error log: {err}");
            }
        }
        inner.entries.push(entry);
    }

    pub fn error_count(&self) -> usize {
        self.inner.lock().expect("error log lock poisoned").entries.len()
    }

    pub fn summary(&self) -> String {
        let count = self.error_count();
        if count == 0 {
            return "No errors".to_string();
        }
        match &self.log_file {
            Some(path) => format!("{} errors logged to {}", count, path.display()),
            None => format!("{count} errors"),
        }
    }
}
