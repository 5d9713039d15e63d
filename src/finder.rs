//! DICOM file discovery.
//!
//! Real-world study folders mix DICOM files (often extensionless) with
//! viewers, indexes and OS litter, so discovery filters by name and
//! extension first and falls back to the `DICM` magic-bytes probe.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

/// Recognized DICOM file extensions (compared lowercase).
pub const DICOM_EXTENSIONS: &[&str] = &["dcm", "dicom"];

/// Filenames to skip outright.
pub const EXCLUDED_NAMES: &[&str] = &[
    "DICOMDIR",
    ".progress.json",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    "Makefile",
    "README",
    "README.md",
    "LICENSE",
    "CHANGELOG",
    "CHANGELOG.md",
    ".gitignore",
];

/// Extensions that are never DICOM (compared lowercase, without the dot).
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    "go", "py", "js", "ts", "rs", "json", "yaml", "yml", "xml", "txt", "md", "log", "csv", "exe",
    "dll", "so", "dylib", "app", "zip", "tar", "gz", "rar", "7z", "png", "jpg", "jpeg", "gif",
    "bmp", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "html", "htm", "css", "sh", "bat",
    "ps1", "toml", "lock",
];

/// Directory names skipped entirely.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    "build",
    "dist",
    "bin",
    "obj",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
];

/// Finds DICOM files under `input_path`, sorted lexicographically with
/// duplicates suppressed. Files inside any `anonymized` output tree are
/// never picked up again.
pub fn find_dicom_files(input_path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(input_path);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    let iter = walker.into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map_or(false, |name| EXCLUDED_DIRS.contains(&name)))
    });

    for entry in iter {
        let entry = match entry {
            Ok(entry) => entry,
            // Unreadable entries are skipped, not fatal.
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if is_dicom_candidate(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn is_dicom_candidate(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    if EXCLUDED_NAMES.contains(&name) {
        return false;
    }

    // Never re-process prior output.
    if path
        .components()
        .any(|c| c.as_os_str().to_str() == Some("anonymized"))
    {
        return false;
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some(ext) if EXCLUDED_EXTENSIONS.contains(&ext) => false,
        Some(ext) if DICOM_EXTENSIONS.contains(&ext) => true,
        // Unknown or missing extension: probe the preamble.
        _ => has_dicom_magic_bytes(path),
    }
}

/// DICOM part-10 files carry "DICM" at byte offset 128, after the preamble.
pub fn has_dicom_magic_bytes(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return false,
    };
    let mut header = [0u8; 132];
    if file.read_exact(&mut header).is_err() {
        return false;
    }
    &header[128..132] == b"DICM"
}
