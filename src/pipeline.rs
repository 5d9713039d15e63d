//! Folder-level anonymization: discovery, patient grouping, per-file
//! dispatch and resumable bookkeeping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::anonymize::{anonymize_metadata, anonymize_ultrasound};
use crate::dicom_access::{read_dicom_metadata_only, ElementAccess};
use crate::finder::find_dicom_files;
use crate::identity::{identity_hash, is_valid_identity};
use crate::mapper::{MatchMethod, PseudonymizationMapper};
use crate::progress::{ErrorLogger, Tracker};

/// Output sink for human-readable progress text. The CLI prints it; a GUI
/// can capture it. Called synchronously on the processing thread.
pub type OutputSink<'a> = &'a dyn Fn(&str);

/// Per-file progress callback: (current 1-based index, total, basename,
/// status). Status is one of "processing", "success", "failed", "skipped".
pub type ProgressCallback<'a> = &'a dyn Fn(usize, usize, &str, &str);

/// Configuration for one folder run.
pub struct Config<'a> {
    pub input_folder: PathBuf,
    /// Mapping document location; `None` keeps the mapping in memory only.
    pub mapping_file: Option<PathBuf>,
    /// Salt for the identity hash. Same salt, same pseudonyms.
    pub salt: String,
    /// Ultrasound top rows to black out.
    pub redact_rows: u32,
    pub dry_run: bool,
    /// Drop previously failed entries from the tracker before starting.
    pub retry_failed: bool,
    pub recursive: bool,
    /// Process CT/MRI/X-ray files (metadata-only transform).
    pub process_metadata: bool,
    /// Process ultrasound files (metadata + pixel redaction).
    pub process_ultrasound: bool,
    pub output: Option<OutputSink<'a>>,
}

impl<'a> Config<'a> {
    pub fn new(input_folder: impl Into<PathBuf>, salt: impl Into<String>) -> Config<'a> {
        Config {
            input_folder: input_folder.into(),
            mapping_file: None,
            salt: salt.into(),
            redact_rows: 75,
            dry_run: false,
            retry_failed: false,
            recursive: true,
            process_metadata: true,
            process_ultrasound: true,
            output: None,
        }
    }
}

/// Counters for one folder run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub identity_matched: usize,
    pub pid_matched: usize,
    pub total_patients: usize,
}

/// Files belonging to one patient, keyed by identity hash or PID.
#[derive(Debug, Clone)]
pub struct PatientGroup {
    pub key: String,
    pub name: String,
    pub dob: String,
    pub pid: String,
    pub files: Vec<PathBuf>,
}

/// Processes every DICOM file under the configured input folder.
pub fn process_folder(cfg: &Config<'_>) -> Result<Stats> {
    process_folder_impl(cfg, None)
}

/// Like `process_folder`, with a per-file progress callback.
pub fn process_folder_with_progress(
    cfg: &Config<'_>,
    progress: ProgressCallback<'_>,
) -> Result<Stats> {
    process_folder_impl(cfg, Some(progress))
}

fn process_folder_impl(cfg: &Config<'_>, progress: Option<ProgressCallback<'_>>) -> Result<Stats> {
    let print = |s: String| {
        if let Some(output) = &cfg.output {
            output(&s);
        } else {
            print!("{s}");
        }
    };

    let input_folder = cfg.input_folder.as_path();
    let output_folder = input_folder.join("anonymized");
    let progress_file = output_folder.join(".progress.json");
    let log_file = output_folder.join("errors.log");

    // A dry run consults the mapping but must not write it.
    let mapper = if cfg.dry_run {
        PseudonymizationMapper::load_only(cfg.mapping_file.as_deref(), &cfg.salt)
    } else {
        PseudonymizationMapper::new(cfg.mapping_file.as_deref(), &cfg.salt)
    };

    let (tracker, error_logger) = if cfg.dry_run {
        (None, None)
    } else {
        let tracker = Tracker::new(Some(&progress_file));
        if cfg.retry_failed {
            let cleared = tracker.clear_failed();
            if cleared > 0 {
                print(format!("Cleared {cleared} failed entries for retry\n"));
            }
        }
        let logger =
            ErrorLogger::new(Some(&log_file)).context("could not create error logger")?;
        (Some(tracker), Some(logger))
    };

    let files = find_dicom_files(input_folder, cfg.recursive)
        .context("could not find DICOM files")?;
    if files.is_empty() {
        print(format!(
            "No DICOM files found in {}\n",
            input_folder.display()
        ));
        return Ok(Stats::default());
    }
    print(format!(
        "Found {} DICOM file(s) in {}\n",
        files.len(),
        input_folder.display()
    ));

    let patients = group_files_by_patient(&files, &cfg.salt);
    print(format!("Found {} unique patient(s)\n", patients.len()));

    if cfg.dry_run {
        return Ok(dry_run(&patients, &mapper, &print));
    }

    let total_files: usize = patients.iter().map(|p| p.files.len()).sum();
    let mut stats = Stats {
        total_patients: patients.len(),
        ..Stats::default()
    };
    let mut file_index = 0usize;

    for (i, patient) in patients.iter().enumerate() {
        let (anon_id, method) = mapper.get_anon_id(&patient.pid, &patient.name, &patient.dob);

        if method == MatchMethod::Identity {
            stats.identity_matched += 1;
        } else {
            stats.pid_matched += 1;
        }

        let patient_folder = output_folder.join(&anon_id);

        print(format!("\nProcessing Patient {}/{}\n", i + 1, patients.len()));
        if method == MatchMethod::Identity {
            print(format!("  Name: {}\n", patient.name));
            print(format!("  DOB: {}\n", patient.dob));
        }
        print(format!("  Original PID: {}\n", patient.pid));
        print(format!("  Anon ID: {anon_id} ({method} match)\n"));
        print(format!("  Files: {}\n", patient.files.len()));

        for file_path in &patient.files {
            file_index += 1;
            let basename = file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_path.display().to_string());

            if let Some(tracker) = &tracker {
                if tracker.is_processed(file_path) {
                    stats.skipped += 1;
                    if let Some(cb) = progress {
                        cb(file_index, total_files, &basename, "skipped");
                    }
                    continue;
                }
            }

            if let Some(cb) = progress {
                cb(file_index, total_files, &basename, "processing");
            }

            let rel_path = file_path
                .strip_prefix(input_folder)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(basename.as_str()));
            let output_path = patient_folder.join(rel_path);

            // Only probe the modality when the ultrasound pipeline is on.
            let is_us = cfg.process_ultrasound
                && read_dicom_metadata_only(file_path)
                    .map(|obj| obj.is_ultrasound())
                    .unwrap_or(false);

            let result = if is_us {
                anonymize_ultrasound(file_path, &output_path, cfg.redact_rows, &anon_id)
            } else if cfg.process_metadata {
                anonymize_metadata(file_path, &output_path, &anon_id)
            } else {
                stats.skipped += 1;
                if let Some(cb) = progress {
                    cb(file_index, total_files, &basename, "skipped");
                }
                continue;
            };

            match result {
                Ok(()) => {
                    stats.success += 1;
                    if let Some(tracker) = &tracker {
                        tracker.mark_success(file_path, &output_path);
                    }
                    if let Some(cb) = progress {
                        cb(file_index, total_files, &basename, "success");
                    }
                }
                Err(err) => {
                    stats.failed += 1;
                    let msg = format!("{err:#}");
                    if let Some(tracker) = &tracker {
                        tracker.mark_error(file_path, &msg);
                    }
                    if let Some(logger) = &error_logger {
                        logger.log(file_path, &msg);
                    }
                    print(format!("  Error: {basename}: {msg}\n"));
                    if let Some(cb) = progress {
                        cb(file_index, total_files, &basename, "failed");
                    }
                }
            }
        }
    }

    print(format!("\n{}\n", "=".repeat(50)));
    print(format!(
        "Complete! {} succeeded, {} failed, {} skipped\n",
        stats.success, stats.failed, stats.skipped
    ));
    print(format!(
        "Matching: {} by Name+DOB, {} by PatientID\n",
        stats.identity_matched, stats.pid_matched
    ));
    if let Some(logger) = &error_logger {
        print(format!("  {}\n", logger.summary()));
    }
    print(format!("Output: {}\n", output_folder.display()));
    if let Some(mapping) = &cfg.mapping_file {
        print(format!("Mapping: {}\n", mapping.display()));
    }

    Ok(stats)
}

/// Groups files by patient: the identity hash when Name+DOB are usable,
/// otherwise "PID:<id>". Unreadable files land in a synthetic UNKNOWN
/// group. Groups keep the insertion order of their first file.
pub fn group_files_by_patient(files: &[PathBuf], salt: &str) -> Vec<PatientGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<PatientGroup> = Vec::new();

    for file_path in files {
        let (key, name, dob, pid) = match read_dicom_metadata_only(file_path) {
            Ok(obj) => {
                let name = obj.patient_name();
                let dob = obj.patient_birth_date();
                let mut pid = obj.patient_id();
                if pid.is_empty() {
                    pid = "UNKNOWN".to_string();
                }

                let key = if is_valid_identity(&name, &dob) {
                    identity_hash(&name, &dob, salt)
                } else {
                    format!("PID:{pid}")
                };
                (key, name, dob, pid)
            }
            Err(_) => (
                "UNKNOWN".to_string(),
                String::new(),
                String::new(),
                String::new(),
            ),
        };

        let idx = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(PatientGroup {
                key,
                name,
                dob,
                pid,
                files: Vec::new(),
            });
            groups.len() - 1
        });
        groups[idx].files.push(file_path.clone());
    }

    groups
}

/// Dry-run: report the mapping plan without touching any file. Every file
/// counts as skipped.
fn dry_run(
    patients: &[PatientGroup],
    mapper: &PseudonymizationMapper,
    print: &dyn Fn(String),
) -> Stats {
    print("\n[DRY RUN] Would process:\n".to_string());

    let mut stats = Stats {
        total_patients: patients.len(),
        ..Stats::default()
    };

    for patient in patients {
        let (anon_id, method) = mapper.get_anon_id(&patient.pid, &patient.name, &patient.dob);
        stats.skipped += patient.files.len();

        if method == MatchMethod::Identity {
            stats.identity_matched += 1;
            print(format!(
                "  {} <- '{}' + DOB ({} files) [identity match]\n",
                anon_id,
                patient.name,
                patient.files.len()
            ));
        } else {
            stats.pid_matched += 1;
            print(format!(
                "  {} <- PID '{}' ({} files) [PID fallback]\n",
                anon_id,
                patient.pid,
                patient.files.len()
            ));
        }
    }

    print(format!(
        "\nMatching method: {} by identity, {} by PID\n",
        stats.identity_matched, stats.pid_matched
    ));

    stats
}
