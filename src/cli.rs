//! Command-line driver: a thin layer over the folder pipeline.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::pipeline::{process_folder_with_progress, Config, Stats};
use crate::transcode::dcmtk_installed;

#[derive(Parser)]
#[command(name = "dicom-anonymizer")]
#[command(about = "Anonymize DICOM studies with consistent patient pseudonyms", long_about = None)]
pub struct Cli {
    /// Input folder containing DICOM files
    #[arg(short, long)]
    pub input: PathBuf,

    /// Secret key for pseudonymization. Use the SAME key across modalities
    /// so a patient keeps one anonymous ID.
    #[arg(short, long)]
    pub key: String,

    /// Patient mapping file (default: <parent-of-input>/patient_mapping.json)
    #[arg(short, long)]
    pub mapping: Option<PathBuf>,

    /// Rows to redact from ultrasound images
    #[arg(long, default_value_t = 75)]
    pub redact_rows: u32,

    /// Search subdirectories
    #[arg(short, long, default_value_t = true, action = clap::ArgAction::Set)]
    pub recursive: bool,

    /// Retry previously failed files
    #[arg(long)]
    pub retry: bool,

    /// Process CT/MRI/X-Ray files (metadata only)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub metadata: bool,

    /// Process ultrasound files (metadata + pixel redaction)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub ultrasound: bool,

    /// Preview what would be processed; modify nothing
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

/// Runs the CLI end to end and returns the stats of the folder run.
pub fn run(cli: Cli) -> Result<Stats> {
    if !cli.input.is_dir() {
        bail!("input folder does not exist: {}", cli.input.display());
    }

    if !dcmtk_installed() {
        eprintln!("Warning: dcmtk is not installed; JPEG-LS compressed files will fail.");
        eprintln!("Install it with your package manager (e.g. apt install dcmtk).");
    }

    let mapping_file = cli.mapping.clone().unwrap_or_else(|| {
        let parent = cli
            .input
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.input.clone());
        parent.join("patient_mapping.json")
    });

    print_header(&cli, &mapping_file);

    // Suppress the pipeline's internal narration; the progress bar covers it.
    let quiet = |_: &str| {};
    let mut config = Config::new(&cli.input, &cli.key);
    config.mapping_file = Some(mapping_file.clone());
    config.redact_rows = cli.redact_rows;
    config.dry_run = cli.dry_run;
    config.retry_failed = cli.retry;
    config.recursive = cli.recursive;
    config.process_metadata = cli.metadata;
    config.process_ultrasound = cli.ultrasound;
    if !cli.dry_run {
        config.output = Some(&quiet);
    }

    if cli.dry_run {
        println!("\n[DRY RUN MODE]");
    }
    println!();

    let bar = ProgressBar::new(50);
    let draw = |current: usize, total: usize, _name: &str, _status: &str| {
        bar.update(current, total);
    };

    let stats = process_folder_with_progress(&config, &draw)?;

    let total = stats.success + stats.failed + stats.skipped;
    if total > 0 {
        bar.update(total, total);
        println!();
    }

    print_summary(&stats, &cli.input, &mapping_file);
    Ok(stats)
}

fn print_header(cli: &Cli, mapping_file: &std::path::Path) {
    println!("DICOM Anonymizer");
    println!("{}", "=".repeat(50));
    println!("Input:     {}", cli.input.display());
    println!("Mapping:   {}", mapping_file.display());
    if cli.key.len() > 8 {
        println!("Key:       {}... (provided)", &cli.key[..8]);
    } else {
        println!("Key:       {} (provided)", cli.key);
    }

    let mut modalities = Vec::new();
    if cli.metadata {
        modalities.push("CT/MRI/X-Ray".to_string());
    }
    if cli.ultrasound {
        modalities.push(format!("Ultrasound ({}px redaction)", cli.redact_rows));
    }
    if modalities.is_empty() {
        modalities.push("None".to_string());
    }
    println!("Modality:  {}", modalities.join(", "));

    let mut options = Vec::new();
    if cli.recursive {
        options.push("Recursive");
    }
    if cli.retry {
        options.push("Retry failed");
    }
    if cli.dry_run {
        options.push("Dry run");
    }
    if !options.is_empty() {
        println!("Options:   {}", options.join(", "));
    }
}

fn print_summary(stats: &Stats, input: &std::path::Path, mapping_file: &std::path::Path) {
    println!();
    println!("{}", "=".repeat(50));
    println!(
        "Complete! {} succeeded, {} failed, {} skipped",
        stats.success, stats.failed, stats.skipped
    );
    println!(
        "Patients:  {} total ({} by Name+DOB, {} by PatientID)",
        stats.total_patients, stats.identity_matched, stats.pid_matched
    );
    println!("Output:    {}", input.join("anonymized").display());
    println!("Mapping:   {}", mapping_file.display());
}

/// Minimal single-line terminal progress bar.
struct ProgressBar {
    width: usize,
}

impl ProgressBar {
    fn new(width: usize) -> ProgressBar {
        ProgressBar { width }
    }

    fn update(&self, current: usize, total: usize) {
        if total == 0 {
            return;
        }
        let percent = current as f64 / total as f64;
        let filled = ((percent * self.width as f64) as usize).min(self.width);
        let bar: String = "#".repeat(filled) + &"-".repeat(self.width - filled);
        print!("\r[{}] {:3.0}%  ({}/{})", bar, percent * 100.0, current, total);
        let _ = io::stdout().flush();
    }
}
