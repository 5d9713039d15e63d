//! Per-file anonymization pipelines.
//!
//! The metadata pipeline rewrites identifying tags only. The ultrasound
//! pipeline additionally blacks out the top image rows (burned-in patient
//! text) and, when the source was JPEG-LS compressed, re-encodes the
//! modified pixels with the embedded encoder.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::dicom_access::read_dicom;
use crate::redact::redact_top_rows;
use crate::transcode::{
    decompress_jpegls, is_jpegls_compressed, save_unchanged, save_with_jpegls,
};
use crate::transforms::{
    apply_tag_transforms, DATE_TAGS_TO_TRUNCATE, PII_TAGS_TO_CLEAR, ULTRASOUND_DATE_TAGS,
    ULTRASOUND_PII_TAGS,
};

fn ensure_parent_dir(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).context("could not create output directory")?;
    }
    Ok(())
}

/// Anonymizes a CT/MRI/X-ray file: tag transforms only, pixel data and
/// transfer syntax untouched.
pub fn anonymize_metadata(input: &Path, output: &Path, anon_id: &str) -> Result<()> {
    let mut obj = read_dicom(input)?;

    apply_tag_transforms(&mut obj, PII_TAGS_TO_CLEAR, DATE_TAGS_TO_TRUNCATE, anon_id);

    ensure_parent_dir(output)?;
    save_unchanged(&obj, output)
}

/// Anonymizes an ultrasound file: decompress if JPEG-LS, black out the top
/// `redact_rows` rows, apply the ultrasound tag set, and re-compress when
/// the original was compressed. Temporary files are removed on every exit
/// path.
pub fn anonymize_ultrasound(
    input: &Path,
    output: &Path,
    redact_rows: u32,
    anon_id: &str,
) -> Result<()> {
    let was_compressed = is_jpegls_compressed(input);

    // The temp path deletes itself when dropped.
    let mut _temp = None;
    let mut obj = if was_compressed {
        let temp_path = decompress_jpegls(input).context("JPEG-LS decompression failed")?;
        let obj = read_dicom(&temp_path)?;
        _temp = Some(temp_path);
        obj
    } else {
        read_dicom(input)?
    };

    redact_top_rows(&mut obj, redact_rows).context("pixel redaction failed")?;

    apply_tag_transforms(&mut obj, ULTRASOUND_PII_TAGS, ULTRASOUND_DATE_TAGS, anon_id);

    ensure_parent_dir(output)?;
    if was_compressed {
        save_with_jpegls(obj, output)
    } else {
        save_unchanged(&obj, output)
    }
}
