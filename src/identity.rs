//! Patient identity normalization and salted hashing.
//!
//! A patient is identified by the pair (name, date of birth); the name is
//! canonicalized so "SMITH^JOHN", "John Smith" and "smith, john" all
//! collapse to the same key before hashing.

use sha2::{Digest, Sha256};

/// Name values that indicate missing or test data. Compared against the
/// normalized name, lowercased.
const PLACEHOLDER_NAMES: &[&str] = &["", "unknown", "no name", "noname", "anonymous", "test", "patient"];

/// DOB values that indicate missing or test data.
const PLACEHOLDER_DOBS: &[&str] = &["", "00000000", "11111111", "19000101", "99999999"];

/// Normalizes a patient name for consistent matching: uppercase, DICOM
/// separators (`^`, `,`) to spaces, everything outside A-Z and space
/// dropped, tokens sorted and concatenated.
pub fn normalize_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    let cleaned: String = name
        .to_uppercase()
        .chars()
        .map(|c| if c == '^' || c == ',' { ' ' } else { c })
        .filter(|c| c.is_ascii_uppercase() || *c == ' ')
        .collect();

    let mut parts: Vec<&str> = cleaned.split_whitespace().collect();
    parts.sort_unstable();
    parts.concat()
}

/// Whether name and DOB are real values rather than placeholders.
/// The normalized name must be at least 3 letters; the DOB must be the
/// 8-digit DICOM DA form and not a well-known dummy.
pub fn is_valid_identity(name: &str, dob: &str) -> bool {
    let normalized = normalize_name(name).to_lowercase();
    let dob = dob.trim();

    if PLACEHOLDER_NAMES.contains(&normalized.as_str()) || normalized.len() < 3 {
        return false;
    }
    if PLACEHOLDER_DOBS.contains(&dob) || dob.len() != 8 {
        return false;
    }
    true
}

/// Salted identity hash: uppercase first 12 hex characters of
/// SHA-256("<normalized-name>|<dob>|<salt>"). Deterministic for a given
/// salt; changing the salt changes every hash.
pub fn identity_hash(name: &str, dob: &str, salt: &str) -> String {
    let identity = format!("{}|{}|{}", normalize_name(name), dob.trim(), salt);
    let digest = Sha256::digest(identity.as_bytes());
    hex::encode(&digest[..6]).to_uppercase()
}
