//! Pseudonymization mapper: stable anonymous patient IDs across runs.
//!
//! Matching is salted-hash-first (Name+DOB) with a PatientID fallback, so
//! the same patient keeps one `ANON-NNNNNN` id across modalities and input
//! folders. Every mutation persists the whole mapping document; the file is
//! plaintext on purpose — it is the only way to reverse the mapping.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::identity::{identity_hash, is_valid_identity};

/// How a patient was matched to an anonymous id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    /// Matched (or created) via the Name+DOB identity hash.
    Identity,
    /// Matched (or created) via the raw PatientID fallback.
    Pid,
    /// Neither identity nor PatientID available; unique id, no stored mapping.
    None,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMethod::Identity => write!(f, "identity"),
            MatchMethod::Pid => write!(f, "pid"),
            MatchMethod::None => write!(f, "none"),
        }
    }
}

/// Reverse lookup entry kept for audit; never consulted for matching.
/// Sets are insertion-ordered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverseMapEntry {
    pub identity_hashes: Vec<String>,
    pub patient_ids: Vec<String>,
}

/// On-disk document. Sub-maps may be `null` in hand-edited files; they are
/// treated as empty on load.
#[derive(Debug, Serialize, Deserialize)]
struct MapperData {
    identity_map: Option<BTreeMap<String, String>>,
    pid_map: Option<BTreeMap<String, String>>,
    reverse_map: Option<BTreeMap<String, ReverseMapEntry>>,
    #[serde(default)]
    counter: u32,
    #[serde(default)]
    updated: String,
    #[serde(default)]
    note: String,
}

#[derive(Debug, Default)]
struct MapperState {
    identity_map: BTreeMap<String, String>,
    pid_map: BTreeMap<String, String>,
    reverse_map: BTreeMap<String, ReverseMapEntry>,
    counter: u32,
}

/// Mapping statistics for the run summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapperStats {
    pub total_patients: usize,
    pub identity_matched: usize,
    pub pid_fallback: usize,
}

/// Thread-safe pseudonymization mapper. All operations serialize on one
/// lock; ids are allocated in strictly increasing counter order.
pub struct PseudonymizationMapper {
    mapping_file: Option<PathBuf>,
    salt: String,
    state: Mutex<MapperState>,
}

impl PseudonymizationMapper {
    /// Creates a mapper, loading prior state from `mapping_file` when it
    /// exists. A corrupt file is logged and ignored.
    pub fn new(mapping_file: Option<&Path>, salt: &str) -> PseudonymizationMapper {
        let mut state = MapperState::default();
        if let Some(path) = mapping_file {
            if let Some(loaded) = load_state(path) {
                state = loaded;
            }
        }
        PseudonymizationMapper {
            mapping_file: mapping_file.map(Path::to_path_buf),
            salt: salt.to_string(),
            state: Mutex::new(state),
        }
    }

    /// Loads prior state from `mapping_file` but never writes back. Used by
    /// dry runs, which must leave no trace on disk.
    pub fn load_only(mapping_file: Option<&Path>, salt: &str) -> PseudonymizationMapper {
        let mut mapper = PseudonymizationMapper::new(mapping_file, salt);
        mapper.mapping_file = None;
        mapper
    }

    /// Gets or creates the anonymous id for a patient.
    ///
    /// Identity (Name+DOB) matching wins when the identity is valid; a
    /// previously seen PatientID adopts its existing id for the identity.
    /// Without a usable identity the PatientID alone is the key; with
    /// neither, a fresh id is handed out and nothing is stored.
    pub fn get_anon_id(&self, patient_id: &str, name: &str, dob: &str) -> (String, MatchMethod) {
        let mut state = self.state.lock().expect("mapper lock poisoned");

        let pid = patient_id.trim();
        let name = name.trim();
        let dob = dob.trim();

        if is_valid_identity(name, dob) {
            let hash = identity_hash(name, dob, &self.salt);

            if let Some(anon_id) = state.identity_map.get(&hash).cloned() {
                // Record the PID spelling for reference if it is new.
                if !pid.is_empty() && !state.pid_map.contains_key(pid) {
                    state.pid_map.insert(pid.to_string(), anon_id.clone());
                    self.save(&state);
                }
                return (anon_id, MatchMethod::Identity);
            }

            if !pid.is_empty() {
                if let Some(anon_id) = state.pid_map.get(pid).cloned() {
                    // The PID was seen before the identity; link them.
                    state.identity_map.insert(hash.clone(), anon_id.clone());
                    update_reverse_map(&mut state, &anon_id, &hash, pid);
                    self.save(&state);
                    return (anon_id, MatchMethod::Identity);
                }
            }

            let anon_id = generate_id(&mut state);
            state.identity_map.insert(hash.clone(), anon_id.clone());
            if !pid.is_empty() {
                state.pid_map.insert(pid.to_string(), anon_id.clone());
            }
            update_reverse_map(&mut state, &anon_id, &hash, pid);
            self.save(&state);
            return (anon_id, MatchMethod::Identity);
        }

        if !pid.is_empty() {
            if let Some(anon_id) = state.pid_map.get(pid).cloned() {
                return (anon_id, MatchMethod::Pid);
            }

            let anon_id = generate_id(&mut state);
            state.pid_map.insert(pid.to_string(), anon_id.clone());
            update_reverse_map(&mut state, &anon_id, "", pid);
            self.save(&state);
            return (anon_id, MatchMethod::Pid);
        }

        let anon_id = generate_id(&mut state);
        self.save(&state);
        (anon_id, MatchMethod::None)
    }

    /// Mapping statistics: patients known, identity-matched, pid-only.
    pub fn stats(&self) -> MapperStats {
        let state = self.state.lock().expect("mapper lock poisoned");

        let identity_ids: std::collections::HashSet<&String> =
            state.identity_map.values().collect();
        let pid_only = state
            .pid_map
            .values()
            .filter(|id| !identity_ids.contains(id))
            .count();

        MapperStats {
            total_patients: state.reverse_map.len(),
            identity_matched: state.identity_map.len(),
            pid_fallback: pid_only,
        }
    }

    fn save(&self, state: &MapperState) {
        let Some(path) = &self.mapping_file else {
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                tracing::warn!("could not create mapping directory: {err}");
                return;
            }
        }

        let data = MapperData {
            identity_map: Some(state.identity_map.clone()),
            pid_map: Some(state.pid_map.clone()),
            reverse_map: Some(state.reverse_map.clone()),
            counter: state.counter,
            updated: Utc::now().to_rfc3339(),
            note: "identity_map uses hash(Name+DOB), pid_map is fallback for missing identity"
                .to_string(),
        };

        match serde_json::to_string_pretty(&data) {
            Ok(json) => {
                if let Err(err) = fs::write(path, json) {
                    tracing::warn!("could not save mapping file: {err}");
                }
            }
            Err(err) => tracing::warn!("could not serialize mapping data: {err}"),
        }
    }
}

fn generate_id(state: &mut MapperState) -> String {
    state.counter += 1;
    format!("ANON-{:06}", state.counter)
}

fn update_reverse_map(state: &mut MapperState, anon_id: &str, identity_hash: &str, pid: &str) {
    let entry = state.reverse_map.entry(anon_id.to_string()).or_default();

    if !identity_hash.is_empty() && !entry.identity_hashes.iter().any(|h| h == identity_hash) {
        entry.identity_hashes.push(identity_hash.to_string());
    }
    if !pid.is_empty() && !entry.patient_ids.iter().any(|p| p == pid) {
        entry.patient_ids.push(pid.to_string());
    }
}

fn load_state(path: &Path) -> Option<MapperState> {
    let data = fs::read(path).ok()?;

    let parsed: MapperData = match serde_json::from_slice(&data) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!("could not load mapping file {}: {err}", path.display());
            return None;
        }
    };

    Some(MapperState {
        identity_map: parsed.identity_map.unwrap_or_default(),
        pid_map: parsed.pid_map.unwrap_or_default(),
        reverse_map: parsed.reverse_map.unwrap_or_default(),
        counter: parsed.counter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn identity_match_is_stable() {
        let mapper = PseudonymizationMapper::new(None, "s");

        let (id1, m1) = mapper.get_anon_id("P1", "Smith^John", "19800101");
        let (id2, m2) = mapper.get_anon_id("P1", "John Smith", "19800101");

        assert_eq!(id1, "ANON-000001");
        assert_eq!(id1, id2);
        assert_eq!(m1, MatchMethod::Identity);
        assert_eq!(m2, MatchMethod::Identity);
    }

    #[test]
    fn pid_fallback_reuses_identity_created_id() {
        let mapper = PseudonymizationMapper::new(None, "s");

        let (id1, _) = mapper.get_anon_id("P1", "Smith^John", "19800101");
        // Later file with a placeholder name but the same PID
        let (id2, m2) = mapper.get_anon_id("P1", "UNKNOWN", "");

        assert_eq!(id1, id2);
        assert_eq!(m2, MatchMethod::Pid);
    }

    #[test]
    fn identity_adopts_prior_pid_mapping() {
        let mapper = PseudonymizationMapper::new(None, "s");

        let (id1, m1) = mapper.get_anon_id("Q9", "UNKNOWN", "19800101");
        assert_eq!(m1, MatchMethod::Pid);

        let (id2, m2) = mapper.get_anon_id("Q9", "Smith^John", "19800101");
        assert_eq!(id1, id2);
        assert_eq!(m2, MatchMethod::Identity);

        // And the identity now matches directly, without the PID.
        let (id3, m3) = mapper.get_anon_id("", "Smith^John", "19800101");
        assert_eq!(id1, id3);
        assert_eq!(m3, MatchMethod::Identity);
    }

    #[test]
    fn placeholder_name_falls_back_to_pid() {
        let mapper = PseudonymizationMapper::new(None, "s");

        let (id, method) = mapper.get_anon_id("Q9", "UNKNOWN", "19800101");
        assert_eq!(id, "ANON-000001");
        assert_eq!(method, MatchMethod::Pid);

        let state = mapper.state.lock().unwrap();
        assert!(state.identity_map.is_empty());
        assert_eq!(state.pid_map.get("Q9"), Some(&"ANON-000001".to_string()));
    }

    #[test]
    fn no_identity_no_pid_generates_unstored_id() {
        let mapper = PseudonymizationMapper::new(None, "s");

        let (id1, m1) = mapper.get_anon_id("", "", "");
        let (id2, _) = mapper.get_anon_id("", "", "");

        assert_eq!(m1, MatchMethod::None);
        assert_ne!(id1, id2);

        let state = mapper.state.lock().unwrap();
        assert!(state.identity_map.is_empty());
        assert!(state.pid_map.is_empty());
    }

    #[test]
    fn counter_survives_persistence_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patient_mapping.json");

        {
            let mapper = PseudonymizationMapper::new(Some(&path), "s");
            mapper.get_anon_id("P1", "Smith^John", "19800101");
            mapper.get_anon_id("P2", "Doe^Jane", "19900202");
        }

        let mapper = PseudonymizationMapper::new(Some(&path), "s");
        let (id, _) = mapper.get_anon_id("P1", "Smith^John", "19800101");
        assert_eq!(id, "ANON-000001");

        let (id_new, _) = mapper.get_anon_id("P3", "Roe^Richard", "19700303");
        assert_eq!(id_new, "ANON-000003");
    }

    #[test]
    fn corrupt_mapping_file_starts_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patient_mapping.json");
        fs::write(&path, b"{ not json").unwrap();

        let mapper = PseudonymizationMapper::new(Some(&path), "s");
        let (id, _) = mapper.get_anon_id("P1", "Smith^John", "19800101");
        assert_eq!(id, "ANON-000001");
    }

    #[test]
    fn null_submaps_are_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patient_mapping.json");
        fs::write(
            &path,
            br#"{"identity_map":null,"pid_map":null,"reverse_map":null,"counter":7,"updated":"","note":""}"#,
        )
        .unwrap();

        let mapper = PseudonymizationMapper::new(Some(&path), "s");
        let (id, _) = mapper.get_anon_id("P1", "Smith^John", "19800101");
        assert_eq!(id, "ANON-000008");
    }

    #[test]
    fn reverse_map_collects_all_aliases() {
        let mapper = PseudonymizationMapper::new(None, "s");

        mapper.get_anon_id("Q9", "UNKNOWN", "19800101");
        mapper.get_anon_id("Q9", "Smith^John", "19800101");

        let state = mapper.state.lock().unwrap();
        let entry = state.reverse_map.get("ANON-000001").unwrap();
        assert_eq!(entry.patient_ids, vec!["Q9"]);
        assert_eq!(entry.identity_hashes.len(), 1);
    }

    #[test]
    fn stats_count_identity_and_pid_only() {
        let mapper = PseudonymizationMapper::new(None, "s");
        mapper.get_anon_id("P1", "Smith^John", "19800101");
        mapper.get_anon_id("Q9", "UNKNOWN", "");

        let stats = mapper.stats();
        assert_eq!(stats.total_patients, 2);
        assert_eq!(stats.identity_matched, 1);
        assert_eq!(stats.pid_fallback, 1);
    }
}
