pub mod anonymize;
pub mod cli;
pub mod dicom_access;
pub mod encapsulate;
pub mod finder;
pub mod identity;
pub mod jpegls;
pub mod mapper;
pub mod pipeline;
pub mod progress;
pub mod redact;
pub mod transcode;
pub mod transforms;

pub use cli::{run as run_cli, Cli};
pub use mapper::{MatchMethod, PseudonymizationMapper};
pub use pipeline::{process_folder, process_folder_with_progress, Config, PatientGroup, Stats};
