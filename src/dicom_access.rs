//! Uniform typed access to parsed DICOM objects.
//!
//! The parser collaborator is the `dicom` crate; this trait keeps the rest
//! of the pipeline independent of its error types and value conversions.

use std::path::Path;

use anyhow::{Context as _, Result};
use dicom::core::Tag;
use dicom::object::{open_file, DefaultDicomObject, OpenFileOptions};

/// Tags used across the pipeline, by (group, element). The parser's
/// dictionary is only needed for VR lookup; tag identity is fixed by the
/// standard.
pub mod tags {
    use dicom::core::Tag;

    pub const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);

    pub const INSTANCE_CREATION_DATE: Tag = Tag(0x0008, 0x0012);
    pub const INSTANCE_CREATION_TIME: Tag = Tag(0x0008, 0x0013);
    pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
    pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
    pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
    pub const SERIES_DATE: Tag = Tag(0x0008, 0x0021);
    pub const ACQUISITION_DATE: Tag = Tag(0x0008, 0x0022);
    pub const CONTENT_DATE: Tag = Tag(0x0008, 0x0023);
    pub const STUDY_TIME: Tag = Tag(0x0008, 0x0030);
    pub const SERIES_TIME: Tag = Tag(0x0008, 0x0031);
    pub const ACQUISITION_TIME: Tag = Tag(0x0008, 0x0032);
    pub const CONTENT_TIME: Tag = Tag(0x0008, 0x0033);
    pub const ACCESSION_NUMBER: Tag = Tag(0x0008, 0x0050);
    pub const MODALITY: Tag = Tag(0x0008, 0x0060);
    pub const INSTITUTION_ADDRESS: Tag = Tag(0x0008, 0x0081);
    pub const REFERRING_PHYSICIAN_NAME: Tag = Tag(0x0008, 0x0090);
    pub const REFERRING_PHYSICIAN_ADDRESS: Tag = Tag(0x0008, 0x0092);
    pub const REFERRING_PHYSICIAN_TELEPHONE_NUMBERS: Tag = Tag(0x0008, 0x0094);
    pub const STATION_NAME: Tag = Tag(0x0008, 0x1010);
    pub const STUDY_DESCRIPTION: Tag = Tag(0x0008, 0x1030);
    pub const SERIES_DESCRIPTION: Tag = Tag(0x0008, 0x103E);
    pub const INSTITUTIONAL_DEPARTMENT_NAME: Tag = Tag(0x0008, 0x1040);
    pub const PHYSICIANS_OF_RECORD: Tag = Tag(0x0008, 0x1048);
    pub const PERFORMING_PHYSICIAN_NAME: Tag = Tag(0x0008, 0x1050);
    pub const NAME_OF_PHYSICIANS_READING_STUDY: Tag = Tag(0x0008, 0x1060);
    pub const OPERATORS_NAME: Tag = Tag(0x0008, 0x1070);

    pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
    pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
    pub const PATIENT_BIRTH_DATE: Tag = Tag(0x0010, 0x0030);
    pub const PATIENT_BIRTH_TIME: Tag = Tag(0x0010, 0x0032);
    pub const OTHER_PATIENT_IDS: Tag = Tag(0x0010, 0x1000);
    pub const OTHER_PATIENT_IDS_SEQUENCE: Tag = Tag(0x0010, 0x1002);
    pub const PATIENT_AGE: Tag = Tag(0x0010, 0x1010);
    pub const PATIENT_ADDRESS: Tag = Tag(0x0010, 0x1040);
    pub const PATIENT_MOTHER_BIRTH_NAME: Tag = Tag(0x0010, 0x1060);
    pub const MILITARY_RANK: Tag = Tag(0x0010, 0x1080);
    pub const PATIENT_TELEPHONE_NUMBERS: Tag = Tag(0x0010, 0x2154);
    pub const ETHNIC_GROUP: Tag = Tag(0x0010, 0x2160);
    pub const PATIENT_RELIGIOUS_PREFERENCE: Tag = Tag(0x0010, 0x21F0);
    pub const PATIENT_COMMENTS: Tag = Tag(0x0010, 0x4000);

    pub const STUDY_ID: Tag = Tag(0x0020, 0x0010);

    pub const SAMPLES_PER_PIXEL: Tag = Tag(0x0028, 0x0002);
    pub const NUMBER_OF_FRAMES: Tag = Tag(0x0028, 0x0008);
    pub const ROWS: Tag = Tag(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag(0x0028, 0x0011);
    pub const BITS_ALLOCATED: Tag = Tag(0x0028, 0x0100);

    pub const REQUESTING_PHYSICIAN: Tag = Tag(0x0032, 0x1032);

    pub const SCHEDULED_PERFORMING_PHYSICIAN_NAME: Tag = Tag(0x0040, 0x0006);
    pub const SCHEDULED_PROCEDURE_STEP_ID: Tag = Tag(0x0040, 0x0009);
    pub const PERFORMED_PROCEDURE_STEP_ID: Tag = Tag(0x0040, 0x0253);
    pub const REQUEST_ATTRIBUTES_SEQUENCE: Tag = Tag(0x0040, 0x0275);

    pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);
}

/// Small helper trait to pull typed values out of a DICOM object.
pub trait ElementAccess {
    fn element_str(&self, tag: Tag) -> Option<String>;
    fn element_u32(&self, tag: Tag) -> Option<u32>;
    fn has_element(&self, tag: Tag) -> bool;
    fn transfer_syntax(&self) -> Option<String>;

    fn patient_name(&self) -> String {
        self.element_str(tags::PATIENT_NAME).unwrap_or_default()
    }

    fn patient_id(&self) -> String {
        self.element_str(tags::PATIENT_ID).unwrap_or_default()
    }

    fn patient_birth_date(&self) -> String {
        self.element_str(tags::PATIENT_BIRTH_DATE).unwrap_or_default()
    }

    fn modality(&self) -> String {
        self.element_str(tags::MODALITY).unwrap_or_default()
    }

    /// Ultrasound and intravascular ultrasound carry burned-in patient text.
    fn is_ultrasound(&self) -> bool {
        let modality = self.modality();
        let modality = modality.trim();
        modality == "US" || modality == "IVUS"
    }
}

impl ElementAccess for DefaultDicomObject {
    fn element_str(&self, tag: Tag) -> Option<String> {
        // Many tags are optional; fold missing values into None.
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.into_owned())
    }

    fn element_u32(&self, tag: Tag) -> Option<u32> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .and_then(|s| s.trim().parse::<u32>().ok())
    }

    fn has_element(&self, tag: Tag) -> bool {
        self.element(tag).is_ok()
    }

    fn transfer_syntax(&self) -> Option<String> {
        Some(self.meta().transfer_syntax().trim_end_matches('\0').to_string())
    }
}

/// Opens a DICOM file fully.
pub fn read_dicom(path: &Path) -> Result<DefaultDicomObject> {
    open_file(path).with_context(|| format!("could not read DICOM file {}", path.display()))
}

/// Opens a DICOM file without its pixel data, for cheap metadata probes.
pub fn read_dicom_metadata_only(path: &Path) -> Result<DefaultDicomObject> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .with_context(|| format!("could not read DICOM metadata from {}", path.display()))
}
