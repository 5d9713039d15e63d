//! Tag-level anonymization transforms and the PII tag sets.
//!
//! Transforms only rewrite tags that are present; a file that never carried
//! a tag gains nothing from an empty copy of it.

use dicom::core::header::Header;
use dicom::core::{DataElement, PrimitiveValue, Tag};
use dicom::object::DefaultDicomObject;

use crate::dicom_access::{tags, ElementAccess};

/// PII tags cleared by the metadata pipeline. PatientSex, InstitutionName
/// and the study/series descriptions are deliberately preserved for
/// clinical and research context.
pub const PII_TAGS_TO_CLEAR: &[Tag] = &[
    // Patient identifiers
    tags::PATIENT_NAME,
    tags::PATIENT_BIRTH_DATE,
    tags::PATIENT_AGE,
    tags::PATIENT_ADDRESS,
    tags::PATIENT_TELEPHONE_NUMBERS,
    tags::OTHER_PATIENT_IDS,
    tags::OTHER_PATIENT_IDS_SEQUENCE,
    tags::PATIENT_BIRTH_TIME,
    tags::PATIENT_MOTHER_BIRTH_NAME,
    tags::MILITARY_RANK,
    tags::ETHNIC_GROUP,
    tags::PATIENT_RELIGIOUS_PREFERENCE,
    tags::PATIENT_COMMENTS,
    // Times only; the paired dates are truncated instead to keep year-month
    tags::STUDY_TIME,
    tags::SERIES_TIME,
    tags::ACQUISITION_TIME,
    tags::CONTENT_TIME,
    tags::INSTANCE_CREATION_TIME,
    // Institution details (name preserved)
    tags::INSTITUTION_ADDRESS,
    tags::INSTITUTIONAL_DEPARTMENT_NAME,
    tags::STATION_NAME,
    // Physicians
    tags::REFERRING_PHYSICIAN_NAME,
    tags::REFERRING_PHYSICIAN_ADDRESS,
    tags::REFERRING_PHYSICIAN_TELEPHONE_NUMBERS,
    tags::PERFORMING_PHYSICIAN_NAME,
    tags::OPERATORS_NAME,
    tags::PHYSICIANS_OF_RECORD,
    tags::NAME_OF_PHYSICIANS_READING_STUDY,
    tags::REQUESTING_PHYSICIAN,
    tags::SCHEDULED_PERFORMING_PHYSICIAN_NAME,
    // Other identifiers
    tags::ACCESSION_NUMBER,
    tags::REQUEST_ATTRIBUTES_SEQUENCE,
    tags::PERFORMED_PROCEDURE_STEP_ID,
    tags::SCHEDULED_PROCEDURE_STEP_ID,
    tags::STUDY_ID,
];

/// Dates truncated to YYYYMM01 by the metadata pipeline.
pub const DATE_TAGS_TO_TRUNCATE: &[Tag] = &[
    tags::STUDY_DATE,
    tags::SERIES_DATE,
    tags::ACQUISITION_DATE,
    tags::CONTENT_DATE,
    tags::INSTANCE_CREATION_DATE,
];

/// PII tags cleared on ultrasound files: a subset of the general list.
/// Study/series descriptions and institution name stay for clinical
/// context, and instance-creation time is left alone.
pub const ULTRASOUND_PII_TAGS: &[Tag] = &[
    tags::PATIENT_NAME,
    tags::PATIENT_BIRTH_DATE,
    tags::PATIENT_AGE,
    tags::PATIENT_ADDRESS,
    tags::PATIENT_TELEPHONE_NUMBERS,
    tags::OTHER_PATIENT_IDS,
    tags::STUDY_TIME,
    tags::SERIES_TIME,
    tags::ACQUISITION_TIME,
    tags::CONTENT_TIME,
    tags::INSTITUTION_ADDRESS,
    tags::INSTITUTIONAL_DEPARTMENT_NAME,
    tags::STATION_NAME,
    tags::REFERRING_PHYSICIAN_NAME,
    tags::PERFORMING_PHYSICIAN_NAME,
    tags::OPERATORS_NAME,
    tags::PHYSICIANS_OF_RECORD,
    tags::NAME_OF_PHYSICIANS_READING_STUDY,
    tags::ACCESSION_NUMBER,
    tags::STUDY_ID,
];

/// Dates truncated on ultrasound files (no instance-creation date).
pub const ULTRASOUND_DATE_TAGS: &[Tag] = &[
    tags::STUDY_DATE,
    tags::SERIES_DATE,
    tags::ACQUISITION_DATE,
    tags::CONTENT_DATE,
];

/// Replaces the value of `tag` with a single string, preserving the
/// element's VR. Absent tags are left absent.
pub fn set_string(obj: &mut DefaultDicomObject, tag: Tag, value: &str) {
    let vr = match obj.element(tag) {
        Ok(elem) => elem.vr(),
        Err(_) => return,
    };
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

/// Clears a tag value (sets it to the empty string).
pub fn clear_tag(obj: &mut DefaultDicomObject, tag: Tag) {
    set_string(obj, tag, "");
}

/// Truncates a DA value to YYYYMM01. Values shorter than 6 characters are
/// cleared; empty values are left unchanged.
pub fn truncate_date(obj: &mut DefaultDicomObject, tag: Tag) {
    let value = obj.element_str(tag).unwrap_or_default();
    if value.len() >= 6 {
        set_string(obj, tag, &format!("{}01", &value[..6]));
    } else if !value.is_empty() {
        set_string(obj, tag, "");
    }
}

/// Applies a full tag-transform pass: clear the PII set, truncate the date
/// set, and set the anonymous PatientID last so it wins over the clears.
pub fn apply_tag_transforms(
    obj: &mut DefaultDicomObject,
    pii_tags: &[Tag],
    date_tags: &[Tag],
    anon_id: &str,
) {
    for &tag in pii_tags {
        clear_tag(obj, tag);
    }
    for &tag in date_tags {
        truncate_date(obj, tag);
    }
    set_string(obj, tags::PATIENT_ID, anon_id);
}
