//! Pixel redaction: blacks out the top rows of an image, where ultrasound
//! devices burn in patient name and identifiers.

use anyhow::{bail, Context as _, Result};
use dicom::core::header::Header;
use dicom::core::{DataElement, DicomValue, PrimitiveValue};
use dicom::object::DefaultDicomObject;

use crate::dicom_access::{tags, ElementAccess};

/// Zeroes the first `redact_rows` rows of the pixel data in place.
///
/// The payload must be native (uncompressed); the ultrasound pipeline
/// decompresses JPEG-LS files before calling this. Rows beyond the image
/// clamp to the buffer.
pub fn redact_top_rows(obj: &mut DefaultDicomObject, redact_rows: u32) -> Result<()> {
    let rows = obj
        .element_u32(tags::ROWS)
        .context("no Rows tag found")?;
    let cols = obj
        .element_u32(tags::COLUMNS)
        .context("no Columns tag found")?;
    let samples = obj
        .element_u32(tags::SAMPLES_PER_PIXEL)
        .filter(|&s| s != 0)
        .unwrap_or(1);
    let bits_allocated = obj
        .element_u32(tags::BITS_ALLOCATED)
        .filter(|&b| b != 0)
        .unwrap_or(8);
    let bytes_per_sample = (bits_allocated as usize).div_ceil(8);

    let redact_rows = redact_rows.min(rows) as usize;
    let cols = cols as usize;
    let samples = samples as usize;

    // Copy the payload out so the element borrow ends before the put.
    enum Payload {
        Bytes(Vec<u8>),
        Words(Vec<u16>),
    }

    let elem = obj
        .element(tags::PIXEL_DATA)
        .context("no pixel data found")?;
    let vr = elem.vr();
    let payload = match elem.value() {
        DicomValue::Primitive(PrimitiveValue::U8(data)) => Payload::Bytes(data.to_vec()),
        DicomValue::Primitive(PrimitiveValue::U16(data)) => Payload::Words(data.to_vec()),
        DicomValue::PixelSequence(_) => {
            bail!("pixel data is still encapsulated; decompress before redaction")
        }
        _ => bail!("unsupported pixel data payload"),
    };

    match payload {
        Payload::Bytes(mut data) => {
            let bytes_per_row = cols * samples * bytes_per_sample;
            let redact_bytes = (redact_rows * bytes_per_row).min(data.len());
            data[..redact_bytes].fill(0);
            obj.put(DataElement::new(tags::PIXEL_DATA, vr, PrimitiveValue::from(data)));
        }
        Payload::Words(mut data) => {
            let redact_samples = (redact_rows * cols * samples).min(data.len());
            data[..redact_samples].fill(0);
            obj.put(DataElement::new(
                tags::PIXEL_DATA,
                vr,
                PrimitiveValue::U16(data.into()),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::VR;
    use dicom::dictionary_std::StandardDataDictionary;
    use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};

    fn image_object(
        rows: u16,
        cols: u16,
        samples: u16,
        bits: u16,
        pixel_value: PrimitiveValue,
    ) -> DefaultDicomObject {
        let mut obj = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
        obj.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)));
        obj.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(cols)));
        obj.put(DataElement::new(
            tags::SAMPLES_PER_PIXEL,
            VR::US,
            PrimitiveValue::from(samples),
        ));
        obj.put(DataElement::new(
            tags::BITS_ALLOCATED,
            VR::US,
            PrimitiveValue::from(bits),
        ));
        let vr = if bits > 8 { VR::OW } else { VR::OB };
        obj.put(DataElement::new(tags::PIXEL_DATA, vr, pixel_value));

        let meta = FileMetaTableBuilder::new()
            .transfer_syntax("1.2.840.10008.1.2.1")
            .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.6.1")
            .media_storage_sop_instance_uid("1.2.3.4")
            .build()
            .expect("meta");
        let mut file_obj =
            FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
        for elem in obj {
            file_obj.put(elem);
        }
        file_obj
    }

    #[test]
    fn redacts_exactly_the_requested_rows_of_bytes() {
        let pixels: Vec<u8> = (0..8 * 4).map(|i| (i + 1) as u8).collect();
        let mut obj = image_object(
            8,
            4,
            1,
            8,
            PrimitiveValue::from(pixels.clone()),
        );

        redact_top_rows(&mut obj, 3).unwrap();

        let elem = obj.element(tags::PIXEL_DATA).unwrap();
        let DicomValue::Primitive(PrimitiveValue::U8(data)) = elem.value() else {
            panic!("expected u8 payload");
        };
        assert!(data[..12].iter().all(|&b| b == 0));
        assert_eq!(&data[12..], &pixels[12..]);
    }

    #[test]
    fn redaction_clamps_to_image_height() {
        let pixels = vec![7u8; 4 * 4];
        let mut obj = image_object(
            4,
            4,
            1,
            8,
            PrimitiveValue::from(pixels),
        );

        redact_top_rows(&mut obj, 100).unwrap();

        let elem = obj.element(tags::PIXEL_DATA).unwrap();
        let DicomValue::Primitive(PrimitiveValue::U8(data)) = elem.value() else {
            panic!("expected u8 payload");
        };
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn sixteen_bit_samples_are_zeroed_samplewise() {
        let pixels: Vec<u16> = (0..6 * 2).map(|i| (i + 1) as u16).collect();
        let mut obj = image_object(
            6,
            2,
            1,
            16,
            PrimitiveValue::U16(pixels.clone().into()),
        );

        redact_top_rows(&mut obj, 2).unwrap();

        let elem = obj.element(tags::PIXEL_DATA).unwrap();
        let DicomValue::Primitive(PrimitiveValue::U16(data)) = elem.value() else {
            panic!("expected u16 payload");
        };
        assert!(data[..4].iter().all(|&w| w == 0));
        assert_eq!(&data[4..], &pixels[4..]);
    }

    #[test]
    fn multi_sample_rows_cover_all_samples() {
        // RGB 4x2: one row is 4 * 3 bytes
        let pixels: Vec<u8> = (0..4 * 2 * 3).map(|i| (i + 1) as u8).collect();
        let mut obj = image_object(
            2,
            4,
            3,
            8,
            PrimitiveValue::from(pixels.clone()),
        );

        redact_top_rows(&mut obj, 1).unwrap();

        let elem = obj.element(tags::PIXEL_DATA).unwrap();
        let DicomValue::Primitive(PrimitiveValue::U8(data)) = elem.value() else {
            panic!("expected u8 payload");
        };
        assert!(data[..12].iter().all(|&b| b == 0));
        assert_eq!(&data[12..], &pixels[12..]);
    }

    #[test]
    fn missing_rows_tag_fails() {
        let mut obj = image_object(
            4,
            4,
            1,
            8,
            PrimitiveValue::from(vec![1u8; 16]),
        );
        // Rebuild without Rows by overwriting with an empty string is not
        // possible for US; instead check the missing-columns case via a
        // fresh object lacking the tag.
        let meta = FileMetaTableBuilder::new()
            .transfer_syntax("1.2.840.10008.1.2.1")
            .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.6.1")
            .media_storage_sop_instance_uid("1.2.3.4")
            .build()
            .expect("meta");
        let mut bare =
            FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
        bare.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::from(vec![1u8; 16]),
        ));
        assert!(redact_top_rows(&mut bare, 1).is_err());

        // And the fully-formed object still redacts fine.
        assert!(redact_top_rows(&mut obj, 1).is_ok());
    }
}
