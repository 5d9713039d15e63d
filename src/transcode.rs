//! JPEG-LS transfer-syntax handling: detection, external decompression and
//! re-compression with the embedded encoder.
//!
//! Decompression goes through the dcmtk `dcmdjpls` tool because decoding is
//! out of scope here; compression uses the in-crate encoder so the output
//! does not depend on external tooling.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use dicom::core::value::PixelFragmentSequence;
use dicom::core::{DataElement, DicomValue, Length, PrimitiveValue, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, FileDicomObject, FileMetaTableBuilder};
use dicom::transfer_syntax::entries::{
    EXPLICIT_VR_LITTLE_ENDIAN, JPEG_LS_LOSSLESS_IMAGE_COMPRESSION,
    JPEG_LS_LOSSY_IMAGE_COMPRESSION,
};
use tempfile::TempPath;

use crate::dicom_access::{read_dicom_metadata_only, tags, ElementAccess};
use crate::encapsulate;
use crate::jpegls;

/// JPEG-LS lossless transfer syntax UID (1.2.840.10008.1.2.4.80).
pub fn jpegls_lossless_uid() -> &'static str {
    JPEG_LS_LOSSLESS_IMAGE_COMPRESSION.uid()
}

/// JPEG-LS near-lossless transfer syntax UID (1.2.840.10008.1.2.4.81).
pub fn jpegls_near_lossless_uid() -> &'static str {
    JPEG_LS_LOSSY_IMAGE_COMPRESSION.uid()
}

/// Whether the file's transfer syntax is one of the JPEG-LS encodings.
pub fn is_jpegls_compressed(path: &Path) -> bool {
    let Ok(obj) = read_dicom_metadata_only(path) else {
        return false;
    };
    let Some(ts) = obj.transfer_syntax() else {
        return false;
    };
    ts == jpegls_lossless_uid() || ts == jpegls_near_lossless_uid()
}

/// Decompresses a JPEG-LS DICOM file to a temporary uncompressed file via
/// dcmtk. The returned path deletes itself on drop, covering every exit
/// path of the caller.
pub fn decompress_jpegls(input: &Path) -> Result<TempPath> {
    let tmp = tempfile::Builder::new()
        .prefix("dicom-")
        .suffix(".dcm")
        .tempfile()
        .context("could not create temp file")?;
    let tmp_path = tmp.into_temp_path();

    let output = match Command::new("dcmdjpls").arg(input).arg(&*tmp_path).output() {
        Ok(output) => output,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            bail!("dcmtk not installed. Run: brew install dcmtk (macOS) or apt install dcmtk (Linux)")
        }
        Err(err) => return Err(err).context("could not run dcmdjpls"),
    };

    if !output.status.success() {
        bail!(
            "dcmdjpls failed: {}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(tmp_path)
}

/// Whether the dcmtk JPEG-LS decompressor is available, either on PATH or
/// in a well-known install location.
pub fn dcmtk_installed() -> bool {
    if Command::new("dcmdjpls")
        .arg("--version")
        .output()
        .is_ok()
    {
        return true;
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &["/opt/homebrew/bin/dcmdjpls", "/usr/local/bin/dcmdjpls"]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\Program Files\\dcmtk\\bin\\dcmdjpls.exe",
            "C:\\dcmtk\\bin\\dcmdjpls.exe",
        ]
    } else {
        &["/usr/bin/dcmdjpls", "/usr/local/bin/dcmdjpls"]
    };
    candidates.iter().any(|p| Path::new(p).exists())
}

/// Geometry and depth of the image as stored in the dataset.
struct PixelLayout {
    width: usize,
    height: usize,
    samples: usize,
    bits_allocated: u8,
    frames: usize,
}

fn pixel_layout(obj: &DefaultDicomObject) -> Result<PixelLayout> {
    let height = obj.element_u32(tags::ROWS).context("no Rows tag found")? as usize;
    let width = obj
        .element_u32(tags::COLUMNS)
        .context("no Columns tag found")? as usize;
    if width == 0 || height == 0 {
        bail!("invalid image dimensions: {width}x{height}");
    }
    let samples = obj
        .element_u32(tags::SAMPLES_PER_PIXEL)
        .filter(|&s| s != 0)
        .unwrap_or(1) as usize;
    let bits_allocated = obj
        .element_u32(tags::BITS_ALLOCATED)
        .filter(|&b| b != 0)
        .unwrap_or(8) as u8;
    let frames = obj
        .element_u32(tags::NUMBER_OF_FRAMES)
        .filter(|&f| f != 0)
        .unwrap_or(1) as usize;
    Ok(PixelLayout {
        width,
        height,
        samples,
        bits_allocated,
        frames,
    })
}

/// Pulls the native pixel payload out as little-endian bytes.
fn raw_pixel_bytes(obj: &DefaultDicomObject) -> Result<Vec<u8>> {
    let elem = obj
        .element(tags::PIXEL_DATA)
        .context("no pixel data found")?;
    match elem.value() {
        DicomValue::Primitive(PrimitiveValue::U8(data)) => Ok(data.to_vec()),
        DicomValue::Primitive(PrimitiveValue::U16(data)) => {
            let mut bytes = Vec::with_capacity(data.len() * 2);
            for word in data.iter() {
                bytes.extend_from_slice(&word.to_le_bytes());
            }
            Ok(bytes)
        }
        DicomValue::PixelSequence(_) => bail!("pixel data is already encapsulated"),
        _ => bail!("unsupported pixel data payload"),
    }
}

/// Compresses the dataset's pixel data with the embedded JPEG-LS encoder,
/// one fragment per frame.
fn compress_pixel_data(obj: &DefaultDicomObject) -> Result<Vec<Vec<u8>>> {
    let layout = pixel_layout(obj)?;
    let data = raw_pixel_bytes(obj)?;

    let bytes_per_sample = (usize::from(layout.bits_allocated) + 7) / 8;
    let frame_size = layout.width * layout.height * layout.samples * bytes_per_sample;

    // A multi-frame declaration only holds if the buffer divides evenly;
    // otherwise encode the payload as a single frame and let the length
    // check reject anything inconsistent.
    let frames: Vec<&[u8]> = if layout.frames > 1 && data.len() == layout.frames * frame_size {
        data.chunks(frame_size).collect()
    } else {
        vec![&data[..]]
    };

    let mut compressed = Vec::with_capacity(frames.len());
    for frame in frames {
        let encoded = jpegls::encode_from_bytes(
            frame,
            layout.width,
            layout.height,
            layout.samples,
            layout.bits_allocated,
        )?;
        compressed.push(encapsulate::pad_even(encoded));
    }
    Ok(compressed)
}

/// Serializes the dataset to `output` with its pixel data re-encoded as
/// encapsulated JPEG-LS lossless and the transfer syntax rewritten.
pub fn save_with_jpegls(obj: DefaultDicomObject, output: &Path) -> Result<()> {
    let fragments = compress_pixel_data(&obj)?;
    let offsets = if fragments.len() > 1 {
        encapsulate::offset_table(&fragments)
    } else {
        Vec::new()
    };

    let sop_class_uid = obj
        .element_str(tags::SOP_CLASS_UID)
        .unwrap_or_else(|| "1.2.840.10008.5.1.4.1.1.6.1".to_string());
    let sop_instance_uid = obj
        .element_str(tags::SOP_INSTANCE_UID)
        .unwrap_or_else(|| "1.2.3.4.5".to_string());

    let file_meta = FileMetaTableBuilder::new()
        .transfer_syntax(jpegls_lossless_uid())
        .media_storage_sop_class_uid(sop_class_uid)
        .media_storage_sop_instance_uid(sop_instance_uid)
        .build()
        .context("could not build file meta table")?;

    let mut file_obj =
        FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, file_meta);
    for elem in obj.into_inner() {
        file_obj.put(elem);
    }
    file_obj.put(DataElement::new_with_len(
        tags::PIXEL_DATA,
        VR::OB,
        Length::UNDEFINED,
        PixelFragmentSequence::new(offsets, fragments),
    ));
    set_string_value(&mut file_obj, tags::TRANSFER_SYNTAX_UID, jpegls_lossless_uid());

    file_obj
        .write_to_file(output)
        .context("could not write output file")?;
    Ok(())
}

/// Serializes the dataset to `output` without altering the transfer syntax.
pub fn save_unchanged(obj: &DefaultDicomObject, output: &Path) -> Result<()> {
    obj.write_to_file(output)
        .context("could not write output file")
}

fn set_string_value(obj: &mut DefaultDicomObject, tag: dicom::core::Tag, value: &str) {
    if obj.element(tag).is_ok() {
        obj.put(DataElement::new(tag, VR::UI, PrimitiveValue::from(value)));
    }
}

/// Explicit VR little endian, the uncompressed syntax dcmdjpls emits.
pub fn explicit_vr_le_uid() -> &'static str {
    EXPLICIT_VR_LITTLE_ENDIAN.uid()
}
