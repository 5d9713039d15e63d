//! JPEG-LS marker segment writers.
//!
//! All multi-byte fields are big-endian per the JPEG interchange format.

pub const MARKER_SOI: u8 = 0xD8;
pub const MARKER_EOI: u8 = 0xD9;
pub const MARKER_SOF55: u8 = 0xF7;
pub const MARKER_SOS: u8 = 0xDA;
pub const MARKER_LSE: u8 = 0xF8;

/// Preset coding parameters LSE type.
const LSE_PRESET_PARAMS: u8 = 1;

/// Frame header fields.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub width: u16,
    pub height: u16,
    pub bits_per_sample: u8,
    pub component_count: u8,
}

/// Scan header fields plus the optional preset parameters.
#[derive(Debug, Clone, Copy)]
pub struct ScanInfo {
    /// NEAR parameter (0 = lossless).
    pub near: u8,
    /// Interleave mode (0 = none, 2 = sample-interleaved).
    pub ilv: u8,
    /// Point transform; always 0 here.
    pub pt: u8,
    pub max_val: u16,
    pub t1: u16,
    pub t2: u16,
    pub t3: u16,
    pub reset: u16,
    /// Whether to emit an LSE preset-parameters segment before SOS.
    pub use_preset: bool,
}

fn push_u16(buf: &mut Vec<u8>, val: u16) {
    buf.extend_from_slice(&val.to_be_bytes());
}

pub fn write_soi(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&[0xFF, MARKER_SOI]);
}

pub fn write_eoi(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&[0xFF, MARKER_EOI]);
}

/// SOF55 marker segment: precision, dimensions and one descriptor per
/// component (id, 1:1 sampling, no quantization table).
pub fn write_sof55(buf: &mut Vec<u8>, info: FrameInfo) {
    let nf = info.component_count.max(1);
    let length = 8 + 3 * u16::from(nf);

    buf.extend_from_slice(&[0xFF, MARKER_SOF55]);
    push_u16(buf, length);
    buf.push(info.bits_per_sample);
    push_u16(buf, info.height);
    push_u16(buf, info.width);
    buf.push(nf);
    for i in 0..nf {
        buf.push(i + 1);
        buf.push(0x11);
        buf.push(0);
    }
}

/// LSE preset-parameters segment (ID 1): MAXVAL, T1..T3, RESET.
pub fn write_lse_preset(buf: &mut Vec<u8>, info: ScanInfo) {
    buf.extend_from_slice(&[0xFF, MARKER_LSE]);
    push_u16(buf, 13);
    buf.push(LSE_PRESET_PARAMS);
    push_u16(buf, info.max_val);
    push_u16(buf, info.t1);
    push_u16(buf, info.t2);
    push_u16(buf, info.t3);
    push_u16(buf, info.reset);
}

/// SOS marker segment for an explicit list of 1-based component selectors.
pub fn write_sos_components(buf: &mut Vec<u8>, info: ScanInfo, component_ids: &[u8]) {
    let ids: &[u8] = if component_ids.is_empty() {
        &[1]
    } else {
        component_ids
    };
    let length = 6 + 2 * ids.len() as u16;

    buf.extend_from_slice(&[0xFF, MARKER_SOS]);
    push_u16(buf, length);
    buf.push(ids.len() as u8);
    for &id in ids {
        buf.push(id);
        buf.push(0);
    }
    buf.push(info.near);
    buf.push(info.ilv);
    buf.push(info.pt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sof55_layout() {
        let mut buf = Vec::new();
        write_sof55(
            &mut buf,
            FrameInfo {
                width: 640,
                height: 480,
                bits_per_sample: 8,
                component_count: 1,
            },
        );
        assert_eq!(&buf[..2], &[0xFF, 0xF7]);
        // length 8 + 3*1 = 11
        assert_eq!(&buf[2..4], &[0, 11]);
        assert_eq!(buf[4], 8);
        assert_eq!(&buf[5..7], &480u16.to_be_bytes());
        assert_eq!(&buf[7..9], &640u16.to_be_bytes());
        assert_eq!(buf[9], 1);
        assert_eq!(&buf[10..13], &[1, 0x11, 0]);
        assert_eq!(buf.len(), 13);
    }

    #[test]
    fn sos_layout_single_component() {
        let mut buf = Vec::new();
        let scan = ScanInfo {
            near: 0,
            ilv: 0,
            pt: 0,
            max_val: 255,
            t1: 3,
            t2: 7,
            t3: 21,
            reset: 64,
            use_preset: false,
        };
        write_sos_components(&mut buf, scan, &[1]);
        assert_eq!(&buf[..2], &[0xFF, 0xDA]);
        assert_eq!(&buf[2..4], &[0, 8]);
        assert_eq!(buf[4], 1);
        assert_eq!(&buf[5..7], &[1, 0]);
        assert_eq!(&buf[7..10], &[0, 0, 0]);
    }

    #[test]
    fn lse_preset_layout() {
        let mut buf = Vec::new();
        let scan = ScanInfo {
            near: 0,
            ilv: 0,
            pt: 0,
            max_val: 4095,
            t1: 16,
            t2: 64,
            t3: 256,
            reset: 64,
            use_preset: true,
        };
        write_lse_preset(&mut buf, scan);
        assert_eq!(&buf[..2], &[0xFF, 0xF8]);
        assert_eq!(&buf[2..4], &[0, 13]);
        assert_eq!(buf[4], 1);
        assert_eq!(buf.len(), 2 + 13);
    }
}
