//! DICOM encapsulated pixel data framing.
//!
//! Compressed frames travel inside an item sequence: a basic offset table
//! item, one item per frame (even-length, zero-padded), and a sequence
//! delimitation item. All tags and lengths are little-endian.

/// Item tag (FFFE,E000) as written on the wire.
const ITEM_TAG: [u8; 4] = [0xFE, 0xFF, 0x00, 0xE0];
/// Sequence delimitation tag (FFFE,E0DD).
const SEQ_DELIM_TAG: [u8; 4] = [0xFE, 0xFF, 0xDD, 0xE0];

/// Pads a frame to even length with a zero byte.
pub fn pad_even(mut frame: Vec<u8>) -> Vec<u8> {
    if frame.len() % 2 != 0 {
        frame.push(0);
    }
    frame
}

/// Basic offset table entries: for each frame, the distance from the end of
/// the offset-table item to the start of that frame's item.
pub fn offset_table(frames: &[Vec<u8>]) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(frames.len());
    let mut current = 0u32;
    for frame in frames {
        offsets.push(current);
        let mut len = frame.len() as u32;
        if len % 2 != 0 {
            len += 1;
        }
        current += 8 + len;
    }
    offsets
}

/// Wraps compressed frames as a complete encapsulated pixel data value.
/// The offset table is left empty for single-frame images.
pub fn encapsulate_frames(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();

    // Basic offset table item
    buf.extend_from_slice(&ITEM_TAG);
    if frames.len() <= 1 {
        buf.extend_from_slice(&0u32.to_le_bytes());
    } else {
        let offsets = offset_table(frames);
        buf.extend_from_slice(&((offsets.len() * 4) as u32).to_le_bytes());
        for offset in offsets {
            buf.extend_from_slice(&offset.to_le_bytes());
        }
    }

    for frame in frames {
        let mut len = frame.len() as u32;
        if len % 2 != 0 {
            len += 1;
        }
        buf.extend_from_slice(&ITEM_TAG);
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(frame);
        if frame.len() % 2 != 0 {
            buf.push(0);
        }
    }

    buf.extend_from_slice(&SEQ_DELIM_TAG);
    buf.extend_from_slice(&0u32.to_le_bytes());

    buf
}

/// Convenience wrapper for the common single-frame case.
pub fn encapsulate_single_frame(frame: Vec<u8>) -> Vec<u8> {
    encapsulate_frames(&[frame])
}

/// Inverse of `encapsulate_frames`: splits an encapsulated value back into
/// its frame items. Tolerates truncated input by stopping early.
pub fn extract_frames(data: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut offset = 0usize;

    if data.len() < 8 {
        return frames;
    }

    // Skip the basic offset table
    if data[..4] == ITEM_TAG {
        let bot_len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        offset = 8 + bot_len;
    }

    while offset + 8 <= data.len() {
        if data[offset..offset + 4] == SEQ_DELIM_TAG {
            break;
        }
        if data[offset..offset + 4] != ITEM_TAG {
            break;
        }
        let item_len = u32::from_le_bytes([
            data[offset + 4],
            data[offset + 5],
            data[offset + 6],
            data[offset + 7],
        ]) as usize;
        offset += 8;

        if offset + item_len <= data.len() {
            frames.push(data[offset..offset + item_len].to_vec());
        }
        offset += item_len;
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_has_empty_offset_table() {
        let encapsulated = encapsulate_single_frame(vec![1, 2, 3, 4]);

        // BOT item with zero length
        assert_eq!(&encapsulated[..4], &ITEM_TAG);
        assert_eq!(&encapsulated[4..8], &[0, 0, 0, 0]);
        // Frame item
        assert_eq!(&encapsulated[8..12], &ITEM_TAG);
        assert_eq!(&encapsulated[12..16], &4u32.to_le_bytes());
        assert_eq!(&encapsulated[16..20], &[1, 2, 3, 4]);
        // Sequence delimiter
        assert_eq!(&encapsulated[20..24], &SEQ_DELIM_TAG);
        assert_eq!(&encapsulated[24..28], &[0, 0, 0, 0]);
    }

    #[test]
    fn odd_frames_are_zero_padded() {
        let encapsulated = encapsulate_single_frame(vec![9, 9, 9]);
        // Item length rounded to 4, padding byte 0
        assert_eq!(&encapsulated[12..16], &4u32.to_le_bytes());
        assert_eq!(&encapsulated[16..20], &[9, 9, 9, 0]);
    }

    #[test]
    fn multi_frame_offsets_measure_from_table_end() {
        let frames = vec![vec![1u8; 6], vec![2u8; 3], vec![3u8; 4]];
        let offsets = offset_table(&frames);
        // frame 0 at 0; frame 1 after 8 + 6; frame 2 after another 8 + 4 (padded)
        assert_eq!(offsets, vec![0, 14, 26]);

        let encapsulated = encapsulate_frames(&frames);
        // BOT length = 3 offsets * 4 bytes
        assert_eq!(&encapsulated[4..8], &12u32.to_le_bytes());
        // First frame item begins right after the table
        assert_eq!(&encapsulated[8 + 12..8 + 12 + 4], &ITEM_TAG);
    }

    #[test]
    fn extract_inverts_encapsulation() {
        let frames = vec![vec![1u8, 2, 3, 4], vec![5u8, 6]];
        let encapsulated = encapsulate_frames(&frames);
        let roundtrip = extract_frames(&encapsulated);
        assert_eq!(roundtrip, frames);

        let single = encapsulate_single_frame(vec![7u8, 8]);
        assert_eq!(extract_frames(&single), vec![vec![7u8, 8]]);
    }

    #[test]
    fn pad_even_behavior() {
        assert_eq!(pad_even(vec![1]), vec![1, 0]);
        assert_eq!(pad_even(vec![1, 2]), vec![1, 2]);
    }
}
