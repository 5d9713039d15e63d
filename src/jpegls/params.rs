/// Number of regular-mode contexts (ITU-T T.87).
pub const CONTEXT_COUNT: usize = 365;

/// Number of run-mode contexts.
pub const RUN_CONTEXT_COUNT: usize = 2;

/// Lower bound of the bias correction value C.
pub const MIN_C: i32 = -128;

/// Upper bound of the bias correction value C.
pub const MAX_C: i32 = 127;

/// Cap on the Golomb parameter k.
pub const MAX_K: i32 = 32;

/// Run length coding order table from ITU-T T.87 Table A.2.
/// `rk` is the segment-length exponent: a full segment covers `1 << rk`
/// samples at that RUNindex.
pub const J_TABLE: [u8; 32] = [
    0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 5, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14,
    15, 16, 17,
];

/// Coding parameters derived from the sample bit depth and NEAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    /// Maximum sample value (2^bpp - 1).
    pub max_val: i32,
    /// Loss parameter; 0 for lossless.
    pub near: i32,
    /// Gradient quantization thresholds.
    pub t1: i32,
    pub t2: i32,
    pub t3: i32,
    /// Context reset threshold (value of N at which statistics halve).
    pub reset: i32,
    /// Bits needed for a mapped error value: ceil(log2(RANGE)).
    pub qbpp: i32,
    /// (MAXVAL + 2*NEAR) / (2*NEAR + 1) + 1, or MAXVAL + 1 for lossless.
    pub range: i32,
    /// Limit for the unary part of a Golomb code.
    pub limit: i32,
    /// Bits per sample.
    pub bits_per_pixel: i32,
}

impl Params {
    /// Computes the coding parameters for a bit depth and NEAR value
    /// (ITU-T T.87 A.1/A.2.1/A.7).
    pub fn new(bpp: u8, near: i32) -> Params {
        let bpp = i32::from(bpp);
        let max_val = (1 << bpp) - 1;

        let range = if near == 0 {
            max_val + 1
        } else {
            (max_val + 2 * near) / (2 * near + 1) + 1
        };

        let (t1, t2, t3) = default_thresholds(max_val, near);

        let mut qbpp = 0;
        while (1 << qbpp) < range {
            qbpp += 1;
        }

        let limit = 2 * (bpp + bpp.max(8));

        Params {
            max_val,
            near,
            t1,
            t2,
            t3,
            reset: 64,
            qbpp,
            range,
            limit,
            bits_per_pixel: bpp,
        }
    }
}

/// T1/T2/T3 defaults per ITU-T T.87 Table A.1.
fn default_thresholds(max_val: i32, near: i32) -> (i32, i32, i32) {
    if max_val >= 128 {
        let factor = max_val.min(4095);
        let t1 = clamp(near + 1 + factor / 256, near + 1, max_val);
        let t2 = clamp(near + 1 + factor / 64, t1, max_val);
        let t3 = clamp(near + 1 + factor / 16, t2, max_val);
        (t1, t2, t3)
    } else {
        let t1 = clamp(near + 1 + ((max_val + 1) / 16).max(1), near + 1, max_val);
        let t2 = clamp(near + 1 + ((max_val + 1) / 8).max(1), t1, max_val);
        let t3 = clamp(near + 1 + ((max_val + 1) / 4).max(1), t2, max_val);
        (t1, t2, t3)
    }
}

fn clamp(val: i32, lo: i32, hi: i32) -> i32 {
    val.max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_bit_defaults() {
        let p = Params::new(8, 0);
        assert_eq!(p.max_val, 255);
        assert_eq!(p.range, 256);
        assert_eq!(p.qbpp, 8);
        assert_eq!(p.limit, 32);
        // Table A.1 defaults for MAXVAL=255, NEAR=0
        assert_eq!((p.t1, p.t2, p.t3), (3, 7, 21));
        assert_eq!(p.reset, 64);
    }

    #[test]
    fn twelve_and_sixteen_bit() {
        let p12 = Params::new(12, 0);
        assert_eq!(p12.max_val, 4095);
        assert_eq!(p12.range, 4096);
        assert_eq!(p12.qbpp, 12);
        assert_eq!(p12.limit, 2 * (12 + 12));

        let p16 = Params::new(16, 0);
        assert_eq!(p16.max_val, 65535);
        assert_eq!(p16.qbpp, 16);
        assert_eq!(p16.limit, 2 * (16 + 16));
    }

    #[test]
    fn small_maxval_thresholds_stay_ordered() {
        let p = Params::new(4, 0);
        assert!(p.t1 >= 1);
        assert!(p.t2 >= p.t1);
        assert!(p.t3 >= p.t2);
        assert!(p.t3 <= p.max_val);
    }

    #[test]
    fn j_table_layout() {
        assert_eq!(J_TABLE.len(), 32);
        assert_eq!(&J_TABLE[..4], &[0, 0, 0, 0]);
        assert_eq!(J_TABLE[16], 4);
        assert_eq!(J_TABLE[18], 5);
        assert_eq!(J_TABLE[31], 17);
    }
}
