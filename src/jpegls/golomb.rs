use super::bitwriter::BitWriter;

/// Maps a prediction error to a non-negative index for Golomb coding,
/// interleaving positives and negatives: 0, 1, -1, 2, -2 -> 0, 2, 1, 4, 3.
pub fn map_error_value(errval: i32) -> i32 {
    if errval >= 0 {
        2 * errval
    } else {
        2 * (-errval) - 1
    }
}

/// Sign-corrects a raw prediction error, quantizes it when NEAR > 0, and
/// reduces it into the coding range (ITU-T T.87 A.4.4/A.4.5).
pub fn compute_prediction_error(
    actual: i32,
    predicted: i32,
    sign: i32,
    near: i32,
    range: i32,
) -> i32 {
    let mut errval = (actual - predicted) * sign;
    if near > 0 {
        errval = if errval > 0 {
            (errval + near) / (2 * near + 1)
        } else {
            -(near - errval) / (2 * near + 1)
        };
    }
    reduce_error(errval, range)
}

/// Reduces a (sign-corrected, quantized) error into (-RANGE/2, RANGE/2]
/// (ITU-T T.87 A.4.5).
pub fn reduce_error(mut errval: i32, range: i32) -> i32 {
    if errval < 0 {
        errval += range;
    }
    if errval >= (range + 1) / 2 {
        errval -= range;
    }
    errval
}

/// Rebuilds the sample a decoder will see, to keep the causal plane in sync.
/// For lossless the dequantization is the identity.
pub fn reconstruct_sample(predicted: i32, errval: i32, sign: i32, near: i32, max_val: i32) -> i32 {
    let mut errval = errval * sign;
    if near > 0 {
        errval *= 2 * near + 1;
    }
    (predicted + errval).clamp(0, max_val)
}

/// Limited-length Golomb-Rice coding of a mapped error value
/// (ITU-T T.87 A.5.3).
///
/// The quotient is unary-coded while it stays below `limit - qbpp - 1`;
/// beyond that an escape emits the maximal unary prefix followed by
/// `mapped - 1` in `qbpp` bits.
pub fn encode_golomb(bw: &mut BitWriter<'_>, mapped: i32, k: i32, limit: i32, qbpp: i32) {
    let q = mapped >> k;
    if q < limit - qbpp - 1 {
        bw.write_unary(q as u32);
        if k > 0 {
            bw.write_bits((mapped & ((1 << k) - 1)) as u32, k as u32);
        }
    } else {
        bw.write_unary((limit - qbpp - 1).max(0) as u32);
        bw.write_bits((mapped - 1) as u32, qbpp as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mapping_interleaves() {
        let cases = [(0, 0), (1, 2), (-1, 1), (2, 4), (-2, 3), (5, 10), (-5, 9)];
        for (e, want) in cases {
            assert_eq!(map_error_value(e), want, "errval={e}");
        }
    }

    #[test]
    fn modulo_reduction_range() {
        for e in -255..=255 {
            let r = reduce_error(e, 256);
            assert!((-128..128).contains(&r), "reduced {e} -> {r}");
        }
        assert_eq!(reduce_error(255, 256), -1);
        assert_eq!(reduce_error(-255, 256), 1);
        assert_eq!(reduce_error(127, 256), 127);
        assert_eq!(reduce_error(129, 256), -127);
    }

    #[test]
    fn reconstruct_clamps() {
        assert_eq!(reconstruct_sample(250, 10, 1, 0, 255), 255);
        assert_eq!(reconstruct_sample(5, 10, -1, 0, 255), 0);
        assert_eq!(reconstruct_sample(100, 3, 1, 0, 255), 103);
    }

    #[test]
    fn golomb_short_codes() {
        // k=0: pure unary
        let mut out = Vec::new();
        let mut bw = BitWriter::new(&mut out);
        encode_golomb(&mut bw, 3, 0, 32, 8);
        bw.flush();
        // 0001 + 1111 padding
        assert_eq!(out, vec![0x1F]);

        // k=2, mapped=6: q=1, remainder=2 -> 01 10 + padding
        let mut out = Vec::new();
        let mut bw = BitWriter::new(&mut out);
        encode_golomb(&mut bw, 6, 2, 32, 8);
        bw.flush();
        assert_eq!(out, vec![0b0110_1111]);
    }

    #[test]
    fn golomb_escape_path() {
        // limit=8, qbpp=4: escape when q >= 3
        let mut out = Vec::new();
        let mut bw = BitWriter::new(&mut out);
        encode_golomb(&mut bw, 12, 0, 8, 4);
        bw.flush();
        // unary(3) = 0001, then mapped-1 = 11 in 4 bits = 1011
        assert_eq!(out, vec![0b0001_1011]);
    }
}
