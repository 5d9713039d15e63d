use super::bitwriter::BitWriter;
use super::context::ContextModel;
use super::golomb::{encode_golomb, reduce_error};
use super::params::{Params, J_TABLE, MAX_K};
use super::predictor::Neighborhood;

/// Encodes a run starting at (x, y) with reference value `ra` (the left
/// neighbor at run entry). Returns the number of samples consumed,
/// including the interrupting sample when the run stops short of the line
/// end (ITU-T T.87 A.7).
pub fn encode_run(
    bw: &mut BitWriter<'_>,
    cm: &mut ContextModel,
    params: &Params,
    ng: &Neighborhood,
    x: usize,
    y: usize,
    ra: i32,
) -> usize {
    let row = ng.row(y);
    let remaining = row.len() - x;

    let mut run_length = 0;
    for &sample in &row[x..] {
        if samples_match(sample, ra, params.near) {
            run_length += 1;
        } else {
            break;
        }
    }

    if run_length > 0 {
        encode_run_segments(bw, cm, run_length, remaining);
    }

    if run_length < remaining {
        let sample = row[x + run_length];
        let run_index = cm.run_index();
        let rb = if y == 0 {
            ra
        } else {
            ng.get(x + run_length, y - 1)
        };
        encode_run_interruption(bw, cm, params, sample, ra, rb, run_index);
        return run_length + 1;
    }

    run_length
}

fn samples_match(sample: i32, ra: i32, near: i32) -> bool {
    if near == 0 {
        sample == ra
    } else {
        (sample - ra).abs() <= near
    }
}

/// J-table driven segment coding of the run length (T.87 A.7.1.1).
///
/// A run that reaches the end of the line emits no terminating segment;
/// a run that stops earlier is closed with a 0 bit plus the remainder
/// (or rk zero bits when it stopped exactly on a segment boundary), and
/// RUNindex falls back to 0.
fn encode_run_segments(
    bw: &mut BitWriter<'_>,
    cm: &mut ContextModel,
    mut run_length: usize,
    remaining: usize,
) {
    let mut line_remaining = remaining;

    while run_length > 0 {
        let rk = J_TABLE[cm.run_index()] as u32;
        let segment = 1usize << rk;

        if run_length >= segment {
            bw.write_bit(1);
            run_length -= segment;
            line_remaining -= segment;
            cm.increment_run_index();

            if run_length == 0 {
                if line_remaining == 0 {
                    return;
                }
                // Run ended on a segment boundary before end of line.
                let rk = J_TABLE[cm.run_index()] as u32;
                bw.write_bit(0);
                if rk > 0 {
                    bw.write_bits(0, rk);
                }
                cm.reset_run_index();
                return;
            }
        } else {
            if run_length == line_remaining {
                // Partial segment running to end of line: implicit.
                return;
            }
            bw.write_bit(0);
            if rk > 0 {
                bw.write_bits(run_length as u32, rk);
            }
            run_length = 0;
            cm.reset_run_index();
        }
    }
}

/// Run-interruption error mapping (T.87 A.7.2.1). The variant depends on
/// whether the reference pair is ordered Ra >= Rb.
fn map_run_interruption_error(errval: i32, ra: i32, rb: i32) -> i32 {
    if ra >= rb {
        if errval >= 0 {
            2 * errval
        } else {
            2 * (-errval) - 1
        }
    } else if errval > 0 {
        2 * errval - 1
    } else {
        2 * (-errval)
    }
}

/// Encodes the sample that interrupted a run (T.87 A.7.2).
fn encode_run_interruption(
    bw: &mut BitWriter<'_>,
    cm: &mut ContextModel,
    params: &Params,
    sample: i32,
    ra: i32,
    rb: i32,
    run_index: usize,
) {
    let ctx_idx = if (ra - rb).abs() > params.near { 1 } else { 0 };

    let (predicted, sign) = if ra < rb { (ra, -1) } else { (rb, 1) };

    let mut errval = (sample - predicted) * sign;
    errval = reduce_error(errval, params.range);
    let mapped = map_run_interruption_error(errval, ra, rb);

    let ctx = cm.run_context_mut(ctx_idx);
    let mut k = ctx.compute_k(MAX_K);
    let temp_a = ctx.a + (ctx.n >> 1);

    if run_index > 0 {
        k = (k - 1).max(0);
    }

    let rk = i32::from(J_TABLE[run_index]);
    let limit = (params.limit - rk - 1).max(2);
    encode_golomb(bw, mapped, k, limit, params.qbpp);

    if errval < 0 {
        ctx.b += 1;
    }
    ctx.a += errval.abs() - (temp_a - ctx.a) / ctx.n;
    if ctx.n == params.reset {
        ctx.a >>= 1;
        ctx.n >>= 1;
    }
    ctx.n += 1;

    cm.decrement_run_index();
}
