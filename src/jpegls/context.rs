use super::params::{Params, CONTEXT_COUNT, MAX_C, MIN_C, RUN_CONTEXT_COUNT};

/// Adaptive statistics for one context (ITU-T T.87 A.2.1).
#[derive(Debug, Clone, Copy)]
pub struct Context {
    /// Accumulated absolute prediction errors.
    pub a: i32,
    /// Accumulated prediction errors (bias).
    pub b: i32,
    /// Bias correction value.
    pub c: i32,
    /// Occurrence count.
    pub n: i32,
}

impl Context {
    fn init(range: i32) -> Context {
        Context {
            a: ((range + 32) / 64).max(2),
            b: 0,
            c: 0,
            n: 1,
        }
    }

    /// Golomb parameter: smallest k with `N << k >= A`, capped at `max_k`.
    pub fn compute_k(&self, max_k: i32) -> i32 {
        let mut k = 0;
        let mut temp = self.n;
        while temp < self.a {
            temp <<= 1;
            k += 1;
        }
        k.min(max_k)
    }

    /// Regular-mode statistics update plus bias adjustment (T.87 A.6).
    pub fn update(&mut self, errval: i32, reset: i32) {
        self.b += errval;
        self.a += errval.abs();

        if self.n == reset {
            self.a = (self.a + 1) >> 1;
            self.b = if self.b >= 0 {
                (self.b + 1) >> 1
            } else {
                -((1 - self.b) >> 1)
            };
            self.n = (self.n + 1) >> 1;
        }
        self.n += 1;

        if self.b <= -self.n {
            self.b += self.n;
            if self.c > MIN_C {
                self.c -= 1;
            }
            if self.b <= -self.n {
                self.b = -self.n + 1;
            }
        } else if self.b > 0 {
            self.b -= self.n;
            if self.c < MAX_C {
                self.c += 1;
            }
            if self.b > 0 {
                self.b = 0;
            }
        }
    }
}

/// All contexts for one scan component: 365 regular, 2 run, and the
/// RUNindex cursor into the J table.
pub struct ContextModel {
    contexts: Vec<Context>,
    run_contexts: [Context; RUN_CONTEXT_COUNT],
    run_index: usize,
    t1: i32,
    t2: i32,
    t3: i32,
}

impl ContextModel {
    pub fn new(params: &Params) -> ContextModel {
        let init = Context::init(params.range);
        ContextModel {
            contexts: vec![init; CONTEXT_COUNT],
            run_contexts: [init; RUN_CONTEXT_COUNT],
            run_index: 0,
            t1: params.t1,
            t2: params.t2,
            t3: params.t3,
        }
    }

    pub fn context_mut(&mut self, idx: usize) -> &mut Context {
        &mut self.contexts[idx]
    }

    pub fn run_context_mut(&mut self, idx: usize) -> &mut Context {
        &mut self.run_contexts[idx]
    }

    pub fn run_index(&self) -> usize {
        self.run_index
    }

    pub fn increment_run_index(&mut self) {
        if self.run_index < super::J_TABLE.len() - 1 {
            self.run_index += 1;
        }
    }

    pub fn decrement_run_index(&mut self) {
        if self.run_index > 0 {
            self.run_index -= 1;
        }
    }

    /// RUNindex resets to 0 at the start of every image line and after any
    /// terminated run segment.
    pub fn reset_run_index(&mut self) {
        self.run_index = 0;
    }

    /// Context index and sign from raw gradients.
    pub fn context_from_gradients(&self, g1: i32, g2: i32, g3: i32) -> (usize, i32) {
        let q1 = quantize_gradient(g1, self.t1, self.t2, self.t3);
        let q2 = quantize_gradient(g2, self.t1, self.t2, self.t3);
        let q3 = quantize_gradient(g3, self.t1, self.t2, self.t3);
        context_index(q1, q2, q3)
    }
}

/// Gradient quantization per ITU-T T.87 Table A.7; result is in [-4, 4].
pub fn quantize_gradient(g: i32, t1: i32, t2: i32, t3: i32) -> i32 {
    if g < -t3 {
        -4
    } else if g < -t2 {
        -3
    } else if g < -t1 {
        -2
    } else if g < 0 {
        -1
    } else if g == 0 {
        0
    } else if g <= t1 {
        1
    } else if g <= t2 {
        2
    } else if g <= t3 {
        3
    } else {
        4
    }
}

/// Maps quantized gradients to a context index in [0, 364] plus a sign.
/// The sign flip makes the first non-zero gradient positive, halving the
/// context count.
pub fn context_index(q1: i32, q2: i32, q3: i32) -> (usize, i32) {
    let (q1, q2, q3, sign) =
        if q1 < 0 || (q1 == 0 && q2 < 0) || (q1 == 0 && q2 == 0 && q3 < 0) {
            (-q1, -q2, -q3, -1)
        } else {
            (q1, q2, q3, 1)
        };

    // q1 in [0, 4]; q2, q3 in [-4, 4]
    let idx = q1 * 81 + (q2 + 4) * 9 + (q3 + 4);
    (idx as usize, sign)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantization_buckets() {
        let cases = [
            (0, 0),
            (1, 1),
            (-1, -1),
            (5, 2),
            (-5, -2),
            (15, 3),
            (-15, -3),
            (50, 4),
            (-50, -4),
        ];
        for (g, want) in cases {
            assert_eq!(quantize_gradient(g, 3, 7, 21), want, "g={g}");
        }
    }

    #[test]
    fn context_index_and_sign() {
        assert_eq!(context_index(0, 0, 0), (4 * 9 + 4, 1));
        assert_eq!(context_index(1, 0, 0), (81 + 4 * 9 + 4, 1));
        assert_eq!(context_index(-1, 0, 0), (81 + 4 * 9 + 4, -1));
        assert_eq!(context_index(0, 1, 0), (5 * 9 + 4, 1));
        assert_eq!(context_index(0, -1, 0), (5 * 9 + 4, -1));
    }

    #[test]
    fn context_index_bounds() {
        let (lo, _) = context_index(0, -4, -4);
        let (hi, _) = context_index(4, 4, 4);
        assert!(lo < CONTEXT_COUNT);
        assert_eq!(hi, CONTEXT_COUNT - 1);
    }

    #[test]
    fn compute_k_values() {
        let cases = [(4, 1, 2), (8, 2, 2), (16, 1, 4), (1, 1, 0)];
        for (a, n, want) in cases {
            let ctx = Context { a, b: 0, c: 0, n };
            assert_eq!(ctx.compute_k(32), want, "A={a} N={n}");
        }
    }

    #[test]
    fn initial_a_for_eight_bit() {
        let params = Params::new(8, 0);
        let cm = ContextModel::new(&params);
        assert_eq!(cm.contexts[0].a, 4);
        assert_eq!(cm.contexts[0].n, 1);
    }

    #[test]
    fn bias_correction_drifts_with_systematic_error() {
        let mut ctx = Context::init(256);
        for _ in 0..10 {
            ctx.update(3, 64);
        }
        assert!(ctx.c > 0);

        let mut ctx = Context::init(256);
        for _ in 0..10 {
            ctx.update(-3, 64);
        }
        assert!(ctx.c < 0);
    }
}
