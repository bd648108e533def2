//! Decoder post-processing: deblocking loop filter, chroma dithering and
//! alpha smoothing.

use alloc::vec::Vec;

use crate::codecs::Lcg;

/// Loop filter settings carried in partition 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoopFilter {
    /// Simple filter touches one pixel per side and luma only.
    pub simple: bool,
    pub sharpness: u8,
}

/// Thresholds derived from a filter level.
#[derive(Debug, Clone, Copy)]
struct Limits {
    interior: i32,
    edge: i32,
    hev: i32,
}

impl LoopFilter {
    fn limits(&self, level: u8) -> Limits {
        let level = i32::from(level);
        let sharpness = i32::from(self.sharpness);
        let mut interior = match sharpness {
            0 => level,
            1..=4 => level >> 1,
            _ => level >> 2,
        };
        if sharpness > 0 {
            interior = interior.min(9 - sharpness);
        }
        let interior = interior.max(1);
        let hev = match level {
            40.. => 2,
            15..=39 => 1,
            _ => 0,
        };
        Limits {
            interior,
            edge: (level + 2) * 2 + interior,
            hev,
        }
    }

    /// Filter every block edge of one plane.
    ///
    /// `block` is the macroblock size in this plane (16 luma, 8 chroma) and
    /// `level_at(bx, by)` the filter level of a block.
    pub(crate) fn apply(
        &self,
        plane: &mut [u8],
        w: usize,
        h: usize,
        block: usize,
        level_at: impl Fn(usize, usize) -> u8,
    ) {
        let bw = w.div_ceil(block);
        let bh = h.div_ceil(block);
        for by in 0..bh {
            for bx in 0..bw {
                let level = level_at(bx, by);
                if level == 0 {
                    continue;
                }
                let limits = self.limits(level);
                let (x0, y0) = (bx * block, by * block);
                // Left edge, filtered across columns.
                if bx > 0 && x0 + 4 <= w {
                    for y in y0..(y0 + block).min(h) {
                        self.edge(plane, y * w + x0, 1, &limits);
                    }
                }
                // Top edge, filtered across rows.
                if by > 0 && y0 + 4 <= h {
                    for x in x0..(x0 + block).min(w) {
                        self.edge(plane, y0 * w + x, w, &limits);
                    }
                }
            }
        }
    }

    /// Filter one edge position; `at` indexes q0 and `step` crosses the edge.
    #[inline]
    fn edge(&self, plane: &mut [u8], at: usize, step: usize, limits: &Limits) {
        let s = |v: u8| i32::from(v) - 128;
        let p = [
            s(plane[at - step]),
            s(plane[at - 2 * step]),
            s(plane[at - 3 * step]),
            s(plane[at - 4 * step]),
        ];
        let q = [
            s(plane[at]),
            s(plane[at + step]),
            s(plane[at + 2 * step]),
            s(plane[at + 3 * step]),
        ];
        if (p[0] - q[0]).abs() * 2 + (p[1] - q[1]).abs() / 2 > limits.edge {
            return;
        }
        let put = |plane: &mut [u8], i: usize, v: i32| plane[i] = (clamp_s8(v) + 128) as u8;

        if self.simple {
            let (np0, nq0) = common_adjust(p[1], p[0], q[0], q[1]);
            put(plane, at - step, np0);
            put(plane, at, nq0);
            return;
        }

        let i = limits.interior;
        let interior_ok = (p[3] - p[2]).abs() <= i
            && (p[2] - p[1]).abs() <= i
            && (p[1] - p[0]).abs() <= i
            && (q[3] - q[2]).abs() <= i
            && (q[2] - q[1]).abs() <= i
            && (q[1] - q[0]).abs() <= i;
        if !interior_ok {
            return;
        }
        let hev = (p[1] - p[0]).abs() > limits.hev || (q[1] - q[0]).abs() > limits.hev;
        if hev {
            let (np0, nq0) = common_adjust(p[1], p[0], q[0], q[1]);
            put(plane, at - step, np0);
            put(plane, at, nq0);
            return;
        }
        let w = clamp_s8(clamp_s8(p[1] - q[1]) + 3 * (q[0] - p[0]));
        let a0 = clamp_s8((27 * w + 63) >> 7);
        let a1 = clamp_s8((18 * w + 63) >> 7);
        let a2 = clamp_s8((9 * w + 63) >> 7);
        put(plane, at - step, p[0] + a0);
        put(plane, at, q[0] - a0);
        put(plane, at - 2 * step, p[1] + a1);
        put(plane, at + step, q[1] - a1);
        put(plane, at - 3 * step, p[2] + a2);
        put(plane, at + 2 * step, q[2] - a2);
    }
}

#[inline]
fn clamp_s8(v: i32) -> i32 {
    v.clamp(-128, 127)
}

/// Shared two-tap adjustment, returns new `(p0, q0)`.
#[inline]
fn common_adjust(p1: i32, p0: i32, q0: i32, q1: i32) -> (i32, i32) {
    let a = clamp_s8(clamp_s8(p1 - q1) + 3 * (q0 - p0));
    let f1 = clamp_s8(a + 4) >> 3;
    let f2 = clamp_s8(a + 3) >> 3;
    (p0 + f2, q0 - f1)
}

/// Add pseudo-random noise to a chroma plane; `strength` is 0..=100.
pub(crate) fn dither_chroma(plane: &mut [u8], strength: u8, seed: u32) {
    let amplitude = i32::from(strength.min(100)) * 8 / 100;
    if amplitude == 0 {
        return;
    }
    let mut rng = Lcg::new(seed);
    for v in plane.iter_mut() {
        *v = (i32::from(*v) + rng.next_in(amplitude)).clamp(0, 255) as u8;
    }
}

/// Soften the steps left by alpha level reduction.
///
/// Pixels bordering a different alpha value are blended towards the 3x3
/// mean; `strength` (0..=100) is the blend weight.
pub(crate) fn smooth_alpha(plane: &mut [u8], w: usize, h: usize, strength: u8) {
    let weight = u32::from(strength.min(100));
    if weight == 0 {
        return;
    }
    let src: Vec<u8> = plane.to_vec();
    for y in 0..h {
        for x in 0..w {
            let center = src[y * w + x];
            let (mut sum, mut n, mut differs) = (0u32, 0u32, false);
            for ny in y.saturating_sub(1)..(y + 2).min(h) {
                for nx in x.saturating_sub(1)..(x + 2).min(w) {
                    let v = src[ny * w + nx];
                    differs |= v != center;
                    sum += u32::from(v);
                    n += 1;
                }
            }
            if differs {
                let mean = (sum + n / 2) / n;
                let blended = (u32::from(center) * (100 - weight) + mean * weight + 50) / 100;
                plane[y * w + x] = blended as u8;
            }
        }
    }
}
