//! Picture distortion metrics.
//!
//! Scores are reported per plane in the order Y, U, V, alpha, then all
//! planes together. Every metric is expressed in dB so that higher means
//! more similar; identical planes score 99.

use crate::picture::Picture;
use crate::CodecError;

/// Score for identical planes.
const MAX_DB: f64 = 99.0;
/// Neighborhood radius for SSIM windows and LSIM search (7x7).
const RADIUS: usize = 3;
const SSIM_C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const SSIM_C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Distortion metric for [`measure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum Metric {
    /// Peak signal-to-noise ratio.
    #[default]
    Psnr,
    /// Mean structural similarity over 7x7 windows.
    Ssim,
    /// Local similarity: each pixel matched against the closest value in
    /// its 7x7 neighborhood of the reference.
    Lsim,
}

/// Accumulated score for one plane.
#[derive(Debug, Clone, Copy, Default)]
struct PlaneScore {
    /// Squared error (PSNR, LSIM) or summed SSIM (SSIM).
    value: f64,
    samples: u64,
}

impl PlaneScore {
    fn add(&mut self, other: PlaneScore) {
        self.value += other.value;
        self.samples += other.samples;
    }

    fn db(self, metric: Metric) -> f32 {
        let db = match metric {
            Metric::Psnr | Metric::Lsim => sse_to_psnr(self.value, self.samples),
            Metric::Ssim => ssim_to_db(self.value / self.samples.max(1) as f64),
        };
        db as f32
    }
}

fn sse_to_psnr(sse: f64, samples: u64) -> f64 {
    if sse <= 0.0 {
        return MAX_DB;
    }
    let peak = 255.0 * 255.0 * samples as f64;
    (10.0 * libm::log10(peak / sse)).min(MAX_DB)
}

fn ssim_to_db(ssim: f64) -> f64 {
    if ssim >= 1.0 {
        return MAX_DB;
    }
    (-10.0 * libm::log10(1.0 - ssim)).min(MAX_DB)
}

/// Compare `source` against `reference`.
///
/// Two YUV pictures are compared plane by plane at their native
/// resolution; otherwise both are converted to ARGB and compared as
/// full-resolution YUVA. Neither picture is modified.
pub fn measure(source: &Picture, reference: &Picture, metric: Metric) -> Result<[f32; 5], CodecError> {
    if (source.width(), source.height()) != (reference.width(), reference.height()) {
        return Err(CodecError::DimensionMismatch {
            first_width: source.width(),
            first_height: source.height(),
            second_width: reference.width(),
            second_height: reference.height(),
        });
    }
    let (a, b) = if source.is_argb() || reference.is_argb() {
        (source.to_argb().metric_planes(), reference.to_argb().metric_planes())
    } else {
        (source.metric_planes(), reference.metric_planes())
    };

    let mut out = [0f32; 5];
    let mut all = PlaneScore::default();
    for (i, ((pa, w, h), (pb, _, _))) in a.iter().zip(&b).enumerate() {
        let score = match metric {
            Metric::Psnr => sse(pa, pb),
            Metric::Ssim => ssim(pa, pb, *w, *h),
            Metric::Lsim => lsim(pa, pb, *w, *h),
        };
        out[i] = score.db(metric);
        all.add(score);
    }
    out[4] = all.db(metric);
    log::trace!("{metric:?} {}x{}: {out:?}", source.width(), source.height());
    Ok(out)
}

fn sse(a: &[u8], b: &[u8]) -> PlaneScore {
    let value = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = i64::from(x) - i64::from(y);
            (d * d) as f64
        })
        .sum();
    PlaneScore {
        value,
        samples: a.len() as u64,
    }
}

/// Index range of the window around `c`, clipped to `0..len`.
#[inline]
fn window(c: usize, len: usize) -> core::ops::Range<usize> {
    c.saturating_sub(RADIUS)..(c + RADIUS + 1).min(len)
}

fn ssim(a: &[u8], b: &[u8], w: usize, h: usize) -> PlaneScore {
    let mut value = 0.0;
    for y in 0..h {
        for x in 0..w {
            let (mut sa, mut sb, mut saa, mut sbb, mut sab, mut n) = (0u64, 0u64, 0u64, 0u64, 0u64, 0u64);
            for wy in window(y, h) {
                for wx in window(x, w) {
                    let (va, vb) = (u64::from(a[wy * w + wx]), u64::from(b[wy * w + wx]));
                    sa += va;
                    sb += vb;
                    saa += va * va;
                    sbb += vb * vb;
                    sab += va * vb;
                    n += 1;
                }
            }
            let n = n as f64;
            let (ma, mb) = (sa as f64 / n, sb as f64 / n);
            let va = saa as f64 / n - ma * ma;
            let vb = sbb as f64 / n - mb * mb;
            let cov = sab as f64 / n - ma * mb;
            let num = (2.0 * ma * mb + SSIM_C1) * (2.0 * cov + SSIM_C2);
            let den = (ma * ma + mb * mb + SSIM_C1) * (va + vb + SSIM_C2);
            value += num / den;
        }
    }
    PlaneScore {
        value,
        samples: (w * h) as u64,
    }
}

fn lsim(src: &[u8], reference: &[u8], w: usize, h: usize) -> PlaneScore {
    let mut value = 0.0;
    for y in 0..h {
        for x in 0..w {
            let v = i32::from(src[y * w + x]);
            let mut best = i32::MAX;
            for wy in window(y, h) {
                for wx in window(x, w) {
                    let d = v - i32::from(reference[wy * w + wx]);
                    best = best.min(d * d);
                }
            }
            value += f64::from(best);
        }
    }
    PlaneScore {
        value,
        samples: (w * h) as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelLayout;
    use alloc::vec::Vec;

    fn picture(w: u32, h: u32, seed: u8, use_argb: bool) -> Picture {
        let px: Vec<u8> = (0..w * h * 4)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect();
        Picture::from_pixels(&px, PixelLayout::Rgba8, w, h, None, use_argb).unwrap()
    }

    #[test]
    fn identical_pictures_score_99() {
        for use_argb in [true, false] {
            let p = picture(9, 6, 0, use_argb);
            for metric in [Metric::Psnr, Metric::Ssim, Metric::Lsim] {
                assert_eq!(measure(&p, &p, metric).unwrap(), [99.0; 5], "{metric:?}");
            }
        }
    }

    #[test]
    fn dimension_mismatch() {
        let err = measure(&picture(4, 4, 0, true), &picture(4, 5, 0, true), Metric::Psnr)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::DimensionMismatch {
                first_height: 4,
                second_height: 5,
                ..
            }
        ));
    }

    #[test]
    fn psnr_of_full_scale_error_is_zero() {
        assert_eq!(sse_to_psnr(255.0 * 255.0, 1), 0.0);
        assert_eq!(sse_to_psnr(0.0, 10), 99.0);
    }

    #[test]
    fn different_pictures_score_lower() {
        let a = picture(8, 8, 0, true);
        let b = picture(8, 8, 40, true);
        let psnr = measure(&a, &b, Metric::Psnr).unwrap();
        assert!(psnr.iter().all(|&db| db < 99.0));
        let ssim = measure(&a, &b, Metric::Ssim).unwrap();
        assert!(ssim[0] < 99.0);
    }

    #[test]
    fn lsim_forgives_small_shifts() {
        let row: Vec<u8> = (0..16).map(|x| (x * 16) as u8).collect();
        let shifted: Vec<u8> = (0..16).map(|x| (((x + 1) % 16) * 16) as u8).collect();
        let plain = sse(&row, &shifted);
        let local = lsim(&row, &shifted, 16, 1);
        assert!(local.value < plain.value);
    }

    #[test]
    fn inputs_are_untouched() {
        let a = picture(5, 5, 1, false);
        let b = picture(5, 5, 9, true);
        let (a0, b0) = (a.clone(), b.clone());
        measure(&a, &b, Metric::Lsim).unwrap();
        assert_eq!((a, b), (a0, b0));
    }
}
