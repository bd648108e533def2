//! Macroblock analysis for the lossy encoder: activity, segmentation and
//! optional luma dithering.

use alloc::vec;
use alloc::vec::Vec;

use crate::codecs::Lcg;

/// Luma macroblock edge in pixels.
pub(crate) const MB_SIZE: usize = 16;

/// Mean absolute gradient inside one macroblock, scaled by 16.
fn mb_activity(y: &[u8], w: usize, h: usize, mbx: usize, mby: usize) -> u32 {
    let x0 = mbx * MB_SIZE;
    let y0 = mby * MB_SIZE;
    let x1 = (x0 + MB_SIZE).min(w);
    let y1 = (y0 + MB_SIZE).min(h);
    let mut sum = 0u32;
    let mut n = 0u32;
    for yy in y0..y1 {
        for xx in x0..x1 {
            let p = i32::from(y[yy * w + xx]);
            if xx + 1 < x1 {
                sum += (p - i32::from(y[yy * w + xx + 1])).unsigned_abs();
                n += 1;
            }
            if yy + 1 < y1 {
                sum += (p - i32::from(y[(yy + 1) * w + xx])).unsigned_abs();
                n += 1;
            }
        }
    }
    if n == 0 { 0 } else { sum * 16 / n }
}

/// Per-macroblock segment ids, raster order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SegmentMap {
    pub ids: Vec<u8>,
    pub mb_w: usize,
    pub mb_h: usize,
}

impl SegmentMap {
    pub(crate) fn uniform(mb_w: usize, mb_h: usize) -> Self {
        Self {
            ids: vec![0; mb_w * mb_h],
            mb_w,
            mb_h,
        }
    }

    #[inline]
    pub(crate) fn get(&self, mbx: usize, mby: usize) -> u8 {
        self.ids[mby * self.mb_w + mbx]
    }

    /// Replace each id by the majority of its 3x3 neighborhood, keeping the
    /// current id on ties.
    fn smooth(&mut self, segments: u8) {
        let mut out = self.ids.clone();
        for mby in 0..self.mb_h {
            for mbx in 0..self.mb_w {
                let mut counts = [0u8; 4];
                for ny in mby.saturating_sub(1)..(mby + 2).min(self.mb_h) {
                    for nx in mbx.saturating_sub(1)..(mbx + 2).min(self.mb_w) {
                        counts[usize::from(self.get(nx, ny))] += 1;
                    }
                }
                let current = self.get(mbx, mby);
                let mut best = current;
                for s in 0..segments {
                    if counts[usize::from(s)] > counts[usize::from(best)] {
                        best = s;
                    }
                }
                out[mby * self.mb_w + mbx] = best;
            }
        }
        self.ids = out;
    }
}

/// Split macroblocks into `segments` activity quantiles; segment 0 holds the
/// flattest blocks.
pub(crate) fn segment(y: &[u8], w: usize, h: usize, segments: u8, smooth: bool) -> SegmentMap {
    let mb_w = w.div_ceil(MB_SIZE);
    let mb_h = h.div_ceil(MB_SIZE);
    if segments <= 1 {
        return SegmentMap::uniform(mb_w, mb_h);
    }
    let activity: Vec<u32> = (0..mb_w * mb_h)
        .map(|i| mb_activity(y, w, h, i % mb_w, i / mb_w))
        .collect();
    let mut sorted = activity.clone();
    sorted.sort_unstable();
    let thresholds: Vec<u32> = (1..usize::from(segments))
        .map(|k| sorted[k * sorted.len() / usize::from(segments)])
        .collect();
    let ids = activity
        .iter()
        .map(|&a| thresholds.iter().filter(|&&t| a >= t).count() as u8)
        .collect();
    let mut map = SegmentMap { ids, mb_w, mb_h };
    if smooth {
        map.smooth(segments);
    }
    log::trace!(
        "segmented {mb_w}x{mb_h} macroblocks into {segments}, thresholds {thresholds:?}"
    );
    map
}

/// Per-segment quantizer offsets from spatial noise shaping.
///
/// Busy segments get coarser quantizers, flat ones finer; `sns` of 0
/// disables the modulation.
pub(crate) fn sns_offsets(segments: u8, sns: u8) -> [i32; 4] {
    let mut out = [0i32; 4];
    if segments <= 1 {
        return out;
    }
    let n = i32::from(segments) - 1;
    for (s, slot) in out.iter_mut().enumerate().take(usize::from(segments)) {
        let spread = 2 * s as i32 - n;
        *slot = i32::from(sns) * 12 * spread / (100 * n);
    }
    out
}

/// Add deterministic low-amplitude noise to the luma plane.
pub(crate) fn dither_luma(y: &mut [u8], amplitude: i32) {
    let mut rng = Lcg::new(0x5eed);
    for v in y.iter_mut() {
        *v = (i32::from(*v) + rng.next_in(amplitude)).clamp(0, 255) as u8;
    }
}
