//! `ALPH` chunk coding for lossy images with transparency.
//!
//! Header byte: bits 0-1 compression (0 raw, 1 zlib), bits 2-3 filter
//! (none, horizontal, vertical, gradient), bits 4-5 preprocessing (1 =
//! level reduction), bits 6-7 reserved.

use alloc::vec::Vec;

use crate::codecs;

/// Predictive filter applied to the alpha plane before coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AlphaFilter {
    None = 0,
    Horizontal = 1,
    Vertical = 2,
    Gradient = 3,
}

impl AlphaFilter {
    const ALL: [AlphaFilter; 4] = [
        AlphaFilter::None,
        AlphaFilter::Horizontal,
        AlphaFilter::Vertical,
        AlphaFilter::Gradient,
    ];

    #[inline]
    fn predict(self, plane: &[u8], w: usize, x: usize, y: usize) -> u8 {
        let left = |i: usize| plane[i - 1];
        let top = |i: usize| plane[i - w];
        let i = y * w + x;
        match (self, x, y) {
            (AlphaFilter::None, _, _) | (_, 0, 0) => 0,
            // First row predicts from the left, first column from above.
            (_, _, 0) => left(i),
            (_, 0, _) => top(i),
            (AlphaFilter::Horizontal, _, _) => left(i),
            (AlphaFilter::Vertical, _, _) => top(i),
            (AlphaFilter::Gradient, _, _) => {
                let g = i16::from(left(i)) + i16::from(top(i)) - i16::from(plane[i - w - 1]);
                g.clamp(0, 255) as u8
            }
        }
    }

    fn apply(self, plane: &[u8], w: usize, h: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                out.push(plane[y * w + x].wrapping_sub(self.predict(plane, w, x, y)));
            }
        }
        out
    }

    fn invert(self, residuals: &mut [u8], w: usize, h: usize) {
        for y in 0..h {
            for x in 0..w {
                let pred = self.predict(residuals, w, x, y);
                residuals[y * w + x] = residuals[y * w + x].wrapping_add(pred);
            }
        }
    }
}

/// Encoder knobs for the alpha plane.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AlphaParams {
    /// 0 raw, 1 zlib.
    pub compression: u8,
    /// 0 none, 1 fast estimate, 2 try every filter.
    pub filtering: u8,
    /// Below 100 reduces the number of distinct alpha levels.
    pub quality: u8,
    pub zlib_level: u8,
}

/// Number of alpha levels kept for a given alpha quality.
fn alpha_levels(quality: u8) -> u32 {
    let q = u32::from(quality);
    if q <= 70 { 2 + q / 5 } else { 16 + (q - 70) * 8 }
}

/// Snap every alpha value onto `levels` evenly spaced values.
fn reduce_levels(plane: &mut [u8], levels: u32) {
    let steps = levels - 1;
    for v in plane.iter_mut() {
        let idx = (u32::from(*v) * steps + 127) / 255;
        *v = ((idx * 255 + steps / 2) / steps) as u8;
    }
}

/// Sum of absolute residuals, a proxy for compressed size.
fn filter_cost(plane: &[u8], w: usize, h: usize, filter: AlphaFilter) -> u64 {
    filter
        .apply(plane, w, h)
        .iter()
        .map(|&r| u64::from((r as i8).unsigned_abs()))
        .sum()
}

fn pack(filtered: &[u8], compression: u8, level: u8) -> Vec<u8> {
    if compression == 0 {
        filtered.to_vec()
    } else {
        codecs::deflate(filtered, level)
    }
}

/// Encode an alpha plane into an `ALPH` chunk payload.
pub(crate) fn encode(alpha: &[u8], w: usize, h: usize, params: &AlphaParams) -> Vec<u8> {
    let mut plane = alpha.to_vec();
    let levels = alpha_levels(params.quality);
    let reduced = params.quality < 100 && levels < 256;
    if reduced {
        reduce_levels(&mut plane, levels);
    }

    let (filter, body) = match params.filtering {
        0 => (
            AlphaFilter::None,
            pack(&plane, params.compression, params.zlib_level),
        ),
        1 => {
            let filter = AlphaFilter::ALL
                .into_iter()
                .min_by_key(|&f| filter_cost(&plane, w, h, f))
                .unwrap_or(AlphaFilter::None);
            (
                filter,
                pack(&filter.apply(&plane, w, h), params.compression, params.zlib_level),
            )
        }
        _ => {
            let mut best = (
                AlphaFilter::None,
                pack(&plane, params.compression, params.zlib_level),
            );
            for filter in &AlphaFilter::ALL[1..] {
                let body = pack(&filter.apply(&plane, w, h), params.compression, params.zlib_level);
                if body.len() < best.1.len() {
                    best = (*filter, body);
                }
            }
            best
        }
    };

    let header = params.compression.min(1) | ((filter as u8) << 2) | (u8::from(reduced) << 4);
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(header);
    out.extend_from_slice(&body);
    log::trace!(
        "alpha {w}x{h}: filter {filter:?}, levels {}, {} bytes",
        if reduced { levels } else { 256 },
        out.len()
    );
    out
}

/// Decoded alpha plane plus whether level reduction was applied.
pub(crate) struct DecodedAlpha {
    pub plane: Vec<u8>,
    pub level_reduced: bool,
}

/// Decode an `ALPH` chunk payload into a `w * h` plane.
pub(crate) fn decode(payload: &[u8], w: usize, h: usize) -> Result<DecodedAlpha, &'static str> {
    let (&header, body) = payload.split_first().ok_or("empty alpha chunk")?;
    if header >> 6 != 0 {
        return Err("reserved alpha header bits set");
    }
    let compression = header & 0x03;
    let filter = AlphaFilter::ALL[usize::from((header >> 2) & 0x03)];
    let preprocessing = (header >> 4) & 0x03;
    if preprocessing > 1 {
        return Err("unknown alpha preprocessing");
    }
    let mut plane = match compression {
        0 if body.len() >= w * h => body[..w * h].to_vec(),
        0 => return Err("raw alpha plane truncated"),
        1 => codecs::inflate_exact(body, w * h)?,
        _ => return Err("unknown alpha compression"),
    };
    filter.invert(&mut plane, w, h);
    Ok(DecodedAlpha {
        plane,
        level_reduced: preprocessing == 1,
    })
}
