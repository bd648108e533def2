//! Lossless engine for the `VP8L` chunk.
//!
//! Layout after the 5-byte VP8L header:
//!
//! | bytes | content |
//! |-------|---------|
//! | 1     | transform byte: bit 0 subtract-green, bits 1..=3 predictor, bit 4 palette |
//! | rest  | zlib stream of residual planes G, R, B, A (`w * h` bytes each) |
//!
//! With the palette bit set (and no other), the zlib stream instead holds
//! the color count minus one, the sorted colors as RGBA deltas from the
//! previous entry, then one index byte per pixel.

use alloc::collections::BTreeSet;
use alloc::vec;
use alloc::vec::Vec;

use crate::codecs::{self, map_indexed};
use crate::config::ImageHint;
use crate::picture::{pack_argb, unpack_argb};
use crate::probe::VP8L_SIGNATURE;

const SUBTRACT_GREEN: u8 = 0x01;
const PALETTE: u8 = 0x10;
const RESERVED_BITS: u8 = 0xe0;
const MAX_PALETTE: usize = 256;

/// Spatial predictor applied to every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Predictor {
    None = 0,
    Left = 1,
    Top = 2,
    Average = 3,
    Select = 4,
    Gradient = 5,
}

impl Predictor {
    const ALL: [Predictor; 6] = [
        Predictor::None,
        Predictor::Left,
        Predictor::Top,
        Predictor::Average,
        Predictor::Select,
        Predictor::Gradient,
    ];

    fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(usize::from(bits)).copied()
    }

    #[inline]
    fn predict(self, left: [u8; 4], top: [u8; 4], top_left: [u8; 4]) -> [u8; 4] {
        match self {
            Predictor::None => [0; 4],
            Predictor::Left => left,
            Predictor::Top => top,
            Predictor::Average => {
                core::array::from_fn(|c| ((u16::from(left[c]) + u16::from(top[c])) / 2) as u8)
            }
            Predictor::Select => {
                let mut to_left = 0i32;
                let mut to_top = 0i32;
                for c in 0..4 {
                    let estimate =
                        i32::from(left[c]) + i32::from(top[c]) - i32::from(top_left[c]);
                    to_left += (estimate - i32::from(left[c])).abs();
                    to_top += (estimate - i32::from(top[c])).abs();
                }
                if to_left < to_top { left } else { top }
            }
            Predictor::Gradient => core::array::from_fn(|c| {
                (i32::from(left[c]) + i32::from(top[c]) - i32::from(top_left[c])).clamp(0, 255)
                    as u8
            }),
        }
    }
}

/// Prediction for pixel `(x, y)` given already-known pixels.
#[inline]
fn prediction(px: &[[u8; 4]], w: usize, x: usize, y: usize, predictor: Predictor) -> [u8; 4] {
    match (x, y) {
        // Opaque black.
        (0, 0) => [0, 0, 0, 255],
        (_, 0) => px[x - 1],
        (0, _) => px[(y - 1) * w],
        _ => predictor.predict(px[y * w + x - 1], px[(y - 1) * w + x], px[(y - 1) * w + x - 1]),
    }
}

/// Pixel in `[g, r, b, a]` channel order with optional green subtraction.
#[inline]
fn forward_color(argb: u32, subtract_green: bool) -> [u8; 4] {
    let [r, g, b, a] = unpack_argb(argb);
    if subtract_green {
        [g, r.wrapping_sub(g), b.wrapping_sub(g), a]
    } else {
        [g, r, b, a]
    }
}

#[inline]
fn inverse_color([g, r, b, a]: [u8; 4], subtract_green: bool) -> u32 {
    if subtract_green {
        pack_argb([r.wrapping_add(g), g, b.wrapping_add(g), a])
    } else {
        pack_argb([r, g, b, a])
    }
}

/// Encoder knobs derived from the configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LosslessParams {
    pub method: u8,
    pub quality: f32,
    pub hint: ImageHint,
    /// Code images with at most 256 colors as a delta-coded palette plus
    /// indices.
    pub use_delta_palette: bool,
    pub threads: bool,
}

impl LosslessParams {
    /// zlib level: grows with method and quality.
    pub(crate) fn zlib_level(&self) -> u8 {
        (1 + self.method + (self.quality as u8) / 34).min(10)
    }
}

/// Result of a lossless encode.
pub(crate) struct LosslessOutput {
    /// Complete `VP8L` chunk payload.
    pub payload: Vec<u8>,
    pub predictor: Predictor,
    pub subtract_green: bool,
    /// Colors in the palette, when palette coding was used.
    pub palette_size: Option<usize>,
}

/// Sorted distinct colors, or `None` when there are more than 256.
fn collect_palette(argb: &[u32]) -> Option<Vec<u32>> {
    let mut colors = BTreeSet::new();
    for &px in argb {
        if colors.insert(px) && colors.len() > MAX_PALETTE {
            return None;
        }
    }
    Some(colors.into_iter().collect())
}

fn palette_stream(palette: &[u32], argb: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 4 * palette.len() + argb.len());
    out.push((palette.len() - 1) as u8);
    let mut prev = [0u8; 4];
    for &color in palette {
        let cur = unpack_argb(color);
        out.extend((0..4).map(|c| cur[c].wrapping_sub(prev[c])));
        prev = cur;
    }
    out.extend(
        argb.iter()
            .map(|px| palette.binary_search(px).unwrap_or_default() as u8),
    );
    out
}

fn decode_palette(data: &[u8], n: usize) -> Result<Vec<u32>, &'static str> {
    let raw = codecs::inflate_bounded(data, 1 + 4 * MAX_PALETTE + n)?;
    let (&count, rest) = raw.split_first().ok_or("palette truncated")?;
    let count = usize::from(count) + 1;
    if rest.len() != 4 * count + n {
        return Err("palette stream size mismatch");
    }
    let (entries, indices) = rest.split_at(4 * count);
    let mut palette = Vec::with_capacity(count);
    let mut prev = [0u8; 4];
    for entry in entries.chunks_exact(4) {
        let cur: [u8; 4] = core::array::from_fn(|c| entry[c].wrapping_add(prev[c]));
        palette.push(pack_argb(cur));
        prev = cur;
    }
    indices
        .iter()
        .map(|&i| {
            palette
                .get(usize::from(i))
                .copied()
                .ok_or("palette index out of range")
        })
        .collect()
}

/// Residual planes for one transform choice.
fn residuals(
    px: &[[u8; 4]],
    w: usize,
    h: usize,
    predictor: Predictor,
    threads: bool,
) -> Vec<u8> {
    let rows = map_indexed(h, threads, |y| {
        let mut row = [
            Vec::with_capacity(w),
            Vec::with_capacity(w),
            Vec::with_capacity(w),
            Vec::with_capacity(w),
        ];
        for x in 0..w {
            let pred = prediction(px, w, x, y, predictor);
            let cur = px[y * w + x];
            for c in 0..4 {
                row[c].push(cur[c].wrapping_sub(pred[c]));
            }
        }
        row
    });
    let mut planes = Vec::with_capacity(w * h * 4);
    for c in 0..4 {
        for row in &rows {
            planes.extend_from_slice(&row[c]);
        }
    }
    planes
}

/// Cheap size estimate: residual magnitudes over every fourth row.
fn estimate_cost(px: &[[u8; 4]], w: usize, h: usize, predictor: Predictor) -> u64 {
    let mut cost = 0u64;
    for y in (0..h).step_by(4) {
        for x in 0..w {
            let pred = prediction(px, w, x, y, predictor);
            let cur = px[y * w + x];
            for c in 0..4 {
                let r = cur[c].wrapping_sub(pred[c]) as i8;
                cost += u64::from(r.unsigned_abs());
            }
        }
    }
    cost
}

fn default_predictor(hint: ImageHint) -> Predictor {
    match hint {
        ImageHint::Graph => Predictor::Left,
        ImageHint::Photo | ImageHint::Picture => Predictor::Gradient,
        ImageHint::Default => Predictor::Select,
    }
}

/// Encode an ARGB image into a `VP8L` chunk payload.
pub(crate) fn encode(argb: &[u32], w: usize, h: usize, params: &LosslessParams) -> LosslessOutput {
    let has_alpha = argb.iter().any(|&p| p >> 24 != 0xff);
    let level = params.zlib_level();

    let palette = if params.use_delta_palette {
        collect_palette(argb)
    } else {
        None
    };
    let (predictor, subtract_green, body) = if let Some(palette) = &palette {
        let body = codecs::deflate(&palette_stream(palette, argb), level);
        (Predictor::None, false, body)
    } else if params.method >= 5 {
        // Full trial over every predictor, with and without green subtraction.
        let with_sg: Vec<[u8; 4]> = argb.iter().map(|&p| forward_color(p, true)).collect();
        let without_sg: Vec<[u8; 4]> = argb.iter().map(|&p| forward_color(p, false)).collect();
        let trial = |sg: bool, predictor: Predictor| {
            let px = if sg { &with_sg } else { &without_sg };
            let packed = codecs::deflate(&residuals(px, w, h, predictor, params.threads), level);
            (predictor, sg, packed)
        };
        let mut best = trial(true, Predictor::Select);
        for sg in [true, false] {
            for predictor in Predictor::ALL {
                if sg && predictor == Predictor::Select {
                    continue;
                }
                let candidate = trial(sg, predictor);
                if candidate.2.len() < best.2.len() {
                    best = candidate;
                }
            }
        }
        best
    } else {
        let px: Vec<[u8; 4]> = argb.iter().map(|&p| forward_color(p, true)).collect();
        let predictor = if params.method >= 3 {
            Predictor::ALL
                .into_iter()
                .min_by_key(|&p| estimate_cost(&px, w, h, p))
                .unwrap_or(Predictor::Select)
        } else {
            default_predictor(params.hint)
        };
        let body = codecs::deflate(&residuals(&px, w, h, predictor, params.threads), level);
        (predictor, true, body)
    };

    let mut payload = Vec::with_capacity(6 + body.len());
    payload.push(VP8L_SIGNATURE);
    let bits = (w as u32 - 1) | ((h as u32 - 1) << 14) | (u32::from(has_alpha) << 28);
    payload.extend_from_slice(&bits.to_le_bytes());
    let transform = if palette.is_some() {
        PALETTE
    } else {
        u8::from(subtract_green) | ((predictor as u8) << 1)
    };
    payload.push(transform);
    payload.extend_from_slice(&body);

    let palette_size = palette.as_ref().map(Vec::len);
    log::debug!(
        "lossless {w}x{h}: predictor {predictor:?}, subtract_green={subtract_green}, palette {palette_size:?}, zlib level {level}, {} bytes",
        payload.len()
    );
    LosslessOutput {
        payload,
        predictor,
        subtract_green,
        palette_size,
    }
}

/// Parsed transform byte.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LosslessHeader {
    pub predictor: Predictor,
    pub subtract_green: bool,
    pub palette: bool,
}

/// Parse the transform byte following the 5-byte VP8L header.
pub(crate) fn parse_header(payload: &[u8]) -> Result<LosslessHeader, &'static str> {
    let transform = *payload.get(5).ok_or("missing transform byte")?;
    if transform & RESERVED_BITS != 0 {
        return Err("unsupported color transform");
    }
    if transform & PALETTE != 0 {
        if transform != PALETTE {
            return Err("unsupported color transform");
        }
        return Ok(LosslessHeader {
            predictor: Predictor::None,
            subtract_green: false,
            palette: true,
        });
    }
    let predictor =
        Predictor::from_bits((transform >> 1) & 0x07).ok_or("unsupported color transform")?;
    Ok(LosslessHeader {
        predictor,
        subtract_green: transform & SUBTRACT_GREEN != 0,
        palette: false,
    })
}

/// Decode the residual stream into ARGB pixels.
pub(crate) fn decode_pixels(
    payload: &[u8],
    header: &LosslessHeader,
    w: usize,
    h: usize,
) -> Result<Vec<u32>, &'static str> {
    let n = w * h;
    if header.palette {
        return decode_palette(&payload[6..], n);
    }
    let planes = codecs::inflate_exact(&payload[6..], n * 4)?;
    let mut px = vec![[0u8; 4]; n];
    for y in 0..h {
        for x in 0..w {
            let pred = prediction(&px, w, x, y, header.predictor);
            let i = y * w + x;
            px[i] = core::array::from_fn(|c| planes[c * n + i].wrapping_add(pred[c]));
        }
    }
    Ok(px
        .into_iter()
        .map(|p| inverse_color(p, header.subtract_green))
        .collect())
}
