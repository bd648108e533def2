//! Color conversion between interleaved RGB and planar YUV 4:2:0.
//!
//! BT.601 limited range, 8-bit fixed point, matching the VP8 color space.

#[inline]
fn clip8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline]
pub(crate) fn rgb_to_y(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    clip8(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16)
}

/// Chroma from RGB sums over `n` pixels (1 to 4).
#[inline]
pub(crate) fn rgb_sum_to_uv(r: u32, g: u32, b: u32, n: u32) -> (u8, u8) {
    let half = n as i32 / 2;
    let r = (r as i32 + half) / n as i32;
    let g = (g as i32 + half) / n as i32;
    let b = (b as i32 + half) / n as i32;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (clip8(u), clip8(v))
}

#[inline]
pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    [
        clip8((298 * c + 409 * e + 128) >> 8),
        clip8((298 * c - 100 * d - 208 * e + 128) >> 8),
        clip8((298 * c + 516 * d + 128) >> 8),
    ]
}

/// Gamma-to-linear table for sharp chroma averaging, 12-bit linear.
pub(crate) struct GammaTables {
    to_linear: [u16; 256],
}

impl GammaTables {
    pub(crate) fn new() -> Self {
        let mut to_linear = [0u16; 256];
        for (i, v) in to_linear.iter_mut().enumerate() {
            let x = i as f32 / 255.0;
            *v = (libm::powf(x, 2.2) * 4095.0 + 0.5) as u16;
        }
        Self { to_linear }
    }

    #[inline]
    pub(crate) fn linear(&self, v: u8) -> u32 {
        u32::from(self.to_linear[usize::from(v)])
    }

    /// Average of `n` linear samples back to gamma space.
    #[inline]
    pub(crate) fn gamma_average(&self, sum: u32, n: u32) -> u32 {
        let linear = sum as f32 / (n as f32 * 4095.0);
        (libm::powf(linear, 1.0 / 2.2) * 255.0 + 0.5) as u32
    }
}

/// Chroma sample used by an output pixel and its nearest neighbors.
///
/// Returns `(near, far)` chroma indices along one axis for output
/// coordinate `pos`; `len` is the chroma plane length on that axis.
#[inline]
fn chroma_taps(pos: usize, len: usize) -> (usize, usize) {
    let near = pos / 2;
    let far = if pos % 2 == 0 {
        near.saturating_sub(1)
    } else {
        (near + 1).min(len - 1)
    };
    (near, far)
}

/// Chroma value at output pixel `(x, y)`.
///
/// Fancy upsampling weights the four surrounding samples 9:3:3:1; plain
/// upsampling replicates the nearest sample.
#[inline]
pub(crate) fn sample_chroma(
    plane: &[u8],
    stride: usize,
    rows: usize,
    x: usize,
    y: usize,
    fancy: bool,
) -> u8 {
    let (cx, fx) = chroma_taps(x, stride);
    if !fancy {
        return plane[(y / 2) * stride + cx];
    }
    let (cy, fy) = chroma_taps(y, rows);
    let near = u32::from(plane[cy * stride + cx]);
    let horiz = u32::from(plane[cy * stride + fx]);
    let vert = u32::from(plane[fy * stride + cx]);
    let diag = u32::from(plane[fy * stride + fx]);
    ((9 * near + 3 * horiz + 3 * vert + diag + 8) >> 4) as u8
}
