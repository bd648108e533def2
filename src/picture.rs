//! In-memory picture used by the encoder and the distortion metrics.
//!
//! A [`Picture`] holds exactly one representation: planar YUV 4:2:0 with an
//! optional alpha plane, or packed ARGB. Conversions produce a new picture;
//! the source is left untouched.

use alloc::borrow::Cow;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::buffer_len;
use crate::pipeline::convert::{self, GammaTables};
use crate::pixel::{PixelData, PixelLayout};
use crate::probe::MAX_DIMENSION;
use crate::CodecError;

/// Planar YUV 4:2:0 buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvaPlanes {
    /// Luma, `width` bytes per row.
    pub y: Vec<u8>,
    /// Blue-difference chroma, `(width + 1) / 2` bytes per row.
    pub u: Vec<u8>,
    /// Red-difference chroma, same geometry as `u`.
    pub v: Vec<u8>,
    /// Alpha at full resolution, present when the source had an alpha channel.
    pub a: Option<Vec<u8>>,
}

/// The active representation of a [`Picture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PictureData {
    Yuva(YuvaPlanes),
    /// `0xAARRGGBB` per pixel, `width` pixels per row.
    Argb(Vec<u32>),
}

/// Pixel storage for encode and measure calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    width: u32,
    height: u32,
    data: PictureData,
}

#[inline]
pub(crate) fn pack_argb([r, g, b, a]: [u8; 4]) -> u32 {
    u32::from_be_bytes([a, r, g, b])
}

#[inline]
pub(crate) fn unpack_argb(argb: u32) -> [u8; 4] {
    let [a, r, g, b] = argb.to_be_bytes();
    [r, g, b, a]
}

/// Reject empty or oversized dimensions.
pub(crate) fn check_dimensions(width: u32, height: u32) -> Result<(), CodecError> {
    if width == 0 || height == 0 {
        return Err(CodecError::EmptySource { width, height });
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(CodecError::DimensionTooLarge {
            width,
            height,
            max: MAX_DIMENSION,
        });
    }
    Ok(())
}

/// Validated view over caller pixels.
pub(crate) struct SourceImage<'a> {
    pixels: &'a [u8],
    layout: PixelLayout,
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a> SourceImage<'a> {
    /// `stride` of `None` means tightly packed rows.
    pub(crate) fn new(
        pixels: &'a [u8],
        layout: PixelLayout,
        width: u32,
        height: u32,
        stride: Option<usize>,
    ) -> Result<Self, CodecError> {
        check_dimensions(width, height)?;
        let row = buffer_len(width, 1, layout.channels())?;
        let stride = stride.unwrap_or(row);
        if stride < row {
            return Err(CodecError::InvalidInput(alloc::format!(
                "stride {stride} is smaller than a {row}-byte row"
            )));
        }
        let needed = stride
            .checked_mul(height as usize - 1)
            .and_then(|n| n.checked_add(row))
            .ok_or(CodecError::PlatformUnsupported(
                "image size exceeds the address space",
            ))?;
        if pixels.len() < needed {
            return Err(CodecError::InvalidInput(alloc::format!(
                "pixel buffer holds {} bytes, {needed} required",
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            layout,
            width: width as usize,
            height: height as usize,
            stride,
        })
    }

    /// Whether the layout carries alpha and any pixel is not fully opaque.
    pub(crate) fn has_transparency(&self) -> bool {
        if !self.layout.has_alpha() {
            return false;
        }
        (0..self.height).any(|y| (0..self.width).any(|x| self.rgba(x, y)[3] != 0xff))
    }

    #[inline]
    fn rgba(&self, x: usize, y: usize) -> [u8; 4] {
        let ch = self.layout.channels();
        let at = y * self.stride + x * ch;
        self.layout.read_rgba(&self.pixels[at..at + ch])
    }
}

impl Picture {
    /// Import interleaved pixels.
    ///
    /// `use_argb` selects the packed ARGB representation; otherwise the
    /// pixels are converted to YUV 4:2:0. `stride` is the distance between
    /// rows in bytes; `None` means tightly packed.
    pub fn from_pixels(
        pixels: &[u8],
        layout: PixelLayout,
        width: u32,
        height: u32,
        stride: Option<usize>,
        use_argb: bool,
    ) -> Result<Self, CodecError> {
        let source = SourceImage::new(pixels, layout, width, height, stride)?;
        Ok(Self::import(&source, use_argb, false))
    }

    /// Import a decoded image as packed ARGB.
    pub fn from_decoded(pixels: &PixelData) -> Self {
        let layout = pixels.layout();
        let argb = pixels
            .as_bytes()
            .chunks_exact(layout.channels())
            .map(|px| pack_argb(layout.read_rgba(px)))
            .collect();
        Self {
            width: pixels.width(),
            height: pixels.height(),
            data: PictureData::Argb(argb),
        }
    }

    pub(crate) fn import(source: &SourceImage<'_>, use_argb: bool, sharp_yuv: bool) -> Self {
        let (w, h) = (source.width, source.height);
        let data = if use_argb {
            let mut argb = Vec::with_capacity(w * h);
            for y in 0..h {
                argb.extend((0..w).map(|x| pack_argb(source.rgba(x, y))));
            }
            PictureData::Argb(argb)
        } else {
            PictureData::Yuva(rgba_to_yuva(
                w,
                h,
                source.layout.has_alpha(),
                sharp_yuv,
                |x, y| source.rgba(x, y),
            ))
        };
        log::trace!("imported {w}x{h} picture, argb={use_argb} sharp_yuv={sharp_yuv}");
        Self {
            width: w as u32,
            height: h as u32,
            data,
        }
    }

    pub(crate) fn from_argb(width: u32, height: u32, argb: Vec<u32>) -> Self {
        Self {
            width,
            height,
            data: PictureData::Argb(argb),
        }
    }

    pub(crate) fn from_yuva(width: u32, height: u32, planes: YuvaPlanes) -> Self {
        Self {
            width,
            height,
            data: PictureData::Yuva(planes),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &PictureData {
        &self.data
    }

    pub fn is_argb(&self) -> bool {
        matches!(self.data, PictureData::Argb(_))
    }

    /// Whether any pixel is not fully opaque.
    pub fn has_transparency(&self) -> bool {
        match &self.data {
            PictureData::Argb(argb) => argb.iter().any(|&p| p >> 24 != 0xff),
            PictureData::Yuva(planes) => planes
                .a
                .as_ref()
                .is_some_and(|a| a.iter().any(|&v| v != 0xff)),
        }
    }

    /// Chroma plane width for this picture.
    pub fn uv_width(&self) -> usize {
        (self.width as usize).div_ceil(2)
    }

    /// Chroma plane height for this picture.
    pub fn uv_height(&self) -> usize {
        (self.height as usize).div_ceil(2)
    }

    /// Convert to the ARGB representation (fancy chroma upsampling).
    pub fn to_argb(&self) -> Picture {
        Picture {
            width: self.width,
            height: self.height,
            data: PictureData::Argb(self.argb_pixels().into_owned()),
        }
    }

    /// Convert to the YUV 4:2:0 representation.
    pub fn to_yuva(&self) -> Picture {
        Picture {
            width: self.width,
            height: self.height,
            data: PictureData::Yuva(self.yuva_planes().into_owned()),
        }
    }

    /// YUV planes, converting when the picture is ARGB.
    pub(crate) fn yuva_planes(&self) -> Cow<'_, YuvaPlanes> {
        match &self.data {
            PictureData::Yuva(planes) => Cow::Borrowed(planes),
            PictureData::Argb(argb) => {
                let w = self.width as usize;
                Cow::Owned(rgba_to_yuva(w, self.height as usize, true, false, |x, y| {
                    unpack_argb(argb[y * w + x])
                }))
            }
        }
    }

    /// ARGB pixels, converting when the picture is YUV.
    pub(crate) fn argb_pixels(&self) -> Cow<'_, [u32]> {
        let planes = match &self.data {
            PictureData::Argb(argb) => return Cow::Borrowed(argb),
            PictureData::Yuva(planes) => planes,
        };
        let (w, h) = (self.width as usize, self.height as usize);
        let (uv_w, uv_h) = (self.uv_width(), self.uv_height());
        let mut argb = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let u = convert::sample_chroma(&planes.u, uv_w, uv_h, x, y, true);
                let v = convert::sample_chroma(&planes.v, uv_w, uv_h, x, y, true);
                let [r, g, b] = convert::yuv_to_rgb(planes.y[y * w + x], u, v);
                let a = planes.a.as_ref().map_or(0xff, |a| a[y * w + x]);
                argb.push(pack_argb([r, g, b, a]));
            }
        }
        Cow::Owned(argb)
    }

    /// Full-resolution Y, U, V and alpha planes for metrics.
    ///
    /// YUV pictures keep their subsampled chroma; ARGB pictures are
    /// converted per pixel.
    pub(crate) fn metric_planes(&self) -> [(Vec<u8>, usize, usize); 4] {
        let (w, h) = (self.width as usize, self.height as usize);
        match &self.data {
            PictureData::Yuva(planes) => [
                (planes.y.clone(), w, h),
                (planes.u.clone(), self.uv_width(), self.uv_height()),
                (planes.v.clone(), self.uv_width(), self.uv_height()),
                (planes.a.clone().unwrap_or_else(|| vec![0xff; w * h]), w, h),
            ],
            PictureData::Argb(argb) => {
                let mut y = Vec::with_capacity(w * h);
                let mut u = Vec::with_capacity(w * h);
                let mut v = Vec::with_capacity(w * h);
                let mut a = Vec::with_capacity(w * h);
                for &p in argb {
                    let [r, g, b, alpha] = unpack_argb(p);
                    y.push(convert::rgb_to_y(r, g, b));
                    let (cu, cv) =
                        convert::rgb_sum_to_uv(u32::from(r), u32::from(g), u32::from(b), 1);
                    u.push(cu);
                    v.push(cv);
                    a.push(alpha);
                }
                [(y, w, h), (u, w, h), (v, w, h), (a, w, h)]
            }
        }
    }
}

/// RGBA source to YUV 4:2:0, averaging each 2x2 block for chroma.
fn rgba_to_yuva(
    w: usize,
    h: usize,
    keep_alpha: bool,
    sharp: bool,
    rgba: impl Fn(usize, usize) -> [u8; 4],
) -> YuvaPlanes {
    let uv_w = w.div_ceil(2);
    let uv_h = h.div_ceil(2);
    let mut y_plane = vec![0u8; w * h];
    let mut a_plane = keep_alpha.then(|| vec![0xffu8; w * h]);
    for y in 0..h {
        for x in 0..w {
            let [r, g, b, a] = rgba(x, y);
            y_plane[y * w + x] = convert::rgb_to_y(r, g, b);
            if let Some(plane) = a_plane.as_mut() {
                plane[y * w + x] = a;
            }
        }
    }

    let tables = sharp.then(GammaTables::new);
    let mut u_plane = vec![0u8; uv_w * uv_h];
    let mut v_plane = vec![0u8; uv_w * uv_h];
    for cy in 0..uv_h {
        for cx in 0..uv_w {
            let (mut sr, mut sg, mut sb, mut n) = (0u32, 0u32, 0u32, 0u32);
            for y in (2 * cy)..(2 * cy + 2).min(h) {
                for x in (2 * cx)..(2 * cx + 2).min(w) {
                    let [r, g, b, _] = rgba(x, y);
                    match &tables {
                        Some(t) => {
                            sr += t.linear(r);
                            sg += t.linear(g);
                            sb += t.linear(b);
                        }
                        None => {
                            sr += u32::from(r);
                            sg += u32::from(g);
                            sb += u32::from(b);
                        }
                    }
                    n += 1;
                }
            }
            let (u, v) = match &tables {
                Some(t) => convert::rgb_sum_to_uv(
                    t.gamma_average(sr, n),
                    t.gamma_average(sg, n),
                    t.gamma_average(sb, n),
                    1,
                ),
                None => convert::rgb_sum_to_uv(sr, sg, sb, n),
            };
            u_plane[cy * uv_w + cx] = u;
            v_plane[cy * uv_w + cx] = v;
        }
    }

    YuvaPlanes {
        y: y_plane,
        u: u_plane,
        v: v_plane,
        a: a_plane,
    }
}
