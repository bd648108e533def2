//! Interleaved 8-bit pixel layouts and typed pixel buffers.
//!
//! Uses `imgref::ImgVec` for 2D pixel data with typed pixels from the `rgb` crate.

use alloc::vec::Vec;

use bytemuck::Pod;
use imgref::ImgVec;
use rgb::alt::{BGR, BGRA};
use rgb::{ComponentBytes, Rgb, Rgba};

/// Byte order of interleaved 8-bit pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelLayout {
    Rgb8,
    Rgba8,
    Bgr8,
    Bgra8,
}

impl PixelLayout {
    /// Bytes per pixel.
    pub const fn channels(self) -> usize {
        match self {
            PixelLayout::Rgb8 | PixelLayout::Bgr8 => 3,
            PixelLayout::Rgba8 | PixelLayout::Bgra8 => 4,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, PixelLayout::Rgba8 | PixelLayout::Bgra8)
    }

    /// Layout used when the caller does not choose one: BGRA with alpha,
    /// BGR without.
    pub const fn default_for(has_alpha: bool) -> Self {
        if has_alpha {
            PixelLayout::Bgra8
        } else {
            PixelLayout::Bgr8
        }
    }

    /// Read one pixel as `[r, g, b, a]`; alpha is 255 for 3-channel layouts.
    #[inline]
    pub(crate) fn read_rgba(self, px: &[u8]) -> [u8; 4] {
        match self {
            PixelLayout::Rgb8 => [px[0], px[1], px[2], 255],
            PixelLayout::Rgba8 => [px[0], px[1], px[2], px[3]],
            PixelLayout::Bgr8 => [px[2], px[1], px[0], 255],
            PixelLayout::Bgra8 => [px[2], px[1], px[0], px[3]],
        }
    }

    /// Write `[r, g, b, a]` into one pixel; alpha is dropped for 3-channel
    /// layouts.
    #[inline]
    pub(crate) fn write_rgba(self, px: &mut [u8], rgba: [u8; 4]) {
        let [r, g, b, a] = rgba;
        match self {
            PixelLayout::Rgb8 => px[..3].copy_from_slice(&[r, g, b]),
            PixelLayout::Rgba8 => px[..4].copy_from_slice(&[r, g, b, a]),
            PixelLayout::Bgr8 => px[..3].copy_from_slice(&[b, g, r]),
            PixelLayout::Bgra8 => px[..4].copy_from_slice(&[b, g, r, a]),
        }
    }
}

/// Decoded pixels in a typed buffer.
///
/// The variant determines the channel order; width and height are embedded
/// in the `ImgVec`.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PixelData {
    Rgb8(ImgVec<Rgb<u8>>),
    Rgba8(ImgVec<Rgba<u8>>),
    /// Blue, green, red byte order.
    Bgr8(ImgVec<BGR<u8>>),
    /// Blue, green, red, alpha byte order.
    Bgra8(ImgVec<BGRA<u8>>),
}

fn typed<P: Pod>(bytes: Vec<u8>) -> Vec<P> {
    match bytemuck::allocation::try_cast_vec(bytes) {
        Ok(pixels) => pixels,
        // Capacity not a multiple of the pixel size.
        Err((_, bytes)) => bytemuck::allocation::pod_collect_to_vec(&bytes),
    }
}

impl PixelData {
    /// Wrap a tightly packed byte buffer of `layout` pixels.
    pub(crate) fn from_packed(
        bytes: Vec<u8>,
        layout: PixelLayout,
        width: u32,
        height: u32,
    ) -> Self {
        let (w, h) = (width as usize, height as usize);
        match layout {
            PixelLayout::Rgb8 => PixelData::Rgb8(ImgVec::new(typed(bytes), w, h)),
            PixelLayout::Rgba8 => PixelData::Rgba8(ImgVec::new(typed(bytes), w, h)),
            PixelLayout::Bgr8 => PixelData::Bgr8(ImgVec::new(typed(bytes), w, h)),
            PixelLayout::Bgra8 => PixelData::Bgra8(ImgVec::new(typed(bytes), w, h)),
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            PixelData::Rgb8(img) => img.width() as u32,
            PixelData::Rgba8(img) => img.width() as u32,
            PixelData::Bgr8(img) => img.width() as u32,
            PixelData::Bgra8(img) => img.width() as u32,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            PixelData::Rgb8(img) => img.height() as u32,
            PixelData::Rgba8(img) => img.height() as u32,
            PixelData::Bgr8(img) => img.height() as u32,
            PixelData::Bgra8(img) => img.height() as u32,
        }
    }

    pub fn layout(&self) -> PixelLayout {
        match self {
            PixelData::Rgb8(_) => PixelLayout::Rgb8,
            PixelData::Rgba8(_) => PixelLayout::Rgba8,
            PixelData::Bgr8(_) => PixelLayout::Bgr8,
            PixelData::Bgra8(_) => PixelLayout::Bgra8,
        }
    }

    pub fn has_alpha(&self) -> bool {
        self.layout().has_alpha()
    }

    /// Tightly packed bytes in this buffer's layout.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PixelData::Rgb8(img) => img.buf().as_bytes(),
            PixelData::Rgba8(img) => img.buf().as_bytes(),
            PixelData::Bgr8(img) => img.buf().as_bytes(),
            PixelData::Bgra8(img) => img.buf().as_bytes(),
        }
    }

    /// Convert to RGBA8, allocating a new buffer unless already RGBA8.
    pub fn into_rgba8(self) -> ImgVec<Rgba<u8>> {
        let layout = self.layout();
        let (w, h) = (self.width() as usize, self.height() as usize);
        if let PixelData::Rgba8(img) = self {
            return img;
        }
        let pixels = self
            .as_bytes()
            .chunks_exact(layout.channels())
            .map(|px| {
                let [r, g, b, a] = layout.read_rgba(px);
                Rgba { r, g, b, a }
            })
            .collect();
        ImgVec::new(pixels, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn layouts_swizzle() {
        let mut px = [0u8; 4];
        PixelLayout::Bgra8.write_rgba(&mut px, [1, 2, 3, 4]);
        assert_eq!(px, [3, 2, 1, 4]);
        assert_eq!(PixelLayout::Bgra8.read_rgba(&px), [1, 2, 3, 4]);
        assert_eq!(PixelLayout::Bgr8.read_rgba(&[9, 8, 7]), [7, 8, 9, 255]);
    }

    #[test]
    fn default_layout_follows_alpha() {
        assert_eq!(PixelLayout::default_for(true), PixelLayout::Bgra8);
        assert_eq!(PixelLayout::default_for(false), PixelLayout::Bgr8);
    }

    #[test]
    fn packed_bgr_to_rgba() {
        let data = PixelData::from_packed(vec![10, 20, 30, 40, 50, 60], PixelLayout::Bgr8, 2, 1);
        assert_eq!(data.width(), 2);
        assert!(!data.has_alpha());
        assert_eq!(data.as_bytes(), &[10, 20, 30, 40, 50, 60]);
        let rgba = data.into_rgba8();
        assert_eq!(rgba.buf()[0], Rgba { r: 30, g: 20, b: 10, a: 255 });
        assert_eq!(rgba.buf()[1], Rgba { r: 60, g: 50, b: 40, a: 255 });
    }
}
