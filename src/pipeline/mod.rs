//! Decode geometry: crop, resample and flip an RGBA raster, then pack it
//! into the requested output layout.
//!
//! Steps always run in that order, so a crop rectangle is expressed in
//! source coordinates and a scale target in output pixels.

pub(crate) mod convert;
pub(crate) mod quality;

use alloc::vec::Vec;

use crate::error::buffer_len;
use crate::pixel::PixelLayout;
use crate::CodecError;

/// Fixed-point precision of the bilinear upsampler.
const FRAC_BITS: u32 = 16;
const FRAC_ONE: u64 = 1 << FRAC_BITS;

/// Empty vector with room for `len` items, or `LimitExceeded` when the
/// allocator refuses.
fn reserve<T>(len: usize) -> Result<Vec<T>, CodecError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| CodecError::LimitExceeded("out of memory for the output image"))?;
    Ok(v)
}

/// Interleaved RGBA pixels, `width * height` entries in row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Raster {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[u8; 4]>,
}

impl Raster {
    /// Keep the `width x height` window at `(left, top)`. The caller has
    /// checked that the window fits.
    pub(crate) fn crop(
        self,
        left: usize,
        top: usize,
        width: usize,
        height: usize,
    ) -> Result<Raster, CodecError> {
        if (left, top, width, height) == (0, 0, self.width, self.height) {
            return Ok(self);
        }
        let mut pixels = reserve(width * height)?;
        for y in top..top + height {
            let row = y * self.width + left;
            pixels.extend_from_slice(&self.pixels[row..row + width]);
        }
        Ok(Raster {
            width,
            height,
            pixels,
        })
    }

    /// Resample to exactly `width x height`: box filter on shrinking axes,
    /// bilinear on growing ones.
    pub(crate) fn scale(self, width: usize, height: usize) -> Result<Raster, CodecError> {
        let horizontal = if width == self.width {
            self
        } else {
            let mut pixels = reserve(width * self.height)?;
            for row in self.pixels.chunks_exact(self.width) {
                pixels.extend(resample(row, width));
            }
            Raster {
                width,
                height: self.height,
                pixels,
            }
        };
        if height == horizontal.height {
            return Ok(horizontal);
        }
        let mut pixels = reserve(width * height)?;
        pixels.resize(width * height, [0u8; 4]);
        let mut column = Vec::with_capacity(horizontal.height);
        for x in 0..width {
            column.clear();
            column.extend((0..horizontal.height).map(|y| horizontal.pixels[y * width + x]));
            for (y, px) in resample(&column, height).into_iter().enumerate() {
                pixels[y * width + x] = px;
            }
        }
        Ok(Raster {
            width,
            height,
            pixels,
        })
    }

    /// Mirror rows top to bottom.
    pub(crate) fn flip_vertical(&mut self) {
        let w = self.width;
        for y in 0..self.height / 2 {
            let bottom = self.height - 1 - y;
            let (head, tail) = self.pixels.split_at_mut(bottom * w);
            head[y * w..(y + 1) * w].swap_with_slice(&mut tail[..w]);
        }
    }

    /// Pack into `layout` with rows `stride` bytes apart.
    pub(crate) fn pack_into(&self, out: &mut [u8], layout: PixelLayout, stride: usize) {
        let ch = layout.channels();
        for (y, row) in self.pixels.chunks_exact(self.width).enumerate() {
            let line = &mut out[y * stride..y * stride + self.width * ch];
            for (px, &rgba) in line.chunks_exact_mut(ch).zip(row) {
                layout.write_rgba(px, rgba);
            }
        }
    }

    /// Tightly packed bytes in `layout`.
    pub(crate) fn pack(&self, layout: PixelLayout) -> Result<Vec<u8>, CodecError> {
        let len = buffer_len(self.width as u32, self.height as u32, layout.channels())?;
        let mut out = reserve(len)?;
        out.resize(len, 0);
        self.pack_into(&mut out, layout, self.width * layout.channels());
        Ok(out)
    }
}

/// Resample one line of pixels to `len` samples.
fn resample(line: &[[u8; 4]], len: usize) -> Vec<[u8; 4]> {
    let n = line.len();
    if len == n {
        return line.to_vec();
    }
    if len < n {
        return (0..len)
            .map(|i| {
                let start = i * n / len;
                let end = ((i + 1) * n / len).max(start + 1);
                let mut sum = [0u32; 4];
                for px in &line[start..end] {
                    for (s, &c) in sum.iter_mut().zip(px) {
                        *s += u32::from(c);
                    }
                }
                let count = (end - start) as u32;
                sum.map(|s| ((s + count / 2) / count) as u8)
            })
            .collect();
    }
    // Sample centers aligned: source position (i + 0.5) * n / len - 0.5.
    (0..len)
        .map(|i| {
            let centered = ((2 * i + 1) as u64 * n as u64 * FRAC_ONE) / (2 * len as u64);
            let pos = centered.saturating_sub(FRAC_ONE / 2);
            let i0 = ((pos >> FRAC_BITS) as usize).min(n - 1);
            let i1 = (i0 + 1).min(n - 1);
            let frac = pos & (FRAC_ONE - 1);
            let mut out = [0u8; 4];
            for (c, o) in out.iter_mut().enumerate() {
                let a = u64::from(line[i0][c]);
                let b = u64::from(line[i1][c]);
                *o = ((a * (FRAC_ONE - frac) + b * frac + FRAC_ONE / 2) >> FRAC_BITS) as u8;
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn raster(w: usize, h: usize) -> Raster {
        Raster {
            width: w,
            height: h,
            pixels: (0..w * h).map(|i| [i as u8, (i * 2) as u8, 0, 255]).collect(),
        }
    }

    #[test]
    fn oversized_reservation_is_an_error() {
        assert!(matches!(
            reserve::<[u8; 4]>(usize::MAX),
            Err(CodecError::LimitExceeded(_))
        ));
    }

    #[test]
    fn crop_window() {
        let out = raster(4, 3).crop(1, 1, 2, 2).unwrap();
        assert_eq!((out.width, out.height), (2, 2));
        assert_eq!(out.pixels[0][0], 5);
        assert_eq!(out.pixels[3][0], 10);
    }

    #[test]
    fn scale_exact_dimensions() {
        for (w, h) in [(1, 1), (3, 7), (10, 2), (17, 13)] {
            let out = raster(6, 5).scale(w, h).unwrap();
            assert_eq!((out.width, out.height), (w, h));
            assert_eq!(out.pixels.len(), w * h);
        }
    }

    #[test]
    fn box_filter_averages() {
        let line = [[0, 0, 0, 0], [10, 10, 10, 10], [20, 20, 20, 20], [30, 30, 30, 30]];
        assert_eq!(resample(&line, 2), vec![[5; 4], [25; 4]]);
        assert_eq!(resample(&line, 1), vec![[15; 4]]);
    }

    #[test]
    fn upsampling_keeps_flat_and_endpoints() {
        let flat = [[42u8; 4]; 3];
        assert!(resample(&flat, 11).iter().all(|&p| p == [42; 4]));
        let ramp = [[0u8; 4], [100u8; 4]];
        let up = resample(&ramp, 4);
        assert_eq!(up[0], [0; 4]);
        assert_eq!(up[3], [100; 4]);
        assert!(up[1][0] < up[2][0]);
    }

    #[test]
    fn flip_reverses_rows() {
        let mut r = raster(2, 3);
        r.flip_vertical();
        assert_eq!(r.pixels[0][0], 4);
        assert_eq!(r.pixels[2][0], 2);
        assert_eq!(r.pixels[4][0], 0);
    }

    #[test]
    fn packing_honors_layout_and_stride() {
        let r = Raster {
            width: 1,
            height: 2,
            pixels: vec![[1, 2, 3, 4], [5, 6, 7, 8]],
        };
        assert_eq!(r.pack(PixelLayout::Bgr8).unwrap(), vec![3, 2, 1, 7, 6, 5]);
        let mut out = [0u8; 10];
        r.pack_into(&mut out, PixelLayout::Rgba8, 5);
        assert_eq!(out, [1, 2, 3, 4, 0, 5, 6, 7, 8, 0]);
    }
}
