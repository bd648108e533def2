//! Near-lossless preprocessing for the lossless encoder.
//!
//! Pixels that differ noticeably from a 4-connected neighbor are snapped
//! to a coarser grid, which shortens the residual alphabet while keeping
//! flat regions untouched. Quality 100 disables the step.

use alloc::vec::Vec;

/// Images smaller than this in both dimensions are left alone.
const MIN_SIZE: usize = 64;

/// Grid bits for a near-lossless level: 100 → 0, 80..99 → 1, … 0..19 → 5.
#[inline]
pub(crate) fn grid_bits(level: u8) -> u8 {
    5 - level.min(100) / 20
}

/// Round `v` to a multiple of `1 << bits`, ties to the even multiple.
#[inline]
fn snap(v: u8, bits: u8) -> u8 {
    let v = u32::from(v);
    let mask = (1u32 << bits) - 1;
    let rounded = v + (mask >> 1) + ((v >> bits) & 1);
    if rounded > 0xff {
        0xff
    } else {
        (rounded & !mask) as u8
    }
}

#[inline]
fn snap_argb(argb: u32, bits: u8) -> u32 {
    u32::from_be_bytes(argb.to_be_bytes().map(|c| snap(c, bits)))
}

#[inline]
fn close(a: u32, b: u32, limit: i32) -> bool {
    a.to_be_bytes()
        .iter()
        .zip(b.to_be_bytes())
        .all(|(&x, y)| (i32::from(x) - i32::from(y)).abs() < limit)
}

fn pass(src: &[u32], dst: &mut [u32], w: usize, h: usize, bits: u8) {
    let limit = 1i32 << bits;
    dst.copy_from_slice(src);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let p = src[i];
            let smooth = close(p, src[i - 1], limit)
                && close(p, src[i + 1], limit)
                && close(p, src[i - w], limit)
                && close(p, src[i + w], limit);
            if !smooth {
                dst[i] = snap_argb(p, bits);
            }
        }
    }
}

/// Apply near-lossless quantization in place.
///
/// Runs one pass per grid size from the coarsest down to 1 bit; the image
/// border is never modified.
pub(crate) fn apply(argb: &mut [u32], w: usize, h: usize, level: u8) {
    let bits = grid_bits(level);
    if bits == 0 || (w < MIN_SIZE && h < MIN_SIZE) || w < 3 || h < 3 {
        return;
    }
    let mut scratch: Vec<u32> = argb.to_vec();
    for b in (1..=bits).rev() {
        scratch.copy_from_slice(argb);
        pass(&scratch, argb, w, h, b);
    }
    log::trace!("near-lossless level {level}: {bits} grid bits");
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn bits_per_level() {
        assert_eq!(grid_bits(100), 0);
        assert_eq!(grid_bits(99), 1);
        assert_eq!(grid_bits(60), 2);
        assert_eq!(grid_bits(59), 3);
        assert_eq!(grid_bits(0), 5);
    }

    #[test]
    fn snapping_rounds_half_to_even() {
        assert_eq!(snap(1, 1), 0);
        assert_eq!(snap(3, 1), 4);
        assert_eq!(snap(2, 2), 0);
        assert_eq!(snap(3, 2), 4);
        assert_eq!(snap(253, 2), 252);
        assert_eq!(snap(255, 2), 255);
        for bits in 1..=5u8 {
            for v in 0..=255u8 {
                let s = snap(v, bits);
                assert!(s == 255 || s % (1 << bits) == 0, "{v} -> {s}");
                assert!((i32::from(s) - i32::from(v)).abs() <= 1 << bits);
            }
        }
    }

    #[test]
    fn flat_image_untouched() {
        let mut img = vec![0xff40_8020u32; 80 * 80];
        let before = img.clone();
        apply(&mut img, 80, 80, 0);
        assert_eq!(img, before);
    }

    #[test]
    fn small_images_skipped() {
        let mut img: Vec<u32> = (0..32 * 32u32).map(|i| i.wrapping_mul(2654435761)).collect();
        let before = img.clone();
        apply(&mut img, 32, 32, 0);
        assert_eq!(img, before);
    }

    #[test]
    fn noisy_interior_is_snapped_border_kept() {
        let (w, h) = (70, 70);
        let mut img: Vec<u32> = (0..w * h).map(|i| (i as u32).wrapping_mul(2654435761)).collect();
        let before = img.clone();
        apply(&mut img, w, h, 0);
        assert_eq!(img[..w], before[..w]);
        assert_eq!(img[w * (h - 1)..], before[w * (h - 1)..]);
        assert_ne!(img, before);
    }
}
