//! Payload engines for the `VP8 `, `VP8L` and `ALPH` chunks.
//!
//! Each chunk keeps its standard header; the body is coded with spatial
//! prediction followed by zlib. Helpers shared by the engines live here.

pub(crate) mod alpha;
pub(crate) mod analysis;
pub(crate) mod filter;
pub(crate) mod near_lossless;
pub(crate) mod vp8;
pub(crate) mod vp8l;

use alloc::vec::Vec;

use miniz_oxide::inflate::TINFLStatus;

/// zlib-compress `data` at miniz level `level` (0..=10).
pub(crate) fn deflate(data: &[u8], level: u8) -> Vec<u8> {
    miniz_oxide::deflate::compress_to_vec_zlib(data, level.min(10))
}

/// Inflate a zlib stream that must expand to exactly `expected` bytes.
///
/// Work is bounded by `expected`; a stream that would produce more output
/// is rejected without decoding the rest.
pub(crate) fn inflate_exact(data: &[u8], expected: usize) -> Result<Vec<u8>, &'static str> {
    let out = miniz_oxide::inflate::decompress_to_vec_zlib_with_limit(data, expected).map_err(
        |err| match err.status {
            TINFLStatus::Adler32Mismatch => "checksum mismatch",
            TINFLStatus::HasMoreOutput => "payload larger than image",
            _ => "corrupt compressed stream",
        },
    )?;
    if out.len() != expected {
        return Err("payload shorter than image");
    }
    Ok(out)
}

/// Inflate a zlib stream whose size is only bounded, not known.
pub(crate) fn inflate_bounded(data: &[u8], limit: usize) -> Result<Vec<u8>, &'static str> {
    miniz_oxide::inflate::decompress_to_vec_zlib_with_limit(data, limit).map_err(|err| {
        match err.status {
            TINFLStatus::Adler32Mismatch => "checksum mismatch",
            TINFLStatus::HasMoreOutput => "payload larger than image",
            _ => "corrupt compressed stream",
        }
    })
}

/// Run `f` for each index in `0..count`, in parallel when `threads` is set
/// and the `threads` feature is compiled in. Results keep index order.
pub(crate) fn map_indexed<R, F>(count: usize, threads: bool, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize) -> R + Sync + Send,
{
    #[cfg(feature = "threads")]
    {
        if threads {
            use rayon::prelude::*;
            return (0..count).into_par_iter().map(f).collect();
        }
    }
    let _ = threads;
    (0..count).map(f).collect()
}

/// Median edge detector prediction from left, top and top-left neighbors.
#[inline]
pub(crate) fn med_predict(left: u8, top: u8, top_left: u8) -> u8 {
    let (lo, hi) = if left < top { (left, top) } else { (top, left) };
    if top_left >= hi {
        lo
    } else if top_left <= lo {
        hi
    } else {
        (i16::from(left) + i16::from(top) - i16::from(top_left)) as u8
    }
}

/// Deterministic pseudo-random generator for dithering.
pub(crate) struct Lcg(u32);

impl Lcg {
    pub(crate) fn new(seed: u32) -> Self {
        Lcg(seed)
    }

    /// Next value in `-amp..=amp`.
    #[inline]
    pub(crate) fn next_in(&mut self, amp: i32) -> i32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12345);
        if amp == 0 {
            return 0;
        }
        ((self.0 >> 16) % (2 * amp as u32 + 1)) as i32 - amp
    }
}
