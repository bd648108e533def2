//! # zenwebp-lite
//!
//! Pure-Rust WebP container codec.
//!
//! Reads and writes the RIFF/WebP container (`VP8 `, `VP8L`, `VP8X`, `ALPH`,
//! `ICCP`, `EXIF`, `XMP `) with real chunk and frame headers. The payload
//! inside the image chunks is coded by an in-house engine (spatial
//! prediction plus zlib), so files round-trip through this crate but are
//! not meant for other WebP decoders.
//!
//! ## Usage
//!
//! ```rust
//! use zenwebp_lite::{DecodeRequest, EncodeRequest, EncoderConfig, PixelLayout};
//!
//! let pixels = vec![255u8, 0, 0, 255].repeat(4);
//! let webp = EncodeRequest::new(EncoderConfig::new().lossless(true))
//!     .encode(&pixels, PixelLayout::Rgba8, 2, 2)?
//!     .data;
//!
//! let info = zenwebp_lite::get_info(&webp)?;
//! assert_eq!((info.width, info.height), (2, 2));
//!
//! let decoded = DecodeRequest::new(&webp)
//!     .with_output_layout(PixelLayout::Rgba8)
//!     .decode()?;
//! assert_eq!(decoded.pixels.as_bytes(), &pixels[..]);
//! # Ok::<(), zenwebp_lite::CodecError>(())
//! ```
//!
//! ## Features
//!
//! - `std` (default): standard library support.
//! - `threads`: row-parallel coding with rayon. Output bytes do not depend
//!   on the thread count.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

mod codecs;
mod config;
mod decode;
mod distortion;
mod encode;
mod error;
mod format;
mod info;
mod limits;
mod picture;
mod pipeline;
mod pixel;
mod probe;
mod registry;
mod riff;

pub use codecs::vp8l::Predictor;
pub use config::{EncoderConfig, ImageHint, Preset, ValidConfig};
pub use decode::{
    decode, decode_with_options, thumbnail_fast, thumbnail_quality, CropRect, DecodeOptions,
    DecodeOutput, DecodeRequest, DecodeState, OutputInfo, ScaleSize,
};
pub use distortion::{measure, Metric};
pub use encode::{
    encode_lossless, encode_lossless_with_speed, encode_lossy, encode_lossy_with_speed,
    encode_near_lossless, EncodeOutput, EncodeRequest, EncodeSink, EncodeStats, FnSink,
};
pub use enough::{Stop, StopReason, Unstoppable};
pub use error::{CodecError, SinkError};
pub use format::{is_webp, BitstreamFormat};
pub use info::{get_info, BitstreamFeatures};
pub use limits::{ImageMetadata, Limits};
pub use picture::{Picture, PictureData, YuvaPlanes};
pub use pixel::{PixelData, PixelLayout};
pub use probe::MAX_DIMENSION;
pub use registry::{Capabilities, Feature};

const fn parse_version(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let mut value = 0u32;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

const VERSION: (u32, u32, u32) = (
    parse_version(env!("CARGO_PKG_VERSION_MAJOR")),
    parse_version(env!("CARGO_PKG_VERSION_MINOR")),
    parse_version(env!("CARGO_PKG_VERSION_PATCH")),
);

/// `(major, minor, patch)` of this crate.
pub fn version() -> (u32, u32, u32) {
    VERSION
}

#[cfg(test)]
mod tests {
    #[test]
    fn version_matches_manifest() {
        let (major, minor, patch) = super::version();
        let joined = alloc::format!("{major}.{minor}.{patch}");
        assert!(env!("CARGO_PKG_VERSION").starts_with(&joined));
    }
}
