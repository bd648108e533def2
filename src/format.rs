//! Bitstream format tags and magic-byte detection.

use core::fmt;

/// Compression family of the image payload.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BitstreamFormat {
    /// Mixed or unknown, e.g. an animation whose frames may differ.
    #[default]
    Undefined,
    /// `VP8 ` payload.
    Lossy,
    /// `VP8L` payload.
    Lossless,
}

impl BitstreamFormat {
    /// Numeric code used by the WebP feature API (0, 1, 2).
    pub const fn code(self) -> u8 {
        match self {
            BitstreamFormat::Undefined => 0,
            BitstreamFormat::Lossy => 1,
            BitstreamFormat::Lossless => 2,
        }
    }
}

impl fmt::Display for BitstreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BitstreamFormat::Undefined => "undefined",
            BitstreamFormat::Lossy => "lossy",
            BitstreamFormat::Lossless => "lossless",
        })
    }
}

/// Whether `data` starts with a `RIFF....WEBP` signature.
///
/// Only the first 12 bytes are inspected; use [`get_info`](crate::get_info)
/// to validate the rest of the container.
pub fn is_webp(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_signature() {
        let mut data = [0u8; 16];
        data[..4].copy_from_slice(b"RIFF");
        data[8..12].copy_from_slice(b"WEBP");
        assert!(is_webp(&data));
        assert!(!is_webp(&data[..11]));
        data[8] = b'A';
        assert!(!is_webp(&data));
    }

    #[test]
    fn format_codes() {
        assert_eq!(BitstreamFormat::default(), BitstreamFormat::Undefined);
        assert_eq!(BitstreamFormat::Lossy.code(), 1);
        assert_eq!(BitstreamFormat::Lossless.code(), 2);
    }
}
