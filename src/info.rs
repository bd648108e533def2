//! Bitstream features extracted without decoding pixels.

use crate::format::BitstreamFormat;
use crate::CodecError;

/// Image properties read from the container headers.
///
/// Produced by [`get_info`]; never modified afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct BitstreamFeatures {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Whether the image carries an alpha channel.
    pub has_alpha: bool,
    /// Whether the file is an animation.
    pub has_animation: bool,
    /// Payload compression family.
    pub format: BitstreamFormat,
    /// An `ICCP` chunk is present.
    pub has_icc: bool,
    /// An `EXIF` chunk is present.
    pub has_exif: bool,
    /// An `XMP ` chunk is present.
    pub has_xmp: bool,
}

impl BitstreamFeatures {
    /// Channel count of the default decode layout (BGR or BGRA).
    pub fn default_channels(&self) -> usize {
        if self.has_alpha { 4 } else { 3 }
    }
}

/// Read width, height, alpha and animation flags from WebP bytes.
///
/// Pure metadata scan: no pixel memory is allocated and the result is the
/// same on every call with the same bytes.
pub fn get_info(data: &[u8]) -> Result<BitstreamFeatures, CodecError> {
    crate::probe::parse_container(data).map(|c| c.features)
}
