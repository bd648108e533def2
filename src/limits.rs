//! Resource limits and metadata passthrough.

use crate::CodecError;

/// Resource limits applied before a decode allocates pixel memory.
///
/// All limits are optional; [`Limits::none`] accepts any image the
/// bitstream itself can express.
#[derive(Clone, Debug, Default)]
pub struct Limits {
    /// Maximum output width in pixels.
    pub max_width: Option<u32>,
    /// Maximum output height in pixels.
    pub max_height: Option<u32>,
    /// Maximum output pixel count.
    pub max_pixels: Option<u64>,
    /// Maximum size of the decoded buffer in bytes.
    pub max_memory_bytes: Option<u64>,
}

impl Limits {
    /// No restrictions.
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the maximum width and height.
    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    /// Set the maximum pixel count.
    pub fn with_max_pixels(mut self, pixels: u64) -> Self {
        self.max_pixels = Some(pixels);
        self
    }

    /// Set the maximum decoded buffer size.
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Check image dimensions against the width, height and pixel limits.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), CodecError> {
        if self.max_width.is_some_and(|max| width > max) {
            return Err(CodecError::LimitExceeded("width exceeds limit"));
        }
        if self.max_height.is_some_and(|max| height > max) {
            return Err(CodecError::LimitExceeded("height exceeds limit"));
        }
        let pixels = u64::from(width) * u64::from(height);
        if self.max_pixels.is_some_and(|max| pixels > max) {
            return Err(CodecError::LimitExceeded("pixel count exceeds limit"));
        }
        Ok(())
    }

    /// Check a planned allocation against the memory limit.
    pub fn check_memory(&self, bytes: u64) -> Result<(), CodecError> {
        if self.max_memory_bytes.is_some_and(|max| bytes > max) {
            return Err(CodecError::LimitExceeded("memory allocation exceeds limit"));
        }
        Ok(())
    }
}

/// Metadata chunks to embed when encoding.
///
/// Any present field switches the output to the extended (`VP8X`) layout.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageMetadata<'a> {
    /// ICC color profile (`ICCP` chunk).
    pub icc_profile: Option<&'a [u8]>,
    /// EXIF block (`EXIF` chunk).
    pub exif: Option<&'a [u8]>,
    /// XMP packet (`XMP ` chunk).
    pub xmp: Option<&'a [u8]>,
}

impl<'a> ImageMetadata<'a> {
    /// No metadata.
    pub fn none() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.icc_profile.is_none() && self.exif.is_none() && self.xmp.is_none()
    }
}
