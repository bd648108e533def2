//! Encoder configuration, presets and validation.
//!
//! [`EncoderConfig`] mirrors the full WebP encoder parameter set. It is a
//! plain value that can be built with setters or edited field by field;
//! [`EncoderConfig::validate`] checks it as a unit and returns a
//! [`ValidConfig`], the only form the encode pipeline accepts.

use core::ops::Deref;

use crate::CodecError;

/// Content-aware encoding presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum Preset {
    /// Balanced for general use.
    #[default]
    Default,
    /// Digital picture, like portrait or indoor shot.
    Picture,
    /// Outdoor photograph with natural lighting.
    Photo,
    /// Hand or line drawing with high-contrast details.
    Drawing,
    /// Small colorful images.
    Icon,
    /// Text-like content.
    Text,
}

/// Hint about the source content, used by the lossless encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ImageHint {
    #[default]
    Default,
    /// Digital picture, like portrait or indoor shot.
    Picture,
    /// Outdoor photograph with natural lighting.
    Photo,
    /// Discrete tone image (graph, map tile).
    Graph,
}

/// `(method, quality)` per lossless preset level 0..=9.
const LOSSLESS_PRESETS: [(u8, f32); 10] = [
    (0, 0.0),
    (1, 20.0),
    (2, 25.0),
    (3, 30.0),
    (3, 50.0),
    (4, 50.0),
    (4, 75.0),
    (4, 90.0),
    (5, 90.0),
    (6, 100.0),
];

/// WebP encoder parameters.
///
/// Defaults match the reference encoder: lossy, quality 75, method 4,
/// four segments.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct EncoderConfig {
    /// Use the lossless family.
    pub lossless: bool,
    /// 0 (smallest) to 100 (best). For lossless, compression effort.
    pub quality: f32,
    /// Speed/size trade-off, 0 (fast) to 6 (slow). Larger values clamp to 6.
    pub method: u8,
    pub image_hint: ImageHint,
    /// Target output size in bytes; 0 disables.
    pub target_size: u32,
    /// Target PSNR in dB; 0 disables. Takes precedence over `target_size`.
    pub target_psnr: f32,
    /// Number of segments, 1 to 4.
    pub segments: u8,
    /// Spatial noise shaping, 0 to 100.
    pub sns_strength: u8,
    /// Loop filter strength, 0 (off) to 100.
    pub filter_strength: u8,
    /// Loop filter sharpness, 0 (sharpest threshold) to 7.
    pub filter_sharpness: u8,
    /// 0 = simple filter, 1 = normal filter.
    pub filter_type: u8,
    /// Derive the filter strength from the quantizer.
    pub autofilter: bool,
    /// 0 = raw alpha plane, 1 = compressed.
    pub alpha_compression: u8,
    /// 0 = none, 1 = fast, 2 = best predictive filter for alpha. Larger
    /// values clamp to 2.
    pub alpha_filtering: u8,
    /// Alpha quality, 0 to 100; below 100 reduces the number of alpha levels.
    pub alpha_quality: u8,
    /// Number of encode passes for target size/PSNR search, 1 to 10.
    pub pass: u8,
    /// Decode the result and return it in [`EncodeOutput::compressed`].
    ///
    /// [`EncodeOutput::compressed`]: crate::EncodeOutput::compressed
    pub show_compressed: bool,
    /// Bit 0 smooths the segment map, bit 1 dithers, bit 2 forces sharp YUV.
    pub preprocessing: u8,
    /// log2 of the number of token partitions, 0 to 3.
    pub partitions: u8,
    /// 0 to 100. Above 0, an oversized first partition drops the segment
    /// map instead of failing the encode.
    pub partition_limit: u8,
    /// Raise the effective quality so sizes track a JPEG encode at the same
    /// quality setting.
    pub emulate_jpeg_size: bool,
    /// 0 = single thread, 1 = use worker threads where available.
    pub thread_level: u8,
    /// Code token partitions one at a time. Output is unchanged.
    pub low_memory: bool,
    /// Near-lossless preprocessing, 0 (max) to 100 (off).
    pub near_lossless: u8,
    /// Keep RGB values under fully transparent pixels.
    pub exact: bool,
    /// Lossless only: code images with at most 256 colors as a palette.
    pub use_delta_palette: bool,
    /// Gamma-aware chroma downsampling.
    pub use_sharp_yuv: bool,
    /// Minimum quality for target search.
    pub qmin: u8,
    /// Maximum quality for target search.
    pub qmax: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            lossless: false,
            quality: 75.0,
            method: 4,
            image_hint: ImageHint::Default,
            target_size: 0,
            target_psnr: 0.0,
            segments: 4,
            sns_strength: 50,
            filter_strength: 60,
            filter_sharpness: 0,
            filter_type: 1,
            autofilter: false,
            alpha_compression: 1,
            alpha_filtering: 1,
            alpha_quality: 100,
            pass: 1,
            show_compressed: false,
            preprocessing: 0,
            partitions: 0,
            partition_limit: 0,
            emulate_jpeg_size: false,
            thread_level: 0,
            low_memory: false,
            near_lossless: 100,
            exact: false,
            use_delta_palette: false,
            use_sharp_yuv: false,
            qmin: 0,
            qmax: 100,
        }
    }
}

impl EncoderConfig {
    /// Default lossy configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration tuned for a content preset at `quality`.
    #[must_use]
    pub fn with_preset(preset: Preset, quality: f32) -> Self {
        let mut config = Self {
            quality,
            ..Self::default()
        };
        match preset {
            Preset::Default => {}
            Preset::Picture => {
                config.sns_strength = 80;
                config.filter_sharpness = 4;
                config.filter_strength = 35;
                config.preprocessing &= !2;
            }
            Preset::Photo => {
                config.sns_strength = 80;
                config.filter_sharpness = 3;
                config.filter_strength = 30;
                config.preprocessing |= 2;
            }
            Preset::Drawing => {
                config.sns_strength = 25;
                config.filter_sharpness = 6;
                config.filter_strength = 10;
            }
            Preset::Icon => {
                config.sns_strength = 0;
                config.filter_strength = 0;
                config.preprocessing &= !2;
            }
            Preset::Text => {
                config.sns_strength = 0;
                config.filter_strength = 0;
                config.preprocessing &= !2;
                config.segments = 2;
            }
        }
        config
    }

    /// Lossless configuration for effort `level` (0 fastest, 9 smallest).
    pub fn lossless_preset(level: u8) -> Result<Self, CodecError> {
        let &(method, quality) = LOSSLESS_PRESETS
            .get(usize::from(level))
            .ok_or(CodecError::InvalidConfiguration("lossless preset level above 9"))?;
        Ok(Self {
            lossless: true,
            method,
            quality,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    #[must_use]
    pub fn lossless(mut self, lossless: bool) -> Self {
        self.lossless = lossless;
        self
    }

    /// Set the method. Values above 6 are clamped to 6.
    #[must_use]
    pub fn method(mut self, method: u8) -> Self {
        self.method = method.min(6);
        self
    }

    #[must_use]
    pub fn image_hint(mut self, hint: ImageHint) -> Self {
        self.image_hint = hint;
        self
    }

    #[must_use]
    pub fn target_size(mut self, bytes: u32) -> Self {
        self.target_size = bytes;
        self
    }

    #[must_use]
    pub fn target_psnr(mut self, psnr: f32) -> Self {
        self.target_psnr = psnr;
        self
    }

    #[must_use]
    pub fn segments(mut self, segments: u8) -> Self {
        self.segments = segments;
        self
    }

    #[must_use]
    pub fn sns_strength(mut self, strength: u8) -> Self {
        self.sns_strength = strength;
        self
    }

    #[must_use]
    pub fn filter_strength(mut self, strength: u8) -> Self {
        self.filter_strength = strength;
        self
    }

    #[must_use]
    pub fn filter_sharpness(mut self, sharpness: u8) -> Self {
        self.filter_sharpness = sharpness;
        self
    }

    #[must_use]
    pub fn filter_type(mut self, filter_type: u8) -> Self {
        self.filter_type = filter_type;
        self
    }

    #[must_use]
    pub fn autofilter(mut self, enable: bool) -> Self {
        self.autofilter = enable;
        self
    }

    #[must_use]
    pub fn alpha_quality(mut self, quality: u8) -> Self {
        self.alpha_quality = quality;
        self
    }

    #[must_use]
    pub fn alpha_filtering(mut self, filtering: u8) -> Self {
        self.alpha_filtering = filtering;
        self
    }

    #[must_use]
    pub fn alpha_compression(mut self, compression: u8) -> Self {
        self.alpha_compression = compression;
        self
    }

    #[must_use]
    pub fn pass(mut self, pass: u8) -> Self {
        self.pass = pass;
        self
    }

    #[must_use]
    pub fn preprocessing(mut self, flags: u8) -> Self {
        self.preprocessing = flags;
        self
    }

    #[must_use]
    pub fn partitions(mut self, log2: u8) -> Self {
        self.partitions = log2;
        self
    }

    #[must_use]
    pub fn thread_level(mut self, level: u8) -> Self {
        self.thread_level = level;
        self
    }

    #[must_use]
    pub fn near_lossless(mut self, level: u8) -> Self {
        self.near_lossless = level;
        self
    }

    #[must_use]
    pub fn exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    #[must_use]
    pub fn sharp_yuv(mut self, enable: bool) -> Self {
        self.use_sharp_yuv = enable;
        self
    }

    #[must_use]
    pub fn quality_range(mut self, qmin: u8, qmax: u8) -> Self {
        self.qmin = qmin;
        self.qmax = qmax;
        self
    }

    /// Range-check every field and normalize the clamped ones.
    ///
    /// `method` above 6 becomes 6 and `alpha_filtering` above 2 becomes 2;
    /// any other out-of-range field is rejected with the field named in the
    /// reason.
    pub fn validate(&self) -> Result<ValidConfig, CodecError> {
        let reject = CodecError::InvalidConfiguration;
        if !(0.0..=100.0).contains(&self.quality) {
            return Err(reject("quality must be within 0..=100"));
        }
        if !self.target_psnr.is_finite() || self.target_psnr < 0.0 {
            return Err(reject("target_psnr must be finite and non-negative"));
        }
        if !(1..=4).contains(&self.segments) {
            return Err(reject("segments must be within 1..=4"));
        }
        if self.sns_strength > 100 {
            return Err(reject("sns_strength must be within 0..=100"));
        }
        if self.filter_strength > 100 {
            return Err(reject("filter_strength must be within 0..=100"));
        }
        if self.filter_sharpness > 7 {
            return Err(reject("filter_sharpness must be within 0..=7"));
        }
        if self.filter_type > 1 {
            return Err(reject("filter_type must be 0 or 1"));
        }
        if self.alpha_compression > 1 {
            return Err(reject("alpha_compression must be 0 or 1"));
        }
        if self.alpha_quality > 100 {
            return Err(reject("alpha_quality must be within 0..=100"));
        }
        if !(1..=10).contains(&self.pass) {
            return Err(reject("pass must be within 1..=10"));
        }
        if self.preprocessing > 7 {
            return Err(reject("preprocessing must be within 0..=7"));
        }
        if self.partitions > 3 {
            return Err(reject("partitions must be within 0..=3"));
        }
        if self.partition_limit > 100 {
            return Err(reject("partition_limit must be within 0..=100"));
        }
        if self.thread_level > 1 {
            return Err(reject("thread_level must be 0 or 1"));
        }
        if self.near_lossless > 100 {
            return Err(reject("near_lossless must be within 0..=100"));
        }
        if self.qmax > 100 || self.qmin > self.qmax {
            return Err(reject("qmin/qmax must satisfy qmin <= qmax <= 100"));
        }

        let mut config = self.clone();
        config.method = config.method.min(6);
        config.alpha_filtering = config.alpha_filtering.min(2);
        Ok(ValidConfig(config))
    }
}

/// An [`EncoderConfig`] that passed [`EncoderConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidConfig(EncoderConfig);

impl ValidConfig {
    /// Give back the normalized configuration.
    pub fn into_inner(self) -> EncoderConfig {
        self.0
    }

    /// Copy with a different quality, used by the target search.
    pub(crate) fn with_quality(&self, quality: f32) -> Self {
        let mut config = self.0.clone();
        config.quality = quality.clamp(0.0, 100.0);
        ValidConfig(config)
    }

    /// Sharp chroma downsampling, requested directly or via preprocessing bit 2.
    pub(crate) fn sharp_yuv(&self) -> bool {
        self.0.use_sharp_yuv || self.0.preprocessing & 4 != 0
    }

    pub(crate) fn uses_threads(&self) -> bool {
        self.0.thread_level > 0
    }
}

impl Deref for ValidConfig {
    type Target = EncoderConfig;

    fn deref(&self) -> &EncoderConfig {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let valid = EncoderConfig::default().validate().unwrap();
        assert_eq!(valid.quality, 75.0);
        assert_eq!(valid.method, 4);
        assert_eq!(valid.segments, 4);
    }

    #[test]
    fn segments_bounds() {
        let mut config = EncoderConfig::default();
        config.segments = 5;
        assert!(matches!(
            config.validate(),
            Err(CodecError::InvalidConfiguration(_))
        ));
        config.segments = 4;
        assert!(config.validate().is_ok());
        config.segments = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn quality_bounds() {
        assert!(EncoderConfig::new().quality(150.0).validate().is_err());
        assert!(EncoderConfig::new().quality(-1.0).validate().is_err());
        assert!(EncoderConfig::new().quality(f32::NAN).validate().is_err());
        assert!(EncoderConfig::new().quality(100.0).validate().is_ok());
    }

    #[test]
    fn method_clamps_instead_of_rejecting() {
        let mut config = EncoderConfig::default();
        config.method = 9;
        assert_eq!(config.validate().unwrap().method, 6);
        assert_eq!(EncoderConfig::new().method(200).method, 6);
    }

    #[test]
    fn preprocessing_rejects_above_seven() {
        assert!(EncoderConfig::new().preprocessing(7).validate().is_ok());
        assert!(EncoderConfig::new().preprocessing(8).validate().is_err());
    }

    #[test]
    fn sharpness_and_near_lossless() {
        assert!(EncoderConfig::new().filter_sharpness(8).validate().is_err());
        assert!(EncoderConfig::new().near_lossless(101).validate().is_err());
        assert!(EncoderConfig::new().pass(11).validate().is_err());
        assert!(EncoderConfig::new().pass(0).validate().is_err());
    }

    #[test]
    fn quality_range_order() {
        assert!(EncoderConfig::new().quality_range(40, 30).validate().is_err());
        assert!(EncoderConfig::new().quality_range(30, 40).validate().is_ok());
    }

    #[test]
    fn lossless_presets() {
        let fast = EncoderConfig::lossless_preset(0).unwrap();
        assert!(fast.lossless);
        assert_eq!((fast.method, fast.quality), (0, 0.0));
        let best = EncoderConfig::lossless_preset(9).unwrap();
        assert_eq!((best.method, best.quality), (6, 100.0));
        assert!(EncoderConfig::lossless_preset(10).is_err());
    }

    #[test]
    fn text_preset_uses_two_segments() {
        let config = EncoderConfig::with_preset(Preset::Text, 80.0);
        assert_eq!(config.segments, 2);
        assert_eq!(config.sns_strength, 0);
        assert_eq!(config.quality, 80.0);
        let photo = EncoderConfig::with_preset(Preset::Photo, 80.0);
        assert_eq!(photo.preprocessing & 2, 2);
    }
}
