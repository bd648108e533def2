//! Image decoding.
//!
//! A decode walks a fixed state machine: container header, then either the
//! lossy frame header, partition 0 and pixel data, or the lossless header
//! and pixel data. Any structural error moves it to [`DecodeState::Error`]
//! and the call fails with the last state that completed.

use alloc::vec::Vec;
use core::fmt;

use crate::codecs::{self, alpha, filter, vp8, vp8l};
use crate::error::buffer_len;
use crate::info::BitstreamFeatures;
use crate::picture::unpack_argb;
use crate::pipeline::convert;
use crate::pipeline::Raster;
use crate::pixel::{PixelData, PixelLayout};
use crate::probe::{self, MAX_DIMENSION, Payload};
use crate::{CodecError, Limits, Stop};

/// Decoder progress, strictly forward except for the absorbing `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    HeaderParse,
    FrameHeaderParse,
    PartitionZero,
    PixelData,
    LosslessHeaderParse,
    LosslessData,
    Done,
    Error,
}

impl DecodeState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: DecodeState) -> bool {
        use DecodeState::*;
        matches!(
            (self, next),
            (HeaderParse, FrameHeaderParse)
                | (FrameHeaderParse, PartitionZero)
                | (PartitionZero, PixelData)
                | (PixelData, Done)
                | (HeaderParse, LosslessHeaderParse)
                | (LosslessHeaderParse, LosslessData)
                | (LosslessData, Done)
        ) || (next == Error && !matches!(self, Done | Error))
    }
}

impl fmt::Display for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecodeState::HeaderParse => "HeaderParse",
            DecodeState::FrameHeaderParse => "FrameHeaderParse",
            DecodeState::PartitionZero => "PartitionZero",
            DecodeState::PixelData => "PixelData",
            DecodeState::LosslessHeaderParse => "LosslessHeaderParse",
            DecodeState::LosslessData => "LosslessData",
            DecodeState::Done => "Done",
            DecodeState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Tracks decode progress. Created once the container header has parsed.
struct Machine {
    state: DecodeState,
    last_good: DecodeState,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: DecodeState::HeaderParse,
            last_good: DecodeState::HeaderParse,
        }
    }

    /// Enter `next`; the current state has completed.
    fn advance(&mut self, next: DecodeState) {
        debug_assert!(self.state.can_advance_to(next), "{} -> {next}", self.state);
        log::trace!("decode state {} -> {next}", self.state);
        self.last_good = self.state;
        self.state = next;
    }

    /// Enter `Error`, reporting the last completed state.
    fn fail(&mut self, reason: &'static str) -> CodecError {
        let state = self.last_good;
        log::debug!("decode failed in {} after {state}: {reason}", self.state);
        self.state = DecodeState::Error;
        CodecError::DecodeFailed { state, reason }
    }
}

/// Source rectangle to keep, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Exact output size after cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleSize {
    pub width: u32,
    pub height: u32,
}

impl ScaleSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Options for one decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DecodeOptions {
    /// Skip the deblocking loop filter (lossy only).
    pub bypass_filtering: bool,
    /// Bilinear chroma upsampling instead of nearest sample.
    pub fancy_upsampling: bool,
    pub crop: Option<CropRect>,
    pub scale: Option<ScaleSize>,
    /// Decode token partitions on worker threads when available.
    pub use_threads: bool,
    /// Chroma dithering, 0 (off) to 100.
    pub dithering_strength: u8,
    /// Mirror the output vertically.
    pub flip: bool,
    /// Smoothing of level-reduced alpha, 0 (off) to 100.
    pub alpha_dithering_strength: u8,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            bypass_filtering: false,
            fancy_upsampling: true,
            crop: None,
            scale: None,
            use_threads: false,
            dithering_strength: 0,
            flip: false,
            alpha_dithering_strength: 0,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bypass_filtering(mut self, bypass: bool) -> Self {
        self.bypass_filtering = bypass;
        self
    }

    #[must_use]
    pub fn fancy_upsampling(mut self, fancy: bool) -> Self {
        self.fancy_upsampling = fancy;
        self
    }

    #[must_use]
    pub fn crop(mut self, rect: CropRect) -> Self {
        self.crop = Some(rect);
        self
    }

    #[must_use]
    pub fn scale(mut self, width: u32, height: u32) -> Self {
        self.scale = Some(ScaleSize::new(width, height));
        self
    }

    #[must_use]
    pub fn use_threads(mut self, enable: bool) -> Self {
        self.use_threads = enable;
        self
    }

    #[must_use]
    pub fn dithering_strength(mut self, strength: u8) -> Self {
        self.dithering_strength = strength.min(100);
        self
    }

    #[must_use]
    pub fn flip(mut self, flip: bool) -> Self {
        self.flip = flip;
        self
    }

    #[must_use]
    pub fn alpha_dithering_strength(mut self, strength: u8) -> Self {
        self.alpha_dithering_strength = strength.min(100);
        self
    }
}

/// Decoded image output.
#[derive(Debug)]
pub struct DecodeOutput {
    /// Decoded pixel data in a typed buffer.
    pub pixels: PixelData,
    /// Features of the source bitstream.
    pub features: BitstreamFeatures,
}

impl DecodeOutput {
    /// Output width in pixels (convenience accessor).
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Output height in pixels (convenience accessor).
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Geometry of a decode result, known before any pixel is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub features: BitstreamFeatures,
}

impl OutputInfo {
    /// Bytes per tightly packed output row.
    pub fn min_stride(&self) -> usize {
        self.width as usize * self.layout.channels()
    }
}

/// Image decode request builder.
///
/// # Example
///
/// ```no_run
/// use zenwebp_lite::{DecodeOptions, DecodeRequest, PixelLayout};
///
/// let data: &[u8] = &[]; // your WebP bytes
/// let output = DecodeRequest::new(data)
///     .with_options(DecodeOptions::new().scale(320, 240))
///     .with_output_layout(PixelLayout::Rgba8)
///     .decode()?;
/// println!("{}x{}", output.width(), output.height());
/// # Ok::<(), zenwebp_lite::CodecError>(())
/// ```
pub struct DecodeRequest<'a> {
    data: &'a [u8],
    options: DecodeOptions,
    layout: Option<PixelLayout>,
    limits: Option<&'a Limits>,
    stop: Option<&'a dyn Stop>,
}

impl<'a> DecodeRequest<'a> {
    /// Create a new decode request with default options.
    ///
    /// The output layout follows the source: BGRA with alpha, BGR without.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            options: DecodeOptions::default(),
            layout: None,
            limits: None,
            stop: None,
        }
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Request a specific output layout.
    pub fn with_output_layout(mut self, layout: PixelLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Set resource limits.
    pub fn with_limits(mut self, limits: &'a Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Set a cancellation token.
    pub fn with_stop(mut self, stop: &'a dyn Stop) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Output geometry for this request, validated against crop, scale and
    /// limits. Parses headers only.
    pub fn output_info(&self) -> Result<OutputInfo, CodecError> {
        let features = probe::parse_container(self.data)?.features;
        self.plan(&features)
    }

    fn plan(&self, features: &BitstreamFeatures) -> Result<OutputInfo, CodecError> {
        if features.has_animation {
            return Err(CodecError::UnsupportedFeature("animation"));
        }
        let (mut width, mut height) = (features.width, features.height);
        if let Some(crop) = self.options.crop {
            let fits = u64::from(crop.left) + u64::from(crop.width) <= u64::from(width)
                && u64::from(crop.top) + u64::from(crop.height) <= u64::from(height);
            if !fits {
                return Err(CodecError::CropOutOfBounds {
                    left: crop.left,
                    top: crop.top,
                    width: crop.width,
                    height: crop.height,
                    source_width: width,
                    source_height: height,
                });
            }
            if crop.width == 0 || crop.height == 0 {
                return Err(CodecError::InvalidInput(alloc::format!(
                    "crop {}x{} is empty",
                    crop.width,
                    crop.height
                )));
            }
            (width, height) = (crop.width, crop.height);
        }
        if let Some(scale) = self.options.scale {
            if scale.width == 0 || scale.height == 0 {
                return Err(CodecError::InvalidInput(alloc::format!(
                    "scale target {}x{} is empty",
                    scale.width,
                    scale.height
                )));
            }
            if scale.width > MAX_DIMENSION || scale.height > MAX_DIMENSION {
                return Err(CodecError::InvalidInput(alloc::format!(
                    "scale target {}x{} exceeds {MAX_DIMENSION} pixels per side",
                    scale.width,
                    scale.height
                )));
            }
            (width, height) = (scale.width, scale.height);
        }
        let layout = self
            .layout
            .unwrap_or(PixelLayout::default_for(features.has_alpha));

        let working = buffer_len(features.width, features.height, 4)?;
        let output = buffer_len(width, height, layout.channels())?;
        if let Some(limits) = self.limits {
            limits.check_dimensions(features.width, features.height)?;
            limits.check_dimensions(width, height)?;
            limits.check_memory((working as u64).saturating_add(output as u64))?;
        }
        Ok(OutputInfo {
            width,
            height,
            layout,
            features: *features,
        })
    }

    fn check_stop(&self) -> Result<(), CodecError> {
        if let Some(stop) = self.stop {
            stop.check()?;
        }
        Ok(())
    }

    /// Decode the image to pixels.
    pub fn decode(self) -> Result<DecodeOutput, CodecError> {
        let (raster, info) = self.run()?;
        // Owned by the returned pixels from here on.
        let bytes = raster.pack(info.layout)?;
        Ok(DecodeOutput {
            pixels: PixelData::from_packed(bytes, info.layout, info.width, info.height),
            features: info.features,
        })
    }

    /// Decode into a caller-owned buffer with rows `stride` bytes apart.
    ///
    /// The buffer is written only after the whole image decoded
    /// successfully; on error it is left untouched. Bytes between the end of
    /// a row and the next stride are not written.
    pub fn decode_into(self, buf: &mut [u8], stride: usize) -> Result<OutputInfo, CodecError> {
        let info = self.output_info()?;
        let row = info.min_stride();
        if stride < row {
            return Err(CodecError::InvalidInput(alloc::format!(
                "stride {stride} is smaller than a {row}-byte row"
            )));
        }
        let needed = stride
            .checked_mul(info.height as usize - 1)
            .and_then(|n| n.checked_add(row))
            .ok_or(CodecError::PlatformUnsupported(
                "image size exceeds the address space",
            ))?;
        if buf.len() < needed {
            return Err(CodecError::InvalidInput(alloc::format!(
                "output buffer holds {} bytes, {needed} required",
                buf.len()
            )));
        }
        let (raster, info) = self.run()?;
        raster.pack_into(buf, info.layout, stride);
        Ok(info)
    }

    /// Drive the state machine and the geometry steps.
    fn run(&self) -> Result<(Raster, OutputInfo), CodecError> {
        let container = probe::parse_container(self.data)?;
        let info = self.plan(&container.features)?;
        let mut machine = Machine::new();
        self.check_stop()?;

        let threads = self.options.use_threads;
        if threads && !cfg!(feature = "threads") {
            log::warn!("use_threads requested but the threads feature is not compiled in");
        }
        let features = &container.features;
        let raster = match container.payload {
            Payload::Lossy { vp8, alpha } => {
                self.decode_lossy(&mut machine, vp8, alpha, features)?
            }
            Payload::Lossless(vp8l) => self.decode_lossless(&mut machine, vp8l, features)?,
            Payload::Animation => return Err(CodecError::UnsupportedFeature("animation")),
        };
        machine.advance(DecodeState::Done);
        self.check_stop()?;

        let mut raster = match self.options.crop {
            Some(c) => raster.crop(
                c.left as usize,
                c.top as usize,
                c.width as usize,
                c.height as usize,
            )?,
            None => raster,
        };
        if self.options.scale.is_some() {
            raster = raster.scale(info.width as usize, info.height as usize)?;
        }
        if self.options.flip {
            raster.flip_vertical();
        }
        log::debug!(
            "decoded {}x{} {} image to {}x{} {:?}",
            features.width,
            features.height,
            features.format,
            info.width,
            info.height,
            info.layout
        );
        Ok((raster, info))
    }

    fn decode_lossy(
        &self,
        machine: &mut Machine,
        payload: &[u8],
        alpha_chunk: Option<&[u8]>,
        features: &BitstreamFeatures,
    ) -> Result<Raster, CodecError> {
        let (w, h) = (features.width as usize, features.height as usize);
        machine.advance(DecodeState::FrameHeaderParse);
        let frame = vp8::parse_frame_header(payload).map_err(|r| machine.fail(r))?;
        if (frame.width, frame.height) != (w, h) {
            return Err(machine.fail("frame size disagrees with container"));
        }

        machine.advance(DecodeState::PartitionZero);
        let header = vp8::parse_partition_zero(&frame).map_err(|r| machine.fail(r))?;
        log::trace!(
            "partition 0: {} segment(s), quant {:?}, levels {:?}",
            header.segments,
            header.quant,
            header.level
        );

        machine.advance(DecodeState::PixelData);
        let mut planes = vp8::decode_planes(&frame, &header, self.options.use_threads)
            .map_err(|r| machine.fail(r))?;
        self.check_stop()?;
        if !self.options.bypass_filtering {
            vp8::apply_loop_filter(&mut planes, w, h, &header);
        }
        if self.options.dithering_strength > 0 {
            filter::dither_chroma(&mut planes.u, self.options.dithering_strength, 1);
            filter::dither_chroma(&mut planes.v, self.options.dithering_strength, 2);
        }
        let alpha_plane = match alpha_chunk {
            Some(chunk) => {
                let mut decoded = alpha::decode(chunk, w, h).map_err(|r| machine.fail(r))?;
                if decoded.level_reduced {
                    filter::smooth_alpha(
                        &mut decoded.plane,
                        w,
                        h,
                        self.options.alpha_dithering_strength,
                    );
                }
                Some(decoded.plane)
            }
            None => None,
        };

        let (uv_w, uv_h) = (w.div_ceil(2), h.div_ceil(2));
        let fancy = self.options.fancy_upsampling;
        let rows = codecs::map_indexed(h, self.options.use_threads, |y| {
            (0..w)
                .map(|x| {
                    let u = convert::sample_chroma(&planes.u, uv_w, uv_h, x, y, fancy);
                    let v = convert::sample_chroma(&planes.v, uv_w, uv_h, x, y, fancy);
                    let [r, g, b] = convert::yuv_to_rgb(planes.y[y * w + x], u, v);
                    let a = alpha_plane.as_ref().map_or(0xff, |a| a[y * w + x]);
                    [r, g, b, a]
                })
                .collect::<Vec<_>>()
        });
        Ok(Raster {
            width: w,
            height: h,
            pixels: rows.concat(),
        })
    }

    fn decode_lossless(
        &self,
        machine: &mut Machine,
        payload: &[u8],
        features: &BitstreamFeatures,
    ) -> Result<Raster, CodecError> {
        let (w, h) = (features.width as usize, features.height as usize);
        machine.advance(DecodeState::LosslessHeaderParse);
        let header = vp8l::parse_header(payload).map_err(|r| machine.fail(r))?;

        machine.advance(DecodeState::LosslessData);
        let argb = vp8l::decode_pixels(payload, &header, w, h).map_err(|r| machine.fail(r))?;
        Ok(Raster {
            width: w,
            height: h,
            pixels: argb.into_iter().map(unpack_argb).collect(),
        })
    }
}

/// Decode with default options into the source-dependent default layout.
pub fn decode(data: &[u8]) -> Result<DecodeOutput, CodecError> {
    DecodeRequest::new(data).decode()
}

/// Decode with explicit options.
pub fn decode_with_options(data: &[u8], options: &DecodeOptions) -> Result<DecodeOutput, CodecError> {
    DecodeRequest::new(data)
        .with_options(options.clone())
        .decode()
}

/// Low-cost thumbnail: no loop filter, nearest chroma, BGR output of exactly
/// `width x height`.
pub fn thumbnail_fast(data: &[u8], width: u32, height: u32) -> Result<DecodeOutput, CodecError> {
    let options = DecodeOptions::new()
        .bypass_filtering(true)
        .fancy_upsampling(false)
        .use_threads(cfg!(feature = "threads"))
        .scale(width, height);
    DecodeRequest::new(data)
        .with_options(options)
        .with_output_layout(PixelLayout::Bgr8)
        .decode()
}

/// Filtered thumbnail of exactly `width x height`, BGRA when the source has
/// alpha and BGR otherwise.
pub fn thumbnail_quality(data: &[u8], width: u32, height: u32) -> Result<DecodeOutput, CodecError> {
    let options = DecodeOptions::new()
        .bypass_filtering(false)
        .fancy_upsampling(true)
        .use_threads(cfg!(feature = "threads"))
        .scale(width, height);
    DecodeRequest::new(data).with_options(options).decode()
}
