//! Image encoding.
//!
//! An [`EncodeRequest`] ties an [`EncoderConfig`] to one source image. The
//! request validates the source geometry and the configuration, checks the
//! enabled [`Capabilities`], imports the pixels into a [`Picture`], runs the
//! lossy or lossless engine (several times when a size or PSNR target is
//! set) and pushes the finished container through an [`EncodeSink`].

use alloc::vec::Vec;

use imgref::ImgRef;
use rgb::{ComponentBytes, Rgb, Rgba};

use crate::codecs::{alpha, near_lossless, vp8, vp8l};
use crate::config::{EncoderConfig, ValidConfig};
use crate::decode::DecodeState;
use crate::distortion::{self, Metric};
use crate::picture::{Picture, SourceImage, YuvaPlanes};
use crate::pipeline::quality::{QualitySearch, Target};
use crate::pixel::PixelLayout;
use crate::probe::{VP8X_ALPHA, VP8X_EXIF, VP8X_ICC, VP8X_XMP};
use crate::registry::{Capabilities, Feature};
use crate::riff::{self, ChunkId};
use crate::{CodecError, ImageMetadata, Predictor, SinkError, Stop};

/// Destination for encoded bytes.
///
/// `write` receives consecutive pieces of the file in order. Returning
/// `false` aborts the encode with [`CodecError::WriteSinkFailed`].
pub trait EncodeSink {
    fn write(&mut self, data: &[u8]) -> bool;
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, data: &[u8]) -> bool {
        if self.try_reserve(data.len()).is_err() {
            return false;
        }
        self.extend_from_slice(data);
        true
    }
}

/// Adapts a closure into an [`EncodeSink`].
///
/// ```
/// use zenwebp_lite::{EncodeRequest, EncoderConfig, FnSink, PixelLayout};
///
/// let mut total = 0usize;
/// let mut sink = FnSink(|piece: &[u8]| {
///     total += piece.len();
///     true
/// });
/// EncodeRequest::new(EncoderConfig::new().lossless(true))
///     .encode_to_sink(&[0, 0, 0, 255], PixelLayout::Rgba8, 1, 1, &mut sink)?;
/// assert!(total > 12);
/// # Ok::<(), zenwebp_lite::CodecError>(())
/// ```
pub struct FnSink<F>(pub F);

impl<F: FnMut(&[u8]) -> bool> EncodeSink for FnSink<F> {
    fn write(&mut self, data: &[u8]) -> bool {
        (self.0)(data)
    }
}

/// Statistics gathered during one encode.
///
/// Only computed when requested with [`EncodeRequest::with_stats`].
#[derive(Debug, Clone, Default, PartialEq)]
#[non_exhaustive]
pub struct EncodeStats {
    /// Total bytes pushed to the sink.
    pub coded_size: usize,
    /// PSNR of the reconstruction for Y, U, V, alpha and all planes.
    pub psnr: [f32; 5],
    /// Macroblocks carrying residual data.
    pub intra16_blocks: usize,
    /// Macroblocks whose residuals quantized to zero.
    pub skipped_blocks: usize,
    /// Frame tag, start code and dimensions.
    pub header_bytes: usize,
    /// Compressed partition 0 (segment header and map).
    pub partition0_bytes: usize,
    /// Residual token bytes per segment, before compression.
    pub segment_size: [usize; 4],
    pub segment_quant: [u8; 4],
    pub segment_level: [u8; 4],
    /// Size of the `ALPH` payload, 0 when absent.
    pub alpha_data_size: usize,
    /// Spatial predictor picked by the lossless engine.
    pub lossless_predictor: Option<Predictor>,
    /// Encodes run, more than one with a size or PSNR target.
    pub passes: u32,
}

/// Encoded file plus optional statistics.
#[derive(Clone, Debug)]
pub struct EncodeOutput {
    /// Complete WebP file.
    pub data: Vec<u8>,
    /// Present when requested with [`EncodeRequest::with_stats`].
    pub stats: Option<EncodeStats>,
    /// Decoded result, present when [`EncoderConfig::show_compressed`] is set.
    pub compressed: Option<Picture>,
}

/// Image encode request builder.
///
/// # Example
///
/// ```
/// use zenwebp_lite::{EncodeRequest, EncoderConfig, PixelLayout};
///
/// let pixels = vec![200u8; 16 * 16 * 3];
/// let output = EncodeRequest::new(EncoderConfig::new().quality(85.0))
///     .with_stats(true)
///     .encode(&pixels, PixelLayout::Rgb8, 16, 16)?;
/// assert_eq!(output.stats.map(|s| s.coded_size), Some(output.data.len()));
/// # Ok::<(), zenwebp_lite::CodecError>(())
/// ```
pub struct EncodeRequest<'a> {
    config: EncoderConfig,
    stride: Option<usize>,
    metadata: ImageMetadata<'a>,
    capabilities: Option<&'a Capabilities>,
    stop: Option<&'a dyn Stop>,
    collect_stats: bool,
}

impl<'a> EncodeRequest<'a> {
    /// Encode with `config`. Validation happens when the encode starts.
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            stride: None,
            metadata: ImageMetadata::none(),
            capabilities: None,
            stop: None,
            collect_stats: false,
        }
    }

    /// Distance between source rows in bytes. Defaults to tightly packed.
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = Some(stride);
        self
    }

    /// Embed ICC, EXIF or XMP chunks.
    pub fn with_metadata(mut self, metadata: ImageMetadata<'a>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Restrict the encode families to `capabilities`. Defaults to
    /// [`Capabilities::detect`].
    pub fn with_capabilities(mut self, capabilities: &'a Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Set a cooperative cancellation token, checked between stages and passes.
    pub fn with_stop(mut self, stop: &'a dyn Stop) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Collect [`EncodeStats`]. Off by default; PSNR needs a decode of the
    /// result.
    pub fn with_stats(mut self, collect: bool) -> Self {
        self.collect_stats = collect;
        self
    }

    /// Encode interleaved pixels into a new buffer.
    pub fn encode(
        self,
        pixels: &[u8],
        layout: PixelLayout,
        width: u32,
        height: u32,
    ) -> Result<EncodeOutput, CodecError> {
        let mut data = Vec::new();
        let (stats, compressed) = self.run(pixels, layout, width, height, &mut data)?;
        Ok(EncodeOutput {
            data,
            stats,
            compressed,
        })
    }

    /// Encode RGB8 pixels from an image view.
    pub fn encode_rgb8(self, img: ImgRef<'_, Rgb<u8>>) -> Result<EncodeOutput, CodecError> {
        self.with_stride(img.stride() * 3).encode(
            img.buf().as_bytes(),
            PixelLayout::Rgb8,
            img.width() as u32,
            img.height() as u32,
        )
    }

    /// Encode RGBA8 pixels from an image view.
    pub fn encode_rgba8(self, img: ImgRef<'_, Rgba<u8>>) -> Result<EncodeOutput, CodecError> {
        self.with_stride(img.stride() * 4).encode(
            img.buf().as_bytes(),
            PixelLayout::Rgba8,
            img.width() as u32,
            img.height() as u32,
        )
    }

    /// Encode, pushing the file through `sink` piece by piece.
    ///
    /// Nothing reaches the sink until compression has finished, so an error
    /// before that point leaves the sink untouched. The decoded picture
    /// requested by [`EncoderConfig::show_compressed`] is only returned by
    /// [`encode`](Self::encode).
    pub fn encode_to_sink(
        self,
        pixels: &[u8],
        layout: PixelLayout,
        width: u32,
        height: u32,
        sink: &mut dyn EncodeSink,
    ) -> Result<Option<EncodeStats>, CodecError> {
        Ok(self.run(pixels, layout, width, height, sink)?.0)
    }

    fn run(
        self,
        pixels: &[u8],
        layout: PixelLayout,
        width: u32,
        height: u32,
        sink: &mut dyn EncodeSink,
    ) -> Result<(Option<EncodeStats>, Option<Picture>), CodecError> {
        let source = SourceImage::new(pixels, layout, width, height, self.stride)?;
        let config = self.config.validate()?;
        let detected;
        let caps = match self.capabilities {
            Some(caps) => caps,
            None => {
                detected = Capabilities::detect();
                &detected
            }
        };
        let transparent = source.has_transparency();
        if config.lossless {
            caps.require(Feature::Lossless)?;
            if config.near_lossless < 100 {
                caps.require(Feature::NearLossless)?;
            }
        } else {
            caps.require(Feature::Lossy)?;
            if transparent {
                caps.require(Feature::Alpha)?;
            }
        }
        let threads = thread_choice(&config, caps);
        self.check_stop()?;

        log::debug!(
            "encode {width}x{height} {layout:?}: {} q={} method={} threads={threads}",
            if config.lossless { "lossless" } else { "lossy" },
            config.quality,
            config.method
        );
        let geometry = (width as usize, height as usize);
        let (bitstream, mut stats) = if config.lossless {
            self.encode_lossless(&config, &source, geometry, threads)?
        } else {
            self.encode_lossy(&config, &source, geometry, transparent, threads)?
        };
        self.check_stop()?;

        let vp8x = vp8x_payload(width, height, bitstream.has_alpha, &self.metadata);
        let chunks = bitstream.chunks(&vp8x, &self.metadata);
        let written = emit(sink, &chunks)?;

        if let Some(stats) = stats.as_mut() {
            stats.coded_size = written;
            log::debug!(
                "encode stats: {} bytes, {} pass(es), psnr {:?}, blocks {}/{} skipped, alpha {} bytes",
                stats.coded_size,
                stats.passes,
                stats.psnr,
                stats.skipped_blocks,
                stats.intra16_blocks + stats.skipped_blocks,
                stats.alpha_data_size
            );
        }
        Ok((stats, bitstream.compressed))
    }

    fn check_stop(&self) -> Result<(), CodecError> {
        if let Some(stop) = self.stop {
            stop.check()?;
        }
        Ok(())
    }

    fn encode_lossy(
        &self,
        config: &ValidConfig,
        source: &SourceImage<'_>,
        (w, h): (usize, usize),
        transparent: bool,
        threads: bool,
    ) -> Result<(Bitstream, Option<EncodeStats>), CodecError> {
        let picture = Picture::import(source, false, config.sharp_yuv());
        let planes = picture.yuva_planes();
        let alpha = match (&planes.a, transparent) {
            (Some(plane), true) => Some(alpha::encode(plane, w, h, &alpha_params(config))),
            _ => None,
        };

        let target = search_target(config);
        let needs_psnr = self.collect_stats || matches!(target, Some(Target::Psnr(_)));
        let pass = |quality: f32| -> Result<LossyPass, CodecError> {
            let params = lossy_params(&config.with_quality(quality), threads);
            let output = vp8::encode(&planes, w, h, &params)?;
            let psnr = if needs_psnr {
                let recon = lossy_reconstruction(&output.payload, alpha.as_deref(), w, h, threads)?;
                Some(distortion::measure(&picture, &recon, Metric::Psnr)?)
            } else {
                None
            };
            Ok(LossyPass { output, psnr })
        };

        let mut search = target.map(|t| {
            (t, QualitySearch::new(t, config.quality, config.qmin, config.qmax))
        });
        let quality = search.as_ref().map_or(config.quality, |(_, s)| s.quality());
        let mut best = pass(quality)?;
        let mut passes = 1u32;
        if let Some((target, search)) = search.as_mut() {
            let alpha_len = alpha.as_ref().map_or(0, Vec::len);
            let measure = |p: &LossyPass| match target {
                Target::Size(_) => {
                    container_len(p.output.payload.len(), alpha_len, &self.metadata) as f64
                }
                Target::Psnr(_) => p.psnr.map_or(0.0, |psnr| f64::from(psnr[4])),
            };
            search.record(measure(&best));
            while passes < u32::from(config.pass) && search.advance() {
                self.check_stop()?;
                let trial = pass(search.quality())?;
                passes += 1;
                if search.record(measure(&trial)) {
                    best = trial;
                }
            }
            log::debug!("quality search ran {passes} pass(es) towards {target:?}");
        }

        let stats = self.collect_stats.then(|| {
            let s = &best.output.stats;
            EncodeStats {
                psnr: best.psnr.unwrap_or_default(),
                intra16_blocks: s.macroblocks - s.skipped,
                skipped_blocks: s.skipped,
                header_bytes: s.header_bytes,
                partition0_bytes: s.partition0_bytes,
                segment_size: s.segment_bytes,
                segment_quant: s.segment_quant,
                segment_level: s.segment_level,
                alpha_data_size: alpha.as_ref().map_or(0, Vec::len),
                passes,
                ..EncodeStats::default()
            }
        });
        let compressed = if config.show_compressed {
            Some(lossy_reconstruction(
                &best.output.payload,
                alpha.as_deref(),
                w,
                h,
                threads,
            )?)
        } else {
            None
        };
        let has_alpha = alpha.is_some();
        Ok((
            Bitstream {
                id: ChunkId::VP8,
                image: best.output.payload,
                alpha,
                has_alpha,
                compressed,
            },
            stats,
        ))
    }

    fn encode_lossless(
        &self,
        config: &ValidConfig,
        source: &SourceImage<'_>,
        (w, h): (usize, usize),
        threads: bool,
    ) -> Result<(Bitstream, Option<EncodeStats>), CodecError> {
        if search_target(config).is_some() {
            log::debug!("size and PSNR targets apply to lossy encoding only; ignored");
        }
        let picture = Picture::import(source, true, false);
        let mut argb = picture.argb_pixels().into_owned();
        if !config.exact {
            for px in argb.iter_mut().filter(|px| **px >> 24 == 0) {
                *px = 0;
            }
        }
        if config.near_lossless < 100 {
            near_lossless::apply(&mut argb, w, h, config.near_lossless);
        }
        let has_alpha = argb.iter().any(|&px| px >> 24 != 0xff);
        let params = vp8l::LosslessParams {
            method: config.method,
            quality: config.quality,
            hint: config.image_hint,
            use_delta_palette: config.use_delta_palette,
            threads,
        };
        let output = vp8l::encode(&argb, w, h, &params);
        drop(argb);

        let compressed = if self.collect_stats || config.show_compressed {
            Some(lossless_reconstruction(&output.payload, w, h)?)
        } else {
            None
        };
        let stats = match (&compressed, self.collect_stats) {
            (Some(recon), true) => Some(EncodeStats {
                psnr: distortion::measure(&picture, recon, Metric::Psnr)?,
                header_bytes: 6,
                lossless_predictor: Some(output.predictor),
                passes: 1,
                ..EncodeStats::default()
            }),
            _ => None,
        };
        Ok((
            Bitstream {
                id: ChunkId::VP8L,
                image: output.payload,
                alpha: None,
                has_alpha,
                compressed: compressed.filter(|_| config.show_compressed),
            },
            stats,
        ))
    }
}

struct LossyPass {
    output: vp8::LossyOutput,
    psnr: Option<[f32; 5]>,
}

/// Image chunks of one finished encode.
struct Bitstream {
    id: ChunkId,
    image: Vec<u8>,
    alpha: Option<Vec<u8>>,
    has_alpha: bool,
    compressed: Option<Picture>,
}

impl Bitstream {
    /// Chunks in file order. The extended layout is used when an `ALPH`
    /// chunk or metadata is present.
    fn chunks<'s>(
        &'s self,
        vp8x: &'s [u8],
        metadata: &ImageMetadata<'s>,
    ) -> Vec<(ChunkId, &'s [u8])> {
        let mut chunks = Vec::with_capacity(6);
        if self.alpha.is_some() || !metadata.is_empty() {
            chunks.push((ChunkId::VP8X, vp8x));
        }
        if let Some(icc) = metadata.icc_profile {
            chunks.push((ChunkId::ICCP, icc));
        }
        if let Some(alpha) = &self.alpha {
            chunks.push((ChunkId::ALPH, alpha.as_slice()));
        }
        chunks.push((self.id, self.image.as_slice()));
        if let Some(exif) = metadata.exif {
            chunks.push((ChunkId::EXIF, exif));
        }
        if let Some(xmp) = metadata.xmp {
            chunks.push((ChunkId::XMP, xmp));
        }
        chunks
    }
}

fn vp8x_payload(width: u32, height: u32, alpha: bool, metadata: &ImageMetadata<'_>) -> Vec<u8> {
    let mut flags = 0u8;
    if metadata.icc_profile.is_some() {
        flags |= VP8X_ICC;
    }
    if alpha {
        flags |= VP8X_ALPHA;
    }
    if metadata.exif.is_some() {
        flags |= VP8X_EXIF;
    }
    if metadata.xmp.is_some() {
        flags |= VP8X_XMP;
    }
    let mut out = Vec::with_capacity(10);
    out.push(flags);
    out.extend_from_slice(&[0; 3]);
    riff::push_u24_le(&mut out, width - 1);
    riff::push_u24_le(&mut out, height - 1);
    out
}

/// File size of a lossy encode with the given payload sizes.
fn container_len(image: usize, alpha: usize, metadata: &ImageMetadata<'_>) -> usize {
    let chunk = |len: usize| 8 + riff::padded(len);
    let mut len = 12 + chunk(image);
    if alpha > 0 || !metadata.is_empty() {
        len += chunk(10);
    }
    if alpha > 0 {
        len += chunk(alpha);
    }
    for extra in [metadata.icc_profile, metadata.exif, metadata.xmp]
        .into_iter()
        .flatten()
    {
        len += chunk(extra.len());
    }
    len
}

/// Offset-tracking wrapper that turns a refused write into [`SinkError`].
struct Emitter<'s> {
    sink: &'s mut dyn EncodeSink,
    offset: u64,
}

impl Emitter<'_> {
    fn push(&mut self, data: &[u8]) -> Result<(), CodecError> {
        if data.is_empty() {
            return Ok(());
        }
        if !self.sink.write(data) {
            log::debug!("sink refused {} bytes at offset {}", data.len(), self.offset);
            return Err(SinkError {
                offset: self.offset,
                len: data.len(),
            }
            .into());
        }
        self.offset += data.len() as u64;
        Ok(())
    }

    fn chunk(&mut self, id: ChunkId, payload: &[u8]) -> Result<(), CodecError> {
        self.push(&riff::chunk_header(id, payload.len()))?;
        self.push(payload)?;
        if payload.len() & 1 == 1 {
            self.push(&[0])?;
        }
        Ok(())
    }
}

/// Write the RIFF header and `chunks`; returns the number of bytes written.
fn emit(sink: &mut dyn EncodeSink, chunks: &[(ChunkId, &[u8])]) -> Result<usize, CodecError> {
    let body: usize = chunks
        .iter()
        .map(|(_, payload)| 8 + riff::padded(payload.len()))
        .sum();
    if body > (u32::MAX - 4) as usize {
        return Err(CodecError::LimitExceeded(
            "encoded file exceeds the RIFF size field",
        ));
    }
    let mut out = Emitter { sink, offset: 0 };
    out.push(&riff::riff_header(body))?;
    for &(id, payload) in chunks {
        out.chunk(id, payload)?;
    }
    Ok(12 + body)
}

fn search_target(config: &ValidConfig) -> Option<Target> {
    if config.target_psnr > 0.0 {
        Some(Target::Psnr(config.target_psnr))
    } else if config.target_size > 0 {
        Some(Target::Size(config.target_size))
    } else {
        None
    }
}

fn thread_choice(config: &ValidConfig, caps: &Capabilities) -> bool {
    if !config.uses_threads() {
        return false;
    }
    if caps.supports(Feature::Threads) {
        return true;
    }
    log::warn!(
        "thread_level {} requested but worker threads are unavailable; encoding on one thread",
        config.thread_level
    );
    false
}

fn lossy_params(config: &ValidConfig, threads: bool) -> vp8::LossyParams {
    vp8::LossyParams {
        quality: config.quality,
        method: config.method,
        segments: config.segments,
        sns_strength: config.sns_strength,
        filter_strength: config.filter_strength,
        filter_sharpness: config.filter_sharpness,
        filter_type: config.filter_type,
        autofilter: config.autofilter,
        partitions: config.partitions,
        partition_limit: config.partition_limit,
        emulate_jpeg_size: config.emulate_jpeg_size,
        low_memory: config.low_memory,
        preprocessing: config.preprocessing,
        threads,
    }
}

fn alpha_params(config: &ValidConfig) -> alpha::AlphaParams {
    alpha::AlphaParams {
        compression: config.alpha_compression,
        filtering: config.alpha_filtering,
        quality: config.alpha_quality,
        zlib_level: (3 + config.method).min(9),
    }
}

/// Decode our own `VP8 ` payload back into YUV planes for measurement.
fn lossy_reconstruction(
    payload: &[u8],
    alpha_chunk: Option<&[u8]>,
    w: usize,
    h: usize,
    threads: bool,
) -> Result<Picture, CodecError> {
    let fail = |reason| CodecError::DecodeFailed {
        state: DecodeState::PixelData,
        reason,
    };
    let frame = vp8::parse_frame_header(payload).map_err(fail)?;
    let header = vp8::parse_partition_zero(&frame).map_err(fail)?;
    let mut planes: YuvaPlanes = vp8::decode_planes(&frame, &header, threads).map_err(fail)?;
    vp8::apply_loop_filter(&mut planes, w, h, &header);
    if let Some(chunk) = alpha_chunk {
        planes.a = Some(alpha::decode(chunk, w, h).map_err(fail)?.plane);
    }
    Ok(Picture::from_yuva(w as u32, h as u32, planes))
}

fn lossless_reconstruction(payload: &[u8], w: usize, h: usize) -> Result<Picture, CodecError> {
    let fail = |reason| CodecError::DecodeFailed {
        state: DecodeState::LosslessData,
        reason,
    };
    let header = vp8l::parse_header(payload).map_err(fail)?;
    let argb = vp8l::decode_pixels(payload, &header, w, h).map_err(fail)?;
    Ok(Picture::from_argb(w as u32, h as u32, argb))
}

/// Lossy encode at `quality` (0..=100) with the default preset.
pub fn encode_lossy(
    pixels: &[u8],
    layout: PixelLayout,
    width: u32,
    height: u32,
    quality: f32,
) -> Result<Vec<u8>, CodecError> {
    let config = EncoderConfig::new().quality(quality);
    Ok(EncodeRequest::new(config)
        .encode(pixels, layout, width, height)?
        .data)
}

/// Lossy encode trading time for size: `speed` 0 is fastest, 6 and above
/// search hardest.
pub fn encode_lossy_with_speed(
    pixels: &[u8],
    layout: PixelLayout,
    width: u32,
    height: u32,
    quality: f32,
    speed: u8,
) -> Result<Vec<u8>, CodecError> {
    let config = EncoderConfig::new()
        .quality(quality)
        .method(speed)
        .autofilter(true)
        .pass(speed.saturating_add(1).min(10))
        .segments(4)
        .partitions(3)
        .thread_level(1)
        .alpha_quality(libm::roundf(quality.clamp(0.0, 100.0)) as u8)
        .alpha_filtering(2)
        .sharp_yuv(true)
        .preprocessing(4);
    Ok(EncodeRequest::new(config)
        .encode(pixels, layout, width, height)?
        .data)
}

/// Lossless encode at the default effort, keeping RGB under transparent pixels.
pub fn encode_lossless(
    pixels: &[u8],
    layout: PixelLayout,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CodecError> {
    let config = EncoderConfig::new()
        .lossless(true)
        .quality(70.0)
        .exact(true);
    Ok(EncodeRequest::new(config)
        .encode(pixels, layout, width, height)?
        .data)
}

/// Lossless encode at preset level `speed` (0 fastest, 9 smallest).
pub fn encode_lossless_with_speed(
    pixels: &[u8],
    layout: PixelLayout,
    width: u32,
    height: u32,
    speed: u8,
) -> Result<Vec<u8>, CodecError> {
    let config = EncoderConfig::lossless_preset(speed)?
        .pass(speed + 1)
        .thread_level(1)
        .exact(false);
    Ok(EncodeRequest::new(config)
        .encode(pixels, layout, width, height)?
        .data)
}

/// Near-lossless encode: `quality` 100 is lossless, lower values quantize
/// smooth areas harder. `speed` is the lossless preset level.
pub fn encode_near_lossless(
    pixels: &[u8],
    layout: PixelLayout,
    width: u32,
    height: u32,
    quality: u8,
    speed: u8,
) -> Result<Vec<u8>, CodecError> {
    Capabilities::detect().require(Feature::NearLossless)?;
    let config = EncoderConfig::lossless_preset(speed)?.near_lossless(quality);
    Ok(EncodeRequest::new(config)
        .encode(pixels, layout, width, height)?
        .data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;
    use alloc::vec;

    fn gradient(w: usize, h: usize) -> Vec<u8> {
        let mut px = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            for x in 0..w {
                px.extend_from_slice(&[(x * 7) as u8, (y * 5) as u8, ((x + y) * 3) as u8, 255]);
            }
        }
        px
    }

    #[test]
    fn simple_layout_without_metadata() {
        let out = encode_lossless(&gradient(4, 4), PixelLayout::Rgba8, 4, 4).unwrap();
        assert_eq!(&out[..4], b"RIFF");
        assert_eq!(&out[8..16], b"WEBPVP8L");
        let riff_size = u32::from_le_bytes([out[4], out[5], out[6], out[7]]) as usize;
        assert_eq!(riff_size + 8, out.len());
    }

    #[test]
    fn metadata_switches_to_extended_layout() {
        let icc = [1u8, 2, 3];
        let xmp = [b'x'; 4];
        let out = EncodeRequest::new(EncoderConfig::new())
            .with_metadata(ImageMetadata {
                icc_profile: Some(&icc),
                exif: None,
                xmp: Some(&xmp),
            })
            .encode(&gradient(8, 8), PixelLayout::Rgba8, 8, 8)
            .unwrap();
        assert_eq!(&out.data[12..16], b"VP8X");
        assert_eq!(out.data[20], VP8X_ICC | VP8X_XMP);
        let features = crate::get_info(&out.data).unwrap();
        assert!(features.has_icc && features.has_xmp && !features.has_exif);
        assert_eq!((features.width, features.height), (8, 8));
        assert_eq!(out.data.len() % 2, 0);
    }

    #[test]
    fn lossy_alpha_goes_to_alph_chunk() {
        let mut px = gradient(6, 5);
        px[3] = 0;
        let out = encode_lossy(&px, PixelLayout::Rgba8, 6, 5, 80.0).unwrap();
        assert_eq!(&out[12..16], b"VP8X");
        assert_eq!(out[20] & VP8X_ALPHA, VP8X_ALPHA);
        let decoded = decode::decode(&out).unwrap();
        assert_eq!(decoded.pixels.layout(), PixelLayout::Bgra8);
        assert_eq!(decoded.pixels.as_bytes()[3], 0);
    }

    #[test]
    fn opaque_rgba_stays_simple() {
        let out = encode_lossy(&gradient(6, 5), PixelLayout::Rgba8, 6, 5, 80.0).unwrap();
        assert_eq!(&out[12..16], b"VP8 ");
    }

    #[test]
    fn container_len_matches_emitted_size() {
        let px = gradient(9, 7);
        let out = EncodeRequest::new(EncoderConfig::new())
            .encode(&px, PixelLayout::Rgba8, 9, 7)
            .unwrap();
        let payload_len = u32::from_le_bytes([out.data[16], out.data[17], out.data[18], out.data[19]]);
        let metadata = ImageMetadata::none();
        assert_eq!(container_len(payload_len as usize, 0, &metadata), out.data.len());
    }

    #[test]
    fn refused_write_reports_offset() {
        let mut calls = 0;
        let mut sink = FnSink(|_: &[u8]| {
            calls += 1;
            calls < 3
        });
        let err = EncodeRequest::new(EncoderConfig::new().lossless(true))
            .encode_to_sink(&gradient(2, 2), PixelLayout::Rgba8, 2, 2, &mut sink)
            .unwrap_err();
        match err {
            CodecError::WriteSinkFailed(SinkError { offset, .. }) => assert_eq!(offset, 20),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_config_rejected_before_import() {
        let err = EncodeRequest::new(EncoderConfig::new().segments(5))
            .encode(&gradient(2, 2), PixelLayout::Rgba8, 2, 2)
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidConfiguration(_)));
    }

    #[test]
    fn disabled_family_is_unsupported() {
        let caps = Capabilities::detect().without(Feature::Lossless);
        let err = EncodeRequest::new(EncoderConfig::new().lossless(true))
            .with_capabilities(&caps)
            .encode(&gradient(2, 2), PixelLayout::Rgba8, 2, 2)
            .unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFeature(_)));

        let caps = Capabilities::detect().without(Feature::Alpha);
        let mut px = gradient(2, 2);
        px[7] = 10;
        let err = EncodeRequest::new(EncoderConfig::new())
            .with_capabilities(&caps)
            .encode(&px, PixelLayout::Rgba8, 2, 2)
            .unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFeature(_)));
    }

    #[test]
    fn stats_only_when_requested() {
        let px = gradient(16, 16);
        let plain = EncodeRequest::new(EncoderConfig::new())
            .encode(&px, PixelLayout::Rgba8, 16, 16)
            .unwrap();
        assert!(plain.stats.is_none());

        let out = EncodeRequest::new(EncoderConfig::new())
            .with_stats(true)
            .encode(&px, PixelLayout::Rgba8, 16, 16)
            .unwrap();
        let stats = out.stats.unwrap();
        assert_eq!(stats.coded_size, out.data.len());
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.intra16_blocks + stats.skipped_blocks, 1);
        assert!(stats.psnr[0] > 20.0);
        assert_eq!(out.data, plain.data);
    }

    #[test]
    fn lossless_stats_are_exact() {
        let out = EncodeRequest::new(EncoderConfig::new().lossless(true).exact(true))
            .with_stats(true)
            .encode(&gradient(5, 3), PixelLayout::Rgba8, 5, 3)
            .unwrap();
        let stats = out.stats.unwrap();
        assert_eq!(stats.psnr, [99.0; 5]);
        assert!(stats.lossless_predictor.is_some());
    }

    #[test]
    fn size_target_runs_several_passes() {
        let px = gradient(32, 32);
        let out = EncodeRequest::new(EncoderConfig::new().target_size(400).pass(6))
            .with_stats(true)
            .encode(&px, PixelLayout::Rgba8, 32, 32)
            .unwrap();
        let stats = out.stats.unwrap();
        assert!(stats.passes > 1 && stats.passes <= 6);
    }

    #[test]
    fn inexact_lossless_clears_hidden_rgb() {
        let px = vec![9, 8, 7, 0, 1, 2, 3, 255];
        let out = EncodeRequest::new(EncoderConfig::new().lossless(true).exact(false))
            .encode(&px, PixelLayout::Rgba8, 2, 1)
            .unwrap();
        let decoded = decode::decode(&out.data).unwrap();
        assert_eq!(decoded.pixels.as_bytes(), &[0, 0, 0, 0, 3, 2, 1, 255]);
    }

    #[test]
    fn image_views_honor_stride() {
        let pixels = vec![Rgb { r: 10u8, g: 20, b: 30 }; 6];
        let img = ImgRef::new_stride(&pixels, 2, 2, 3);
        let out = EncodeRequest::new(EncoderConfig::new().lossless(true))
            .encode_rgb8(img)
            .unwrap();
        let decoded = decode::decode(&out.data).unwrap();
        assert_eq!(decoded.pixels.as_bytes(), &[30, 20, 10].repeat(4)[..]);
    }

    #[test]
    fn speed_helpers_validate() {
        let px = gradient(8, 8);
        assert!(encode_lossy_with_speed(&px, PixelLayout::Rgba8, 8, 8, 60.0, 9).is_ok());
        assert!(encode_lossless_with_speed(&px, PixelLayout::Rgba8, 8, 8, 9).is_ok());
        assert!(matches!(
            encode_lossless_with_speed(&px, PixelLayout::Rgba8, 8, 8, 10),
            Err(CodecError::InvalidConfiguration(_))
        ));
        let out = encode_near_lossless(&px, PixelLayout::Rgba8, 8, 8, 60, 5).unwrap();
        assert_eq!(crate::get_info(&out).unwrap().width, 8);
    }
}
