//! `VP8 ` payload engine.
//!
//! Layout: the standard 10-byte key frame header (frame tag, start code,
//! 14-bit dimensions), partition 0 with segment and loop filter
//! parameters, a table of 24-bit token partition sizes, then the token
//! partitions. Pixels are coded per macroblock row with closed-loop DPCM
//! and a per-segment quantizer; rows are dealt round-robin to
//! `1 << partitions` zlib streams so they can be coded in parallel.

use alloc::borrow::Cow;
use alloc::vec;
use alloc::vec::Vec;

use crate::codecs::analysis::{self, MB_SIZE, SegmentMap};
use crate::codecs::filter::LoopFilter;
use crate::codecs::{self, med_predict};
use crate::picture::YuvaPlanes;
use crate::probe::VP8_START_CODE;
use crate::riff::push_u24_le;
use crate::CodecError;

/// The frame tag stores the first partition size in 19 bits.
const MAX_FIRST_PARTITION: usize = 0x7ffff;
const MAX_PARTITION: usize = 0xff_ffff;
const MAX_QUANT: u8 = 127;
const MAX_LEVEL: u8 = 63;
const FLAG_SEGMENT_MAP: u8 = 0x01;
/// Exponent of the quality curve applied with `emulate_jpeg_size`.
const JPEG_EMULATION_EXPONENT: f32 = 0.65;
const TOKEN_ESCAPE: u8 = 0xff;

#[inline]
fn luma_step(q: u8) -> i32 {
    1 + i32::from(q) * i32::from(q) / 256
}

#[inline]
fn chroma_step(q: u8) -> i32 {
    luma_step((q + 8).min(MAX_QUANT))
}

/// Round-half-away-from-zero division by `step`.
#[inline]
fn quantize(residual: i32, step: i32) -> i32 {
    if residual >= 0 {
        (residual + step / 2) / step
    } else {
        -((step / 2 - residual) / step)
    }
}

#[inline]
fn push_token(out: &mut Vec<u8>, q: i32) {
    let zz = (if q >= 0 { 2 * q } else { -2 * q - 1 }) as u32;
    if zz < u32::from(TOKEN_ESCAPE) {
        out.push(zz as u8);
    } else {
        out.push(TOKEN_ESCAPE);
        out.push((zz - u32::from(TOKEN_ESCAPE)) as u8);
    }
}

struct TokenReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl TokenReader<'_> {
    #[inline]
    fn byte(&mut self) -> Result<u32, &'static str> {
        let b = *self.data.get(self.pos).ok_or("token partition truncated")?;
        self.pos += 1;
        Ok(u32::from(b))
    }

    #[inline]
    fn next(&mut self) -> Result<i32, &'static str> {
        let mut zz = self.byte()?;
        if zz == u32::from(TOKEN_ESCAPE) {
            zz += self.byte()?;
        }
        let zz = zz as i32;
        Ok(if zz & 1 == 0 { zz / 2 } else { -(zz + 1) / 2 })
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }
}

/// Prediction from already reconstructed samples of the current band.
#[inline]
fn predict(recon: &[u8], w: usize, x: usize, y: usize) -> u8 {
    match (x, y) {
        (0, 0) => 128,
        (_, 0) => recon[x - 1],
        (0, _) => recon[(y - 1) * w],
        _ => med_predict(
            recon[y * w + x - 1],
            recon[(y - 1) * w + x],
            recon[(y - 1) * w + x - 1],
        ),
    }
}

#[derive(Debug, Clone, Copy)]
struct PlaneGeometry {
    width: usize,
    height: usize,
    block: usize,
}

impl PlaneGeometry {
    /// Row range covered by macroblock row `r`.
    #[inline]
    fn band(&self, r: usize) -> (usize, usize) {
        let start = r * self.block;
        (start, (start + self.block).min(self.height))
    }

    fn band_samples(&self, r: usize) -> usize {
        let (start, end) = self.band(r);
        self.width * (end - start)
    }
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    mb_w: usize,
    mb_h: usize,
    planes: [PlaneGeometry; 3],
}

impl Geometry {
    fn new(width: usize, height: usize) -> Self {
        let luma = PlaneGeometry {
            width,
            height,
            block: MB_SIZE,
        };
        let chroma = PlaneGeometry {
            width: width.div_ceil(2),
            height: height.div_ceil(2),
            block: MB_SIZE / 2,
        };
        Self {
            mb_w: width.div_ceil(MB_SIZE),
            mb_h: height.div_ceil(MB_SIZE),
            planes: [luma, chroma, chroma],
        }
    }
}

/// Per-segment step sizes for luma, then both chroma planes.
fn plane_steps(quant: &[u8; 4]) -> [[i32; 4]; 3] {
    let luma = quant.map(luma_step);
    let chroma = quant.map(chroma_step);
    [luma, chroma, chroma]
}

/// Lossy encoder knobs, taken from a validated config.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LossyParams {
    pub quality: f32,
    pub method: u8,
    pub segments: u8,
    pub sns_strength: u8,
    pub filter_strength: u8,
    pub filter_sharpness: u8,
    pub filter_type: u8,
    pub autofilter: bool,
    /// log2 of the token partition count.
    pub partitions: u8,
    /// Non-zero allows dropping the segment map when partition 0 overflows.
    pub partition_limit: u8,
    pub emulate_jpeg_size: bool,
    /// Code each token partition straight from its rows instead of
    /// buffering every band first. Output is identical.
    pub low_memory: bool,
    pub preprocessing: u8,
    pub threads: bool,
}

impl LossyParams {
    /// Quality driving the quantizer, raised along a power curve when
    /// emulating JPEG file sizes.
    fn effective_quality(&self) -> f32 {
        if self.emulate_jpeg_size {
            100.0 * libm::powf(self.quality / 100.0, JPEG_EMULATION_EXPONENT)
        } else {
            self.quality
        }
    }

    fn zlib_level(&self) -> u8 {
        (3 + self.method).min(9)
    }

    fn filter_level(&self, quant: u8) -> u8 {
        if self.autofilter {
            return (u32::from(quant) * 40 / 127).min(u32::from(MAX_LEVEL)) as u8;
        }
        let strength = u32::from(self.filter_strength) * u32::from(MAX_LEVEL) / 100;
        (strength * (u32::from(quant) + 8) / 135).min(u32::from(MAX_LEVEL)) as u8
    }
}

/// Bookkeeping gathered while coding one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct LossyStats {
    pub header_bytes: usize,
    pub partition0_bytes: usize,
    pub macroblocks: usize,
    pub skipped: usize,
    pub segment_bytes: [usize; 4],
    pub segment_quant: [u8; 4],
    pub segment_level: [u8; 4],
}

pub(crate) struct LossyOutput {
    pub payload: Vec<u8>,
    pub stats: LossyStats,
}

struct EncodedBand {
    tokens: Vec<u8>,
    nonzero: Vec<bool>,
    segment_bytes: [usize; 4],
}

fn encode_plane_band(
    src: &[u8],
    plane_geo: &PlaneGeometry,
    rows: usize,
    row_segments: &[u8],
    steps: &[i32; 4],
    out: &mut EncodedBand,
) {
    let w = plane_geo.width;
    let mut recon = vec![0u8; w * rows];
    for y in 0..rows {
        for x in 0..w {
            let mb = x / plane_geo.block;
            let seg = usize::from(row_segments[mb]);
            let step = steps[seg];
            let pred = i32::from(predict(&recon, w, x, y));
            let q = quantize(i32::from(src[y * w + x]) - pred, step);
            recon[y * w + x] = (pred + q * step).clamp(0, 255) as u8;
            let before = out.tokens.len();
            push_token(&mut out.tokens, q);
            out.segment_bytes[seg] += out.tokens.len() - before;
            out.nonzero[mb] |= q != 0;
        }
    }
}

fn encode_band(
    planes: [&[u8]; 3],
    geo: &Geometry,
    map: &SegmentMap,
    steps: &[[i32; 4]; 3],
    r: usize,
) -> EncodedBand {
    let row_segments = &map.ids[r * geo.mb_w..(r + 1) * geo.mb_w];
    let mut out = EncodedBand {
        tokens: Vec::new(),
        nonzero: vec![false; geo.mb_w],
        segment_bytes: [0; 4],
    };
    for ((plane, plane_geo), steps) in planes.iter().zip(&geo.planes).zip(steps) {
        let (start, end) = plane_geo.band(r);
        let src = &plane[start * plane_geo.width..end * plane_geo.width];
        encode_plane_band(src, plane_geo, end - start, row_segments, steps, &mut out);
    }
    out
}

/// Segment map plus the per-segment quantizer and filter level.
struct SegmentPlan {
    segments: u8,
    map: SegmentMap,
    quant: [u8; 4],
    level: [u8; 4],
}

impl SegmentPlan {
    fn new(
        luma: &[u8],
        width: usize,
        height: usize,
        segments: u8,
        base: i32,
        params: &LossyParams,
    ) -> Self {
        let map = analysis::segment(luma, width, height, segments, params.preprocessing & 1 != 0);
        let offsets = analysis::sns_offsets(segments, params.sns_strength);
        let mut quant = [0u8; 4];
        let mut level = [0u8; 4];
        for s in 0..usize::from(segments) {
            quant[s] = (base + offsets[s]).clamp(0, i32::from(MAX_QUANT)) as u8;
            level[s] = params.filter_level(quant[s]);
        }
        Self {
            segments,
            map,
            quant,
            level,
        }
    }

    fn partition0(&self, params: &LossyParams, zlib_level: u8) -> Vec<u8> {
        let mut out = vec![0u8, self.segments];
        for s in 0..usize::from(self.segments) {
            out.extend([self.quant[s], self.level[s]]);
        }
        let flags = if self.segments > 1 { FLAG_SEGMENT_MAP } else { 0 };
        out.extend([
            params.filter_type,
            params.filter_sharpness,
            params.partitions.min(3),
            flags,
        ]);
        if self.segments > 1 {
            out.extend(codecs::deflate(&self.map.ids, zlib_level));
        }
        out
    }
}

/// One token partition: raw tokens until `finish`, the zlib stream after.
#[derive(Default)]
struct TokenPartition {
    data: Vec<u8>,
    skipped: usize,
    segment_bytes: [usize; 4],
}

impl TokenPartition {
    fn append(&mut self, band: &EncodedBand) {
        self.data.extend_from_slice(&band.tokens);
        self.skipped += band.nonzero.iter().filter(|&&nz| !nz).count();
        for (total, n) in self.segment_bytes.iter_mut().zip(band.segment_bytes) {
            *total += n;
        }
    }

    fn finish(mut self, zlib_level: u8) -> Self {
        self.data = codecs::deflate(&self.data, zlib_level);
        self
    }
}

/// Encode YUV 4:2:0 planes into a `VP8 ` chunk payload.
pub(crate) fn encode(
    planes: &YuvaPlanes,
    width: usize,
    height: usize,
    params: &LossyParams,
) -> Result<LossyOutput, CodecError> {
    encode_frame(planes, width, height, params, MAX_FIRST_PARTITION)
}

fn encode_frame(
    planes: &YuvaPlanes,
    width: usize,
    height: usize,
    params: &LossyParams,
    partition0_budget: usize,
) -> Result<LossyOutput, CodecError> {
    let geo = Geometry::new(width, height);
    let luma: Cow<'_, [u8]> = if params.preprocessing & 2 != 0 {
        let mut y = planes.y.clone();
        analysis::dither_luma(&mut y, 1 + (100 - params.quality as i32) / 50);
        Cow::Owned(y)
    } else {
        Cow::Borrowed(&planes.y)
    };

    let base = libm::roundf((100.0 - params.effective_quality()) * f32::from(MAX_QUANT) / 100.0)
        as i32;
    let segments = params.segments.clamp(1, 4);
    let mut plan = SegmentPlan::new(&luma, width, height, segments, base, params);
    let zlib_level = params.zlib_level();
    let mut partition0 = plan.partition0(params, zlib_level);
    if partition0.len() > partition0_budget {
        if params.partition_limit == 0 || plan.segments == 1 {
            return Err(CodecError::UnsupportedFeature(
                "first partition exceeds 512 KiB",
            ));
        }
        log::debug!(
            "partition 0 is {} bytes; dropping the segment map",
            partition0.len()
        );
        plan = SegmentPlan::new(&luma, width, height, 1, base, params);
        partition0 = plan.partition0(params, zlib_level);
    }
    let steps = plane_steps(&plan.quant);

    let sources = [&luma[..], &planes.u[..], &planes.v[..]];
    let nparts = 1usize << params.partitions.min(3);
    let parts: Vec<TokenPartition> = if params.low_memory {
        // One live band per worker.
        codecs::map_indexed(nparts, params.threads, |p| {
            let mut part = TokenPartition::default();
            for r in (p..geo.mb_h).step_by(nparts) {
                part.append(&encode_band(sources, &geo, &plan.map, &steps, r));
            }
            part.finish(zlib_level)
        })
    } else {
        let bands = codecs::map_indexed(geo.mb_h, params.threads, |r| {
            encode_band(sources, &geo, &plan.map, &steps, r)
        });
        codecs::map_indexed(nparts, params.threads, |p| {
            let mut part = TokenPartition::default();
            for band in bands.iter().skip(p).step_by(nparts) {
                part.append(band);
            }
            part.finish(zlib_level)
        })
    };

    let tokens_len: usize = parts.iter().map(|p| p.data.len()).sum();
    let header_bytes = 10 + 3 * (nparts - 1);
    let mut payload = Vec::with_capacity(header_bytes + partition0.len() + tokens_len);
    // Key frame, version 0, shown.
    push_u24_le(&mut payload, (1 << 4) | ((partition0.len() as u32) << 5));
    payload.extend_from_slice(&VP8_START_CODE);
    payload.extend_from_slice(&(width as u16).to_le_bytes());
    payload.extend_from_slice(&(height as u16).to_le_bytes());
    payload.extend_from_slice(&partition0);
    for part in &parts[..nparts - 1] {
        if part.data.len() > MAX_PARTITION {
            return Err(CodecError::UnsupportedFeature(
                "token partition exceeds 16 MiB",
            ));
        }
        push_u24_le(&mut payload, part.data.len() as u32);
    }
    for part in &parts {
        payload.extend_from_slice(&part.data);
    }

    let mut stats = LossyStats {
        header_bytes,
        partition0_bytes: partition0.len(),
        macroblocks: geo.mb_w * geo.mb_h,
        skipped: parts.iter().map(|p| p.skipped).sum(),
        segment_quant: plan.quant,
        segment_level: plan.level,
        ..LossyStats::default()
    };
    for part in &parts {
        for (total, n) in stats.segment_bytes.iter_mut().zip(part.segment_bytes) {
            *total += n;
        }
    }
    log::debug!(
        "lossy {width}x{height}: base quant {base}, {} segment(s), {nparts} partition(s), {} bytes",
        plan.segments,
        payload.len()
    );
    Ok(LossyOutput { payload, stats })
}

/// Key frame header plus the byte ranges that follow it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader<'a> {
    pub width: usize,
    pub height: usize,
    partition0: &'a [u8],
    tokens: &'a [u8],
}

pub(crate) fn parse_frame_header(payload: &[u8]) -> Result<FrameHeader<'_>, &'static str> {
    if payload.len() < 10 {
        return Err("frame header truncated");
    }
    let tag = u32::from(payload[0]) | u32::from(payload[1]) << 8 | u32::from(payload[2]) << 16;
    if tag & 1 != 0 {
        return Err("not a key frame");
    }
    if payload[3..6] != VP8_START_CODE {
        return Err("missing start code");
    }
    let width = usize::from(u16::from_le_bytes([payload[6], payload[7]]) & 0x3fff);
    let height = usize::from(u16::from_le_bytes([payload[8], payload[9]]) & 0x3fff);
    if width == 0 || height == 0 {
        return Err("zero frame dimensions");
    }
    let size = (tag >> 5) as usize;
    let rest = &payload[10..];
    if size > rest.len() {
        return Err("bad partition size");
    }
    let (partition0, tokens) = rest.split_at(size);
    Ok(FrameHeader {
        width,
        height,
        partition0,
        tokens,
    })
}

/// Decoded partition 0.
#[derive(Debug, Clone)]
pub(crate) struct PartitionZero {
    pub segments: u8,
    pub quant: [u8; 4],
    pub level: [u8; 4],
    pub filter: LoopFilter,
    partitions: usize,
    map: SegmentMap,
}

pub(crate) fn parse_partition_zero(frame: &FrameHeader<'_>) -> Result<PartitionZero, &'static str> {
    const TRUNCATED: &str = "partition 0 truncated";
    let data = frame.partition0;
    let (&color, rest) = data.split_first().ok_or(TRUNCATED)?;
    if color & 1 != 0 {
        return Err("unsupported color transform");
    }
    let (&segments, rest) = rest.split_first().ok_or(TRUNCATED)?;
    if !(1..=4).contains(&segments) {
        return Err("segment count out of range");
    }
    let n = usize::from(segments);
    if rest.len() < 2 * n + 4 {
        return Err(TRUNCATED);
    }
    let mut quant = [0u8; 4];
    let mut level = [0u8; 4];
    for s in 0..n {
        quant[s] = rest[2 * s];
        level[s] = rest[2 * s + 1];
        if quant[s] > MAX_QUANT {
            return Err("quantizer out of range");
        }
        if level[s] > MAX_LEVEL {
            return Err("filter level out of range");
        }
    }
    let tail = &rest[2 * n..];
    let (filter_type, sharpness, partitions, flags) = (tail[0], tail[1], tail[2], tail[3]);
    if filter_type > 1 {
        return Err("unknown filter type");
    }
    if sharpness > 7 {
        return Err("filter sharpness out of range");
    }
    if partitions > 3 {
        return Err("too many token partitions");
    }

    let geo = Geometry::new(frame.width, frame.height);
    let map = if flags & FLAG_SEGMENT_MAP != 0 {
        let ids = codecs::inflate_exact(&tail[4..], geo.mb_w * geo.mb_h)?;
        if ids.iter().any(|&id| id >= segments) {
            return Err("segment id out of range");
        }
        SegmentMap {
            ids,
            mb_w: geo.mb_w,
            mb_h: geo.mb_h,
        }
    } else {
        SegmentMap::uniform(geo.mb_w, geo.mb_h)
    };
    Ok(PartitionZero {
        segments,
        quant,
        level,
        filter: LoopFilter {
            simple: filter_type == 0,
            sharpness,
        },
        partitions: 1 << partitions,
        map,
    })
}

fn decode_plane_band(
    reader: &mut TokenReader<'_>,
    dst: &mut [u8],
    plane_geo: &PlaneGeometry,
    rows: usize,
    row_segments: &[u8],
    steps: &[i32; 4],
) -> Result<(), &'static str> {
    let w = plane_geo.width;
    for y in 0..rows {
        for x in 0..w {
            let step = steps[usize::from(row_segments[x / plane_geo.block])];
            let pred = i32::from(predict(dst, w, x, y));
            let q = reader.next()?;
            dst[y * w + x] = (pred + q * step).clamp(0, 255) as u8;
        }
    }
    Ok(())
}

type DecodedBand = (usize, [Vec<u8>; 3]);

fn decode_partition(
    p: usize,
    data: &[u8],
    geo: &Geometry,
    header: &PartitionZero,
    steps: &[[i32; 4]; 3],
) -> Result<Vec<DecodedBand>, &'static str> {
    let rows = (p..geo.mb_h).step_by(header.partitions);
    // Escaped tokens take two bytes, so this bounds the inflated size.
    let limit: usize = rows
        .clone()
        .map(|r| 2 * geo.planes.iter().map(|s| s.band_samples(r)).sum::<usize>())
        .sum();
    let raw = codecs::inflate_bounded(data, limit.max(1))?;
    let mut reader = TokenReader { data: &raw, pos: 0 };
    let mut out = Vec::new();
    for r in rows {
        let row_segments = &header.map.ids[r * geo.mb_w..(r + 1) * geo.mb_w];
        let mut band: [Vec<u8>; 3] = Default::default();
        for ((dst, plane_geo), steps) in band.iter_mut().zip(&geo.planes).zip(steps) {
            let (start, end) = plane_geo.band(r);
            *dst = vec![0u8; plane_geo.width * (end - start)];
            decode_plane_band(&mut reader, dst, plane_geo, end - start, row_segments, steps)?;
        }
        out.push((r, band));
    }
    if !reader.is_exhausted() {
        return Err("trailing data in token partition");
    }
    Ok(out)
}

/// Decode the token partitions into YUV 4:2:0 planes, before loop filtering.
pub(crate) fn decode_planes(
    frame: &FrameHeader<'_>,
    header: &PartitionZero,
    threads: bool,
) -> Result<YuvaPlanes, &'static str> {
    let geo = Geometry::new(frame.width, frame.height);
    let nparts = header.partitions;
    let table_len = 3 * (nparts - 1);
    if frame.tokens.len() < table_len {
        return Err("bad partition size");
    }
    let (table, mut data) = frame.tokens.split_at(table_len);
    let mut slices = Vec::with_capacity(nparts);
    for entry in table.chunks_exact(3) {
        let size = usize::from(entry[0]) | usize::from(entry[1]) << 8 | usize::from(entry[2]) << 16;
        if size > data.len() {
            return Err("bad partition size");
        }
        let (part, rest) = data.split_at(size);
        slices.push(part);
        data = rest;
    }
    slices.push(data);

    let steps = plane_steps(&header.quant);
    let decoded = codecs::map_indexed(nparts, threads, |p| {
        decode_partition(p, slices[p], &geo, header, &steps)
    })
    .into_iter()
    .collect::<Result<Vec<_>, _>>()?;

    // Every partition decoded; only now allocate the full frame.
    let mut planes = geo
        .planes
        .map(|plane_geo| vec![0u8; plane_geo.width * plane_geo.height]);
    for partition in decoded {
        for (r, band) in partition {
            for ((plane, plane_geo), rows) in planes.iter_mut().zip(&geo.planes).zip(band) {
                let (start, _) = plane_geo.band(r);
                let at = start * plane_geo.width;
                plane[at..at + rows.len()].copy_from_slice(&rows);
            }
        }
    }
    let [y, u, v] = planes;
    Ok(YuvaPlanes { y, u, v, a: None })
}

/// Deblock decoded planes with the per-segment filter levels.
pub(crate) fn apply_loop_filter(planes: &mut YuvaPlanes, width: usize, height: usize, header: &PartitionZero) {
    if header.level.iter().all(|&l| l == 0) {
        return;
    }
    let geo = Geometry::new(width, height);
    let level_at = |bx: usize, by: usize| header.level[usize::from(header.map.get(bx, by))];
    let [luma, chroma, _] = geo.planes;
    header
        .filter
        .apply(&mut planes.y, luma.width, luma.height, luma.block, level_at);
    if !header.filter.simple {
        for plane in [&mut planes.u, &mut planes.v] {
            header
                .filter
                .apply(plane, chroma.width, chroma.height, chroma.block, level_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(quality: f32) -> LossyParams {
        LossyParams {
            quality,
            method: 4,
            segments: 4,
            sns_strength: 50,
            filter_strength: 60,
            filter_sharpness: 0,
            filter_type: 1,
            autofilter: false,
            partitions: 0,
            partition_limit: 0,
            emulate_jpeg_size: false,
            low_memory: false,
            preprocessing: 0,
            threads: false,
        }
    }

    fn planes(w: usize, h: usize) -> YuvaPlanes {
        let (uw, uh) = (w.div_ceil(2), h.div_ceil(2));
        YuvaPlanes {
            y: (0..w * h).map(|i| ((i % w) * 7 + (i / w) * 3) as u8).collect(),
            u: (0..uw * uh).map(|i| (100 + i % 17) as u8).collect(),
            v: (0..uw * uh).map(|i| (150 - i % 13) as u8).collect(),
            a: None,
        }
    }

    fn roundtrip(p: &YuvaPlanes, w: usize, h: usize, params: &LossyParams) -> (YuvaPlanes, PartitionZero) {
        let out = encode(p, w, h, params).unwrap();
        let frame = parse_frame_header(&out.payload).unwrap();
        assert_eq!((frame.width, frame.height), (w, h));
        let header = parse_partition_zero(&frame).unwrap();
        (decode_planes(&frame, &header, params.threads).unwrap(), header)
    }

    #[test]
    fn full_quality_is_exact() {
        let (w, h) = (37, 21);
        let src = planes(w, h);
        let (decoded, header) = roundtrip(&src, w, h, &params(100.0));
        assert_eq!(decoded, src);
        assert_eq!(header.segments, 4);
    }

    #[test]
    fn error_bounded_by_half_step() {
        let (w, h) = (48, 40);
        let src = planes(w, h);
        let (decoded, header) = roundtrip(&src, w, h, &params(30.0));
        let max_step = header.quant.iter().map(|&q| luma_step(q)).max().unwrap();
        for (a, b) in decoded.y.iter().zip(&src.y) {
            assert!((i32::from(*a) - i32::from(*b)).abs() <= max_step / 2);
        }
    }

    #[test]
    fn partitions_and_threads_are_transparent() {
        let (w, h) = (40, 70);
        let src = planes(w, h);
        let mut p = params(60.0);
        p.partitions = 3;
        let single = encode(&src, w, h, &p).unwrap();
        p.threads = true;
        let threaded = encode(&src, w, h, &p).unwrap();
        assert_eq!(single.payload, threaded.payload);
        let (decoded, header) = roundtrip(&src, w, h, &p);
        assert_eq!(header.partitions, 8);
        assert_eq!(decoded.y.len(), w * h);
    }

    #[test]
    fn stats_cover_every_macroblock() {
        let (w, h) = (33, 17);
        let out = encode(&planes(w, h), w, h, &params(75.0)).unwrap();
        assert_eq!(out.stats.macroblocks, 3 * 2);
        assert!(out.stats.skipped <= out.stats.macroblocks);
        assert_eq!(out.stats.header_bytes, 10);
        assert!(out.stats.segment_bytes.iter().sum::<usize>() > 0);
    }

    #[test]
    fn flat_image_skips_macroblocks() {
        let (w, h) = (32, 32);
        let flat = YuvaPlanes {
            y: vec![128; w * h],
            u: vec![128; 16 * 16],
            v: vec![128; 16 * 16],
            a: None,
        };
        let out = encode(&flat, w, h, &params(75.0)).unwrap();
        assert_eq!(out.stats.skipped, 4);
    }

    #[test]
    fn color_space_bit_is_rejected() {
        let (w, h) = (16, 16);
        let mut payload = encode(&planes(w, h), w, h, &params(75.0)).unwrap().payload;
        payload[10] |= 1;
        let frame = parse_frame_header(&payload).unwrap();
        assert_eq!(
            parse_partition_zero(&frame).unwrap_err(),
            "unsupported color transform"
        );
    }

    #[test]
    fn oversized_partition_is_rejected() {
        let (w, h) = (16, 16);
        let mut payload = encode(&planes(w, h), w, h, &params(75.0)).unwrap().payload;
        payload[2] = 0xff;
        assert_eq!(parse_frame_header(&payload).unwrap_err(), "bad partition size");
    }

    #[test]
    fn truncated_tokens_fail() {
        let (w, h) = (24, 24);
        let out = encode(&planes(w, h), w, h, &params(75.0)).unwrap();
        let cut = &out.payload[..out.payload.len() - 4];
        let frame = parse_frame_header(cut).unwrap();
        let header = parse_partition_zero(&frame).unwrap();
        assert!(decode_planes(&frame, &header, false).is_err());
    }

    #[test]
    fn oversized_frame_fails_before_allocating_planes() {
        let (w, h) = (16, 16);
        let mut p = params(75.0);
        p.segments = 1;
        let mut payload = encode(&planes(w, h), w, h, &p).unwrap().payload;
        payload[6..10].copy_from_slice(&[0xff, 0x3f, 0xff, 0x3f]);
        let frame = parse_frame_header(&payload).unwrap();
        assert_eq!((frame.width, frame.height), (16383, 16383));
        let header = parse_partition_zero(&frame).unwrap();
        assert_eq!(
            decode_planes(&frame, &header, false).unwrap_err(),
            "token partition truncated"
        );
    }

    #[test]
    fn low_memory_output_is_identical() {
        let (w, h) = (50, 66);
        let src = planes(w, h);
        let mut p = params(55.0);
        p.partitions = 2;
        let buffered = encode(&src, w, h, &p).unwrap();
        p.low_memory = true;
        let streamed = encode(&src, w, h, &p).unwrap();
        assert_eq!(buffered.payload, streamed.payload);
        assert_eq!(buffered.stats, streamed.stats);
    }

    #[test]
    fn jpeg_emulation_uses_finer_quantizer() {
        let (w, h) = (32, 32);
        let mut p = params(50.0);
        p.segments = 1;
        let plain = encode(&planes(w, h), w, h, &p).unwrap();
        p.emulate_jpeg_size = true;
        let emulated = encode(&planes(w, h), w, h, &p).unwrap();
        assert!(emulated.stats.segment_quant[0] < plain.stats.segment_quant[0]);
        assert_ne!(emulated.payload, plain.payload);
    }

    #[test]
    fn partition_limit_drops_segment_map() {
        let (w, h) = (64, 64);
        let src = planes(w, h);
        let p = params(60.0);
        let full = encode_frame(&src, w, h, &p, MAX_FIRST_PARTITION).unwrap();
        assert!(full.stats.partition0_bytes > 8);

        let budget = full.stats.partition0_bytes - 1;
        assert!(matches!(
            encode_frame(&src, w, h, &p, budget),
            Err(CodecError::UnsupportedFeature(_))
        ));

        let mut limited = p;
        limited.partition_limit = 50;
        let out = encode_frame(&src, w, h, &limited, budget).unwrap();
        let frame = parse_frame_header(&out.payload).unwrap();
        assert_eq!(parse_partition_zero(&frame).unwrap().segments, 1);
        assert_eq!(out.stats.partition0_bytes, 8);
    }

    #[test]
    fn filter_levels() {
        let mut p = params(75.0);
        assert_eq!(p.filter_level(0), 2);
        p.filter_strength = 0;
        assert_eq!(p.filter_level(100), 0);
        p.autofilter = true;
        assert_eq!(p.filter_level(127), 40);
    }
}
