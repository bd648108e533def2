//! Container walking: locate the image payload and extract features.
//!
//! Everything here is pure byte parsing over borrowed slices; no pixel
//! buffers are allocated.

use crate::format::BitstreamFormat;
use crate::info::BitstreamFeatures;
use crate::riff::{ByteReader, ChunkId};
use crate::CodecError;

/// Largest width or height representable in a VP8/VP8L header.
pub const MAX_DIMENSION: u32 = 16383;

pub(crate) const VP8X_ICC: u8 = 0x20;
pub(crate) const VP8X_ALPHA: u8 = 0x10;
pub(crate) const VP8X_EXIF: u8 = 0x08;
pub(crate) const VP8X_XMP: u8 = 0x04;
pub(crate) const VP8X_ANIMATION: u8 = 0x02;

pub(crate) const VP8_START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];
pub(crate) const VP8L_SIGNATURE: u8 = 0x2f;

/// Borrowed view of the image payload.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Payload<'a> {
    Lossy {
        vp8: &'a [u8],
        alpha: Option<&'a [u8]>,
    },
    Lossless(&'a [u8]),
    Animation,
}

/// Parsed container: features plus borrowed chunk payloads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Container<'a> {
    pub features: BitstreamFeatures,
    pub payload: Payload<'a>,
    pub icc: Option<&'a [u8]>,
    pub exif: Option<&'a [u8]>,
    pub xmp: Option<&'a [u8]>,
}

/// Dimensions stored in a `VP8 ` key frame header.
pub(crate) fn vp8_dimensions(vp8: &[u8]) -> Result<(u32, u32), CodecError> {
    let mut r = ByteReader::new(vp8);
    let tag = r.read_u24_le()?;
    if tag & 1 != 0 {
        return Err(CodecError::UnsupportedFeature("VP8 inter frame"));
    }
    if (tag >> 1) & 7 > 3 {
        return Err(CodecError::MalformedContainer("VP8 profile out of range"));
    }
    if r.take(3)? != VP8_START_CODE {
        return Err(CodecError::MalformedContainer("missing VP8 start code"));
    }
    let width = u32::from(r.read_u16_le()? & 0x3fff);
    let height = u32::from(r.read_u16_le()? & 0x3fff);
    Ok((width, height))
}

/// Dimensions and alpha hint stored in a `VP8L` header.
pub(crate) fn vp8l_dimensions(vp8l: &[u8]) -> Result<(u32, u32, bool), CodecError> {
    let mut r = ByteReader::new(vp8l);
    if r.read_u8()? != VP8L_SIGNATURE {
        return Err(CodecError::MalformedContainer("missing VP8L signature"));
    }
    let header = r.read_u32_le()?;
    if header >> 29 != 0 {
        return Err(CodecError::UnsupportedFeature("VP8L version"));
    }
    let width = (header & 0x3fff) + 1;
    let height = ((header >> 14) & 0x3fff) + 1;
    let alpha = (header >> 28) & 1 == 1;
    Ok((width, height, alpha))
}

/// Walk the container and extract features and payload slices.
pub(crate) fn parse_container(data: &[u8]) -> Result<Container<'_>, CodecError> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WEBP" {
        if data.len() < 12 && (data.is_empty() || b"RIFF".starts_with(&data[..data.len().min(4)])) {
            return Err(CodecError::TruncatedInput {
                needed: 12,
                available: data.len() as u64,
            });
        }
        return Err(CodecError::MalformedContainer("missing RIFF/WEBP signature"));
    }
    let riff_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as u64;
    if riff_size < 12 {
        return Err(CodecError::MalformedContainer("RIFF size too small"));
    }
    if riff_size & 1 == 1 {
        return Err(CodecError::MalformedContainer("RIFF size is odd"));
    }
    let riff_end = riff_size + 8;
    if riff_end > data.len() as u64 {
        return Err(CodecError::TruncatedInput {
            needed: riff_end,
            available: data.len() as u64,
        });
    }
    // Bytes after the RIFF payload are ignored.
    let mut r = ByteReader::new(&data[12..riff_end as usize]);
    let (first, payload) = r.read_chunk()?;

    let container = match first {
        ChunkId::VP8 => {
            let (width, height) = vp8_dimensions(payload)?;
            simple(width, height, false, BitstreamFormat::Lossy, Payload::Lossy {
                vp8: payload,
                alpha: None,
            })?
        }
        ChunkId::VP8L => {
            let (width, height, alpha) = vp8l_dimensions(payload)?;
            simple(width, height, alpha, BitstreamFormat::Lossless, Payload::Lossless(payload))?
        }
        ChunkId::VP8X => parse_extended(payload, &mut r)?,
        _ => {
            return Err(CodecError::UnsupportedFeature(
                "payload chunk is neither VP8 nor VP8L",
            ));
        }
    };

    log::trace!(
        "webp container: {}x{} {} alpha={} animation={}",
        container.features.width,
        container.features.height,
        container.features.format,
        container.features.has_alpha,
        container.features.has_animation
    );
    Ok(container)
}

fn simple(
    width: u32,
    height: u32,
    has_alpha: bool,
    format: BitstreamFormat,
    payload: Payload<'_>,
) -> Result<Container<'_>, CodecError> {
    if width == 0 || height == 0 {
        return Err(CodecError::MalformedContainer("zero image dimension"));
    }
    Ok(Container {
        features: BitstreamFeatures {
            width,
            height,
            has_alpha,
            has_animation: false,
            format,
            has_icc: false,
            has_exif: false,
            has_xmp: false,
        },
        payload,
        icc: None,
        exif: None,
        xmp: None,
    })
}

fn parse_extended<'a>(
    header: &'a [u8],
    r: &mut ByteReader<'a>,
) -> Result<Container<'a>, CodecError> {
    if header.len() < 10 {
        return Err(CodecError::MalformedContainer("VP8X chunk too small"));
    }
    let mut h = ByteReader::new(header);
    let flags = h.read_u8()?;
    h.skip(3)?;
    let width = h.read_u24_le()? + 1;
    let height = h.read_u24_le()? + 1;
    if u64::from(width) * u64::from(height) >= 1 << 32 {
        return Err(CodecError::MalformedContainer("canvas area overflows"));
    }

    let mut icc = None;
    let mut exif = None;
    let mut xmp = None;
    let mut alpha = None;
    let mut image: Option<(ChunkId, &'a [u8])> = None;

    while r.remaining() >= 8 {
        let (id, payload) = r.read_chunk()?;
        match id {
            ChunkId::ICCP => icc = icc.or(Some(payload)),
            ChunkId::EXIF => exif = exif.or(Some(payload)),
            ChunkId::XMP => xmp = xmp.or(Some(payload)),
            ChunkId::ALPH if image.is_none() => alpha = alpha.or(Some(payload)),
            ChunkId::VP8 | ChunkId::VP8L if image.is_none() => image = Some((id, payload)),
            _ => {}
        }
    }

    let animated = flags & VP8X_ANIMATION != 0;
    let mut features = BitstreamFeatures {
        width,
        height,
        has_alpha: flags & VP8X_ALPHA != 0,
        has_animation: animated,
        format: BitstreamFormat::Undefined,
        has_icc: flags & VP8X_ICC != 0,
        has_exif: flags & VP8X_EXIF != 0,
        has_xmp: flags & VP8X_XMP != 0,
    };

    let payload = if animated {
        Payload::Animation
    } else {
        let (frame_width, frame_height, payload) = match image {
            Some((ChunkId::VP8, vp8)) => {
                let (w, h) = vp8_dimensions(vp8)?;
                features.format = BitstreamFormat::Lossy;
                features.has_alpha |= alpha.is_some();
                (w, h, Payload::Lossy { vp8, alpha })
            }
            Some((_, vp8l)) => {
                let (w, h, a) = vp8l_dimensions(vp8l)?;
                features.format = BitstreamFormat::Lossless;
                features.has_alpha |= a;
                (w, h, Payload::Lossless(vp8l))
            }
            None => return Err(CodecError::MalformedContainer("missing image payload chunk")),
        };
        if frame_width != width || frame_height != height {
            return Err(CodecError::MalformedContainer(
                "frame size differs from VP8X canvas",
            ));
        }
        payload
    };

    Ok(Container {
        features,
        payload,
        icc,
        exif,
        xmp,
    })
}
