//! RIFF chunk primitives: fourcc tags, a bounds-checked byte reader, and
//! chunk header serialization.

use crate::CodecError;

/// Chunk tags that can appear in a WebP file.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ChunkId {
    RIFF,
    WEBP,
    VP8,
    VP8L,
    VP8X,
    ANIM,
    ANMF,
    ALPH,
    ICCP,
    EXIF,
    XMP,
    Unknown([u8; 4]),
}

impl ChunkId {
    pub(crate) const fn from_fourcc(fourcc: [u8; 4]) -> Self {
        match &fourcc {
            b"RIFF" => Self::RIFF,
            b"WEBP" => Self::WEBP,
            b"VP8 " => Self::VP8,
            b"VP8L" => Self::VP8L,
            b"VP8X" => Self::VP8X,
            b"ANIM" => Self::ANIM,
            b"ANMF" => Self::ANMF,
            b"ALPH" => Self::ALPH,
            b"ICCP" => Self::ICCP,
            b"EXIF" => Self::EXIF,
            b"XMP " => Self::XMP,
            _ => Self::Unknown(fourcc),
        }
    }

    pub(crate) const fn to_fourcc(self) -> [u8; 4] {
        match self {
            Self::RIFF => *b"RIFF",
            Self::WEBP => *b"WEBP",
            Self::VP8 => *b"VP8 ",
            Self::VP8L => *b"VP8L",
            Self::VP8X => *b"VP8X",
            Self::ANIM => *b"ANIM",
            Self::ANMF => *b"ANMF",
            Self::ALPH => *b"ALPH",
            Self::ICCP => *b"ICCP",
            Self::EXIF => *b"EXIF",
            Self::XMP => *b"XMP ",
            Self::Unknown(fourcc) => fourcc,
        }
    }
}

/// Position-tracking reader over a byte slice.
///
/// Every read is bounds-checked; running off the end yields
/// [`CodecError::TruncatedInput`].
#[derive(Clone)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    #[inline]
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn truncated(&self, n: usize) -> CodecError {
        CodecError::TruncatedInput {
            needed: self.pos as u64 + n as u64,
            available: self.data.len() as u64,
        }
    }

    /// Borrow the next `n` bytes and advance past them.
    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(self.truncated(n));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        self.take(n).map(|_| ())
    }

    #[inline]
    pub(crate) fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    pub(crate) fn read_u16_le(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    #[inline]
    pub(crate) fn read_u24_le(&mut self) -> Result<u32, CodecError> {
        let b = self.take(3)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    #[inline]
    pub(crate) fn read_u32_le(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_fourcc(&mut self) -> Result<ChunkId, CodecError> {
        let b = self.take(4)?;
        Ok(ChunkId::from_fourcc([b[0], b[1], b[2], b[3]]))
    }

    /// Read a chunk header and borrow its payload, skipping the pad byte.
    ///
    /// A missing pad byte after the final chunk is tolerated.
    pub(crate) fn read_chunk(&mut self) -> Result<(ChunkId, &'a [u8]), CodecError> {
        let id = self.read_fourcc()?;
        let size = self.read_u32_le()? as usize;
        let payload = self.take(size)?;
        if size & 1 == 1 && self.remaining() > 0 {
            self.pos += 1;
        }
        Ok((id, payload))
    }
}

/// Payload size rounded up to the even chunk boundary.
#[inline]
pub(crate) const fn padded(len: usize) -> usize {
    len + (len & 1)
}

/// Serialized chunk header: fourcc followed by the unpadded payload size.
pub(crate) fn chunk_header(id: ChunkId, len: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&id.to_fourcc());
    out[4..].copy_from_slice(&(len as u32).to_le_bytes());
    out
}

/// `RIFF` header for a file whose chunks occupy `body_len` bytes.
pub(crate) fn riff_header(body_len: usize) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[..4].copy_from_slice(b"RIFF");
    out[4..8].copy_from_slice(&((body_len + 4) as u32).to_le_bytes());
    out[8..].copy_from_slice(b"WEBP");
    out
}

/// Append `value` as three little-endian bytes.
#[inline]
pub(crate) fn push_u24_le(out: &mut alloc::vec::Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_roundtrip_known_and_unknown() {
        assert_eq!(ChunkId::from_fourcc(*b"VP8 "), ChunkId::VP8);
        assert_eq!(ChunkId::VP8L.to_fourcc(), *b"VP8L");
        let odd = ChunkId::from_fourcc(*b"ABCD");
        assert_eq!(odd, ChunkId::Unknown(*b"ABCD"));
        assert_eq!(odd.to_fourcc(), *b"ABCD");
    }

    #[test]
    fn reader_reports_truncation() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        assert_eq!(r.read_u16_le().unwrap(), 0x0201);
        match r.read_u32_le() {
            Err(CodecError::TruncatedInput { needed, available }) => {
                assert_eq!(needed, 6);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        // Failed reads do not advance.
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn odd_chunk_skips_pad() {
        let data = [b'E', b'X', b'I', b'F', 3, 0, 0, 0, 7, 8, 9, 0, b'X'];
        let mut r = ByteReader::new(&data);
        let (id, payload) = r.read_chunk().unwrap();
        assert_eq!(id, ChunkId::EXIF);
        assert_eq!(payload, &[7, 8, 9]);
        assert_eq!(r.read_u8().unwrap(), b'X');
    }

    #[test]
    fn chunk_size_past_end() {
        let data = [b'V', b'P', b'8', b'L', 100, 0, 0, 0, 0x2f];
        let mut r = ByteReader::new(&data);
        assert!(matches!(
            r.read_chunk(),
            Err(CodecError::TruncatedInput { needed: 108, .. })
        ));
    }

    #[test]
    fn headers_serialize() {
        assert_eq!(chunk_header(ChunkId::ALPH, 5), *b"ALPH\x05\0\0\0");
        let riff = riff_header(10);
        assert_eq!(&riff[..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([riff[4], riff[5], riff[6], riff[7]]), 14);
        assert_eq!(padded(5), 6);
        assert_eq!(padded(6), 6);
    }
}
