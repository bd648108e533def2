//! Unified error type for probe, decode, encode and measure operations.

use alloc::string::String;

use crate::decode::DecodeState;

/// Rejection reported by an [`EncodeSink`](crate::EncodeSink).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sink rejected {len} bytes at offset {offset}")]
pub struct SinkError {
    /// Byte offset of the rejected write within the output stream.
    pub offset: u64,
    /// Length of the rejected write.
    pub len: usize,
}

/// Error type for every public operation of this crate.
///
/// Each variant is a distinct failure kind; the `Display` impl gives a
/// human-readable message.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Magic bytes, chunk layout or header signature is wrong.
    #[error("malformed container: {0}")]
    MalformedContainer(&'static str),

    /// A declared size points past the end of the input.
    #[error("truncated input: need {needed} bytes, have {available}")]
    TruncatedInput { needed: u64, available: u64 },

    /// The bitstream uses a feature this codec does not handle.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    /// Crop rectangle does not fit inside the source image.
    #[error(
        "crop {width}x{height} at ({left},{top}) exceeds source {source_width}x{source_height}"
    )]
    CropOutOfBounds {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        source_width: u32,
        source_height: u32,
    },

    /// Width or height exceeds the 14-bit bitstream limit.
    #[error("dimensions {width}x{height} exceed maximum of {max}")]
    DimensionTooLarge { width: u32, height: u32, max: u32 },

    /// Width or height is zero.
    #[error("empty source image ({width}x{height})")]
    EmptySource { width: u32, height: u32 },

    /// The pixel layout cannot be imported.
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(&'static str),

    /// Encoder configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// The output sink refused a write; the encode was aborted.
    #[error("write sink failed: {0}")]
    WriteSinkFailed(#[from] SinkError),

    /// Two pictures passed to a metric have different sizes.
    #[error("dimension mismatch: {first_width}x{first_height} vs {second_width}x{second_height}")]
    DimensionMismatch {
        first_width: u32,
        first_height: u32,
        second_width: u32,
        second_height: u32,
    },

    /// Structural inconsistency inside the payload.
    ///
    /// `state` is the last state the decoder completed successfully.
    #[error("decode failed after {state}: {reason}")]
    DecodeFailed {
        state: DecodeState,
        reason: &'static str,
    },

    /// Image does not fit in this target's address space.
    #[error("platform unsupported: {0}")]
    PlatformUnsupported(&'static str),

    /// Caller-supplied buffer or parameter is unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A configured resource limit was exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    /// Operation cancelled through a stop token.
    #[error("operation cancelled: {0}")]
    Cancelled(enough::StopReason),
}

impl From<enough::StopReason> for CodecError {
    fn from(reason: enough::StopReason) -> Self {
        CodecError::Cancelled(reason)
    }
}

impl CodecError {
    /// Whether this error was caused by the input bytes rather than by the
    /// caller's parameters.
    pub fn is_bitstream_error(&self) -> bool {
        matches!(
            self,
            CodecError::MalformedContainer(_)
                | CodecError::TruncatedInput { .. }
                | CodecError::UnsupportedFeature(_)
                | CodecError::DecodeFailed { .. }
        )
    }
}

/// Byte size of a `width * height * channels` buffer on this target.
pub(crate) fn buffer_len(width: u32, height: u32, channels: usize) -> Result<usize, CodecError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels))
        .ok_or(CodecError::PlatformUnsupported(
            "image size exceeds the address space",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_carries_detail() {
        let err = CodecError::DimensionTooLarge {
            width: 20000,
            height: 10,
            max: 16383,
        };
        assert_eq!(
            err.to_string(),
            "dimensions 20000x10 exceed maximum of 16383"
        );

        let err = CodecError::DecodeFailed {
            state: DecodeState::PartitionZero,
            reason: "bad partition size",
        };
        assert_eq!(
            err.to_string(),
            "decode failed after PartitionZero: bad partition size"
        );
    }

    #[test]
    fn sink_error_converts() {
        let err: CodecError = SinkError { offset: 12, len: 4 }.into();
        assert!(matches!(err, CodecError::WriteSinkFailed(_)));
        assert!(!err.is_bitstream_error());
    }

    #[test]
    fn buffer_len_small() {
        assert_eq!(buffer_len(3, 2, 4).unwrap(), 24);
    }
}
