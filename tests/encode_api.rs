//! Encode request validation, sinks, statistics and metrics.

use zenwebp_lite::{
    encode_lossy, get_info, measure, Capabilities, CodecError, DecodeRequest, EncodeRequest,
    EncoderConfig, Feature, FnSink, Metric, Picture, PixelLayout, Preset, SinkError,
    MAX_DIMENSION,
};

fn sample(w: u32, h: u32) -> Vec<u8> {
    let mut px = Vec::with_capacity((w * h * 4) as usize);
    for y in 0..h {
        for x in 0..w {
            px.extend_from_slice(&[(x * 5) as u8, (y * 3) as u8, ((x * y) % 256) as u8, 255]);
        }
    }
    px
}

#[test]
fn empty_source_is_rejected() {
    let err = encode_lossy(&[], PixelLayout::Rgba8, 0, 10, 75.0).unwrap_err();
    assert!(matches!(err, CodecError::EmptySource { width: 0, .. }));
    let err = encode_lossy(&[], PixelLayout::Rgba8, 10, 0, 75.0).unwrap_err();
    assert!(matches!(err, CodecError::EmptySource { height: 0, .. }));
}

#[test]
fn oversized_source_is_rejected() {
    let err = encode_lossy(&[], PixelLayout::Rgba8, 20000, 1, 75.0).unwrap_err();
    assert!(matches!(
        err,
        CodecError::DimensionTooLarge {
            width: 20000,
            max: MAX_DIMENSION,
            ..
        }
    ));
    assert_eq!(MAX_DIMENSION, 16383);
}

#[test]
fn short_stride_and_buffer() {
    let px = sample(4, 4);
    let err = EncodeRequest::new(EncoderConfig::new())
        .with_stride(8)
        .encode(&px, PixelLayout::Rgba8, 4, 4)
        .unwrap_err();
    assert!(matches!(err, CodecError::InvalidInput(_)));
    assert!(err.to_string().contains("stride 8"), "{err}");

    let err = EncodeRequest::new(EncoderConfig::new())
        .encode(&px[..40], PixelLayout::Rgba8, 4, 4)
        .unwrap_err();
    assert!(matches!(err, CodecError::InvalidInput(_)));
}

#[test]
fn configuration_is_validated() {
    let px = sample(4, 4);
    let mut config = EncoderConfig::new();
    config.segments = 5;
    let err = EncodeRequest::new(config.clone())
        .encode(&px, PixelLayout::Rgba8, 4, 4)
        .unwrap_err();
    assert!(matches!(err, CodecError::InvalidConfiguration(_)));

    config.segments = 4;
    assert!(EncodeRequest::new(config).encode(&px, PixelLayout::Rgba8, 4, 4).is_ok());

    let err = EncodeRequest::new(EncoderConfig::new().quality(150.0))
        .encode(&px, PixelLayout::Rgba8, 4, 4)
        .unwrap_err();
    assert!(matches!(err, CodecError::InvalidConfiguration(_)));
}

#[test]
fn presets_encode() {
    let px = sample(20, 20);
    for preset in [
        Preset::Default,
        Preset::Picture,
        Preset::Photo,
        Preset::Drawing,
        Preset::Icon,
        Preset::Text,
    ] {
        let out = EncodeRequest::new(EncoderConfig::with_preset(preset, 70.0))
            .encode(&px, PixelLayout::Rgba8, 20, 20)
            .unwrap();
        assert_eq!(get_info(&out.data).unwrap().width, 20, "{preset:?}");
    }
}

#[test]
fn sink_failure_surfaces() {
    let mut sink = FnSink(|_: &[u8]| false);
    let err = EncodeRequest::new(EncoderConfig::new())
        .encode_to_sink(&sample(8, 8), PixelLayout::Rgba8, 8, 8, &mut sink)
        .unwrap_err();
    assert!(matches!(
        err,
        CodecError::WriteSinkFailed(SinkError {
            offset: 0,
            len: 12
        })
    ));
}

#[test]
fn sink_sees_whole_file_in_order() {
    let px = sample(9, 9);
    let mut pieces = Vec::new();
    let mut sink = FnSink(|piece: &[u8]| {
        pieces.extend_from_slice(piece);
        true
    });
    EncodeRequest::new(EncoderConfig::new())
        .encode_to_sink(&px, PixelLayout::Rgba8, 9, 9, &mut sink)
        .unwrap();
    let direct = EncodeRequest::new(EncoderConfig::new())
        .encode(&px, PixelLayout::Rgba8, 9, 9)
        .unwrap();
    assert_eq!(pieces, direct.data);
}

#[test]
fn stats_are_opt_in() {
    let px = sample(32, 32);
    let out = EncodeRequest::new(EncoderConfig::new())
        .encode(&px, PixelLayout::Rgba8, 32, 32)
        .unwrap();
    assert!(out.stats.is_none());

    let mut sink = Vec::new();
    let stats = EncodeRequest::new(EncoderConfig::new())
        .with_stats(true)
        .encode_to_sink(&px, PixelLayout::Rgba8, 32, 32, &mut sink)
        .unwrap()
        .unwrap();
    assert_eq!(stats.coded_size, sink.len());
    assert_eq!(stats.intra16_blocks + stats.skipped_blocks, 4);
    assert!(stats.partition0_bytes > 0);
    assert!(stats.psnr.iter().all(|&db| db > 0.0 && db <= 99.0));
}

#[test]
fn psnr_target_steers_quality() {
    let px = sample(32, 32);
    let stats = EncodeRequest::new(EncoderConfig::new().target_psnr(30.0).pass(8))
        .with_stats(true)
        .encode(&px, PixelLayout::Rgba8, 32, 32)
        .unwrap()
        .stats
        .unwrap();
    assert!(stats.passes >= 1 && stats.passes <= 8);
}

#[test]
fn thread_level_does_not_change_output() {
    let px = sample(48, 40);
    for lossless in [false, true] {
        let config = EncoderConfig::new().lossless(lossless).partitions(2);
        let serial = EncodeRequest::new(config.clone())
            .encode(&px, PixelLayout::Rgba8, 48, 40)
            .unwrap();
        let threaded = EncodeRequest::new(config.thread_level(1))
            .encode(&px, PixelLayout::Rgba8, 48, 40)
            .unwrap();
        assert_eq!(serial.data, threaded.data, "lossless={lossless}");
    }
}

#[test]
fn disabled_capability_fails() {
    let caps = Capabilities::detect().without(Feature::Lossy);
    let err = EncodeRequest::new(EncoderConfig::new())
        .with_capabilities(&caps)
        .encode(&sample(4, 4), PixelLayout::Rgba8, 4, 4)
        .unwrap_err();
    assert!(matches!(err, CodecError::UnsupportedFeature(_)));

    let caps = Capabilities::detect().without(Feature::NearLossless);
    let err = EncodeRequest::new(EncoderConfig::new().lossless(true).near_lossless(50))
        .with_capabilities(&caps)
        .encode(&sample(4, 4), PixelLayout::Rgba8, 4, 4)
        .unwrap_err();
    assert!(matches!(err, CodecError::UnsupportedFeature(_)));
}

#[test]
fn measuring_a_picture_against_itself() {
    let px = sample(10, 7);
    for use_argb in [false, true] {
        let p = Picture::from_pixels(&px, PixelLayout::Rgba8, 10, 7, None, use_argb).unwrap();
        assert_eq!(measure(&p, &p, Metric::Psnr).unwrap(), [99.0; 5]);
    }
}

#[test]
fn measuring_mismatched_pictures() {
    let a = Picture::from_pixels(&sample(4, 4), PixelLayout::Rgba8, 4, 4, None, true).unwrap();
    let b = Picture::from_pixels(&sample(4, 3), PixelLayout::Rgba8, 4, 3, None, true).unwrap();
    assert!(matches!(
        measure(&a, &b, Metric::Ssim),
        Err(CodecError::DimensionMismatch { .. })
    ));
}

#[test]
fn version_is_reported() {
    let caps = Capabilities::detect();
    assert_eq!(caps.version(), zenwebp_lite::version());
}

fn four_colors(w: u32, h: u32) -> Vec<u8> {
    let colors = [[255, 0, 0, 255], [0, 80, 160, 255], [9, 9, 9, 0], [240, 240, 10, 200]];
    (0..w * h)
        .flat_map(|i| colors[((i / 3 + i / w) % 4) as usize])
        .collect()
}

#[test]
fn jpeg_size_emulation_changes_lossy_output() {
    let px = sample(32, 32);
    let plain = EncodeRequest::new(EncoderConfig::new().quality(40.0))
        .encode(&px, PixelLayout::Rgba8, 32, 32)
        .unwrap();
    let mut config = EncoderConfig::new().quality(40.0);
    config.emulate_jpeg_size = true;
    let emulated = EncodeRequest::new(config)
        .encode(&px, PixelLayout::Rgba8, 32, 32)
        .unwrap();
    assert_ne!(plain.data, emulated.data);
}

#[test]
fn low_memory_does_not_change_output() {
    let px = sample(48, 40);
    let config = EncoderConfig::new().partitions(2);
    let mut frugal = config.clone();
    frugal.low_memory = true;
    let a = EncodeRequest::new(config)
        .encode(&px, PixelLayout::Rgba8, 48, 40)
        .unwrap();
    let b = EncodeRequest::new(frugal)
        .encode(&px, PixelLayout::Rgba8, 48, 40)
        .unwrap();
    assert_eq!(a.data, b.data);
}

#[test]
fn delta_palette_is_exact() {
    let px = four_colors(21, 13);
    let mut config = EncoderConfig::new().lossless(true).exact(true);
    config.use_delta_palette = true;
    let out = EncodeRequest::new(config)
        .encode(&px, PixelLayout::Rgba8, 21, 13)
        .unwrap();
    // Transform byte follows the 5-byte VP8L header.
    let vp8l = out.data.windows(4).position(|w| w == b"VP8L").unwrap();
    assert_eq!(out.data[vp8l + 8 + 5], 0x10);
    let decoded = DecodeRequest::new(&out.data)
        .with_output_layout(PixelLayout::Rgba8)
        .decode()
        .unwrap();
    assert_eq!(decoded.pixels.as_bytes(), &px[..]);
}

#[test]
fn show_compressed_returns_the_decoded_picture() {
    let px = sample(16, 12);
    for lossless in [false, true] {
        let mut config = EncoderConfig::new().lossless(lossless);
        let out = EncodeRequest::new(config.clone())
            .encode(&px, PixelLayout::Rgba8, 16, 12)
            .unwrap();
        assert!(out.compressed.is_none());

        config.show_compressed = true;
        let out = EncodeRequest::new(config)
            .encode(&px, PixelLayout::Rgba8, 16, 12)
            .unwrap();
        let picture = out.compressed.unwrap();
        assert_eq!((picture.width(), picture.height()), (16, 12));
        let original =
            Picture::from_pixels(&px, PixelLayout::Rgba8, 16, 12, None, lossless).unwrap();
        let psnr = measure(&original, &picture, Metric::Psnr).unwrap();
        if lossless {
            assert_eq!(psnr[4], 99.0);
        } else {
            assert!(psnr[4] > 15.0, "{psnr:?}");
        }
    }
}
