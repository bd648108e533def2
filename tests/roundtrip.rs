//! Encode/decode roundtrips through the public API.

use zenwebp_lite::{
    decode, encode_lossless, encode_lossless_with_speed, encode_lossy, encode_near_lossless,
    get_info, BitstreamFormat, DecodeRequest, EncodeRequest, EncoderConfig, ImageMetadata,
    PixelLayout,
};

fn deterministic_noise(w: u32, h: u32, channels: u32) -> Vec<u8> {
    let mut px = vec![0u8; (w * h * channels) as usize];
    let mut seed = 42u64;
    for b in px.iter_mut() {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        *b = (seed >> 33) as u8;
    }
    px
}

fn smooth_rgba(w: u32, h: u32) -> Vec<u8> {
    let mut px = Vec::with_capacity((w * h * 4) as usize);
    for y in 0..h {
        for x in 0..w {
            px.extend_from_slice(&[
                (x * 255 / w) as u8,
                (y * 255 / h) as u8,
                ((x + y) * 127 / (w + h)) as u8,
                255,
            ]);
        }
    }
    px
}

fn decode_rgba(webp: &[u8]) -> Vec<u8> {
    DecodeRequest::new(webp)
        .with_output_layout(PixelLayout::Rgba8)
        .decode()
        .expect("decode failed")
        .pixels
        .as_bytes()
        .to_vec()
}

#[test]
fn red_2x2_lossless() {
    let red = [255u8, 0, 0, 255].repeat(4);
    let webp = encode_lossless(&red, PixelLayout::Rgba8, 2, 2).unwrap();
    let out = DecodeRequest::new(&webp)
        .with_output_layout(PixelLayout::Rgba8)
        .decode()
        .unwrap();
    assert_eq!((out.width(), out.height()), (2, 2));
    for px in out.pixels.as_bytes().chunks_exact(4) {
        assert_eq!(px, [255, 0, 0, 255]);
    }
}

#[test]
fn lossless_noise_is_exact() {
    for (w, h) in [(1, 1), (3, 7), (16, 16), (33, 5)] {
        let px = deterministic_noise(w, h, 4);
        let webp = encode_lossless(&px, PixelLayout::Rgba8, w, h).unwrap();
        assert_eq!(decode_rgba(&webp), px, "{w}x{h}");
    }
}

#[test]
fn lossless_rgb_and_bgr_sources() {
    let rgb = deterministic_noise(9, 4, 3);
    let webp = encode_lossless(&rgb, PixelLayout::Rgb8, 9, 4).unwrap();
    let out = DecodeRequest::new(&webp)
        .with_output_layout(PixelLayout::Rgb8)
        .decode()
        .unwrap();
    assert_eq!(out.pixels.as_bytes(), &rgb[..]);

    let webp = encode_lossless(&rgb, PixelLayout::Bgr8, 9, 4).unwrap();
    let out = DecodeRequest::new(&webp)
        .with_output_layout(PixelLayout::Bgr8)
        .decode()
        .unwrap();
    assert_eq!(out.pixels.as_bytes(), &rgb[..]);
}

#[test]
fn lossless_every_speed_is_exact() {
    let px = deterministic_noise(12, 10, 4);
    let exact: Vec<u8> = px
        .chunks_exact(4)
        .flat_map(|p| if p[3] == 0 { [0; 4] } else { [p[0], p[1], p[2], p[3]] })
        .collect();
    for speed in 0..=9 {
        let webp = encode_lossless_with_speed(&px, PixelLayout::Rgba8, 12, 10, speed).unwrap();
        assert_eq!(decode_rgba(&webp), exact, "speed {speed}");
    }
}

#[test]
fn lossy_keeps_dimensions() {
    for (w, h) in [(1, 1), (2, 3), (17, 9), (40, 33)] {
        for q in [0.0, 50.0, 100.0] {
            let webp = encode_lossy(&smooth_rgba(w, h), PixelLayout::Rgba8, w, h, q).unwrap();
            let info = get_info(&webp).unwrap();
            assert_eq!((info.width, info.height), (w, h));
            assert_eq!(info.format, BitstreamFormat::Lossy);
            let out = decode(&webp).unwrap();
            assert_eq!((out.width(), out.height()), (w, h));
        }
    }
}

#[test]
fn lossy_quality_orders_size() {
    let px = deterministic_noise(48, 48, 4)
        .chunks_exact(4)
        .flat_map(|p| [p[0], p[1], p[2], 255])
        .collect::<Vec<_>>();
    let small = encode_lossy(&px, PixelLayout::Rgba8, 48, 48, 5.0).unwrap();
    let large = encode_lossy(&px, PixelLayout::Rgba8, 48, 48, 100.0).unwrap();
    assert!(small.len() < large.len(), "{} vs {}", small.len(), large.len());
}

#[test]
fn lossy_alpha_survives() {
    let mut px = smooth_rgba(20, 12);
    for (i, p) in px.chunks_exact_mut(4).enumerate() {
        p[3] = if i % 3 == 0 { 0 } else { 255 };
    }
    let webp = encode_lossy(&px, PixelLayout::Rgba8, 20, 12, 75.0).unwrap();
    let info = get_info(&webp).unwrap();
    assert!(info.has_alpha);
    let decoded = decode_rgba(&webp);
    let alpha: Vec<u8> = decoded.chunks_exact(4).map(|p| p[3]).collect();
    let expected: Vec<u8> = px.chunks_exact(4).map(|p| p[3]).collect();
    assert_eq!(alpha, expected);
}

#[test]
fn near_lossless_keeps_dimensions_and_alpha() {
    let px = smooth_rgba(24, 24);
    let webp = encode_near_lossless(&px, PixelLayout::Rgba8, 24, 24, 40, 6).unwrap();
    let info = get_info(&webp).unwrap();
    assert_eq!(info.format, BitstreamFormat::Lossless);
    let decoded = decode_rgba(&webp);
    assert!(decoded.chunks_exact(4).all(|p| p[3] == 255));
}

#[test]
fn metadata_roundtrips_through_features() {
    let exif = b"Exif\0\0MM";
    let webp = EncodeRequest::new(EncoderConfig::new().lossless(true))
        .with_metadata(ImageMetadata {
            icc_profile: None,
            exif: Some(exif),
            xmp: None,
        })
        .encode(&smooth_rgba(5, 5), PixelLayout::Rgba8, 5, 5)
        .unwrap()
        .data;
    let info = get_info(&webp).unwrap();
    assert!(info.has_exif && !info.has_icc && !info.has_xmp);
    assert_eq!(info.format, BitstreamFormat::Lossless);
    assert_eq!(decode_rgba(&webp), smooth_rgba(5, 5));
}
