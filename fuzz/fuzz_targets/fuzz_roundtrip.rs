#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use zenwebp_lite::{DecodeRequest, EncodeRequest, EncoderConfig, PixelLayout};

#[derive(Debug, Arbitrary)]
struct Input {
    width: u8,
    height: u8,
    quality: u8,
    method: u8,
    lossless: bool,
    pixels: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let (w, h) = (u32::from(input.width % 64) + 1, u32::from(input.height % 64) + 1);
    let needed = (w * h * 4) as usize;
    if input.pixels.len() < needed {
        return;
    }
    let config = EncoderConfig::new()
        .lossless(input.lossless)
        .exact(true)
        .quality(f32::from(input.quality % 101))
        .method(input.method);
    let encoded = EncodeRequest::new(config)
        .encode(&input.pixels[..needed], PixelLayout::Rgba8, w, h)
        .expect("valid input must encode");
    let decoded = DecodeRequest::new(&encoded.data)
        .with_output_layout(PixelLayout::Rgba8)
        .decode()
        .expect("own output must decode");
    assert_eq!((decoded.width(), decoded.height()), (w, h));
    if input.lossless {
        assert_eq!(decoded.pixels.as_bytes(), &input.pixels[..needed]);
    }
});
