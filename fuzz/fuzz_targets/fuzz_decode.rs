#![no_main]

use libfuzzer_sys::fuzz_target;
use zenwebp_lite::{CropRect, DecodeOptions, DecodeRequest, Limits, PixelLayout};

fuzz_target!(|data: &[u8]| {
    let limits = Limits::none()
        .with_max_pixels(1 << 22)
        .with_max_memory(64 << 20);
    if let Ok(out) = DecodeRequest::new(data).with_limits(&limits).decode() {
        let info = zenwebp_lite::get_info(data).expect("decodable input must probe");
        assert_eq!((out.width(), out.height()), (info.width, info.height));
    }

    let options = DecodeOptions::new()
        .crop(CropRect::new(1, 1, 7, 5))
        .scale(3, 9)
        .flip(true)
        .dithering_strength(50);
    let _ = DecodeRequest::new(data)
        .with_options(options)
        .with_output_layout(PixelLayout::Rgb8)
        .with_limits(&limits)
        .decode();
});
