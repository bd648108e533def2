#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let detected = zenwebp_lite::is_webp(data);
    if let Ok(info) = zenwebp_lite::get_info(data) {
        assert!(detected);
        assert!(info.width >= 1 && info.height >= 1);
    }
});
