#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The decoder must never panic on arbitrary bytes: malformed input is a
    // silent skip, well-formed input yields a finite-field frame.
    if let Some(bartrack_core::Frame::Data(sample)) = bartrack_core::frames::decode(data, 0) {
        assert!(sample.is_valid());
    }
});
