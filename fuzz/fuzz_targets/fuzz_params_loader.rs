#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parameter blobs come from disk; parsing and validation must reject
    // garbage gracefully, never panic.
    match toml::from_str::<bartrack_config::UserParams>(data) {
        Ok(params) => {
            let _ = params.validate();
        }
        Err(_e) => {
            // parse error is acceptable
        }
    }
});
