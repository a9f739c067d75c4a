#![no_main]

use doctrace::filter::Preset;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // parsing either builds a preset or reports a filter error
        if let Ok(preset) = Preset::from_expr(input) {
            let _ = preset.excludes(&["app".to_string(), "module".to_string()], "function", 3);
        }
    }
});
