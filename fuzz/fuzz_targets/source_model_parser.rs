#![no_main]

use libfuzzer_sys::fuzz_target;
use runhook::report_paths::{decode_safe_file_name, safe_file_name};
use runhook::source_model::SourceModel;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Loading must reject bad input with an error, never panic
        let _ = SourceModel::from_json_str(input);

        assert_eq!(
            decode_safe_file_name(&safe_file_name(input)).as_deref(),
            Some(input)
        );
    }
});
