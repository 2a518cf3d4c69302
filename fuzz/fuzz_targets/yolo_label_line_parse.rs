//! Fuzz target for YOLO single-line label parsing.
//!
//! Feeds arbitrary UTF-8 text to the YOLO label line parser. Lines with
//! extra tokens, bad numbers or huge class ids must come back as errors.

#![no_main]

use detconv::ir::io_yolo::fuzz_parse_label_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_parse_label_line(line);
});
