//! Fuzz target for COCO JSON parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the COCO JSON parser,
//! checking that malformed documents fail with an error instead of a panic.
//!
//! Run with:
//!   cargo +nightly fuzz run coco_json_parse
//!
//! Or with a corpus:
//!   cargo +nightly fuzz run coco_json_parse fuzz/corpus/coco_json_parse/

#![no_main]

use detconv::ir::io_coco_json::from_coco_slice;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // 10MB is generous for a COCO annotation file.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    // Errors are expected; only panics and hangs are findings.
    let _ = from_coco_slice(data);
});
