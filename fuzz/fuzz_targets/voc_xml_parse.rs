//! Fuzz target for VOC XML parsing.
//!
//! Feeds arbitrary bytes to the single-file VOC parser, which must turn
//! anything that is not a well-formed `<annotation>` into an error.

#![no_main]

use detconv::ir::io_voc_xml::from_voc_xml_slice;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = from_voc_xml_slice(data);
});
