#![no_main]
use libfuzzer_sys::fuzz_target;
use minnow::Metainfo;

fuzz_target!(|data: &[u8]| {
    // Metainfo parsing should never panic on arbitrary input
    let _ = Metainfo::parse(data);
});
