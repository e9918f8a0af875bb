#![no_main]
use libfuzzer_sys::fuzz_target;
use minnow::bencode::Value;

fuzz_target!(|data: &[u8]| {
    // parse() should never panic on arbitrary input, and every accepted
    // input must re-encode to itself.
    let _ = Value::parse(data);
    if let Ok(value) = Value::parse_exact(data) {
        assert_eq!(value.encode(), data);
    }
});
