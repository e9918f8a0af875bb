#![no_main]
use libfuzzer_sys::fuzz_target;
use minnow::Message;

fuzz_target!(|data: &[u8]| {
    // Wire message decoding should never panic on arbitrary payloads
    let _ = Message::decode(data);
});
