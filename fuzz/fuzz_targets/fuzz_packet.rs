#![no_main]

use bidcos_engine::core::packet::Packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Binary form: short input is an error, never a panic
    let _ = Packet::from_bytes(data, true);

    // Hex form: every line parses, possibly with warnings
    let text = String::from_utf8_lossy(data);
    let parsed = Packet::parse(&text, true);
    let reparsed = Packet::parse(&parsed.value.serialize(), false);
    assert!(reparsed.is_clean());
    assert_eq!(reparsed.value, parsed.value);
});
