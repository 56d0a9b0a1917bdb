#![no_main]

use cartridge_rs::{Cartridge, HEADER_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Anything shorter than a header is rejected before any parsing
    if data.len() < HEADER_SIZE {
        assert!(Cartridge::from_bytes(data).is_err());
        return;
    }

    // Try to load - should never panic
    let cartridge = match Cartridge::from_bytes(data) {
        Ok(c) => c,
        Err(_) => return, // Expected for invalid data
    };

    // The streaming loader must agree once the declared size is known to fit
    let streamed = Cartridge::read_from(data).expect("streaming load of a valid buffer");
    assert_eq!(streamed.data(), cartridge.data());

    // Every occupied record points inside the data section
    for record in cartridge.blocks().filter(|r| !r.is_empty()) {
        assert!(cartridge.slice(&record).is_some());
    }

    // Lookups and verification must never panic
    let _ = cartridge.verify();
    let _ = cartridge.get("test.txt");
    let _ = cartridge.get("");
    let _ = cartridge.get("/");
    let _ = cartridge.get("../../../etc/passwd");
});
