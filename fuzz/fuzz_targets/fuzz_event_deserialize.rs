//! Fuzz target for key event deserialization.
//!
//! Decoding arbitrary JSON as an event and re-encoding it must never panic.

#![no_main]

use aid_core::Event;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(event) = serde_json::from_slice::<Event>(data) {
        let _ = event.canonicalize();
        let _ = event.verify_digest();
        let _ = aid_core::KeyState::from_inception(&event);
    }
});
