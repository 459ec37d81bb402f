//! Fuzz target for threshold parsing.
//!
//! Parsing arbitrary text as a signing threshold must return an error or a
//! threshold whose canonical form parses back to the same value.

#![no_main]

use aid_core::Threshold;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(threshold) = input.parse::<Threshold>() {
            let sith = threshold.sith();
            assert_eq!(Threshold::parse(&sith).ok(), Some(threshold.clone()));
            let _ = threshold.validate(threshold.size());
        }
    }

    // JSON forms: numbers, lists and lists of lists
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = Threshold::parse(&value);
    }
});
