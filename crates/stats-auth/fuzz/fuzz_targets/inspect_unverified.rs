#![no_main]

use common::jwt::{inspect_unverified, MAX_JWT_SIZE_BYTES};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(token) = std::str::from_utf8(data) else {
        return;
    };

    // Must never panic; anything accepted must satisfy the pre-lookup checks
    if let Ok(unverified) = inspect_unverified(token) {
        assert!(token.len() <= MAX_JWT_SIZE_BYTES);
        assert_eq!(token.split('.').count(), 3);
        assert!(!unverified.kid.is_empty());
    }
});
