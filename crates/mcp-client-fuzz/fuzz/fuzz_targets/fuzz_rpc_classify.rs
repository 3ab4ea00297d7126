#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_client_fuzz::rpc::classify;

fuzz_target!(|data: &[u8]| {
    // classify() must never panic on any well-formed-or-not JSON object,
    // regardless of which of the three frame shapes (or none) it matches.
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = classify(&value);
    }
});
