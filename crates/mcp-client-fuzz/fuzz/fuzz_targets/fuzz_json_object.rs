#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_client_fuzz::models::{Prompt, Resource, Tool};

fuzz_target!(|data: &[u8]| {
    // Every MCP wire model must deserialize-or-reject arbitrary JSON without
    // panicking, since servers are untrusted input.
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = serde_json::from_value::<Tool>(json.clone());
        let _ = serde_json::from_value::<Prompt>(json.clone());
        let _ = serde_json::from_value::<Resource>(json);
    }
});
