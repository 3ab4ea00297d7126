#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_client_fuzz::SseParser;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes (as lossy UTF-8, same as a real SSE byte stream
    // decoded chunk-by-chunk) and drain every event the parser thinks it
    // found. Must never panic, no matter how the `\n\n` boundaries land.
    let mut parser = SseParser::default();
    parser.feed(&String::from_utf8_lossy(data));
    while parser.pop_event().is_some() {}
});
