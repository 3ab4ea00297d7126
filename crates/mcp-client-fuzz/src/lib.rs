//! Fuzzing library for mcp-client.
//!
//! Re-exports the pieces the fuzz targets exercise directly: the JSON-RPC
//! frame classifier, the SSE event parser, and the wire models servers send
//! over both.
//!
//! # Usage
//!
//! ```bash
//! cd crates/mcp-client-fuzz
//! cargo +nightly fuzz run fuzz_json_object -- -max_total_time=60
//! ```

pub use mcp_client::models;
pub use mcp_client::rpc;
pub use mcp_client::transport::sse::SseParser;
