//! Benchmarks for the JSON-RPC codec (spec.md §4.A): every transport runs
//! `classify` on each inbound line and serializes a request/notification on
//! every outbound call, so its cost is on the hot path of every RPC.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mcp_client::rpc::{classify, JsonRpcNotification, JsonRpcRequest};

fn bench_encode_request(c: &mut Criterion) {
    c.bench_function("encode_request", |b| {
        b.iter(|| {
            let req = JsonRpcRequest::new(
                black_box(42),
                black_box("tools/call"),
                black_box(serde_json::json!({"name": "search", "arguments": {"query": "rust async runtimes"}})),
            );
            black_box(serde_json::to_string(&req).unwrap())
        });
    });
}

fn bench_encode_notification(c: &mut Criterion) {
    c.bench_function("encode_notification", |b| {
        b.iter(|| {
            let note = JsonRpcNotification::new(
                black_box("notifications/progress"),
                black_box(serde_json::json!({"progressToken": "abc", "progress": 50, "total": 100})),
            );
            black_box(serde_json::to_string(&note).unwrap())
        });
    });
}

fn bench_classify_response(c: &mut Criterion) {
    let line = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 7,
        "result": {"tools": [{"name": "search", "inputSchema": {"type": "object"}}]},
    });
    c.bench_function("classify_response", |b| {
        b.iter(|| black_box(classify(black_box(&line)).unwrap()));
    });
}

fn bench_classify_server_request(c: &mut Criterion) {
    let line = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "elicitation/create",
        "params": {"message": "confirm?", "requestedSchema": {"type": "object"}},
    });
    c.bench_function("classify_server_request", |b| {
        b.iter(|| black_box(classify(black_box(&line)).unwrap()));
    });
}

fn bench_classify_notification(c: &mut Criterion) {
    let line = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "notifications/message",
        "params": {"level": "info", "data": "server started"},
    });
    c.bench_function("classify_notification", |b| {
        b.iter(|| black_box(classify(black_box(&line)).unwrap()));
    });
}

criterion_group!(
    codec,
    bench_encode_request,
    bench_encode_notification,
    bench_classify_response,
    bench_classify_server_request,
    bench_classify_notification,
);
criterion_main!(codec);
