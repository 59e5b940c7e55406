/// Dispatch overhead of stacked chain layers
///
/// Measures request and metadata calls through 0..16 pass-through layers
/// over an in-memory terminal handler, plus the cost of sealing a prefix.
use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mcp_chain::middleware::MarkTools;
use mcp_chain::{chain, Chain, ChainArg, McpHandler, Result, SharedHandler};
use serde_json::{json, Value};

struct Echo;

#[async_trait]
impl McpHandler for Echo {
    async fn get_metadata(&self) -> Result<Value> {
        Ok(json!({"tools": [{"name": "echo"}, {"name": "other"}]}))
    }

    async fn handle_request(&self, request: Value) -> Result<Value> {
        Ok(json!({"jsonrpc": "2.0", "id": request["id"], "result": {}}))
    }
}

fn pass_through() -> ChainArg {
    ChainArg::transform(|next: SharedHandler, request: Value| async move {
        next.handle_request(request).await
    })
}

fn stacked(depth: usize) -> Chain {
    let mut built = chain();
    for _ in 0..depth {
        built = built.then(pass_through()).unwrap();
    }
    built.seal(Echo).unwrap()
}

fn bench_request_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("RequestDispatch");
    let rt = tokio::runtime::Runtime::new().unwrap();

    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "echo", "arguments": {}}
    });

    for depth in [0usize, 1, 4, 16] {
        let sealed = stacked(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.to_async(&rt).iter(|| async {
                let result = sealed.handle_request(black_box(request.clone())).await;
                black_box(result)
            });
        });
    }

    group.finish();
}

fn bench_metadata(c: &mut Criterion) {
    let mut group = c.benchmark_group("Metadata");
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut built = chain();
    for i in 0..4 {
        built = built
            .with(MarkTools::default().field(format!("mark{i}"), json!(true)))
            .unwrap();
    }
    let sealed = built.seal(Echo).unwrap();

    group.bench_function("four_markers", |b| {
        b.to_async(&rt).iter(|| async {
            let result = sealed.get_metadata().await;
            black_box(result)
        });
    });

    group.finish();
}

fn bench_sealing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sealing");

    for depth in [1usize, 8, 32] {
        let mut prefix = chain();
        for _ in 0..depth {
            prefix = prefix.then(pass_through()).unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(depth), &prefix, |b, prefix| {
            b.iter(|| black_box(prefix.seal(Echo).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_request_dispatch, bench_metadata, bench_sealing);
criterion_main!(benches);
