//! Aggregation hot path benchmarks.
//!
//! Decode, translate and merge are all on the aggregator's single task, so
//! their combined cost bounds how fast the envelope queue drains.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowstat::metrics::storage::MetricTable;
use flowstat::metrics::translate::translate;
use flowstat::metrics::Catalog;
use flowstat::receiver::envelope::StatEnvelope;
use serde_json::json;

fn accounting_frame(flow: usize, nodes: usize) -> String {
    let nodes: Vec<_> = (0..nodes)
        .map(|n| {
            json!({
                "Label": format!("Node{}", n),
                "Type": "ComputeNode",
                "TotalElapsedTime": 1200,
                "MaximumElapsedTime": 300,
                "MinimumElapsedTime": 10,
                "TotalCPUTime": 900,
                "CountOfInvocations": 40,
                "NumberOfInputTerminals": 1,
                "NumberOfOutputTerminals": 2
            })
        })
        .collect();

    json!({
        "event": 0,
        "data": {
            "WMQIStatisticsAccounting": {
                "MessageFlow": {
                    "ExecutionGroupName": "is",
                    "ApplicationName": "app",
                    "MessageFlowName": format!("Flow{}", flow),
                    "TotalElapsedTime": 50000,
                    "MaximumElapsedTime": 4000,
                    "MinimumElapsedTime": 100,
                    "TotalCPUTime": 30000,
                    "TotalInputMessages": 40,
                    "TotalSizeOfInputMessages": 81920,
                    "NumberOfThreadsInPool": 4,
                    "TotalNumberOfCommits": 40,
                    "TotalNumberOfBackouts": 0
                },
                "Nodes": nodes
            }
        }
    })
    .to_string()
}

/// Decode of one accounting frame
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for nodes in [0, 10, 50] {
        let frame = accounting_frame(0, nodes);
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("accounting", nodes), &frame, |b, frame| {
            b.iter(|| black_box(StatEnvelope::decode(black_box(frame))));
        });
    }

    group.finish();
}

/// Translate plus merge, steady state over a fixed set of flows
fn bench_translate_and_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("translate_and_merge");
    let catalog = Catalog::builtin();

    for flows in [1, 100] {
        let envelopes: Vec<StatEnvelope> = (0..flows)
            .map(|f| StatEnvelope::decode(&accounting_frame(f, 10)).expect("bench frame decodes"))
            .collect();

        group.throughput(Throughput::Elements(flows as u64));
        group.bench_with_input(BenchmarkId::new("flows", flows), &envelopes, |b, envelopes| {
            let mut table = MetricTable::seeded(&catalog);
            b.iter(|| {
                for envelope in envelopes {
                    let updates = translate(envelope, &catalog).expect("bench frame translates");
                    black_box(table.apply(updates));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_translate_and_merge);
criterion_main!(benches);
