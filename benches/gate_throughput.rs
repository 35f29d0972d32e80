//! Exclusivity gate benchmarks.
//!
//! Measures reservation round trips and the cost of a contended reserve.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use node_orchestrator::gate::ExclusivityGate;
use node_orchestrator::managers::WorkloadKind;
use node_orchestrator::proxy::{classify, default_rules};

fn bench_reserve_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate_reserve_release");
    group.throughput(Throughput::Elements(1));

    for kind in WorkloadKind::ALL {
        let gate = ExclusivityGate::new();
        group.bench_function(BenchmarkId::new("round_trip", kind.as_str()), |b| {
            b.iter(|| {
                gate.check_and_reserve(black_box(kind)).ok();
                gate.release(black_box(kind));
            })
        });
    }

    group.finish();
}

fn bench_conflict(c: &mut Criterion) {
    let gate = ExclusivityGate::new();
    gate.check_and_reserve(WorkloadKind::Inference).ok();

    c.bench_function("gate_conflict", |b| {
        b.iter(|| black_box(gate.check_and_reserve(black_box(WorkloadKind::Mining))).is_err())
    });
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate_contended");

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(threads as u64 * 1000));
        group.bench_function(BenchmarkId::new("threads", threads), |b| {
            b.iter(|| {
                let gate = Arc::new(ExclusivityGate::new());
                let handles: Vec<_> = (0..threads)
                    .map(|i| {
                        let gate = Arc::clone(&gate);
                        let kind = WorkloadKind::ALL[i % WorkloadKind::ALL.len()];
                        std::thread::spawn(move || {
                            for _ in 0..1000 {
                                if gate.check_and_reserve(kind).is_ok() {
                                    gate.release(kind);
                                }
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().ok();
                }
            })
        });
    }

    group.finish();
}

fn bench_request_routing(c: &mut Criterion) {
    let rules = default_rules();
    let paths = ["/health", "/api/v1/inference/start", "/v1/chat/completions", "/completions?n=2"];

    let mut group = c.benchmark_group("request_routing");
    group.throughput(Throughput::Elements(paths.len() as u64));
    group.bench_function("classify", |b| {
        b.iter(|| {
            for path in paths {
                black_box(classify(black_box(path)));
            }
        })
    });
    group.bench_function("legacy_rewrite", |b| {
        b.iter(|| {
            for path in paths {
                black_box(rules.iter().find_map(|rule| rule.apply(black_box(path))));
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_reserve_release, bench_conflict, bench_contended, bench_request_routing);
criterion_main!(benches);
