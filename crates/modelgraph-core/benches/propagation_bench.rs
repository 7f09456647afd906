use criterion::{criterion_group, criterion_main, Bencher, BenchmarkId, Criterion, Throughput};
use modelgraph_core::{ObservableList, PropagationManager};
use std::hint::black_box;

fn chain(n: usize) -> PropagationManager {
    let manager = PropagationManager::new();
    for i in 1..n {
        let source = format!("p{}", i - 1);
        manager.graph().depend_on(&format!("p{}", i), &[source.as_str()]);
    }
    manager
}

fn fan_out(n: usize) -> PropagationManager {
    let manager = PropagationManager::new();
    for i in 0..n {
        manager.graph().depend_on(&format!("d{}", i), &["root"]);
        manager.graph().depend_on("sink", &[format!("d{}", i).as_str()]);
    }
    manager
}

fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation");
    for &n in &[10usize, 100, 1_000] {
        let linear = chain(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("chain", n), &n, |b: &mut Bencher, _| {
            b.iter(|| black_box(linear.impacted(&["p0"])))
        });

        let wide = fan_out(n);
        group.bench_with_input(BenchmarkId::new("fan_out", n), &n, |b: &mut Bencher, _| {
            b.iter(|| black_box(wide.impacted(&["root"])))
        });
    }
    group.finish();
}

fn bench_list_revert(c: &mut Criterion) {
    c.bench_function("list_push_then_revert_1000", |b| {
        b.iter(|| {
            let mut list = ObservableList::new();
            let changes: Vec<_> = (0..1_000).map(|i| list.push(i)).collect();
            for change in changes.iter().rev() {
                list.revert(change).unwrap();
            }
            black_box(list)
        })
    });
}

criterion_group!(benches, bench_propagation, bench_list_revert);
criterion_main!(benches);
