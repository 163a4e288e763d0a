use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ct_core::{Domain, Variable};
use ct_graph::{CausalDag, EstimandIdentifier};
use std::hint::black_box;

/// `x -> y` with `n` confounders `c_i -> x, c_i -> y` chained `c_i -> c_{i+1}`.
fn make_confounded(n: usize) -> CausalDag {
    let mut dag = CausalDag::new();
    dag.add_variable(Variable::input("x", Domain::continuous())).unwrap();
    dag.add_variable(Variable::output("y", Domain::continuous())).unwrap();
    for i in 0..n {
        dag.add_variable(Variable::covariate(format!("c{i:03}"), Domain::continuous())).unwrap();
    }
    dag.add_edge("x", "y").unwrap();
    for i in 0..n {
        let c = format!("c{i:03}");
        dag.add_edge(&c, "x").unwrap();
        dag.add_edge(&c, "y").unwrap();
        if i + 1 < n {
            dag.add_edge(&c, &format!("c{:03}", i + 1)).unwrap();
        }
    }
    dag
}

fn bench_identify(c: &mut Criterion) {
    let mut group = c.benchmark_group("identification");

    for n in [2usize, 4, 8, 16] {
        let dag = make_confounded(n);
        group.bench_with_input(BenchmarkId::new("backdoor", n), &dag, |b, dag| {
            let id = EstimandIdentifier::new(dag);
            b.iter(|| black_box(id.identify(["x"], ["y"]).map(|e| e.len())))
        });
        // x and y are adjacent in the full graph; the back-door graph has to
        // walk every confounder path.
        let backdoor_graph = dag.without_outgoing_edges(["x"]).unwrap();
        group.bench_with_input(BenchmarkId::new("d_separation", n), &backdoor_graph, |b, g| {
            let all: Vec<String> = (0..n).map(|i| format!("c{i:03}")).collect();
            b.iter(|| black_box(g.is_d_separated(["x"], ["y"], &all)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_identify);
criterion_main!(benches);
