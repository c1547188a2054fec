use criterion::{black_box, BenchmarkId, Criterion, criterion_group, criterion_main};
use distmat::parallel::SerialComm;
use distmat::{BasicRowMatrix, BlockMap, CsrMatrix, MultiVector};

fn laplacian(n: usize) -> CsrMatrix {
    let rows: Vec<Vec<(usize, f64)>> = (0..n)
        .map(|i| {
            let mut row = vec![(i, 2.0)];
            if i > 0 { row.push((i - 1, -1.0)); }
            if i + 1 < n { row.push((i + 1, -1.0)); }
            row
        })
        .collect();
    CsrMatrix::from_rows(n, &rows).unwrap()
}

fn bench_multiply(c: &mut Criterion) {
    let n = 100_000;
    let map = BlockMap::linear(n, SerialComm);
    let a = BasicRowMatrix::new(laplacian(n), map.clone(), map.clone()).unwrap();

    let mut group = c.benchmark_group("multiply");
    for nv in [1usize, 4] {
        let x = MultiVector::from_fn(map.clone(), nv, |g, k| ((g as f64) + k as f64).sin());
        let mut y = MultiVector::new(map.clone(), nv);
        group.bench_with_input(BenchmarkId::new("forward", nv), &nv, |ben, _| {
            ben.iter(|| a.multiply(false, black_box(&x), black_box(&mut y)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("transpose", nv), &nv, |ben, _| {
            ben.iter(|| a.multiply(true, black_box(&x), black_box(&mut y)).unwrap())
        });
    }
    group.finish();

    // small enough that the dense faer product is a fair reference point
    let n = 500;
    let small = laplacian(n);
    let dense = small.to_dense();
    let map = BlockMap::linear(n, SerialComm);
    let a = BasicRowMatrix::new(small, map.clone(), map.clone()).unwrap();
    let x = MultiVector::from_fn(map.clone(), 1, |g, _| (g as f64).cos());
    let mut y = MultiVector::new(map, 1);
    let x_mat = x.to_mat();

    c.bench_function("distmat multiply n=500", |ben| {
        ben.iter(|| a.multiply(false, black_box(&x), black_box(&mut y)).unwrap())
    });
    c.bench_function("faer dense product n=500", |ben| {
        ben.iter(|| black_box(&dense * &x_mat))
    });
}

criterion_group!(benches, bench_multiply);
criterion_main!(benches);
