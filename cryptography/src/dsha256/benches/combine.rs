use criterion::{criterion_group, Criterion};
use ipld_bitcoin_cryptography::{hash, DblSha256, Hasher};

fn bench_combine(c: &mut Criterion) {
    let left = hash(b"left");
    let right = hash(b"right");
    let mut hasher = DblSha256::new();
    c.bench_function(&format!("{}/merkle_node", module_path!()), |b| {
        b.iter(|| {
            hasher.update(&left);
            hasher.update(&right);
            hasher.finalize()
        });
    });
}

criterion_group!(benches, bench_combine);
