use criterion::{black_box, criterion_group, criterion_main, Criterion};
use http::Method;
use tollgate::{BucketRegistry, Route};

fn bench_compile(c: &mut Criterion) {
    let literal = Route::new(Method::GET, "/gateway/bot");
    let message = Route::with_bucket(
        Method::DELETE,
        "/channels/{channel.id}/messages/{message.id}",
        "DELETE /channels/{channel.id}/messages",
    );

    c.bench_function("compile_literal", |b| {
        b.iter(|| black_box(&literal).compile(black_box([("unused", "x")])).unwrap())
    });

    c.bench_function("compile_two_placeholders", |b| {
        b.iter(|| {
            black_box(&message)
                .compile(black_box([("channel.id", "81384788765712384"), ("message.id", "1")]))
                .unwrap()
        })
    });
}

fn bench_registry(c: &mut Criterion) {
    let registry = BucketRegistry::new(5);
    let keys: Vec<String> = (0..1_000).map(|i| format!("/channels/{i}/messages")).collect();
    for key in &keys {
        registry.get_or_create(key).unwrap();
    }

    c.bench_function("registry_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(registry.get_or_create(&keys[i]))
        })
    });

    c.bench_function("registry_snapshot_1k", |b| b.iter(|| black_box(registry.snapshot())));
}

criterion_group!(benches, bench_compile, bench_registry);
criterion_main!(benches);
