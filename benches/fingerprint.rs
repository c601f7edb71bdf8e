use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use videogate::fingerprint::fingerprint;
use videogate::recipe::{Mode, TransformRecipe};

fn simple_recipe() -> TransformRecipe {
    let mut params = HashMap::new();
    params.insert("mode".to_string(), "video".to_string());
    params.insert("w".to_string(), "720".to_string());
    params.insert("h".to_string(), "480".to_string());
    TransformRecipe::from_query("/videos/sample.mp4", &params).unwrap()
}

fn derivative_recipe() -> TransformRecipe {
    let mut params = HashMap::new();
    params.insert("mode".to_string(), "video".to_string());
    params.insert("derivative".to_string(), "thumbnail".to_string());
    TransformRecipe::from_query("/videos/sample.mp4", &params).unwrap()
}

fn custom_data_recipe(pairs: usize) -> TransformRecipe {
    let mut params = HashMap::new();
    params.insert("mode".to_string(), "video".to_string());
    params.insert("w".to_string(), "720".to_string());
    for i in 0..pairs {
        params.insert(format!("custom-key-{}", i), format!("custom-value-{}", i));
    }
    TransformRecipe::from_query("/videos/long/nested/path/sample.mp4", &params).unwrap()
}

fn bench_simple(c: &mut Criterion) {
    let recipe = simple_recipe();
    c.bench_function("fingerprint_simple", |b| {
        b.iter(|| fingerprint(black_box(&recipe)));
    });
}

fn bench_derivative(c: &mut Criterion) {
    let recipe = derivative_recipe();
    c.bench_function("fingerprint_derivative", |b| {
        b.iter(|| fingerprint(black_box(&recipe)));
    });
}

fn bench_custom_data_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint_custom_data");
    for pairs in [1, 5, 20, 50] {
        let recipe = custom_data_recipe(pairs);
        group.bench_with_input(BenchmarkId::new("pairs", pairs), &recipe, |b, recipe| {
            b.iter(|| fingerprint(black_box(recipe)));
        });
    }
    group.finish();
}

fn bench_audio_mode(c: &mut Criterion) {
    let recipe = TransformRecipe::from_minimal("/podcasts/episode-1.mp4".to_string(), Mode::Audio);
    c.bench_function("fingerprint_audio", |b| {
        b.iter(|| fingerprint(black_box(&recipe)));
    });
}

criterion_group!(
    benches,
    bench_simple,
    bench_derivative,
    bench_custom_data_scaling,
    bench_audio_mode,
);
criterion_main!(benches);
