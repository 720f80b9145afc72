//! Benchmarks for request identity derivation
//!
//! This benchmark measures:
//! - SHA-256 fingerprinting over typical label photo sizes
//! - Canonical parameter digest and cache key rendering

use ai_analysis_core::cache::CacheKey;
use ai_analysis_core::fingerprint::fingerprint;
use ai_analysis_core::types::{AnalysisParams, AnalysisVariant, ContentItem};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

fn photos(count: usize, size: usize) -> Vec<ContentItem> {
    (0..count)
        .map(|i| ContentItem::new(vec![(i % 251) as u8; size], "image/jpeg"))
        .collect()
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    for size in [64 * 1024, 512 * 1024, 2 * 1024 * 1024] {
        let items = photos(3, size);
        group.throughput(Throughput::Bytes((3 * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| fingerprint(black_box(items)))
        });
    }
    group.finish();
}

fn bench_cache_key(c: &mut Criterion) {
    let items = photos(2, 256 * 1024);
    let fp = fingerprint(&items);
    let plain = AnalysisParams::default();
    let personalized = AnalysisParams::new(AnalysisVariant::Nutrition)
        .with_dietary_preferences(["vegan", "gluten-free", "low-sodium"])
        .with_health_conditions(["hypertension"])
        .with_user_profile(json!({"age": 42, "activity": "moderate", "goals": ["weight"]}))
        .with_language("en");

    c.bench_function("cache_key/default_params", |b| {
        b.iter(|| CacheKey::new(black_box(fp), black_box(&plain)).request_key())
    });
    c.bench_function("cache_key/personalized", |b| {
        b.iter(|| CacheKey::new(black_box(fp), black_box(&personalized)).prefixed("vitai:cache:v1"))
    });
}

criterion_group!(benches, bench_fingerprint, bench_cache_key);
criterion_main!(benches);
