//! Benchmark tests for tvplayer-core operations
//!
//! Run with: cargo bench -p tvplayer-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Map, Value};

use tvplayer_core::analytics::{kava_defaults, KavaParams};
use tvplayer_core::config::{merge_plugin_configs, PluginConfigs};
use tvplayer_core::token::TokenResolver;
use tvplayer_core::types::*;

// ============================================================================
// Helpers
// ============================================================================

fn create_test_entry(metadata_count: usize) -> MediaEntry {
    let mut entry = MediaEntry::new("1_abc123")
        .with_name("Benchmark entry")
        .with_media_type(MediaEntryType::Vod);
    for i in 0..metadata_count {
        entry = entry.with_metadata(format!("meta{}", i), format!("value-{}", i));
    }
    entry
}

fn create_resolver(metadata_count: usize) -> TokenResolver {
    let mut resolver = TokenResolver::new();
    resolver.refresh_entry(&create_test_entry(metadata_count));
    resolver.refresh_pair("partnerId", "100");
    resolver.refresh_pair("ks", "djJ8MTAwfAbc");
    resolver
}

fn create_plugin_configs(plugin_count: usize, keys_per_plugin: usize) -> PluginConfigs {
    (0..plugin_count)
        .map(|p| {
            let config: Map<String, Value> = (0..keys_per_plugin)
                .map(|k| (format!("key{}", k), json!(format!("{{{{meta{}}}}}-{{{{entryId}}}}", k))))
                .collect();
            (format!("plugin{}", p), Value::Object(config))
        })
        .collect()
}

// ============================================================================
// Token Resolution Benchmarks
// ============================================================================

fn bench_resolve_str(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_resolve_str");
    let resolver = create_resolver(20);

    group.bench_function("no_tokens", |b| {
        let text = "https://ads.example.com/vast?cust_params=section%3Dsports&correlator=1";
        b.iter(|| resolver.resolve_str(black_box(text)))
    });

    group.bench_function("three_tokens", |b| {
        let text = "https://ads.example.com/vast?entry={{entryId}}&pid={{partnerId}}&ks={{ks}}";
        b.iter(|| resolver.resolve_str(black_box(text)))
    });

    group.bench_function("unknown_tokens", |b| {
        let text = "{{userId}}/{{deviceId}}/{{sessionId}}/{{entryId}}";
        b.iter(|| resolver.resolve_str(black_box(text)))
    });

    group.finish();
}

fn bench_resolve_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_resolve_value");
    let resolver = create_resolver(20);

    for keys in [4, 16, 64] {
        let configs = create_plugin_configs(1, keys).to_json();
        group.bench_with_input(BenchmarkId::new("keys", keys), &configs, |b, configs| {
            b.iter(|| resolver.resolve_value(black_box(configs)))
        });
    }

    group.finish();
}

fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_refresh");

    for metadata in [0, 10, 100] {
        let entry = create_test_entry(metadata);
        group.bench_with_input(BenchmarkId::new("metadata", metadata), &entry, |b, entry| {
            b.iter(|| {
                let mut resolver = TokenResolver::new();
                resolver.refresh_entry(black_box(entry));
                resolver
            })
        });
    }

    group.finish();
}

// ============================================================================
// Merge Benchmarks
// ============================================================================

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("plugin_merge");

    let mut defaults = PluginConfigs::new();
    defaults.set(
        "kava",
        kava_defaults(&KavaParams {
            partner_id: Some(100),
            ui_conf_id: Some(41),
            entry_id: Some("1_abc123"),
            ks: None,
            referrer: Some("app://bench"),
        }),
    );

    for plugins in [2, 8, 32] {
        let app = create_plugin_configs(plugins, 8);
        let remote = create_plugin_configs(plugins * 2, 12).to_json();
        group.bench_with_input(BenchmarkId::new("plugins", plugins), &plugins, |b, _| {
            b.iter(|| merge_plugin_configs(black_box(&app), remote.as_object(), &defaults))
        });
    }

    group.bench_function("merge_and_resolve", |b| {
        let app = create_plugin_configs(8, 8);
        let remote = create_plugin_configs(8, 12).to_json();
        let resolver = create_resolver(8);
        b.iter(|| merge_plugin_configs(&app, remote.as_object(), &defaults).resolve(&resolver))
    });

    group.finish();
}

// ============================================================================
// Entry Benchmarks
// ============================================================================

fn bench_entry(c: &mut Criterion) {
    let mut group = c.benchmark_group("media_entry");

    group.bench_function("retain_preferred_format", |b| {
        let entry = (0..12).fold(MediaEntry::new("1_abc"), |entry, i| {
            let format = if i % 2 == 0 { MediaFormat::Hls } else { MediaFormat::Dash };
            entry.with_source(MediaSource::new(format!("s{}", i), "https://cdn/a", format))
        });
        b.iter(|| {
            let mut entry = entry.clone();
            entry.retain_preferred_format(black_box(MediaFormat::Dash));
            entry
        })
    });

    group.bench_function("format_from_url", |b| {
        b.iter(|| MediaFormat::from_url(black_box("https://cdn.example.com/path/master.m3u8?token=abc")))
    });

    group.finish();
}

criterion_group!(
    token_benches,
    bench_resolve_str,
    bench_resolve_value,
    bench_refresh,
);

criterion_group!(
    merge_benches,
    bench_merge,
);

criterion_group!(
    entry_benches,
    bench_entry,
);

criterion_main!(
    token_benches,
    merge_benches,
    entry_benches,
);
