//! Benchmarks for the dependency resolver.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use garnet_resolver::{
    Constraint, Dependency, Index, LockedSpecs, MemoryIndex, PackageName, Platform, Query,
    Resolver, ResolverConfig, SourceId, SourceMap, Version,
};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Generate a synthetic registry. Dependencies only point at packages with
/// a higher index, so the graph is acyclic.
fn generate_registry(
    num_packages: usize,
    versions_per_package: usize,
    deps_per_version: usize,
) -> MemoryIndex {
    let index = MemoryIndex::new(SourceId::registry("https://gems.example.org/").unwrap());
    let mut rng = StdRng::seed_from_u64(42);

    for pkg_idx in 0..num_packages {
        let name = format!("gem{pkg_idx}");
        for v in 0..versions_per_package {
            let version = format!("{}.{}.0", v / 10 + 1, v % 10);

            let mut deps = Vec::new();
            if pkg_idx + 1 < num_packages {
                for _ in 0..deps_per_version {
                    let dep_idx = rng.gen_range(pkg_idx + 1..num_packages);
                    let constraint = match rng.gen_range(0..3) {
                        0 => ">= 1.0".to_string(),
                        1 => format!("~> 1.{}", rng.gen_range(0..versions_per_package.min(10))),
                        _ => format!("< 1.{}", rng.gen_range(1..=versions_per_package.min(10))),
                    };
                    deps.push((format!("gem{dep_idx}"), constraint));
                }
            }

            let deps_refs: Vec<(&str, &str)> =
                deps.iter().map(|(n, c)| (n.as_str(), c.as_str())).collect();
            index.add_version(&name, &version, deps_refs).unwrap();
        }
    }

    index
}

/// Honour `RUST_LOG` while benchmarking; warnings only by default.
fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::WARN.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}

fn roots(count: usize) -> Vec<Dependency> {
    (0..count)
        .map(|i| Dependency::parse(&format!("gem{i}"), ">= 1.0").unwrap())
        .collect()
}

fn resolver(index: MemoryIndex) -> Resolver {
    let config = ResolverConfig {
        max_iterations: 1_000_000,
        ..ResolverConfig::default()
    };
    Resolver::new(SourceMap::new().with_source(Arc::new(index)), config)
}

/// Benchmark version parsing.
fn bench_version_parsing(c: &mut Criterion) {
    let versions = [
        "1.0.0",
        "1.2.3",
        "7.0.4.1",
        "1.0.0.alpha",
        "3.1.0.beta1",
        "2.0.0.rc2",
        "1.16.0",
        "0.0.1",
    ];

    c.bench_function("version_parse", |b| {
        b.iter(|| {
            for v in &versions {
                black_box(Version::parse(v).ok());
            }
        });
    });
}

/// Benchmark constraint parsing.
fn bench_constraint_parsing(c: &mut Criterion) {
    let constraints = [
        "~> 1.0",
        "~> 2.2.8",
        ">= 1.0, < 2.0",
        "= 7.0.4",
        "!= 1.5",
        ">= 3.1.0.beta1",
        "> 0",
    ];

    c.bench_function("constraint_parse", |b| {
        b.iter(|| {
            for c in &constraints {
                black_box(Constraint::parse(c).ok());
            }
        });
    });
}

/// Benchmark constraint matching.
fn bench_constraint_matching(c: &mut Criterion) {
    let constraint = Constraint::parse("~> 1.4").unwrap();
    let versions: Vec<_> = (0..100)
        .map(|i| Version::parse(&format!("{}.{}.0", i / 10, i % 10)).unwrap())
        .collect();

    c.bench_function("constraint_match_100", |b| {
        b.iter(|| {
            for v in &versions {
                black_box(constraint.satisfied_by(v));
            }
        });
    });
}

/// Benchmark index search.
fn bench_index_search(c: &mut Criterion) {
    let index = generate_registry(100, 10, 3);
    let names: Vec<_> = (0..100).map(|i| PackageName::new(format!("gem{i}"))).collect();
    let constraint = Constraint::parse(">= 1.3").unwrap();

    c.bench_function("index_search_100", |b| {
        b.iter(|| {
            for name in &names {
                let query = Query {
                    name,
                    constraint: &constraint,
                    platform: &Platform::Generic,
                    prerelease: false,
                };
                black_box(index.search(&query));
            }
        });
    });
}

/// Benchmark resolution with different graph sizes.
fn bench_resolution(c: &mut Criterion) {
    init_tracing();
    let mut group = c.benchmark_group("resolution");

    for size in [10, 50, 100, 500] {
        let resolver = resolver(generate_registry(size, 5, 2));
        let deps = roots(3);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("packages", size), &size, |b, _| {
            b.iter(|| black_box(resolver.resolve(&deps)));
        });
    }

    group.finish();
}

/// Benchmark re-resolving against a lock of the previous result.
fn bench_locked_resolution(c: &mut Criterion) {
    let deps = roots(3);
    let first = resolver(generate_registry(100, 10, 2))
        .resolve(&deps)
        .ok()
        .map(|resolution| LockedSpecs::from_resolution(&resolution))
        .unwrap_or_default();
    let resolver = resolver(generate_registry(100, 10, 2)).with_locked(first);

    c.bench_function("resolution_locked_100", |b| {
        b.iter(|| black_box(resolver.resolve(&deps)));
    });
}

/// Benchmark a resolution that has to backtrack through every version.
fn bench_conflict(c: &mut Criterion) {
    let index = MemoryIndex::new(SourceId::path("/gems"));
    for v in 0..20 {
        let version = format!("1.{v}.0");
        index
            .add_version("left", &version, vec![("shared", "= 1.0")])
            .unwrap();
        index
            .add_version("right", &version, vec![("shared", "= 2.0")])
            .unwrap();
    }
    index.add_version("shared", "1.0", vec![]).unwrap();
    index.add_version("shared", "2.0", vec![]).unwrap();
    let resolver = resolver(index);
    let deps = vec![
        Dependency::parse("left", ">= 1.0").unwrap(),
        Dependency::parse("right", ">= 1.0").unwrap(),
    ];

    c.bench_function("resolution_conflict_20", |b| {
        b.iter(|| black_box(resolver.resolve(&deps).is_err()));
    });
}

/// Benchmark independent resolutions run in parallel.
fn bench_resolve_all(c: &mut Criterion) {
    let resolver = resolver(generate_registry(100, 5, 2));
    let requests: Vec<_> = (0..16)
        .map(|i| vec![Dependency::parse(&format!("gem{i}"), ">= 1.0").unwrap()])
        .collect();

    c.bench_function("resolve_all_16", |b| {
        b.iter(|| black_box(resolver.resolve_all(&requests)));
    });
}

criterion_group!(
    benches,
    bench_version_parsing,
    bench_constraint_parsing,
    bench_constraint_matching,
    bench_index_search,
    bench_resolution,
    bench_locked_resolution,
    bench_conflict,
    bench_resolve_all,
);
criterion_main!(benches);
