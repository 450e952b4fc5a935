use criterion::{black_box, criterion_group, criterion_main, Criterion};
use modgraph::config::{AccessConfig, CacheConfig};
use modgraph::module::layer::Layer;
use modgraph::{Loader, Module, ModuleDescriptor, ModuleSystem};
use std::sync::Arc;

struct Setup {
    system: ModuleSystem,
    layer: Arc<Layer>,
    app: Arc<Module>,
    lib: Arc<Module>,
    unnamed: Arc<Module>,
}

fn setup(cache_enabled: bool) -> Setup {
    let system = ModuleSystem::new(AccessConfig {
        cache: CacheConfig {
            enabled: cache_enabled,
            ..CacheConfig::default()
        },
        ..AccessConfig::default()
    });
    let mut app = ModuleDescriptor::new("bench.app");
    for i in 0..64 {
        app = app.package(format!("bench.app.p{}", i));
    }
    let layer = system
        .define_layer(
            "bench",
            &[system.empty_layer()],
            vec![app, ModuleDescriptor::new("bench.lib")],
        )
        .unwrap();
    let loader = Loader::new("bench");
    let app = system.define_module(&layer, "bench.app", &loader).unwrap();
    let lib = system.define_module(&layer, "bench.lib", &loader).unwrap();
    let unnamed = system.define_unnamed_module(&loader).unwrap();

    for i in 0..64 {
        let package = format!("bench.app.p{}", i);
        system.add_exports(&app, &package, &lib).unwrap();
        if i % 2 == 0 {
            system.add_opens_to_all_unnamed(&app, &package).unwrap();
        }
    }

    Setup {
        system,
        layer,
        app,
        lib,
        unnamed,
    }
}

fn benchmark_cached_export_query(c: &mut Criterion) {
    let s = setup(true);
    c.bench_function("cached_export_query", |b| {
        b.iter(|| {
            black_box(
                s.system
                    .is_reflectively_exported(&s.app, black_box("bench.app.p17"), &s.lib),
            )
            .unwrap();
        })
    });
}

fn benchmark_uncached_export_query(c: &mut Criterion) {
    let s = setup(false);
    c.bench_function("uncached_export_query", |b| {
        b.iter(|| {
            black_box(
                s.system
                    .is_reflectively_exported(&s.app, black_box("bench.app.p17"), &s.lib),
            )
            .unwrap();
        })
    });
}

fn benchmark_open_query_after_mutation(c: &mut Criterion) {
    let s = setup(true);
    c.bench_function("open_query_after_mutation", |b| {
        b.iter(|| {
            s.system.add_reads(&s.lib, &s.app).unwrap();
            black_box(
                s.system
                    .is_reflectively_opened(&s.app, black_box("bench.app.p8"), &s.unnamed),
            )
            .unwrap();
        })
    });
}

fn benchmark_services_catalog(c: &mut Criterion) {
    let s = setup(true);
    c.bench_function("services_catalog_lookup", |b| {
        b.iter(|| {
            black_box(s.system.services_catalog(&s.layer)).unwrap();
        })
    });
}

criterion_group!(
    benches,
    benchmark_cached_export_query,
    benchmark_uncached_export_query,
    benchmark_open_query_after_mutation,
    benchmark_services_catalog
);
criterion_main!(benches);
