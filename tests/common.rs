#![allow(dead_code)]

use modgraph::module::layer::Layer;
use modgraph::{Loader, Module, ModuleDescriptor, ModuleSystem};
use std::sync::Arc;

/// A layer with two named modules and one anonymous unit
///
/// `app` contains `app.api` (exported), `app.internal` and `app.impl`;
/// `lib` contains `lib.core` and `lib.spi`, and `lib.spi` is exported only to `app`.
pub struct Fixture {
    pub system: ModuleSystem,
    pub layer: Arc<Layer>,
    pub loader: Arc<Loader>,
    pub app: Arc<Module>,
    pub lib: Arc<Module>,
    pub unnamed: Arc<Module>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_system(ModuleSystem::default())
    }

    pub fn with_system(system: ModuleSystem) -> Self {
        let layer = system
            .define_layer("app-layer", &[system.empty_layer()], descriptors())
            .unwrap();
        let loader = Loader::new("app-loader");
        let app = system.define_module(&layer, "app", &loader).unwrap();
        let lib = system.define_module(&layer, "lib", &loader).unwrap();
        let unnamed = system.define_unnamed_module(&loader).unwrap();
        Fixture {
            system,
            layer,
            loader,
            app,
            lib,
            unnamed,
        }
    }
}

pub fn descriptors() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::new("app")
            .exports("app.api")
            .package("app.internal")
            .package("app.impl")
            .requires("lib")
            .uses("lib.spi.Codec"),
        ModuleDescriptor::new("lib")
            .package("lib.core")
            .exports_to("lib.spi", ["app"])
            .provides("lib.spi.Codec", ["lib.core.JsonCodec"]),
    ]
}
