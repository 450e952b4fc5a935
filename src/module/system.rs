//! Module system facade
//!
//! Ties the access graph, layer index and package access cache together and
//! implements the definition notifications: a module defined from a layer's
//! declarations is registered with the graph and recorded against its
//! loader in the layer index before it is handed out.
//!
//! The composed checks (`can_read`, `is_exported`, `is_open`, `can_use`)
//! combine a module's static declaration with the dynamic edges. The dynamic
//! part always goes through the package access cache.

use dashmap::DashSet;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AccessConfig;
use crate::module::cache::{AccessKey, CacheStats, PackageAccessCache};
use crate::module::graph::{AccessGraph, NodeSnapshot};
use crate::module::layer::{Layer, LayerIndex, LayerIter, ServicesCatalog};
use crate::module::loader::Loader;
use crate::module::registry::{Module, ModuleDescriptor};
use crate::module::traits::{AccessError, PackageAccess, ReflectiveAccess};

static GLOBAL: Lazy<ModuleSystem> = Lazy::new(ModuleSystem::default);

/// Access graph, layer index and package access cache for one process
pub struct ModuleSystem {
    config: AccessConfig,
    cache: Arc<PackageAccessCache>,
    graph: AccessGraph,
    layers: LayerIndex,
    /// Packages not exported to everyone by the module declaring them
    non_exported: DashSet<String>,
}

impl ModuleSystem {
    /// Create an empty module system
    pub fn new(config: AccessConfig) -> Self {
        let cache = Arc::new(PackageAccessCache::new(&config.cache));
        info!(
            "Module system created (access cache {}, max {} entries)",
            if cache.is_enabled() { "enabled" } else { "disabled" },
            config.cache.max_entries
        );
        Self {
            graph: AccessGraph::new(Arc::clone(&cache)),
            layers: LayerIndex::new(),
            non_exported: DashSet::new(),
            cache,
            config,
        }
    }

    /// The process-wide instance, created with the default configuration on first use
    pub fn global() -> &'static ModuleSystem {
        &GLOBAL
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn graph(&self) -> &AccessGraph {
        &self.graph
    }

    pub fn layer_index(&self) -> &LayerIndex {
        &self.layers
    }

    pub fn cache(&self) -> &Arc<PackageAccessCache> {
        &self.cache
    }

    // ---- definition -------------------------------------------------------

    /// The empty root layer
    pub fn empty_layer(&self) -> Arc<Layer> {
        self.layers.empty_layer()
    }

    /// Construct a layer declaring `descriptors` over `parents`
    pub fn define_layer(
        &self,
        name: impl Into<String>,
        parents: &[Arc<Layer>],
        descriptors: Vec<ModuleDescriptor>,
    ) -> Result<Arc<Layer>, AccessError> {
        self.layers.define_layer(name, parents, descriptors)
    }

    /// Define the module `name` declared in `layer` to `loader`
    pub fn define_module(
        &self,
        layer: &Arc<Layer>,
        name: &str,
        loader: &Arc<Loader>,
    ) -> Result<Arc<Module>, AccessError> {
        self.layers.ensure_known(layer)?;
        let descriptor = layer
            .descriptor(name)
            .cloned()
            .ok_or_else(|| AccessError::ModuleNotInLayer {
                module: name.to_string(),
                layer: layer.name().to_string(),
            })?;

        let module = Module::named(descriptor, loader, layer);
        layer.record_defined(&module)?;
        self.graph.register(&module)?;
        self.layers.record_module(&module, layer)?;
        info!("Defined {} to {} in {}", module, loader.name(), layer);
        Ok(module)
    }

    /// Define every module declared in `layer`, in declaration order
    pub fn define_modules<F>(
        &self,
        layer: &Arc<Layer>,
        mut loader_for: F,
    ) -> Result<Vec<Arc<Module>>, AccessError>
    where
        F: FnMut(&str) -> Arc<Loader>,
    {
        layer
            .descriptors()
            .iter()
            .map(|d| {
                let loader = loader_for(&d.name);
                self.define_module(layer, &d.name, &loader)
            })
            .collect()
    }

    /// The anonymous unit of `loader`, defining it on first use
    ///
    /// The unit may have been created through another module system sharing
    /// the loader; it is registered here before it is returned.
    pub fn define_unnamed_module(&self, loader: &Arc<Loader>) -> Result<Arc<Module>, AccessError> {
        let unit = loader.unnamed_module_or_try_init(|module| self.graph.register(module))?;
        self.graph.register_if_absent(&unit)?;
        Ok(unit)
    }

    // ---- mutators ---------------------------------------------------------

    pub fn add_reads(&self, source: &Arc<Module>, target: &Arc<Module>) -> Result<(), AccessError> {
        self.graph.add_reads(source, target)
    }

    pub fn add_reads_all_unnamed(&self, source: &Arc<Module>) -> Result<(), AccessError> {
        self.graph.add_reads_all_unnamed(source)
    }

    pub fn add_exports(
        &self,
        source: &Arc<Module>,
        package: &str,
        target: &Arc<Module>,
    ) -> Result<(), AccessError> {
        self.graph.add_exports(source, package, target)
    }

    pub fn add_exports_to_all_unnamed(
        &self,
        source: &Arc<Module>,
        package: &str,
    ) -> Result<(), AccessError> {
        self.graph.add_exports_to_all_unnamed(source, package)
    }

    pub fn add_exports_to_all(&self, source: &Arc<Module>, package: &str) -> Result<(), AccessError> {
        self.graph.add_exports_to_all(source, package)
    }

    pub fn add_opens(
        &self,
        source: &Arc<Module>,
        package: &str,
        target: &Arc<Module>,
    ) -> Result<(), AccessError> {
        self.graph.add_opens(source, package, target)
    }

    pub fn add_opens_to_all_unnamed(
        &self,
        source: &Arc<Module>,
        package: &str,
    ) -> Result<(), AccessError> {
        self.graph.add_opens_to_all_unnamed(source, package)
    }

    pub fn add_opens_to_all(&self, source: &Arc<Module>, package: &str) -> Result<(), AccessError> {
        self.graph.add_opens_to_all(source, package)
    }

    /// Open every package in both sets to every anonymous unit
    pub fn add_opens_to_all_unnamed_bulk<C, E, S, T>(
        &self,
        source: &Arc<Module>,
        concealed: C,
        exported: E,
    ) -> Result<(), AccessError>
    where
        C: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        self.graph
            .add_opens_to_all_unnamed_bulk(source, concealed, exported)
    }

    pub fn add_uses(&self, source: &Arc<Module>, service: &str) -> Result<(), AccessError> {
        self.graph.add_uses(source, service)
    }

    // ---- queries ----------------------------------------------------------

    /// Cached [`AccessGraph::is_reflectively_exported`]
    pub fn is_reflectively_exported(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        let key = AccessKey::new(source.id(), package, other.id(), PackageAccess::Exported);
        self.cache
            .get_or_compute(key, || self.graph.is_reflectively_exported(source, package, other))
    }

    /// Cached [`AccessGraph::is_reflectively_opened`]
    pub fn is_reflectively_opened(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        let key = AccessKey::new(source.id(), package, other.id(), PackageAccess::Open);
        self.cache
            .get_or_compute(key, || self.graph.is_reflectively_opened(source, package, other))
    }

    /// Whether `source` reads `other`, statically or dynamically
    ///
    /// Anonymous units read every module, every module reads itself, and a
    /// named module reads the modules it requires by name.
    pub fn can_read(&self, source: &Arc<Module>, other: &Arc<Module>) -> Result<bool, AccessError> {
        let dynamic = self.graph.is_reflectively_read(source, other)?;
        if !source.is_named() || source.id() == other.id() {
            return Ok(true);
        }
        let required = match (source.descriptor(), other.name()) {
            (Some(d), Some(name)) => d.requires.contains(name),
            _ => false,
        };
        Ok(required || dynamic)
    }

    /// Whether `package` of `source` is exported to `other`, statically or dynamically
    pub fn is_exported(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        self.has_package_access(source, package, other, PackageAccess::Exported)
    }

    /// Whether `package` of `source` is open to `other`, statically or dynamically
    pub fn is_open(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        self.has_package_access(source, package, other, PackageAccess::Open)
    }

    fn has_package_access(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
        wanted: PackageAccess,
    ) -> Result<bool, AccessError> {
        self.graph.ensure_registered(source)?;
        self.graph.ensure_registered(other)?;

        let descriptor = match source.descriptor() {
            Some(d) => d,
            None => return Ok(true),
        };
        if !descriptor.contains_package(package) {
            return Ok(false);
        }
        if source.id() == other.id() {
            return Ok(true);
        }
        if descriptor
            .static_access(package, other.name())
            .map_or(false, |declared| declared.satisfies(wanted))
        {
            return Ok(true);
        }
        match wanted {
            PackageAccess::Exported => self.is_reflectively_exported(source, package, other),
            PackageAccess::Open => self.is_reflectively_opened(source, package, other),
        }
    }

    /// Whether `source` may use `service`, statically or dynamically
    pub fn can_use(&self, source: &Arc<Module>, service: &str) -> Result<bool, AccessError> {
        let dynamic = self.graph.is_reflectively_used(source, service)?;
        Ok(match source.descriptor() {
            Some(d) => d.uses.contains(service) || dynamic,
            None => true,
        })
    }

    /// Services `source` was dynamically granted use of
    pub fn used_services(&self, source: &Arc<Module>) -> Result<Vec<String>, AccessError> {
        self.graph.used_services(source)
    }

    /// Deterministic view of `source`'s dynamic edges
    pub fn snapshot(&self, source: &Arc<Module>) -> Result<NodeSnapshot, AccessError> {
        self.graph.snapshot(source)
    }

    // ---- layers -----------------------------------------------------------

    /// `start` and its ancestors, depth-first
    pub fn layers(&self, start: &Arc<Layer>) -> Result<LayerIter, AccessError> {
        self.layers.layers(start)
    }

    /// Layers with at least one module defined to `loader`
    pub fn layers_for_loader(&self, loader: &Loader) -> Vec<Arc<Layer>> {
        self.layers.layers_for_loader(loader)
    }

    pub fn services_catalog(&self, layer: &Arc<Layer>) -> Result<Arc<ServicesCatalog>, AccessError> {
        self.layers.services_catalog(layer)
    }

    /// Find a defined module by name in `start` or its ancestors
    pub fn find_module(
        &self,
        start: &Arc<Layer>,
        name: &str,
    ) -> Result<Option<Arc<Module>>, AccessError> {
        self.layers.find_module(start, name)
    }

    // ---- package access restrictions -------------------------------------

    /// Record the non-exported packages of every module declared in `layer`
    ///
    /// A package is non-exported when its module neither exports nor opens
    /// it unqualified. Recorded packages stay restricted for the life of the
    /// system. Returns how many packages were newly recorded; the package
    /// access cache is invalidated afterwards.
    pub fn add_non_exported_packages(&self, layer: &Arc<Layer>) -> Result<usize, AccessError> {
        self.layers.ensure_known(layer)?;
        let added = layer
            .descriptors()
            .iter()
            .flat_map(|d| d.concealed_packages())
            .filter(|package| self.non_exported.insert(package.clone()))
            .count();
        debug!("Recorded {} non-exported packages from {}", added, layer);
        self.cache.invalidate();
        Ok(added)
    }

    /// Whether `package` was recorded as non-exported
    pub fn is_package_restricted(&self, package: &str) -> bool {
        self.non_exported.contains(package)
    }

    // ---- housekeeping -----------------------------------------------------

    /// Drop every cached access decision
    pub fn invalidate_package_access_cache(&self) {
        self.cache.invalidate();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop bookkeeping for reclaimed modules and layers
    pub fn purge_reclaimed(&self) -> usize {
        self.graph.purge_reclaimed() + self.layers.purge_reclaimed()
    }
}

impl Default for ModuleSystem {
    fn default() -> Self {
        Self::new(AccessConfig::default())
    }
}

impl ReflectiveAccess for ModuleSystem {
    fn is_reflectively_exported(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        ModuleSystem::is_reflectively_exported(self, source, package, other)
    }

    fn is_reflectively_opened(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        ModuleSystem::is_reflectively_opened(self, source, package, other)
    }
}

/// Drop every cached access decision of the process-wide instance
pub fn invalidate_package_access_cache() {
    ModuleSystem::global().invalidate_package_access_cache();
}
