//! Layer index
//!
//! Tracks every layer constructed through [`LayerIndex::define_layer`], the
//! layers each defining loader has modules in, and the create-once services
//! catalog of each layer.

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

use crate::module::layer::catalog::ServicesCatalog;
use crate::module::layer::Layer;
use crate::module::loader::Loader;
use crate::module::registry::{Module, ModuleDescriptor};
use crate::module::traits::{AccessError, LayerId, LoaderId};
use crate::module::validation::{DescriptorValidator, ValidationResult};

type CatalogCell = Arc<OnceCell<Arc<ServicesCatalog>>>;

/// Depth-first enumeration of a layer and its ancestors
///
/// Yields the start layer first, then parents in declaration order,
/// recursively, each distinct layer exactly once. Uses an explicit stack so
/// depth of the layer graph never grows the call stack.
pub struct LayerIter {
    stack: Vec<Arc<Layer>>,
    visited: HashSet<LayerId>,
}

impl LayerIter {
    fn new(start: Arc<Layer>) -> Self {
        Self {
            stack: vec![start],
            visited: HashSet::new(),
        }
    }
}

impl Iterator for LayerIter {
    type Item = Arc<Layer>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(layer) = self.stack.pop() {
            if !self.visited.insert(layer.id()) {
                continue;
            }
            // reversed so the first declared parent is popped first
            for parent in layer.parents().iter().rev() {
                if !self.visited.contains(&parent.id()) {
                    self.stack.push(Arc::clone(parent));
                }
            }
            return Some(layer);
        }
        None
    }
}

impl FusedIterator for LayerIter {}

/// Index of constructed layers, loader → layers, and layer → catalog
pub struct LayerIndex {
    /// Layers constructed by this index (held weakly)
    layers: DashMap<LayerId, Weak<Layer>>,
    /// Catalog cell per layer, created with the layer
    catalogs: DashMap<LayerId, CatalogCell>,
    /// Layers with at least one module defined to the loader, in first-seen order
    loader_layers: DashMap<LoaderId, Vec<Weak<Layer>>>,
    /// Number of catalogs built so far
    catalog_builds: AtomicUsize,
    validator: DescriptorValidator,
    empty: Arc<Layer>,
}

impl LayerIndex {
    /// Create an index holding only the empty root layer
    pub fn new() -> Self {
        let empty = Layer::new("empty", Vec::new(), Vec::new());
        let index = Self {
            layers: DashMap::new(),
            catalogs: DashMap::new(),
            loader_layers: DashMap::new(),
            catalog_builds: AtomicUsize::new(0),
            validator: DescriptorValidator::new(),
            empty: Arc::clone(&empty),
        };
        index.insert_layer(&empty);
        index
    }

    /// The empty layer: no parents, no modules
    pub fn empty_layer(&self) -> Arc<Layer> {
        Arc::clone(&self.empty)
    }

    /// Construct a new layer over the given parents
    ///
    /// Parents must have been constructed by this index. Every descriptor is
    /// validated and names must be unique within the layer.
    pub fn define_layer(
        &self,
        name: impl Into<String>,
        parents: &[Arc<Layer>],
        descriptors: Vec<ModuleDescriptor>,
    ) -> Result<Arc<Layer>, AccessError> {
        let name = name.into();
        for parent in parents {
            self.ensure_known(parent)?;
        }

        let mut names = HashSet::new();
        for descriptor in &descriptors {
            if let ValidationResult::Invalid(errors) = self.validator.validate(descriptor) {
                warn!("Rejected descriptor {} for layer {}: {:?}", descriptor.name, name, errors);
                return Err(AccessError::InvalidDescriptor(format!(
                    "{}: {}",
                    descriptor.name,
                    errors.join("; ")
                )));
            }
            if !names.insert(descriptor.name.as_str()) {
                return Err(AccessError::InvalidDescriptor(format!(
                    "Module {} declared twice in layer {}",
                    descriptor.name, name
                )));
            }
        }

        let layer = Layer::new(name, parents.to_vec(), descriptors);
        self.insert_layer(&layer);
        debug!(
            "Defined {} with {} parents and {} modules",
            layer,
            layer.parents().len(),
            layer.descriptors().len()
        );
        Ok(layer)
    }

    fn insert_layer(&self, layer: &Arc<Layer>) {
        self.layers.insert(layer.id(), Arc::downgrade(layer));
        self.catalogs
            .insert(layer.id(), Arc::new(OnceCell::new()));
    }

    /// Fail unless the layer was constructed by this index
    pub fn ensure_known(&self, layer: &Arc<Layer>) -> Result<(), AccessError> {
        let known = self
            .layers
            .get(&layer.id())
            .map_or(false, |w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(layer)));
        if known {
            Ok(())
        } else {
            error!("Operation on unknown {}", layer);
            Err(AccessError::UnknownLayer(layer.to_string()))
        }
    }

    /// Enumerate `start` and its ancestors depth-first
    pub fn layers(&self, start: &Arc<Layer>) -> Result<LayerIter, AccessError> {
        self.ensure_known(start)?;
        Ok(LayerIter::new(Arc::clone(start)))
    }

    /// Record that a module defined to its loader lives in `layer`
    pub fn record_module(&self, module: &Module, layer: &Arc<Layer>) -> Result<(), AccessError> {
        self.ensure_known(layer)?;
        let mut entry = self.loader_layers.entry(module.loader_id()).or_default();
        let already = entry
            .iter()
            .any(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(layer)));
        if !already {
            entry.push(Arc::downgrade(layer));
            debug!("{} now has modules in {}", module.loader_id(), layer);
        }
        Ok(())
    }

    /// Layers with at least one module defined to `loader`
    ///
    /// Ordered by when the loader first defined a module in each layer.
    pub fn layers_for_loader(&self, loader: &Loader) -> Vec<Arc<Layer>> {
        self.loader_layers
            .get(&loader.id())
            .map(|layers| layers.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Services catalog for a layer, built on first access
    ///
    /// Concurrent first callers all receive the same catalog; it is built once.
    pub fn services_catalog(&self, layer: &Arc<Layer>) -> Result<Arc<ServicesCatalog>, AccessError> {
        self.ensure_known(layer)?;
        let cell = self
            .catalogs
            .entry(layer.id())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();
        let catalog = cell.get_or_init(|| {
            self.catalog_builds.fetch_add(1, Ordering::SeqCst);
            let catalog = ServicesCatalog::build(layer);
            debug!("Built services catalog for {} ({} services)", layer, catalog.len());
            Arc::new(catalog)
        });
        Ok(Arc::clone(catalog))
    }

    /// Number of catalogs built since the index was created
    pub fn catalog_builds(&self) -> usize {
        self.catalog_builds.load(Ordering::SeqCst)
    }

    /// Find a defined module by name in `start` or its ancestors (DFS order)
    pub fn find_module(
        &self,
        start: &Arc<Layer>,
        name: &str,
    ) -> Result<Option<Arc<Module>>, AccessError> {
        Ok(self.layers(start)?.find_map(|layer| layer.find_defined(name)))
    }

    /// Number of live layers known to the index
    pub fn layer_count(&self) -> usize {
        self.layers.iter().filter(|e| e.value().strong_count() > 0).count()
    }

    /// Drop bookkeeping for reclaimed layers, returning how many were dropped
    pub fn purge_reclaimed(&self) -> usize {
        let mut purged = 0;
        self.layers.retain(|_, layer| {
            let live = layer.strong_count() > 0;
            purged += usize::from(!live);
            live
        });

        self.catalogs.retain(|id, _| self.layers.contains_key(id));
        self.loader_layers.retain(|_, layers| {
            layers.retain(|layer| layer.strong_count() > 0);
            !layers.is_empty()
        });

        if purged > 0 {
            debug!("Purged {} reclaimed layers", purged);
        }
        purged
    }
}

impl Default for LayerIndex {
    fn default() -> Self {
        Self::new()
    }
}
