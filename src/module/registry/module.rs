//! Module identity
//!
//! A [`Module`] is created once by the definition machinery and handed out as
//! `Arc<Module>`. The access graph and the layer index only ever hold it
//! weakly, so dropping every outside `Arc` makes it reclaimable.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::module::layer::Layer;
use crate::module::loader::Loader;
use crate::module::registry::descriptor::ModuleDescriptor;
use crate::module::traits::{LoaderId, ModuleId};

/// Link from a module to its defining loader
///
/// Named modules keep their loader alive. The anonymous unit is owned by its
/// loader, so it links back weakly.
#[derive(Debug)]
enum LoaderLink {
    Defining(Arc<Loader>),
    Anonymous(Weak<Loader>),
}

/// A named module or an anonymous unit
#[derive(Debug)]
pub struct Module {
    id: ModuleId,
    descriptor: Option<ModuleDescriptor>,
    loader_id: LoaderId,
    loader: LoaderLink,
    layer: Option<Arc<Layer>>,
}

impl Module {
    pub(crate) fn named(
        descriptor: ModuleDescriptor,
        loader: &Arc<Loader>,
        layer: &Arc<Layer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ModuleId::next(),
            descriptor: Some(descriptor),
            loader_id: loader.id(),
            loader: LoaderLink::Defining(Arc::clone(loader)),
            layer: Some(Arc::clone(layer)),
        })
    }

    pub(crate) fn anonymous(loader: &Arc<Loader>) -> Arc<Self> {
        Arc::new(Self {
            id: ModuleId::next(),
            descriptor: None,
            loader_id: loader.id(),
            loader: LoaderLink::Anonymous(Arc::downgrade(loader)),
            layer: None,
        })
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Module name, `None` for an anonymous unit
    pub fn name(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.name.as_str())
    }

    pub fn is_named(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Static declarations, `None` for an anonymous unit
    pub fn descriptor(&self) -> Option<&ModuleDescriptor> {
        self.descriptor.as_ref()
    }

    /// Open modules and anonymous units open every package
    pub fn is_open(&self) -> bool {
        self.descriptor.as_ref().map_or(true, |d| d.open)
    }

    pub fn loader_id(&self) -> LoaderId {
        self.loader_id
    }

    /// Defining loader, if it is still alive
    pub fn loader(&self) -> Option<Arc<Loader>> {
        match &self.loader {
            LoaderLink::Defining(loader) => Some(Arc::clone(loader)),
            LoaderLink::Anonymous(loader) => loader.upgrade(),
        }
    }

    /// Layer the module was defined in, `None` for an anonymous unit
    pub fn layer(&self) -> Option<&Arc<Layer>> {
        self.layer.as_ref()
    }

    /// Whether the module contains the package (anonymous units contain any package)
    pub fn contains_package(&self, package: &str) -> bool {
        self.descriptor
            .as_ref()
            .map_or(true, |d| d.contains_package(package))
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "module {}", name),
            None => write!(f, "unnamed module @{}", self.loader_id),
        }
    }
}
