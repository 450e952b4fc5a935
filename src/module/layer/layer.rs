//! Module layers
//!
//! A layer groups the modules declared for it and links to zero or more
//! parent layers. Parents and declarations are fixed at construction, so the
//! layer graph is a DAG and never changes shape.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::module::registry::{Module, ModuleDescriptor};
use crate::module::traits::{AccessError, LayerId};

/// Immutable group of declared modules with fixed parents
pub struct Layer {
    id: LayerId,
    name: String,
    parents: Vec<Arc<Layer>>,
    descriptors: Vec<ModuleDescriptor>,
    /// Modules defined so far, by name (held weakly)
    defined: RwLock<HashMap<String, Weak<Module>>>,
}

impl Layer {
    pub(crate) fn new(
        name: impl Into<String>,
        parents: Vec<Arc<Layer>>,
        descriptors: Vec<ModuleDescriptor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: LayerId::next(),
            name: name.into(),
            parents,
            descriptors,
            defined: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent layers in declaration order
    pub fn parents(&self) -> &[Arc<Layer>] {
        &self.parents
    }

    /// Module declarations in declaration order
    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    /// Declaration for a module name
    pub fn descriptor(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Defined module with the given name in this layer only
    pub fn find_defined(&self, name: &str) -> Option<Arc<Module>> {
        self.defined.read().get(name).and_then(Weak::upgrade)
    }

    /// Live defined modules, sorted by name
    pub fn modules(&self) -> Vec<Arc<Module>> {
        let defined = self.defined.read();
        let mut names: Vec<&String> = defined.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| defined.get(name).and_then(Weak::upgrade))
            .collect()
    }

    /// Record a newly defined module under its name
    ///
    /// A name may be defined again only after the previous module has been
    /// reclaimed.
    pub(crate) fn record_defined(&self, module: &Arc<Module>) -> Result<(), AccessError> {
        let name = module
            .name()
            .ok_or_else(|| AccessError::InvalidDescriptor(format!("{} has no name", module)))?;
        let mut defined = self.defined.write();
        if defined.get(name).and_then(Weak::upgrade).is_some() {
            return Err(AccessError::ModuleAlreadyDefined {
                module: name.to_string(),
                layer: self.name.clone(),
            });
        }
        defined.insert(name.to_string(), Arc::downgrade(module));
        Ok(())
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field(
                "parents",
                &self.parents.iter().map(|p| p.id).collect::<Vec<_>>(),
            )
            .field(
                "modules",
                &self.descriptors.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer {} ({})", self.name, self.id)
    }
}
