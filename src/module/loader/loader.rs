//! Defining loader implementation
//!
//! A loader is an identity that modules are defined to. It owns its anonymous
//! unit; the unit links back weakly so the pair never forms a cycle.

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::debug;

use crate::module::registry::Module;
use crate::module::traits::{AccessError, LoaderId};

/// Defining loader for modules
#[derive(Debug)]
pub struct Loader {
    id: LoaderId,
    name: String,
    unnamed: OnceCell<Arc<Module>>,
}

impl Loader {
    /// Create a new loader
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: LoaderId::next(),
            name: name.into(),
            unnamed: OnceCell::new(),
        })
    }

    pub fn id(&self) -> LoaderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Anonymous unit, if it has been created
    pub fn unnamed_module(&self) -> Option<Arc<Module>> {
        self.unnamed.get().cloned()
    }

    /// Anonymous unit, creating it on first call
    ///
    /// `register` runs exactly once, for the unit that wins creation. If it
    /// fails no unit is stored and the next call retries.
    pub(crate) fn unnamed_module_or_try_init<F>(
        self: &Arc<Self>,
        register: F,
    ) -> Result<Arc<Module>, AccessError>
    where
        F: FnOnce(&Arc<Module>) -> Result<(), AccessError>,
    {
        self.unnamed
            .get_or_try_init(|| {
                let module = Module::anonymous(self);
                register(&module)?;
                debug!("Created unnamed module {} for loader {}", module.id(), self.name);
                Ok(module)
            })
            .cloned()
    }
}
