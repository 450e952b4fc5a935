//! Per-layer services catalog
//!
//! Maps each service type to the modules in a layer that provide it. Built
//! once from the layer's declarations and never modified afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::module::layer::Layer;
use crate::module::traits::LayerId;

/// A provider of a service type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProvider {
    /// Providing module name
    pub module: String,
    /// Provider implementation type name
    pub provider: String,
}

/// Service type → providers, for one layer
#[derive(Debug)]
pub struct ServicesCatalog {
    layer: LayerId,
    providers: HashMap<String, Vec<ServiceProvider>>,
}

impl ServicesCatalog {
    pub(crate) fn build(layer: &Layer) -> Self {
        let mut providers: HashMap<String, Vec<ServiceProvider>> = HashMap::new();
        for descriptor in layer.descriptors() {
            for provides in &descriptor.provides {
                let entry = providers.entry(provides.service.clone()).or_default();
                entry.extend(provides.providers.iter().map(|provider| ServiceProvider {
                    module: descriptor.name.clone(),
                    provider: provider.clone(),
                }));
            }
        }
        Self {
            layer: layer.id(),
            providers,
        }
    }

    /// Layer this catalog belongs to
    pub fn layer_id(&self) -> LayerId {
        self.layer
    }

    /// Providers of a service, in module then provider declaration order
    pub fn find_services(&self, service: &str) -> &[ServiceProvider] {
        self.providers
            .get(service)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Service types with at least one provider, sorted
    pub fn services(&self) -> Vec<&str> {
        let mut services: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        services.sort_unstable();
        services
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
