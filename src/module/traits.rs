//! Module system identities, errors and query interfaces
//!
//! Defines the identities shared by every part of the access graph and the
//! error type returned when a caller hands us something we never registered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::module::registry::Module;

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique module identity (never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(u64);

/// Process-unique defining loader identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoaderId(u64);

/// Process-unique layer identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(u64);

impl ModuleId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl LoaderId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl LayerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader#{}", self.0)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Kind of package-level access a dynamic edge grants
///
/// Ordered: an open grant is stronger than, and implies, an export grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PackageAccess {
    /// Package is exported (public types accessible)
    Exported,
    /// Package is open (deep reflective access)
    Open,
}

impl PackageAccess {
    /// Whether a grant of this kind satisfies a query for `wanted`
    #[inline]
    pub fn satisfies(self, wanted: PackageAccess) -> bool {
        self >= wanted
    }
}

/// Access graph errors
///
/// Every variant indicates a defect in the calling subsystem, never a
/// transient runtime condition. Nothing here is retried.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Module not registered: {0}")]
    UnregisteredModule(String),

    #[error("Module already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Layer not constructed by this index: {0}")]
    UnknownLayer(String),

    #[error("Package {package} not in module {module}")]
    PackageNotInModule { module: String, package: String },

    #[error("Module {module} not declared in layer {layer}")]
    ModuleNotInLayer { module: String, layer: String },

    #[error("Module {module} already defined in layer {layer}")]
    ModuleAlreadyDefined { module: String, layer: String },

    #[error("Invalid module descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for AccessError {
    fn from(e: toml::de::Error) -> Self {
        AccessError::InvalidDescriptor(e.to_string())
    }
}

impl From<serde_json::Error> for AccessError {
    fn from(e: serde_json::Error) -> Self {
        AccessError::Config(e.to_string())
    }
}

/// Dynamic access queries consumed by the reflection layer
///
/// Implemented by the raw [`AccessGraph`](crate::module::graph::AccessGraph)
/// and by [`ModuleSystem`](crate::module::system::ModuleSystem), which puts
/// the package access cache in front of the graph. Both must answer every
/// query identically.
pub trait ReflectiveAccess: Send + Sync {
    /// Whether a dynamically added edge exports `package` of `source` to `other`
    fn is_reflectively_exported(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError>;

    /// Whether a dynamically added edge opens `package` of `source` to `other`
    fn is_reflectively_opened(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = ModuleId::next();
        let b = ModuleId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_open_satisfies_export() {
        assert!(PackageAccess::Open.satisfies(PackageAccess::Exported));
        assert!(PackageAccess::Open.satisfies(PackageAccess::Open));
        assert!(PackageAccess::Exported.satisfies(PackageAccess::Exported));
        assert!(!PackageAccess::Exported.satisfies(PackageAccess::Open));
    }

    #[test]
    fn test_error_messages() {
        let err = AccessError::PackageNotInModule {
            module: "app".to_string(),
            package: "p.q".to_string(),
        };
        assert_eq!(err.to_string(), "Package p.q not in module app");
    }
}
