//! Module system for modgraph
//!
//! Tracks the relations between modules that were added after the modules
//! were created, answers reflective access queries over them, and indexes
//! module layers by defining loader.
//!
//! ## Architecture
//!
//! - **Weak retention**: the graph and the layer index never keep a module, loader or layer alive
//! - **No global lock**: each module's edges are synchronized independently
//! - **Monotonic edges**: nothing is ever removed from a live module's edge sets
//! - **Cached queries**: export/open decisions are memoized and invalidated on every mutation

pub mod traits;
pub mod registry;
pub mod loader;
pub mod validation;
pub mod graph;
pub mod cache;
pub mod layer;
pub mod system;

pub use traits::{AccessError, LayerId, LoaderId, ModuleId, PackageAccess, ReflectiveAccess};
pub use registry::{Module, ModuleDescriptor, PackageGrant, ServiceProvides};
pub use loader::Loader;
pub use validation::{DescriptorValidator, ValidationResult};
pub use graph::{AccessGraph, GrantTarget, NodeSnapshot, PackageSnapshot};
pub use cache::{AccessKey, CacheStats, PackageAccessCache};
pub use layer::{Layer, LayerIndex, LayerIter, ServiceProvider, ServicesCatalog};
pub use system::{invalidate_package_access_cache, ModuleSystem};
