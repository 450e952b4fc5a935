//! modgraph - dynamic module access graph
//!
//! Tracks reads, exports, opens and uses edges added to modules at runtime,
//! answers reflective access queries over them through a generation-checked
//! cache, and indexes module layers by defining loader with lazily built
//! services catalogs.
//!
//! ## Design Principles
//!
//! 1. **Weak Retention**: Bookkeeping never keeps a module, loader or layer alive
//! 2. **Monotonic Edges**: Once a query returns true it stays true for the module's lifetime
//! 3. **Cache Transparency**: Disabling the cache never changes an answer
//!
//! ## Usage
//! ```rust
//! use modgraph::{Loader, ModuleDescriptor, ModuleSystem};
//!
//! let system = ModuleSystem::default();
//! let layer = system
//!     .define_layer(
//!         "app",
//!         &[system.empty_layer()],
//!         vec![ModuleDescriptor::new("app").package("app.internal")],
//!     )
//!     .unwrap();
//! let loader = Loader::new("app-loader");
//! let app = system.define_module(&layer, "app", &loader).unwrap();
//! let unnamed = system.define_unnamed_module(&loader).unwrap();
//!
//! assert!(!system.is_reflectively_opened(&app, "app.internal", &unnamed).unwrap());
//! system.add_opens_to_all_unnamed(&app, "app.internal").unwrap();
//! assert!(system.is_reflectively_opened(&app, "app.internal", &unnamed).unwrap());
//! ```

pub mod config;
pub mod module;
pub mod utils;

// Re-export config module
pub use config::*;

// Re-export commonly used module system types
pub use module::{
    invalidate_package_access_cache, AccessError, AccessGraph, Layer, LayerIndex, Loader, Module,
    ModuleDescriptor, ModuleId, ModuleSystem, PackageAccess, PackageAccessCache,
    ReflectiveAccess,
};
