//! Module registry types
//!
//! Static module declarations and the module identity handed out to callers.

pub mod descriptor;
pub mod module;

pub use descriptor::{ModuleDescriptor, PackageGrant, ServiceProvides};
pub use module::Module;
