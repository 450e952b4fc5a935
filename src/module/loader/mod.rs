//! Defining loaders
//!
//! Every module is defined to a loader; each loader owns at most one
//! anonymous unit, created on first demand.

pub mod loader;

pub use loader::Loader;
