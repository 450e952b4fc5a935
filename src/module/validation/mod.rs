//! Module descriptor validation
//!
//! Structural checks applied to every descriptor before a layer declaring it
//! is constructed.

pub mod descriptor_validator;

pub use descriptor_validator::{DescriptorValidator, ValidationResult};
