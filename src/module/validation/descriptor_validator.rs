//! Descriptor validation framework
//!
//! Validates module descriptors for structure and internal consistency.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::module::registry::descriptor::{ModuleDescriptor, PackageGrant};

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Descriptor is valid
    Valid,
    /// Descriptor is invalid with specific errors
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Descriptor validator
pub struct DescriptorValidator {
    /// Maximum length of a dotted name
    max_name_len: usize,
}

impl DescriptorValidator {
    /// Create a new descriptor validator
    pub fn new() -> Self {
        Self { max_name_len: 255 }
    }

    /// Validate a module descriptor
    pub fn validate(&self, descriptor: &ModuleDescriptor) -> ValidationResult {
        let mut errors = Vec::new();

        if descriptor.name.is_empty() {
            errors.push("Module name cannot be empty".to_string());
        } else if !self.is_valid_dotted_name(&descriptor.name) {
            errors.push(format!("Invalid module name: {}", descriptor.name));
        }

        for package in &descriptor.packages {
            if !self.is_valid_dotted_name(package) {
                errors.push(format!("Invalid package name: {}", package));
            }
        }

        for required in &descriptor.requires {
            if required == &descriptor.name {
                errors.push(format!("Module {} cannot require itself", required));
            } else if !self.is_valid_dotted_name(required) {
                errors.push(format!("Invalid required module name: {}", required));
            }
        }

        errors.extend(self.validate_grants("exports", descriptor, &descriptor.exports));

        if descriptor.open && !descriptor.opens.is_empty() {
            errors.push(format!(
                "Open module {} cannot declare opens",
                descriptor.name
            ));
        }
        errors.extend(self.validate_grants("opens", descriptor, &descriptor.opens));

        for service in &descriptor.uses {
            if !self.is_valid_dotted_name(service) {
                errors.push(format!("Invalid service name in uses: {}", service));
            }
        }

        for provides in &descriptor.provides {
            if !self.is_valid_dotted_name(&provides.service) {
                errors.push(format!(
                    "Invalid service name in provides: {}",
                    provides.service
                ));
            }
            if provides.providers.is_empty() {
                errors.push(format!(
                    "Service {} declared with no providers",
                    provides.service
                ));
            }
            for provider in &provides.providers {
                if !self.is_valid_dotted_name(provider) {
                    errors.push(format!("Invalid provider name: {}", provider));
                }
            }
        }

        if errors.is_empty() {
            debug!("Descriptor validation passed for module: {}", descriptor.name);
            ValidationResult::Valid
        } else {
            warn!(
                "Descriptor validation failed for module {}: {:?}",
                descriptor.name, errors
            );
            ValidationResult::Invalid(errors)
        }
    }

    fn validate_grants(
        &self,
        kind: &str,
        descriptor: &ModuleDescriptor,
        grants: &[PackageGrant],
    ) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for grant in grants {
            if !seen.insert(grant.package.as_str()) {
                errors.push(format!("Duplicate {} of package {}", kind, grant.package));
            }
            if !descriptor.contains_package(&grant.package) {
                errors.push(format!(
                    "Package {} in {} is not in module {}",
                    grant.package, kind, descriptor.name
                ));
            }
            for target in &grant.targets {
                if target == &descriptor.name {
                    errors.push(format!(
                        "Module {} cannot {} {} to itself",
                        descriptor.name, kind, grant.package
                    ));
                } else if !self.is_valid_dotted_name(target) {
                    errors.push(format!("Invalid target module name: {}", target));
                }
            }
        }

        errors
    }

    /// Validate dotted name format (e.g. `com.example.api`)
    #[inline]
    fn is_valid_dotted_name(&self, name: &str) -> bool {
        if name.is_empty() || name.len() > self.max_name_len {
            return false;
        }

        name.split('.').all(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {
                    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
                }
                _ => false,
            }
        })
    }
}

impl Default for DescriptorValidator {
    fn default() -> Self {
        Self::new()
    }
}
