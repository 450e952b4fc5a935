//! Module descriptor parsing and static declaration queries
//!
//! A descriptor carries everything a module declares about itself when it is
//! created: its packages, which of them it exports or opens (optionally only
//! to named friends), what it requires, which services it uses and which it
//! provides. None of this changes after creation; dynamic grants live in the
//! access graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::module::traits::{AccessError, PackageAccess};

/// An `exports` or `opens` declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageGrant {
    /// Package name
    pub package: String,
    /// Target module names; empty means unqualified (everyone)
    #[serde(default)]
    pub targets: BTreeSet<String>,
}

impl PackageGrant {
    /// Whether this declaration is unqualified
    pub fn is_unqualified(&self) -> bool {
        self.targets.is_empty()
    }

    /// Whether this declaration covers a module with the given name
    ///
    /// Anonymous units have no name and are only covered by unqualified grants.
    pub fn covers(&self, other: Option<&str>) -> bool {
        self.is_unqualified() || other.map_or(false, |name| self.targets.contains(name))
    }
}

/// A `provides` declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProvides {
    /// Service type name
    pub service: String,
    /// Provider implementation type names, in declaration order
    pub providers: Vec<String>,
}

/// Static module declaration (module.toml structure)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module name
    pub name: String,
    /// Open modules open every package they contain
    #[serde(default)]
    pub open: bool,
    /// Every package in the module
    #[serde(default)]
    pub packages: BTreeSet<String>,
    /// Names of modules this module reads
    #[serde(default)]
    pub requires: BTreeSet<String>,
    /// Exported packages
    #[serde(default)]
    pub exports: Vec<PackageGrant>,
    /// Opened packages
    #[serde(default)]
    pub opens: Vec<PackageGrant>,
    /// Service types consumed by this module
    #[serde(default)]
    pub uses: BTreeSet<String>,
    /// Services provided by this module
    #[serde(default)]
    pub provides: Vec<ServiceProvides>,
}

impl ModuleDescriptor {
    /// Start a descriptor with no packages and no declarations
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: false,
            packages: BTreeSet::new(),
            requires: BTreeSet::new(),
            exports: Vec::new(),
            opens: Vec::new(),
            uses: BTreeSet::new(),
            provides: Vec::new(),
        }
    }

    /// Mark the module as open
    pub fn open_module(mut self) -> Self {
        self.open = true;
        self
    }

    /// Add a (concealed) package
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.packages.insert(package.into());
        self
    }

    /// Require (read) another module by name
    pub fn requires(mut self, module: impl Into<String>) -> Self {
        self.requires.insert(module.into());
        self
    }

    /// Export a package to everyone
    pub fn exports(self, package: impl Into<String>) -> Self {
        self.exports_to(package, std::iter::empty::<String>())
    }

    /// Export a package to the named modules only
    pub fn exports_to<I, S>(mut self, package: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let package = package.into();
        self.packages.insert(package.clone());
        self.exports.push(PackageGrant {
            package,
            targets: targets.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Open a package to everyone
    pub fn opens(self, package: impl Into<String>) -> Self {
        self.opens_to(package, std::iter::empty::<String>())
    }

    /// Open a package to the named modules only
    pub fn opens_to<I, S>(mut self, package: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let package = package.into();
        self.packages.insert(package.clone());
        self.opens.push(PackageGrant {
            package,
            targets: targets.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Declare use of a service type
    pub fn uses(mut self, service: impl Into<String>) -> Self {
        self.uses.insert(service.into());
        self
    }

    /// Declare providers of a service type
    pub fn provides<I, S>(mut self, service: impl Into<String>, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides.push(ServiceProvides {
            service: service.into(),
            providers: providers.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Whether the module contains the package
    #[inline]
    pub fn contains_package(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    /// Strongest access the static declaration grants on `package` to `other`
    ///
    /// `other` is the target's name, `None` for an anonymous unit.
    pub fn static_access(&self, package: &str, other: Option<&str>) -> Option<PackageAccess> {
        if !self.contains_package(package) {
            return None;
        }
        if self.open {
            return Some(PackageAccess::Open);
        }
        let matches = |grant: &PackageGrant| grant.package == package && grant.covers(other);
        if self.opens.iter().any(matches) {
            return Some(PackageAccess::Open);
        }
        if self.exports.iter().any(matches) {
            return Some(PackageAccess::Exported);
        }
        None
    }

    /// Packages that are neither exported nor opened to everyone
    pub fn concealed_packages(&self) -> BTreeSet<String> {
        self.packages
            .iter()
            .filter(|p| {
                !self
                    .exports
                    .iter()
                    .chain(self.opens.iter())
                    .any(|g| &g.package == *p && g.is_unqualified())
            })
            .cloned()
            .collect()
    }

    /// Packages exported (qualified or not)
    pub fn exported_packages(&self) -> BTreeSet<String> {
        self.exports.iter().map(|g| g.package.clone()).collect()
    }

    /// Parse a descriptor from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, AccessError> {
        let descriptor: ModuleDescriptor = toml::from_str(contents)?;
        if descriptor.name.is_empty() {
            return Err(AccessError::InvalidDescriptor(
                "Module name cannot be empty".to_string(),
            ));
        }
        Ok(descriptor)
    }

    /// Load descriptor from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AccessError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AccessError::InvalidDescriptor(format!("Failed to read descriptor file: {}", e))
        })?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModuleDescriptor {
        ModuleDescriptor::new("app")
            .package("app.internal")
            .exports("app.api")
            .exports_to("app.spi", ["friend"])
            .opens_to("app.model", ["orm"])
    }

    #[test]
    fn test_builder_adds_packages() {
        let d = sample();
        assert!(d.contains_package("app.internal"));
        assert!(d.contains_package("app.api"));
        assert!(d.contains_package("app.spi"));
        assert!(d.contains_package("app.model"));
    }

    #[test]
    fn test_static_access_qualified() {
        let d = sample();
        assert_eq!(d.static_access("app.api", None), Some(PackageAccess::Exported));
        assert_eq!(d.static_access("app.spi", Some("friend")), Some(PackageAccess::Exported));
        assert_eq!(d.static_access("app.spi", Some("stranger")), None);
        assert_eq!(d.static_access("app.spi", None), None);
        assert_eq!(d.static_access("app.model", Some("orm")), Some(PackageAccess::Open));
        assert_eq!(d.static_access("app.internal", Some("friend")), None);
        assert_eq!(d.static_access("missing", None), None);
    }

    #[test]
    fn test_open_module_opens_everything() {
        let d = ModuleDescriptor::new("lib").open_module().package("lib.a");
        assert_eq!(d.static_access("lib.a", None), Some(PackageAccess::Open));
        assert_eq!(d.static_access("lib.b", None), None);
    }

    #[test]
    fn test_concealed_packages() {
        let d = sample();
        let concealed = d.concealed_packages();
        assert!(concealed.contains("app.internal"));
        assert!(concealed.contains("app.spi"));
        assert!(!concealed.contains("app.api"));
    }

    #[test]
    fn test_from_toml() {
        let text = r#"
            name = "svc"
            packages = ["svc.impl"]
            uses = ["svc.Codec"]

            [[exports]]
            package = "svc.api"

            [[provides]]
            service = "svc.Codec"
            providers = ["svc.impl.JsonCodec"]
        "#;
        let d = ModuleDescriptor::from_toml_str(text).unwrap();
        assert_eq!(d.name, "svc");
        assert!(d.uses.contains("svc.Codec"));
        assert_eq!(d.exports[0].package, "svc.api");
        assert!(d.exports[0].is_unqualified());
        assert_eq!(d.provides[0].providers, vec!["svc.impl.JsonCodec".to_string()]);
    }

    #[test]
    fn test_from_toml_rejects_empty_name() {
        assert!(ModuleDescriptor::from_toml_str("name = \"\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(
            &path,
            "name = \"app\"\npackages = [\"app.impl\"]\n\n[[exports]]\npackage = \"app.api\"\n",
        )
        .unwrap();

        let d = ModuleDescriptor::from_file(&path).unwrap();
        assert_eq!(d.name, "app");
        assert_eq!(d.exported_packages().into_iter().collect::<Vec<_>>(), vec!["app.api"]);
        assert!(d.contains_package("app.impl"));

        assert!(ModuleDescriptor::from_file(dir.path().join("missing.toml")).is_err());
    }
}
