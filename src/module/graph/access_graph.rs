//! Dynamic access graph
//!
//! Single source of truth for reads/exports/opens/uses edges added after
//! modules were created. There is no global lock: the registry is a sharded
//! map and each module's edges are synchronized independently by its
//! [`ModuleNode`].
//!
//! Every successful mutation invalidates the package access cache after the
//! edge is recorded.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

use crate::module::cache::PackageAccessCache;
use crate::module::graph::node::{GrantTarget, ModuleNode, NodeSnapshot};
use crate::module::registry::Module;
use crate::module::traits::{AccessError, ModuleId, PackageAccess, ReflectiveAccess};

/// Registry size below which reclaimed modules are never purged automatically
const MIN_PURGE_MARK: usize = 1024;

struct NodeEntry {
    module: Weak<Module>,
    node: Arc<ModuleNode>,
}

impl NodeEntry {
    fn is_for(&self, module: &Arc<Module>) -> bool {
        std::ptr::eq(self.module.as_ptr(), Arc::as_ptr(module))
    }
}

/// Dynamic module relation graph
pub struct AccessGraph {
    nodes: DashMap<ModuleId, NodeEntry>,
    cache: Arc<PackageAccessCache>,
    purge_mark: AtomicUsize,
}

impl AccessGraph {
    /// Create an empty graph that invalidates `cache` on every mutation
    pub fn new(cache: Arc<PackageAccessCache>) -> Self {
        Self {
            nodes: DashMap::new(),
            cache,
            purge_mark: AtomicUsize::new(MIN_PURGE_MARK),
        }
    }

    /// Cache invalidated by this graph's mutations
    pub fn cache(&self) -> &Arc<PackageAccessCache> {
        &self.cache
    }

    /// Create the (empty) edge sets for a newly created module
    pub fn register(&self, module: &Arc<Module>) -> Result<(), AccessError> {
        match self.nodes.entry(module.id()) {
            Entry::Occupied(_) => {
                error!("{} registered twice", module);
                return Err(AccessError::AlreadyRegistered(module.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(NodeEntry {
                    module: Arc::downgrade(module),
                    node: Arc::new(ModuleNode::new(module.id())),
                });
            }
        }
        debug!("Registered {} ({})", module, module.id());
        self.maybe_purge();
        Ok(())
    }

    /// Register `module` unless this graph already tracks it
    ///
    /// Returns whether the module was newly registered. An anonymous unit is
    /// memoized on its loader, so a loader shared between graphs hands every
    /// graph the same unit; each graph registers it on first sight.
    pub fn register_if_absent(&self, module: &Arc<Module>) -> Result<bool, AccessError> {
        match self.nodes.entry(module.id()) {
            Entry::Occupied(entry) if entry.get().is_for(module) => return Ok(false),
            Entry::Occupied(_) => {
                error!("{} collides with a registered module", module);
                return Err(AccessError::AlreadyRegistered(module.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(NodeEntry {
                    module: Arc::downgrade(module),
                    node: Arc::new(ModuleNode::new(module.id())),
                });
            }
        }
        debug!("Registered {} ({})", module, module.id());
        self.maybe_purge();
        Ok(true)
    }

    pub fn is_registered(&self, module: &Arc<Module>) -> bool {
        self.nodes
            .get(&module.id())
            .map_or(false, |entry| entry.is_for(module))
    }

    fn node(&self, module: &Arc<Module>) -> Result<Arc<ModuleNode>, AccessError> {
        match self.nodes.get(&module.id()) {
            Some(entry) if entry.is_for(module) => Ok(Arc::clone(&entry.node)),
            _ => {
                error!("Operation on unregistered {}", module);
                Err(AccessError::UnregisteredModule(module.to_string()))
            }
        }
    }

    /// Fail with [`AccessError::UnregisteredModule`] unless `module` is registered
    pub fn ensure_registered(&self, module: &Arc<Module>) -> Result<(), AccessError> {
        self.node(module).map(|_| ())
    }

    /// `source` reads `target`
    pub fn add_reads(&self, source: &Arc<Module>, target: &Arc<Module>) -> Result<(), AccessError> {
        let node = self.node(source)?;
        self.ensure_registered(target)?;

        // anonymous units read everything; every module reads itself
        if !source.is_named() || source.id() == target.id() {
            return Ok(());
        }
        if node.add_read(target) {
            debug!("{} reads {}", source, target);
        }
        self.cache.invalidate();
        Ok(())
    }

    /// `source` reads every anonymous unit
    pub fn add_reads_all_unnamed(&self, source: &Arc<Module>) -> Result<(), AccessError> {
        let node = self.node(source)?;
        if !source.is_named() {
            return Ok(());
        }
        if node.add_read_all_unnamed() {
            debug!("{} reads all unnamed modules", source);
        }
        self.cache.invalidate();
        Ok(())
    }

    /// `source` exports `package` to `target`
    pub fn add_exports(
        &self,
        source: &Arc<Module>,
        package: &str,
        target: &Arc<Module>,
    ) -> Result<(), AccessError> {
        self.grant(source, package, GrantTarget::Module(target), PackageAccess::Exported)
    }

    /// `source` exports `package` to every anonymous unit
    pub fn add_exports_to_all_unnamed(
        &self,
        source: &Arc<Module>,
        package: &str,
    ) -> Result<(), AccessError> {
        self.grant(source, package, GrantTarget::AllUnnamed, PackageAccess::Exported)
    }

    /// `source` exports `package` to every module
    pub fn add_exports_to_all(&self, source: &Arc<Module>, package: &str) -> Result<(), AccessError> {
        self.grant(source, package, GrantTarget::Everyone, PackageAccess::Exported)
    }

    /// `source` opens `package` to `target`
    pub fn add_opens(
        &self,
        source: &Arc<Module>,
        package: &str,
        target: &Arc<Module>,
    ) -> Result<(), AccessError> {
        self.grant(source, package, GrantTarget::Module(target), PackageAccess::Open)
    }

    /// `source` opens `package` to every anonymous unit
    pub fn add_opens_to_all_unnamed(
        &self,
        source: &Arc<Module>,
        package: &str,
    ) -> Result<(), AccessError> {
        self.grant(source, package, GrantTarget::AllUnnamed, PackageAccess::Open)
    }

    /// `source` opens `package` to every module
    pub fn add_opens_to_all(&self, source: &Arc<Module>, package: &str) -> Result<(), AccessError> {
        self.grant(source, package, GrantTarget::Everyone, PackageAccess::Open)
    }

    /// `source` opens every package in both sets to every anonymous unit
    ///
    /// All packages are checked before anything is recorded; the edges are
    /// then written under a single lock acquisition and the cache is
    /// invalidated once.
    pub fn add_opens_to_all_unnamed_bulk<C, E, S, T>(
        &self,
        source: &Arc<Module>,
        concealed: C,
        exported: E,
    ) -> Result<(), AccessError>
    where
        C: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let node = self.node(source)?;
        let descriptor = match source.descriptor() {
            Some(d) if !source.is_open() => d,
            _ => return Ok(()),
        };

        let packages: Vec<String> = concealed
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .chain(exported.into_iter().map(|p| p.as_ref().to_string()))
            .collect();
        if let Some(missing) = packages.iter().find(|p| !descriptor.contains_package(p)) {
            return Err(self.package_not_in_module(source, missing));
        }

        let pending = packages
            .iter()
            .filter(|p| descriptor.static_access(p, None) != Some(PackageAccess::Open))
            .map(String::as_str);
        let changed = node.grant_many(pending, GrantTarget::AllUnnamed, PackageAccess::Open);
        debug!(
            "{} opens {} of {} packages to all unnamed modules",
            source,
            changed,
            packages.len()
        );
        self.cache.invalidate();
        Ok(())
    }

    fn grant(
        &self,
        source: &Arc<Module>,
        package: &str,
        target: GrantTarget<'_>,
        access: PackageAccess,
    ) -> Result<(), AccessError> {
        let node = self.node(source)?;
        let target_name = match target {
            GrantTarget::Module(module) => {
                self.ensure_registered(module)?;
                if module.id() == source.id() {
                    return Ok(());
                }
                module.name()
            }
            GrantTarget::AllUnnamed | GrantTarget::Everyone => None,
        };

        // anonymous units and open modules already open every package
        let descriptor = match source.descriptor() {
            Some(d) if !source.is_open() => d,
            _ => return Ok(()),
        };
        if !source.contains_package(package) {
            return Err(self.package_not_in_module(source, package));
        }
        if descriptor
            .static_access(package, target_name)
            .map_or(false, |declared| declared.satisfies(access))
        {
            return Ok(());
        }

        if node.grant(package, target, access) {
            debug!("{} grants {:?} on {} to {}", source, access, package, target_label(target));
        }
        self.cache.invalidate();
        Ok(())
    }

    fn package_not_in_module(&self, source: &Module, package: &str) -> AccessError {
        error!("Package {} not in {}", package, source);
        AccessError::PackageNotInModule {
            module: source.name().unwrap_or_default().to_string(),
            package: package.to_string(),
        }
    }

    /// `source` uses `service`
    pub fn add_uses(&self, source: &Arc<Module>, service: &str) -> Result<(), AccessError> {
        let node = self.node(source)?;
        let declared = match source.descriptor() {
            Some(d) => d.uses.contains(service),
            None => true,
        };
        if declared {
            return Ok(());
        }
        if node.add_use(service) {
            debug!("{} uses {}", source, service);
        }
        self.cache.invalidate();
        Ok(())
    }

    /// Whether a dynamic edge exports `package` of `source` to `other`
    ///
    /// Open grants count as exports. Static declarations are not consulted.
    pub fn is_reflectively_exported(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        self.query(source, package, other, PackageAccess::Exported)
    }

    /// Whether a dynamic edge opens `package` of `source` to `other`
    pub fn is_reflectively_opened(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        self.query(source, package, other, PackageAccess::Open)
    }

    fn query(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
        wanted: PackageAccess,
    ) -> Result<bool, AccessError> {
        let node = self.node(source)?;
        self.ensure_registered(other)?;
        Ok(node.allows(package, other, wanted))
    }

    /// Whether a dynamic edge makes `source` read `other`
    pub fn is_reflectively_read(
        &self,
        source: &Arc<Module>,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        let node = self.node(source)?;
        self.ensure_registered(other)?;
        Ok(node.reads(other))
    }

    /// Whether a dynamic edge makes `source` use `service`
    pub fn is_reflectively_used(&self, source: &Arc<Module>, service: &str) -> Result<bool, AccessError> {
        Ok(self.node(source)?.uses(service))
    }

    /// Services `source` was dynamically granted use of, sorted
    pub fn used_services(&self, source: &Arc<Module>) -> Result<Vec<String>, AccessError> {
        Ok(self.node(source)?.used_services())
    }

    /// Deterministic view of `source`'s dynamic edges
    pub fn snapshot(&self, source: &Arc<Module>) -> Result<NodeSnapshot, AccessError> {
        Ok(self.node(source)?.snapshot())
    }

    /// Number of registered modules still alive
    pub fn module_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|entry| entry.value().module.strong_count() > 0)
            .count()
    }

    /// Drop edge sets of reclaimed modules, returning how many were dropped
    pub fn purge_reclaimed(&self) -> usize {
        let mut purged = 0;
        self.nodes.retain(|_, entry| {
            let live = entry.module.strong_count() > 0;
            purged += usize::from(!live);
            live
        });
        if purged > 0 {
            debug!("Purged {} reclaimed modules", purged);
        }
        purged
    }

    fn maybe_purge(&self) {
        let len = self.nodes.len();
        if len < self.purge_mark.load(Ordering::Relaxed) {
            return;
        }
        self.purge_reclaimed();
        let mark = (self.nodes.len() * 2).max(MIN_PURGE_MARK);
        self.purge_mark.store(mark, Ordering::Relaxed);
    }
}

fn target_label(target: GrantTarget<'_>) -> String {
    match target {
        GrantTarget::Module(module) => module.to_string(),
        GrantTarget::AllUnnamed => "all unnamed modules".to_string(),
        GrantTarget::Everyone => "everyone".to_string(),
    }
}

impl ReflectiveAccess for AccessGraph {
    fn is_reflectively_exported(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        AccessGraph::is_reflectively_exported(self, source, package, other)
    }

    fn is_reflectively_opened(
        &self,
        source: &Arc<Module>,
        package: &str,
        other: &Arc<Module>,
    ) -> Result<bool, AccessError> {
        AccessGraph::is_reflectively_opened(self, source, package, other)
    }
}
