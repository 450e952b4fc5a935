//! Per-module edge sets
//!
//! A [`ModuleNode`] holds the dynamic grants going out of one module. Each
//! edge kind sits behind its own lock; exports and opens share the package
//! table so a query sees wildcard flags and concrete targets together.
//! Concrete targets are weak: an edge never keeps its target alive, and an
//! edge whose target is gone simply stops matching.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Weak};

use crate::module::registry::Module;
use crate::module::traits::{ModuleId, PackageAccess};

/// Weakly held edge target
#[derive(Debug, Clone)]
struct WeakTarget {
    id: ModuleId,
    module: Weak<Module>,
}

impl WeakTarget {
    fn new(module: &Arc<Module>) -> Self {
        Self {
            id: module.id(),
            module: Arc::downgrade(module),
        }
    }

    #[inline]
    fn is_live(&self) -> bool {
        self.module.strong_count() > 0
    }

    #[inline]
    fn matches(&self, other: &Module) -> bool {
        self.id == other.id() && self.is_live()
    }
}

/// Who a package grant is for
#[derive(Debug, Clone, Copy)]
pub enum GrantTarget<'a> {
    /// One specific module
    Module(&'a Arc<Module>),
    /// Every anonymous unit, including ones not yet created
    AllUnnamed,
    /// Every module, named or anonymous
    Everyone,
}

#[derive(Debug, Default)]
struct ReadEdges {
    all_unnamed: bool,
    targets: Vec<WeakTarget>,
}

/// Grants recorded for one package of one module
#[derive(Debug, Default)]
struct PackageGrants {
    everyone: Option<PackageAccess>,
    all_unnamed: Option<PackageAccess>,
    targets: Vec<(WeakTarget, PackageAccess)>,
}

/// Raise `slot` to at least `access`; true if it changed
fn raise(slot: &mut Option<PackageAccess>, access: PackageAccess) -> bool {
    if slot.map_or(false, |current| current >= access) {
        return false;
    }
    *slot = Some(access);
    true
}

impl PackageGrants {
    fn grant(&mut self, target: GrantTarget<'_>, access: PackageAccess) -> bool {
        match target {
            GrantTarget::Everyone => raise(&mut self.everyone, access),
            GrantTarget::AllUnnamed => raise(&mut self.all_unnamed, access),
            GrantTarget::Module(module) => {
                self.targets.retain(|(t, _)| t.is_live());
                if let Some((_, current)) = self.targets.iter_mut().find(|(t, _)| t.id == module.id()) {
                    if *current >= access {
                        return false;
                    }
                    *current = access;
                    return true;
                }
                self.targets.push((WeakTarget::new(module), access));
                true
            }
        }
    }

    fn allows(&self, other: &Module, wanted: PackageAccess) -> bool {
        let satisfied = |slot: Option<PackageAccess>| slot.map_or(false, |a| a.satisfies(wanted));
        if satisfied(self.everyone) {
            return true;
        }
        if !other.is_named() && satisfied(self.all_unnamed) {
            return true;
        }
        self.targets
            .iter()
            .any(|(t, access)| access.satisfies(wanted) && t.matches(other))
    }

    fn snapshot(&self) -> PackageSnapshot {
        PackageSnapshot {
            everyone: self.everyone,
            all_unnamed: self.all_unnamed,
            targets: self
                .targets
                .iter()
                .filter(|(t, _)| t.is_live())
                .map(|(t, access)| (t.id, *access))
                .collect(),
        }
    }
}

/// Audit view of one package's grants (live targets only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSnapshot {
    pub everyone: Option<PackageAccess>,
    pub all_unnamed: Option<PackageAccess>,
    pub targets: BTreeMap<ModuleId, PackageAccess>,
}

/// Audit view of a module's dynamic edges, deterministically ordered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub reads_all_unnamed: bool,
    pub reads: BTreeSet<ModuleId>,
    pub packages: BTreeMap<String, PackageSnapshot>,
    pub uses: BTreeSet<String>,
}

/// Outgoing dynamic edges of one module
#[derive(Debug)]
pub struct ModuleNode {
    module: ModuleId,
    reads: RwLock<ReadEdges>,
    packages: RwLock<HashMap<String, PackageGrants>>,
    uses: RwLock<BTreeSet<String>>,
}

impl ModuleNode {
    pub fn new(module: ModuleId) -> Self {
        Self {
            module,
            reads: RwLock::new(ReadEdges::default()),
            packages: RwLock::new(HashMap::new()),
            uses: RwLock::new(BTreeSet::new()),
        }
    }

    /// Module this node belongs to
    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    pub fn add_read(&self, target: &Arc<Module>) -> bool {
        let mut reads = self.reads.write();
        reads.targets.retain(WeakTarget::is_live);
        if reads.targets.iter().any(|t| t.id == target.id()) {
            return false;
        }
        reads.targets.push(WeakTarget::new(target));
        true
    }

    pub fn add_read_all_unnamed(&self) -> bool {
        let mut reads = self.reads.write();
        !std::mem::replace(&mut reads.all_unnamed, true)
    }

    pub fn reads(&self, other: &Module) -> bool {
        let reads = self.reads.read();
        (reads.all_unnamed && !other.is_named()) || reads.targets.iter().any(|t| t.matches(other))
    }

    /// Record a package grant; true if the edge set changed
    pub fn grant(&self, package: &str, target: GrantTarget<'_>, access: PackageAccess) -> bool {
        let mut packages = self.packages.write();
        match packages.get_mut(package) {
            Some(grants) => grants.grant(target, access),
            None => {
                let mut grants = PackageGrants::default();
                grants.grant(target, access);
                packages.insert(package.to_string(), grants);
                true
            }
        }
    }

    /// Record the same grant for many packages under one lock acquisition
    ///
    /// Returns the number of packages whose grants changed.
    pub fn grant_many<'p, I>(&self, packages: I, target: GrantTarget<'_>, access: PackageAccess) -> usize
    where
        I: IntoIterator<Item = &'p str>,
    {
        let mut table = self.packages.write();
        packages
            .into_iter()
            .filter(|package| table.entry(package.to_string()).or_default().grant(target, access))
            .count()
    }

    /// Whether a recorded grant gives `other` at least `wanted` on `package`
    pub fn allows(&self, package: &str, other: &Module, wanted: PackageAccess) -> bool {
        self.packages
            .read()
            .get(package)
            .map_or(false, |grants| grants.allows(other, wanted))
    }

    pub fn add_use(&self, service: &str) -> bool {
        self.uses.write().insert(service.to_string())
    }

    pub fn uses(&self, service: &str) -> bool {
        self.uses.read().contains(service)
    }

    /// Dynamically used services, sorted
    pub fn used_services(&self) -> Vec<String> {
        self.uses.read().iter().cloned().collect()
    }

    /// Deterministic view of every live edge
    pub fn snapshot(&self) -> NodeSnapshot {
        let (reads_all_unnamed, reads) = {
            let reads = self.reads.read();
            (
                reads.all_unnamed,
                reads
                    .targets
                    .iter()
                    .filter(|t| t.is_live())
                    .map(|t| t.id)
                    .collect(),
            )
        };
        let packages = self
            .packages
            .read()
            .iter()
            .map(|(name, grants)| (name.clone(), grants.snapshot()))
            .collect();
        NodeSnapshot {
            reads_all_unnamed,
            reads,
            packages,
            uses: self.uses.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::layer::LayerIndex;
    use crate::module::loader::Loader;
    use crate::module::registry::ModuleDescriptor;

    fn named(index: &LayerIndex, name: &str, loader: &Arc<Loader>) -> Arc<Module> {
        let layer = index
            .define_layer(format!("layer-{}", name), &[], vec![ModuleDescriptor::new(name)])
            .unwrap();
        Module::named(ModuleDescriptor::new(name), loader, &layer)
    }

    #[test]
    fn test_concrete_grant_matches_only_target() {
        let index = LayerIndex::new();
        let loader = Loader::new("app");
        let a = named(&index, "a", &loader);
        let b = named(&index, "b", &loader);
        let node = ModuleNode::new(ModuleId::next());

        assert!(node.grant("p", GrantTarget::Module(&a), PackageAccess::Exported));
        assert!(node.allows("p", &a, PackageAccess::Exported));
        assert!(!node.allows("p", &b, PackageAccess::Exported));
        assert!(!node.allows("p", &a, PackageAccess::Open));
        assert!(!node.allows("q", &a, PackageAccess::Exported));
    }

    #[test]
    fn test_grant_is_idempotent_and_never_downgrades() {
        let index = LayerIndex::new();
        let loader = Loader::new("app");
        let a = named(&index, "a", &loader);
        let node = ModuleNode::new(ModuleId::next());

        assert!(node.grant("p", GrantTarget::Module(&a), PackageAccess::Open));
        let before = node.snapshot();
        assert!(!node.grant("p", GrantTarget::Module(&a), PackageAccess::Open));
        assert!(!node.grant("p", GrantTarget::Module(&a), PackageAccess::Exported));
        assert_eq!(node.snapshot(), before);
        assert!(node.allows("p", &a, PackageAccess::Exported));
    }

    #[test]
    fn test_all_unnamed_flag_covers_anonymous_only() {
        let index = LayerIndex::new();
        let loader = Loader::new("app");
        let a = named(&index, "a", &loader);
        let unnamed = Module::anonymous(&loader);
        let node = ModuleNode::new(ModuleId::next());

        node.grant("p", GrantTarget::AllUnnamed, PackageAccess::Exported);
        assert!(node.allows("p", &unnamed, PackageAccess::Exported));
        assert!(!node.allows("p", &a, PackageAccess::Exported));

        node.grant("p", GrantTarget::Everyone, PackageAccess::Exported);
        assert!(node.allows("p", &a, PackageAccess::Exported));
    }

    #[test]
    fn test_dead_target_stops_matching() {
        let index = LayerIndex::new();
        let loader = Loader::new("app");
        let node = ModuleNode::new(ModuleId::next());
        let target = named(&index, "gone", &loader);
        let weak = Arc::downgrade(&target);

        node.grant("p", GrantTarget::Module(&target), PackageAccess::Open);
        node.add_read(&target);
        drop(target);

        assert!(weak.upgrade().is_none());
        let snapshot = node.snapshot();
        assert!(snapshot.reads.is_empty());
        assert!(snapshot.packages["p"].targets.is_empty());
    }

    #[test]
    fn test_reads_and_uses() {
        let index = LayerIndex::new();
        let loader = Loader::new("app");
        let a = named(&index, "a", &loader);
        let unnamed = Module::anonymous(&loader);
        let node = ModuleNode::new(ModuleId::next());

        assert!(!node.reads(&a));
        assert!(node.add_read(&a));
        assert!(!node.add_read(&a));
        assert!(node.reads(&a));
        assert!(!node.reads(&unnamed));
        assert!(node.add_read_all_unnamed());
        assert!(!node.add_read_all_unnamed());
        assert!(node.reads(&unnamed));

        assert!(node.add_use("spi.Codec"));
        assert!(!node.add_use("spi.Codec"));
        node.add_use("spi.Alpha");
        assert_eq!(node.used_services(), vec!["spi.Alpha", "spi.Codec"]);
    }

    #[test]
    fn test_grant_many() {
        let id = ModuleId::next();
        let node = ModuleNode::new(id);
        assert_eq!(node.module_id(), id);
        let changed = node.grant_many(["a", "b", "c"], GrantTarget::AllUnnamed, PackageAccess::Open);
        assert_eq!(changed, 3);
        let changed = node.grant_many(["a", "d"], GrantTarget::AllUnnamed, PackageAccess::Open);
        assert_eq!(changed, 1);
        assert_eq!(node.snapshot().packages.len(), 4);
    }
}
