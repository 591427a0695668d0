//! Package indices.
//!
//! An [`Index`] answers "which builds of this package exist" for one
//! source. A [`SourceMap`] composes several of them: by default a search
//! spans every source in registration order, but a package pinned to a
//! source is looked up in that source alone.

use crate::candidate::CandidateGroup;
use crate::types::ResolveError;
use ahash::AHashMap;
use garnet_core::{
    Constraint, Dependency, PackageName, Platform, Result as CoreResult, SourceId, Spec, Version,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What a search is looking for.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    /// Package name.
    pub name: &'a PackageName,
    /// Version constraint.
    pub constraint: &'a Constraint,
    /// Platform the result must run on.
    pub platform: &'a Platform,
    /// Whether pre-release versions are eligible.
    pub prerelease: bool,
}

impl Query<'_> {
    /// Whether `group` answers this query.
    #[must_use]
    pub fn matches(&self, group: &CandidateGroup) -> bool {
        let version = group.version();
        self.constraint.satisfied_by(version)
            && (self.prerelease || !version.is_prerelease())
            && group.supports(self.platform)
    }
}

/// Filter grouped specs down to those answering `query`.
#[must_use]
pub fn search_specs(specs: Vec<Arc<Spec>>, query: &Query<'_>) -> Vec<CandidateGroup> {
    CandidateGroup::group_specs(specs)
        .into_iter()
        .filter(|group| query.matches(group))
        .collect()
}

/// A queryable collection of package builds from one source.
pub trait Index: Send + Sync + fmt::Debug {
    /// The source these specs come from.
    fn source(&self) -> &SourceId;

    /// Every spec in the index.
    fn specs(&self) -> Vec<Arc<Spec>>;

    /// Every build of `name`.
    fn specs_named(&self, name: &PackageName) -> Vec<Arc<Spec>>;

    /// Candidate groups answering `query`, ascending by version.
    fn search(&self, query: &Query<'_>) -> Vec<CandidateGroup> {
        search_specs(self.specs_named(query.name), query)
    }

    /// Distinct versions of `name`, ascending.
    fn versions(&self, name: &PackageName) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .specs_named(name)
            .into_iter()
            .map(|spec| spec.version.clone())
            .collect();
        versions.sort();
        versions.dedup();
        versions
    }
}

/// In-memory index, filled programmatically.
#[derive(Debug)]
pub struct MemoryIndex {
    source: SourceId,
    specs: RwLock<AHashMap<PackageName, Vec<Arc<Spec>>>>,
}

impl MemoryIndex {
    /// Create an empty index for `source`.
    #[must_use]
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            specs: RwLock::new(AHashMap::new()),
        }
    }

    /// Add a spec.
    pub fn add(&self, spec: Spec) {
        self.specs
            .write()
            .entry(spec.name.clone())
            .or_default()
            .push(Arc::new(spec));
    }

    /// Add a generic build of `name` at `version` with runtime
    /// dependencies given as `(name, constraint)` pairs.
    pub fn add_version(
        &self,
        name: &str,
        version: &str,
        deps: Vec<(&str, &str)>,
    ) -> CoreResult<()> {
        self.add_platform_version(name, version, "ruby", deps)
    }

    /// Like [`add_version`](Self::add_version), for a specific platform.
    pub fn add_platform_version(
        &self,
        name: &str,
        version: &str,
        platform: &str,
        deps: Vec<(&str, &str)>,
    ) -> CoreResult<()> {
        let mut spec = Spec::new(name.parse()?, Version::parse(version)?, self.source.clone())
            .with_platform(Platform::parse(platform)?);
        for (dep_name, constraint) in deps {
            spec = spec.with_dependency(Dependency::parse(dep_name, constraint)?);
        }
        self.add(spec);
        Ok(())
    }

    /// Number of specs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.read().values().map(Vec::len).sum()
    }

    /// Whether the index has no specs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.read().is_empty()
    }
}

impl Index for MemoryIndex {
    fn source(&self) -> &SourceId {
        &self.source
    }

    fn specs(&self) -> Vec<Arc<Spec>> {
        let specs = self.specs.read();
        let mut names: Vec<&PackageName> = specs.keys().collect();
        names.sort();
        names
            .into_iter()
            .flat_map(|name| specs[name].iter().cloned())
            .collect()
    }

    fn specs_named(&self, name: &PackageName) -> Vec<Arc<Spec>> {
        self.specs.read().get(name).cloned().unwrap_or_default()
    }
}

/// Every source a resolution may draw from, plus per-package pins.
#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    sources: Vec<Arc<dyn Index>>,
    pins: BTreeMap<PackageName, SourceId>,
}

/// Package name to the index it must be looked up in.
pub type Overrides = AHashMap<PackageName, Arc<dyn Index>>;

impl SourceMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source. Earlier sources win when two provide the same
    /// build.
    #[must_use]
    pub fn with_source(mut self, index: Arc<dyn Index>) -> Self {
        self.sources.push(index);
        self
    }

    /// Restrict `name` to `source`.
    #[must_use]
    pub fn with_pin(mut self, name: PackageName, source: SourceId) -> Self {
        self.pins.insert(name, source);
        self
    }

    /// Registered sources.
    #[must_use]
    pub fn sources(&self) -> &[Arc<dyn Index>] {
        &self.sources
    }

    /// Source `name` is pinned to.
    #[must_use]
    pub fn pin(&self, name: &PackageName) -> Option<&SourceId> {
        self.pins.get(name)
    }

    /// Index registered for `source`.
    #[must_use]
    pub fn index_for(&self, source: &SourceId) -> Option<&Arc<dyn Index>> {
        self.sources.iter().find(|index| index.source() == source)
    }

    /// Resolve every pin to its index.
    pub fn overrides(&self) -> Result<Overrides, ResolveError> {
        self.pins
            .iter()
            .map(|(name, source)| {
                self.index_for(source)
                    .map(|index| (name.clone(), Arc::clone(index)))
                    .ok_or_else(|| ResolveError::UnknownSource {
                        name: name.clone(),
                        pinned: source.clone(),
                    })
            })
            .collect()
    }

    /// Human-readable names of every source, for error messages.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|index| index.source().to_string())
            .collect()
    }

    /// Every build of `name` across all sources, in registration order.
    #[must_use]
    pub fn specs_named(&self, name: &PackageName) -> Vec<Arc<Spec>> {
        self.sources
            .iter()
            .flat_map(|index| index.specs_named(name))
            .collect()
    }

    /// Search every source.
    #[must_use]
    pub fn search(&self, query: &Query<'_>) -> Vec<CandidateGroup> {
        search_specs(self.specs_named(query.name), query)
    }

    /// Distinct versions of `name` across all sources, ascending.
    #[must_use]
    pub fn versions(&self, name: &PackageName) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .specs_named(name)
            .into_iter()
            .map(|spec| spec.version.clone())
            .collect();
        versions.sort();
        versions.dedup();
        versions
    }
}
