//! Resolution results.

use crate::candidate::CandidateGroup;
use crate::materialize::Materializer;
use crate::types::ResolveError;
use ahash::AHashMap;
use garnet_core::{ContentHash, ContentHasher, PackageName, Platform, SourceId, Spec, Version};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// A package chosen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPackage {
    /// Package name.
    pub name: PackageName,
    /// Chosen version.
    pub version: Version,
    /// Source of the chosen build.
    pub source: SourceId,
    /// One build per platform it was resolved for, generic first.
    pub specs: Vec<Arc<Spec>>,
    /// Resolved packages this one depends on, sorted.
    pub dependencies: Vec<PackageName>,
    /// Whether it was requested directly.
    pub requested: bool,
}

impl ResolvedPackage {
    /// Platforms this package was resolved for.
    pub fn platforms(&self) -> impl Iterator<Item = &Platform> {
        self.specs.iter().map(|spec| &spec.platform)
    }
}

/// Successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Packages sorted by name; every name appears once.
    pub packages: Vec<ResolvedPackage>,
    /// Dependency graph; edges point from a dependency to its dependent.
    pub graph: DiGraph<PackageName, ()>,
    /// Graph node of each package.
    pub indices: AHashMap<PackageName, NodeIndex>,
    /// Time spent resolving.
    pub duration: Duration,
}

impl Resolution {
    /// Build the result from the final activations.
    pub(crate) fn assemble<'a>(
        activated: impl IntoIterator<Item = (&'a CandidateGroup, &'a BTreeSet<Platform>)>,
        requested: &BTreeSet<PackageName>,
        materializer: &dyn Materializer,
        duration: Duration,
    ) -> Result<Self, ResolveError> {
        let mut chosen: Vec<(&'a CandidateGroup, Vec<Arc<Spec>>)> = Vec::new();
        for (group, platforms) in activated {
            let mut builds: BTreeMap<Platform, Arc<Spec>> = BTreeMap::new();
            for platform in platforms {
                if let Some(spec) = group.member_for(platform) {
                    builds
                        .entry(spec.platform.clone())
                        .or_insert_with(|| Arc::clone(spec));
                }
            }
            let specs = builds
                .into_values()
                .map(|spec| {
                    if spec.is_lazy() {
                        materializer.materialize(&spec)
                    } else {
                        Ok(spec)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            if specs.is_empty() {
                return Err(ResolveError::Internal(format!(
                    "{} {} was activated without a build for any requested platform",
                    group.name(),
                    group.version()
                )));
            }
            chosen.push((group, specs));
        }
        chosen.sort_by(|a, b| a.0.name().cmp(b.0.name()));

        let names: BTreeSet<&'a PackageName> =
            chosen.iter().map(|&(group, _)| group.name()).collect();
        let packages: Vec<ResolvedPackage> = chosen
            .into_iter()
            .map(|(group, specs)| {
                let dependencies: BTreeSet<PackageName> = specs
                    .iter()
                    .flat_map(|spec| spec.runtime_dependencies())
                    .map(|dep| dep.name.clone())
                    .filter(|name| names.contains(name) && name != group.name())
                    .collect();
                ResolvedPackage {
                    name: group.name().clone(),
                    version: group.version().clone(),
                    source: specs[0].source.clone(),
                    dependencies: dependencies.into_iter().collect(),
                    requested: requested.contains(group.name()),
                    specs,
                }
            })
            .collect();

        let mut graph: DiGraph<PackageName, ()> = DiGraph::new();
        let mut indices: AHashMap<PackageName, NodeIndex> = AHashMap::new();
        for package in &packages {
            indices.insert(package.name.clone(), graph.add_node(package.name.clone()));
        }
        for package in &packages {
            let dependent = indices[&package.name];
            for dependency in &package.dependencies {
                graph.add_edge(indices[dependency], dependent, ());
            }
        }

        Ok(Self {
            packages,
            graph,
            indices,
            duration,
        })
    }

    /// Package named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResolvedPackage> {
        self.packages
            .binary_search_by(|p| p.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.packages[i])
    }

    /// Chosen version of `name`.
    #[must_use]
    pub fn version(&self, name: &str) -> Option<&Version> {
        self.get(name).map(|p| &p.version)
    }

    /// Number of packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether nothing was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Every concrete spec, name-sorted.
    pub fn specs(&self) -> impl Iterator<Item = &Arc<Spec>> {
        self.packages.iter().flat_map(|p| p.specs.iter())
    }

    /// Packages with dependencies before dependents.
    ///
    /// Ties are broken by name. Cycles are broken at the package with the
    /// fewest unmet dependencies.
    #[must_use]
    pub fn install_order(&self) -> Vec<&ResolvedPackage> {
        let mut pending: BTreeMap<&PackageName, usize> = self
            .packages
            .iter()
            .map(|p| {
                let idx = self.indices[&p.name];
                (
                    &p.name,
                    self.graph.neighbors_directed(idx, Direction::Incoming).count(),
                )
            })
            .collect();
        let mut ready: BTreeSet<&PackageName> = pending
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(self.packages.len());
        while !pending.is_empty() {
            if ready.is_empty() {
                if let Some((&name, _)) = pending.iter().min_by_key(|(_, degree)| **degree) {
                    ready.insert(name);
                }
            }
            while let Some(name) = ready.pop_first() {
                if pending.remove(name).is_none() {
                    continue;
                }
                if let Some(package) = self.get(name.as_str()) {
                    order.push(package);
                }
                let idx = self.indices[name];
                for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                    let dependent = &self.graph[neighbor];
                    if let Some(degree) = pending.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.insert(dependent);
                        }
                    }
                }
            }
        }
        order
    }

    /// Digest of the name-sorted build listing.
    ///
    /// Equal for two resolutions that chose the same builds.
    #[must_use]
    pub fn checksum(&self) -> ContentHash {
        let mut hasher = ContentHasher::new();
        for spec in self.specs() {
            hasher
                .field(spec.name.as_str())
                .field(spec.version.as_str())
                .field(spec.platform.to_string())
                .field(spec.source.to_string());
        }
        hasher.finalize()
    }

    /// Pretty JSON listing of the packages.
    pub fn to_json(&self) -> garnet_core::Result<String> {
        garnet_core::to_json_pretty(&self.packages)
    }
}
