//! Previously locked specs and the unlock policy.

use crate::candidate::CandidateGroup;
use crate::index::{Query, search_specs};
use crate::resolution::Resolution;
use garnet_core::{PackageName, Spec, Version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Which locked packages may move to another version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unlock {
    /// Keep every locked version where possible.
    #[default]
    None,
    /// Ignore the lock entirely.
    All,
    /// Unlock only these packages.
    Names(BTreeSet<PackageName>),
}

impl Unlock {
    /// Unlock the given names.
    pub fn names<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self::Names(names.into_iter().map(PackageName::new).collect())
    }

    /// Whether `name` may move away from its locked version.
    #[must_use]
    pub fn is_unlocked(&self, name: &PackageName) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Names(names) => names.contains(name),
        }
    }
}

/// Specs chosen by an earlier resolution, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedSpecs {
    specs: BTreeMap<PackageName, Vec<Arc<Spec>>>,
}

impl LockedSpecs {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect specs, typically parsed from a lockfile.
    pub fn from_specs(specs: impl IntoIterator<Item = Spec>) -> Self {
        let mut locked = Self::new();
        for spec in specs {
            locked.insert(spec);
        }
        locked
    }

    /// Lock everything a resolution chose.
    #[must_use]
    pub fn from_resolution(resolution: &Resolution) -> Self {
        let mut specs: BTreeMap<PackageName, Vec<Arc<Spec>>> = BTreeMap::new();
        for package in &resolution.packages {
            specs
                .entry(package.name.clone())
                .or_default()
                .extend(package.specs.iter().cloned());
        }
        Self { specs }
    }

    /// Add a spec.
    pub fn insert(&mut self, spec: Spec) {
        self.specs
            .entry(spec.name.clone())
            .or_default()
            .push(Arc::new(spec));
    }

    /// Locked builds of `name`.
    #[must_use]
    pub fn get(&self, name: &PackageName) -> Option<&[Arc<Spec>]> {
        self.specs.get(name).map(Vec::as_slice)
    }

    /// Locked version of `name`.
    #[must_use]
    pub fn version(&self, name: &PackageName) -> Option<&Version> {
        self.get(name)?.first().map(|spec| &spec.version)
    }

    /// Whether `name` is locked.
    #[must_use]
    pub fn contains(&self, name: &PackageName) -> bool {
        self.specs.contains_key(name)
    }

    /// Locked names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.specs.keys()
    }

    /// Number of locked names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether nothing is locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Answer `query` from the locked builds alone.
    #[must_use]
    pub fn search(&self, query: &Query<'_>) -> Vec<CandidateGroup> {
        self.get(query.name)
            .map(|specs| search_specs(specs.to_vec(), query))
            .unwrap_or_default()
    }
}
