//! Requirements and their required-by chains.

use garnet_core::{Constraint, Dependency, PackageName, Platform, SourceId, Version};
use std::fmt;
use std::sync::Arc;

/// A request for some version of a package on one platform.
///
/// Cheap to clone. Each requirement points at the requirement whose
/// activation introduced it; roots have no parent.
#[derive(Clone)]
pub struct Requirement(Arc<Inner>);

struct Inner {
    name: PackageName,
    constraint: Constraint,
    platform: Platform,
    source: Option<SourceId>,
    parent: Option<Requirement>,
    depth: usize,
}

// Long chains would otherwise drop recursively.
impl Drop for Inner {
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(requirement) = next {
            match Arc::try_unwrap(requirement.0) {
                Ok(mut inner) => next = inner.parent.take(),
                Err(_) => break,
            }
        }
    }
}

impl Requirement {
    /// A top-level requirement.
    #[must_use]
    pub fn root(dependency: &Dependency, platform: Platform, source: Option<SourceId>) -> Self {
        Self(Arc::new(Inner {
            name: dependency.name.clone(),
            constraint: dependency.constraint.clone(),
            platform,
            source,
            parent: None,
            depth: 0,
        }))
    }

    /// A requirement introduced by activating `self`, on the same platform.
    #[must_use]
    pub fn child(&self, dependency: &Dependency) -> Self {
        Self(Arc::new(Inner {
            name: dependency.name.clone(),
            constraint: dependency.constraint.clone(),
            platform: self.0.platform.clone(),
            source: None,
            parent: Some(self.clone()),
            depth: self.0.depth + 1,
        }))
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &PackageName {
        &self.0.name
    }

    /// Version constraint.
    #[must_use]
    pub fn constraint(&self) -> &Constraint {
        &self.0.constraint
    }

    /// Target platform.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.0.platform
    }

    /// Explicit source, if the package is pinned.
    #[must_use]
    pub fn source(&self) -> Option<&SourceId> {
        self.0.source.as_ref()
    }

    /// The requirement whose activation introduced this one.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.0.parent.as_ref()
    }

    /// Whether this is a top-level requirement.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    /// Number of ancestors.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// Ancestors from the root down to `self` inclusive.
    #[must_use]
    pub fn chain(&self) -> Vec<Self> {
        let mut chain = Vec::with_capacity(self.0.depth + 1);
        let mut cursor = Some(self);
        while let Some(requirement) = cursor {
            chain.push(requirement.clone());
            cursor = requirement.parent();
        }
        chain.reverse();
        chain
    }

    /// Whether `version` meets the constraint.
    #[must_use]
    pub fn satisfied_by(&self, version: &Version) -> bool {
        self.0.constraint.satisfied_by(version)
    }

    /// Whether the constraint names a pre-release.
    #[must_use]
    pub fn allows_prerelease(&self) -> bool {
        self.0.constraint.allows_prerelease()
    }

    /// Memoization key for index searches.
    #[must_use]
    pub fn search_key(&self, prerelease: bool) -> SearchKey {
        SearchKey {
            name: self.0.name.clone(),
            constraint: self.0.constraint.clone(),
            platform: self.0.platform.clone(),
            source: self.0.source.clone(),
            prerelease: prerelease || self.allows_prerelease(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0.name, self.0.constraint)?;
        if !self.0.platform.is_generic() {
            write!(f, " [{}]", self.0.platform)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requirement")
            .field("name", &self.0.name)
            .field("constraint", &self.0.constraint)
            .field("platform", &self.0.platform)
            .field("depth", &self.0.depth)
            .finish_non_exhaustive()
    }
}

/// The shape of a requirement as far as index lookups are concerned.
///
/// Two requirements with the same key always see the same candidates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKey {
    /// Package name.
    pub name: PackageName,
    /// Version constraint.
    pub constraint: Constraint,
    /// Target platform.
    pub platform: Platform,
    /// Explicit source.
    pub source: Option<SourceId>,
    /// Whether pre-release versions are eligible.
    pub prerelease: bool,
}
