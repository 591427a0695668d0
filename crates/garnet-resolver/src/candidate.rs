//! Candidate groups: every platform build of one name and version.

use crate::requirement::Requirement;
use ahash::AHashSet;
use garnet_core::{Dependency, PackageName, Platform, SourceId, Spec, Version};
use std::collections::BTreeMap;
use std::sync::Arc;

/// All builds of one package version, generic build first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateGroup {
    name: PackageName,
    version: Version,
    members: Vec<Arc<Spec>>,
}

impl CandidateGroup {
    /// Group specs by version, ascending.
    ///
    /// Specs must all share a name. When two specs have the same version
    /// and platform the first one wins.
    pub fn group_specs(specs: impl IntoIterator<Item = Arc<Spec>>) -> Vec<Self> {
        let mut by_version: BTreeMap<Version, Self> = BTreeMap::new();
        let mut seen: AHashSet<(Version, Platform)> = AHashSet::new();

        for spec in specs {
            if !seen.insert((spec.version.clone(), spec.platform.clone())) {
                continue;
            }
            by_version
                .entry(spec.version.clone())
                .or_insert_with(|| Self {
                    name: spec.name.clone(),
                    version: spec.version.clone(),
                    members: Vec::new(),
                })
                .members
                .push(spec);
        }

        let mut groups: Vec<Self> = by_version.into_values().collect();
        for group in &mut groups {
            group.members.sort_by(|a, b| a.platform.cmp(&b.platform));
        }
        groups
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// Version shared by every member.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Builds, generic first then by platform string.
    #[must_use]
    pub fn members(&self) -> &[Arc<Spec>] {
        &self.members
    }

    /// Source of the first build.
    #[must_use]
    pub fn source(&self) -> Option<&SourceId> {
        self.members.first().map(|spec| &spec.source)
    }

    /// The build to install on `platform`.
    ///
    /// A matching native build is preferred over the generic one.
    #[must_use]
    pub fn member_for(&self, platform: &Platform) -> Option<&Arc<Spec>> {
        self.members
            .iter()
            .rev()
            .find(|spec| !spec.platform.is_generic() && spec.platform.runs_on(platform))
            .or_else(|| self.members.iter().find(|spec| spec.platform.is_generic()))
    }

    /// Whether some build runs on `platform`.
    #[must_use]
    pub fn supports(&self, platform: &Platform) -> bool {
        self.member_for(platform).is_some()
    }

    /// Runtime dependencies of the build for `platform`.
    #[must_use]
    pub fn dependencies(&self, platform: &Platform) -> Vec<&Dependency> {
        self.member_for(platform)
            .map(|spec| spec.runtime_dependencies().collect())
            .unwrap_or_default()
    }

    /// Child requirements created by activating this group for
    /// `requirement`.
    #[must_use]
    pub fn activate(&self, requirement: &Requirement) -> Vec<Requirement> {
        self.dependencies(requirement.platform())
            .into_iter()
            .map(|dependency| requirement.child(dependency))
            .collect()
    }
}
