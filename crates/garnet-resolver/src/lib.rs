//! Backtracking dependency resolver for Garnet packages.
//!
//! Given top-level requirements, a set of package sources and optionally a
//! previous lock, the resolver picks exactly one version of every package
//! reachable from the requirements such that every constraint holds. When
//! that is impossible it returns a report naming each package in conflict
//! together with the chains of requirements that led there.
//!
//! # Features
//!
//! - **Conflict-directed backtracking**: a failed requirement jumps straight
//!   back to the choice that introduced it
//! - **Lock preference**: previously locked versions are tried first unless
//!   unlocked; frozen mode refuses any change
//! - **Multi-platform**: one version per package, with a build for every
//!   requested platform
//! - **Source pinning**: packages can be restricted to a single source
//!
//! # Example
//!
//! ```rust,ignore
//! use garnet_resolver::prelude::*;
//! use std::sync::Arc;
//!
//! let index = MemoryIndex::new(SourceId::registry("https://gems.example.org/")?);
//! index.add_version("rails", "7.0.4", vec![("rack", "~> 2.2")])?;
//! index.add_version("rack", "2.2.8", vec![])?;
//!
//! let resolver = Resolver::new(
//!     SourceMap::new().with_source(Arc::new(index)),
//!     ResolverConfig::default().with_env_overrides(),
//! );
//! let resolution = resolver.resolve(&[Dependency::parse("rails", ">= 7")?])?;
//! for package in resolution.install_order() {
//!     println!("{} {}", package.name, package.version);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`resolver`]: the search and its statistics
//! - [`index`]: package sources and how they are combined
//! - [`candidate`]: grouping platform builds of one version
//! - [`requirement`]: requirements and their required-by chains
//! - [`locked`]: previously locked specs and the unlock policy
//! - [`conflict`]: conflict tracking and reporting
//! - [`resolution`]: the successful result
//! - [`materialize`]: realising lazy locked specs
//! - [`config`]: layered configuration
//! - [`types`]: the error taxonomy

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod candidate;
pub mod config;
pub mod conflict;
pub mod index;
pub mod locked;
pub mod materialize;
pub mod requirement;
pub mod resolution;
pub mod resolver;
pub mod types;

pub use candidate::CandidateGroup;
pub use config::{EnvVar, ResolverConfig};
pub use conflict::{
    Conflict, ConflictFormatter, ConflictRecord, ConflictReport, DefaultConflictFormatter,
    Existing, Link,
};
pub use index::{Index, MemoryIndex, Overrides, Query, SourceMap, search_specs};
pub use locked::{LockedSpecs, Unlock};
pub use materialize::{IndexMaterializer, MaterializeError, Materializer};
pub use requirement::{Requirement, SearchKey};
pub use resolution::{Resolution, ResolvedPackage};
pub use resolver::{Resolver, ResolverStats};
pub use types::ResolveError;

pub use garnet_core::{Constraint, Dependency, PackageName, Platform, SourceId, Spec, Version};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Constraint, Dependency, Index, LockedSpecs, MemoryIndex, PackageName, Platform,
        Resolution, ResolveError, ResolvedPackage, Resolver, ResolverConfig, SourceId,
        SourceMap, Unlock, Version,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    const PACKAGES: usize = 5;
    const CONSTRAINTS: [&str; 5] = [">= 1.0", "= 1.0", "= 2.0", "< 3.0", "~> 2.0"];

    /// `deps[i][v][k]` is the optional constraint that version `v + 1` of
    /// `p{i}` places on `p{i + k + 1}`. Dependencies only point forward.
    #[derive(Debug, Clone)]
    struct Registry {
        deps: Vec<Vec<Vec<Option<usize>>>>,
    }

    fn registry() -> impl Strategy<Value = Registry> {
        prop::collection::vec(1usize..=3, PACKAGES)
            .prop_flat_map(|versions| {
                versions
                    .iter()
                    .enumerate()
                    .map(|(i, &count)| {
                        prop::collection::vec(
                            prop::collection::vec(
                                prop::option::of(0..CONSTRAINTS.len()),
                                PACKAGES - i - 1,
                            ),
                            count,
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .prop_map(|deps| Registry { deps })
    }

    fn build(registry: &Registry) -> Resolver {
        let index = MemoryIndex::new(SourceId::path("/gems"));
        for (i, versions) in registry.deps.iter().enumerate() {
            for (v, deps) in versions.iter().enumerate() {
                let deps: Vec<(String, &str)> = deps
                    .iter()
                    .enumerate()
                    .filter_map(|(k, c)| c.map(|c| (format!("p{}", i + k + 1), CONSTRAINTS[c])))
                    .collect();
                let refs = deps.iter().map(|(name, c)| (name.as_str(), *c)).collect();
                index
                    .add_version(&format!("p{i}"), &format!("{}.0", v + 1), refs)
                    .unwrap();
            }
        }
        let config = ResolverConfig {
            max_iterations: 100_000,
            ..ResolverConfig::default()
        };
        Resolver::new(SourceMap::new().with_source(Arc::new(index)), config)
    }

    fn roots(constraint: usize) -> Vec<Dependency> {
        vec![
            Dependency::parse("p0", ">= 0").unwrap(),
            Dependency::parse("p1", CONSTRAINTS[constraint]).unwrap(),
        ]
    }

    proptest! {
        #[test]
        fn resolutions_satisfy_every_requirement(
            registry in registry(),
            constraint in 0..CONSTRAINTS.len(),
        ) {
            let roots = roots(constraint);
            let resolver = build(&registry);
            match resolver.resolve(&roots) {
                Ok(resolution) => {
                    let names: Vec<_> = resolution.packages.iter().map(|p| &p.name).collect();
                    prop_assert!(names.windows(2).all(|pair| pair[0] < pair[1]));

                    // Without backtracking every package is activated exactly once.
                    let stats = resolver.stats();
                    if stats.backtracks.load(Ordering::Relaxed) == 0 {
                        prop_assert_eq!(
                            stats.activations.load(Ordering::Relaxed),
                            u64::try_from(resolution.len()).unwrap()
                        );
                    }

                    for root in &roots {
                        let version = resolution.version(root.name.as_str());
                        prop_assert!(version.is_some_and(|v| root.constraint.satisfied_by(v)));
                    }
                    for spec in resolution.specs() {
                        for dep in spec.runtime_dependencies() {
                            let version = resolution.version(dep.name.as_str());
                            prop_assert!(
                                version.is_some_and(|v| dep.constraint.satisfied_by(v)),
                                "{} needs {} ({}), got {:?}",
                                spec.full_name(),
                                dep.name,
                                dep.constraint,
                                version
                            );
                        }
                    }
                }
                Err(ResolveError::VersionConflict(report)) => {
                    prop_assert!(!report.is_empty());
                    let mut root_entries = 0;
                    for name in report.names() {
                        let conflict = report.get(name.as_str()).unwrap();
                        prop_assert!(!conflict.requirement.is_empty(), "{} has no chain", name);
                        if conflict.is_root() {
                            root_entries += 1;
                        }
                    }
                    prop_assert!(root_entries <= 1, "{} root conflicts", root_entries);
                }
                Err(err) => prop_assert!(
                    matches!(err, ResolveError::NotFound { .. }),
                    "unexpected error: {}",
                    err
                ),
            }
        }

        #[test]
        fn resolution_is_deterministic(
            registry in registry(),
            constraint in 0..CONSTRAINTS.len(),
        ) {
            let roots = roots(constraint);
            let first = build(&registry).resolve(&roots);
            let second = build(&registry).resolve(&roots);
            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a.packages, b.packages),
                (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
                (a, b) => prop_assert_eq!(a.is_ok(), b.is_ok()),
            }
        }
    }

    #[test]
    fn full_resolution_flow() {
        let index = MemoryIndex::new(SourceId::path("/gems"));
        index
            .add_version(
                "rails",
                "7.0.4",
                vec![("actionpack", "= 7.0.4"), ("rack", "~> 2.2")],
            )
            .unwrap();
        index
            .add_version("actionpack", "7.0.4", vec![("rack", ">= 2.2.4")])
            .unwrap();
        index.add_version("rack", "2.2.8", vec![]).unwrap();
        index.add_version("rack", "3.0.0", vec![]).unwrap();

        let resolver = Resolver::new(
            SourceMap::new().with_source(Arc::new(index)),
            ResolverConfig::default(),
        );
        let resolution = resolver
            .resolve(&[Dependency::parse("rails", "~> 7.0").unwrap()])
            .unwrap();

        assert_eq!(resolution.len(), 3);
        assert_eq!(resolution.version("rack").unwrap().as_str(), "2.2.8");
        let order: Vec<_> = resolution
            .install_order()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(order, vec!["rack", "actionpack", "rails"]);

        let relocked = LockedSpecs::from_resolution(&resolution);
        assert_eq!(relocked.len(), 3);
    }
}
