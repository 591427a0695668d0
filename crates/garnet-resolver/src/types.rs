//! Resolution error taxonomy.

use crate::conflict::ConflictReport;
use crate::materialize::MaterializeError;
use garnet_core::{PackageName, SourceId, Version};
use std::fmt::Write as _;
use thiserror::Error;

/// Why a resolution failed.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A top-level package has no version matching its constraint.
    #[error("{}", not_found_message(.name, .requirement, .sources, .available))]
    NotFound {
        /// Package name.
        name: PackageName,
        /// The unmet requirement, rendered.
        requirement: String,
        /// Sources that were consulted.
        sources: Vec<String>,
        /// Versions that do exist, ascending.
        available: Vec<Version>,
    },

    /// No combination of versions satisfies every requirement.
    #[error("{0}")]
    VersionConflict(ConflictReport),

    /// Frozen mode forbids the change the resolution would need.
    #[error(
        "the lockfile can't be updated because frozen mode is set: {requirement} is not satisfied by the locked {}",
        locked_versions(.locked)
    )]
    FrozenViolation {
        /// Package name.
        name: PackageName,
        /// The unmet requirement, rendered.
        requirement: String,
        /// Locked versions of the package, if any.
        locked: Vec<Version>,
    },

    /// A package is pinned to a source that was never registered.
    #[error("package '{name}' is pinned to {pinned}, which is not a known source")]
    UnknownSource {
        /// Package name.
        name: PackageName,
        /// The unregistered source.
        pinned: SourceId,
    },

    /// The cancel flag was raised.
    #[error("resolution cancelled")]
    Cancelled,

    /// The search ran past the configured iteration limit.
    #[error("resolution gave up after {limit} iterations")]
    IterationLimit {
        /// Configured limit.
        limit: u64,
    },

    /// A lazily locked spec could not be realised.
    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    /// Search bookkeeping went wrong.
    #[error("internal resolver error: {0}")]
    Internal(String),
}

impl ResolveError {
    /// Conflict report, for version conflicts.
    #[must_use]
    pub fn conflicts(&self) -> Option<&ConflictReport> {
        match self {
            Self::VersionConflict(report) => Some(report),
            _ => None,
        }
    }
}

fn not_found_message(
    name: &PackageName,
    requirement: &str,
    sources: &[String],
    available: &[Version],
) -> String {
    let mut message = if available.is_empty() {
        format!("could not find package '{name}' in any of the sources")
    } else {
        format!("could not find package '{requirement}' in any of the sources")
    };
    if !sources.is_empty() {
        let _ = write!(message, " ({})", sources.join(", "));
    }
    if !available.is_empty() {
        let versions: Vec<String> = available.iter().map(ToString::to_string).collect();
        let _ = write!(
            message,
            "; the available versions of '{name}' are {}",
            versions.join(", ")
        );
    }
    message
}

fn locked_versions(locked: &[Version]) -> String {
    if locked.is_empty() {
        return "set (the package is not locked)".to_string();
    }
    let versions: Vec<String> = locked.iter().map(ToString::to_string).collect();
    format!("version {}", versions.join(", "))
}
