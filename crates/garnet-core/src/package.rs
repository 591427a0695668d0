//! Package types and metadata.

use crate::platform::Platform;
use crate::version::{Constraint, Version};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("name pattern is valid"));

/// Package name.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::Into,
)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Create a name without validation.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parse and validate a name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        NAME_PATTERN.is_match(s).then(|| Self::new(s))
    }

    /// Get the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for PackageName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidPackageName(s.to_string()))
    }
}

/// Where a package comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceId {
    /// Remote package index.
    Registry {
        /// Index URL.
        url: Url,
    },
    /// Local directory.
    Path {
        /// Directory path.
        path: PathBuf,
    },
    /// Version-control checkout.
    Git {
        /// Repository URI.
        uri: String,
        /// Branch, tag or commit.
        revision: Option<String>,
    },
}

impl SourceId {
    /// Remote index at `url`.
    pub fn registry(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidSource {
            input: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::Registry { url })
    }

    /// Local directory source.
    #[must_use]
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path { path: path.into() }
    }

    /// Git checkout, optionally at a fixed revision.
    #[must_use]
    pub fn git(uri: impl Into<String>, revision: Option<&str>) -> Self {
        Self::Git {
            uri: uri.into(),
            revision: revision.map(str::to_string),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry { url } => write!(f, "registry {url}"),
            Self::Path { path } => write!(f, "source at `{}`", path.display()),
            Self::Git { uri, revision } => {
                write!(f, "git repository {uri}")?;
                if let Some(revision) = revision {
                    write!(f, " (at {revision})")?;
                }
                Ok(())
            }
        }
    }
}

/// Dependency type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Needed at runtime.
    #[default]
    Runtime,
    /// Needed only to develop the package itself.
    Development,
}

/// Package dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// Package name.
    pub name: PackageName,
    /// Version constraint.
    pub constraint: Constraint,
    /// Dependency type.
    #[serde(default)]
    pub kind: DependencyKind,
}

impl Dependency {
    /// Create runtime dependency.
    #[must_use]
    pub const fn new(name: PackageName, constraint: Constraint) -> Self {
        Self {
            name,
            constraint,
            kind: DependencyKind::Runtime,
        }
    }

    /// Create development dependency.
    #[must_use]
    pub const fn development(name: PackageName, constraint: Constraint) -> Self {
        Self {
            name,
            constraint,
            kind: DependencyKind::Development,
        }
    }

    /// Parse `name` and `constraint` strings into a runtime dependency.
    pub fn parse(name: &str, constraint: &str) -> Result<Self> {
        Ok(Self::new(name.parse()?, Constraint::parse(constraint)?))
    }

    /// Whether this is needed at runtime.
    #[must_use]
    pub fn is_runtime(&self) -> bool {
        self.kind == DependencyKind::Runtime
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.constraint)
    }
}

/// How complete a spec's metadata is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    /// Full metadata from a source index.
    #[default]
    Indexed,
    /// Reference restored from a lockfile; must be materialized before
    /// install.
    Lazy,
}

/// A concrete, platform-qualified package build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    /// Package name.
    pub name: PackageName,
    /// Version.
    pub version: Version,
    /// Platform of this build.
    #[serde(default)]
    pub platform: Platform,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Source it was found in.
    pub source: SourceId,
    /// Metadata completeness.
    #[serde(default)]
    pub kind: SpecKind,
}

impl Spec {
    /// Create a generic, dependency-free spec.
    #[must_use]
    pub fn new(name: PackageName, version: Version, source: SourceId) -> Self {
        Self {
            name,
            version,
            platform: Platform::Generic,
            dependencies: Vec::new(),
            source,
            kind: SpecKind::Indexed,
        }
    }

    /// Set the platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Add a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Mark as a lazy lockfile reference.
    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.kind = SpecKind::Lazy;
        self
    }

    /// Whether this spec still needs materialization.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.kind == SpecKind::Lazy
    }

    /// Runtime dependencies only.
    pub fn runtime_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| d.is_runtime())
    }

    /// `name-version`, suffixed with the platform for native builds.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.platform.is_generic() {
            format!("{}-{}", self.name, self.version)
        } else {
            format!("{}-{}-{}", self.name, self.version, self.platform)
        }
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_package_name() {
        assert_eq!(PackageName::parse("rack").unwrap().as_str(), "rack");
        assert!(PackageName::parse("net-http_2.x").is_some());
        assert!(PackageName::parse("").is_none());
        assert!(PackageName::parse("-rack").is_none());
        assert!(PackageName::parse("ra ck").is_none());
    }

    #[test]
    fn source_display() {
        let registry = SourceId::registry("https://index.example.org/").unwrap();
        assert_eq!(registry.to_string(), "registry https://index.example.org/");
        let git = SourceId::git("https://example.org/repo.git", Some("abc123"));
        assert_eq!(
            git.to_string(),
            "git repository https://example.org/repo.git (at abc123)"
        );
        assert!(SourceId::registry("not a url").is_err());
    }

    #[test]
    fn spec_full_name_and_runtime_dependencies() {
        let source = SourceId::path("/src/gems");
        let spec = Spec::new(
            PackageName::new("nokogiri"),
            Version::parse("1.16.0").unwrap(),
            source,
        )
        .with_platform(Platform::parse("x86_64-linux").unwrap())
        .with_dependency(Dependency::parse("racc", "~> 1.4").unwrap())
        .with_dependency(Dependency::development(
            PackageName::new("rake"),
            Constraint::any(),
        ));

        assert_eq!(spec.full_name(), "nokogiri-1.16.0-x86_64-linux");
        let runtime: Vec<_> = spec.runtime_dependencies().map(|d| d.name.as_str()).collect();
        assert_eq!(runtime, vec!["racc"]);
        assert!(!spec.is_lazy());
        assert!(spec.lazy().is_lazy());
    }
}
