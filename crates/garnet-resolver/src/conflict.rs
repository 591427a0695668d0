//! Conflict tracking and reporting.
//!
//! While searching, every name whose requirement could not be met is
//! remembered together with the requirement chain that led there. The
//! record steers the queue ordering and, if resolution fails, becomes the
//! report handed back to the caller.

use crate::requirement::Requirement;
use ahash::AHashMap;
use garnet_core::{Constraint, PackageName, Platform, Version};
use serde::Serialize;
use std::fmt::{self, Write as _};

/// One step of a required-by chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Package name.
    pub name: PackageName,
    /// Constraint placed on it.
    pub constraint: Constraint,
    /// Version that was active for this name when the conflict was seen.
    pub resolved: Option<Version>,
}

/// The activation a failing requirement collided with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Existing {
    /// Activated version.
    pub version: Version,
    /// Chain of the requirement that activated it.
    pub chain: Vec<Link>,
}

/// A single unmet requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// Package name.
    pub name: PackageName,
    /// Platform of the failing requirement.
    pub platform: Platform,
    /// Chain from a top-level requirement down to the failing one.
    pub requirement: Vec<Link>,
    /// Conflicting activation, or `None` when nothing matched at all.
    pub existing: Option<Existing>,
}

impl Conflict {
    /// Snapshot a conflict, resolving every chain link with `resolved`.
    pub fn capture(
        requirement: &Requirement,
        existing: Option<(&Version, &Requirement)>,
        resolved: impl Fn(&PackageName) -> Option<Version>,
    ) -> Self {
        let links = |requirement: &Requirement| -> Vec<Link> {
            requirement
                .chain()
                .iter()
                .map(|r| Link {
                    name: r.name().clone(),
                    constraint: r.constraint().clone(),
                    resolved: resolved(r.name()),
                })
                .collect()
        };

        Self {
            name: requirement.name().clone(),
            platform: requirement.platform().clone(),
            requirement: links(requirement),
            existing: existing.map(|(version, activated_by)| Existing {
                version: version.clone(),
                chain: links(activated_by),
            }),
        }
    }

    /// Whether the failing requirement was top-level.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.requirement.len() <= 1
    }

    /// The failing constraint.
    #[must_use]
    pub fn constraint(&self) -> Option<&Constraint> {
        self.requirement.last().map(|link| &link.constraint)
    }
}

/// Per-name conflicts seen during one resolution.
#[derive(Debug, Default)]
pub struct ConflictRecord {
    entries: AHashMap<PackageName, Conflict>,
}

impl ConflictRecord {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a conflict, replacing any earlier one for the same name.
    pub fn record(&mut self, conflict: Conflict) {
        self.entries.insert(conflict.name.clone(), conflict);
    }

    /// Record a conflict unless the name already has one.
    pub fn record_if_absent(&mut self, conflict: Conflict) {
        self.entries
            .entry(conflict.name.clone())
            .or_insert(conflict);
    }

    /// Forget the conflict for `name`.
    pub fn clear(&mut self, name: &PackageName) {
        self.entries.remove(name);
    }

    /// Whether `name` has a conflict.
    #[must_use]
    pub fn contains(&self, name: &PackageName) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of names in conflict.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is in conflict.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every conflict, ordered by name.
    #[must_use]
    pub fn report(&self) -> ConflictReport {
        let mut conflicts: Vec<Conflict> = self.entries.values().cloned().collect();
        conflicts.sort_by(|a, b| a.name.cmp(&b.name));
        ConflictReport { conflicts }
    }
}

/// Why a resolution failed, one entry per package, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    /// Conflicts, sorted by package name.
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    /// Names in conflict.
    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.conflicts.iter().map(|c| &c.name)
    }

    /// Conflict for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Conflict> {
        self.conflicts.iter().find(|c| c.name.as_str() == name)
    }

    /// Whether the report has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Render with a custom formatter.
    #[must_use]
    pub fn render(&self, formatter: &dyn ConflictFormatter) -> String {
        formatter.format(self)
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&DefaultConflictFormatter.format(self))
    }
}

/// Turns a conflict report into user-facing text.
pub trait ConflictFormatter {
    /// Render the whole report.
    fn format(&self, report: &ConflictReport) -> String;
}

/// Plain-text formatter listing each requirer chain.
///
/// ```text
/// Could not find compatible versions for package "c":
///   a (>= 0) was resolved to 1.0, which depends on
///     c (= 1.0)
///
///   b (>= 0) was resolved to 1.0, which depends on
///     c (= 2.0)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConflictFormatter;

impl DefaultConflictFormatter {
    fn write_chain(out: &mut String, chain: &[Link]) {
        let last = chain.len().saturating_sub(1);
        for (depth, link) in chain.iter().enumerate() {
            let indent = "  ".repeat(depth + 1);
            let _ = write!(out, "{indent}{} ({})", link.name, link.constraint);
            match (&link.resolved, depth < last) {
                (Some(version), true) => {
                    let _ = writeln!(out, " was resolved to {version}, which depends on");
                }
                _ => out.push('\n'),
            }
        }
    }
}

impl ConflictFormatter for DefaultConflictFormatter {
    fn format(&self, report: &ConflictReport) -> String {
        let mut out = String::new();
        for (i, conflict) in report.conflicts.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = writeln!(
                out,
                "Could not find compatible versions for package \"{}\":",
                conflict.name
            );
            if let Some(existing) = &conflict.existing {
                Self::write_chain(&mut out, &existing.chain);
                out.push('\n');
            }
            Self::write_chain(&mut out, &conflict.requirement);
            match &conflict.existing {
                Some(existing) => {
                    let _ = writeln!(
                        out,
                        "\n  {} {} is already activated",
                        conflict.name, existing.version
                    );
                }
                None if !conflict.platform.is_generic() => {
                    let _ = writeln!(
                        out,
                        "\n  no matching version of {} for {}",
                        conflict.name, conflict.platform
                    );
                }
                None => {
                    let _ = writeln!(out, "\n  no matching version of {}", conflict.name);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_core::Dependency;

    fn root(name: &str, constraint: &str) -> Requirement {
        Requirement::root(
            &Dependency::parse(name, constraint).unwrap(),
            Platform::Generic,
            None,
        )
    }

    fn resolved(name: &PackageName) -> Option<Version> {
        matches!(name.as_str(), "a" | "b").then(|| Version::parse("1.0").unwrap())
    }

    fn diamond_conflict() -> Conflict {
        let a = root("a", ">= 0");
        let b = root("b", ">= 0");
        let c1 = a.child(&Dependency::parse("c", "= 1.0").unwrap());
        let c2 = b.child(&Dependency::parse("c", "= 2.0").unwrap());
        let version = Version::parse("1.0").unwrap();
        Conflict::capture(&c2, Some((&version, &c1)), resolved)
    }

    #[test]
    fn capture_snapshots_chains() {
        let conflict = diamond_conflict();
        assert_eq!(conflict.name.as_str(), "c");
        assert_eq!(conflict.requirement.len(), 2);
        assert_eq!(conflict.requirement[0].name.as_str(), "b");
        assert_eq!(conflict.requirement[0].resolved.as_ref().unwrap().as_str(), "1.0");
        let existing = conflict.existing.as_ref().unwrap();
        assert_eq!(existing.chain[0].name.as_str(), "a");
        assert!(!conflict.is_root());
        assert_eq!(conflict.constraint().unwrap().to_string(), "= 2.0");
    }

    #[test]
    fn record_sorts_and_clears() {
        let mut record = ConflictRecord::new();
        record.record(diamond_conflict());
        record.record_if_absent(Conflict::capture(&root("b", ">= 9"), None, |_| None));
        record.record_if_absent(Conflict::capture(&root("c", ">= 9"), None, |_| None));

        let report = record.report();
        let names: Vec<_> = report.names().map(PackageName::as_str).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert!(report.get("c").unwrap().existing.is_some());

        record.clear(&PackageName::new("c"));
        assert!(!record.contains(&PackageName::new("c")));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn default_formatter_names_both_chains() {
        let report = ConflictReport {
            conflicts: vec![diamond_conflict()],
        };
        let text = report.to_string();
        assert!(text.starts_with("Could not find compatible versions for package \"c\":"));
        assert!(text.contains("  a (>= 0) was resolved to 1.0, which depends on\n    c (= 1.0)"));
        assert!(text.contains("  b (>= 0) was resolved to 1.0, which depends on\n    c (= 2.0)"));
        assert!(text.contains("c 1.0 is already activated"));
    }

    #[test]
    fn custom_formatter() {
        struct NamesOnly;
        impl ConflictFormatter for NamesOnly {
            fn format(&self, report: &ConflictReport) -> String {
                report
                    .names()
                    .map(PackageName::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            }
        }
        let report = ConflictReport {
            conflicts: vec![diamond_conflict()],
        };
        assert_eq!(report.render(&NamesOnly), "c");
    }
}
