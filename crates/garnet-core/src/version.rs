//! Version numbers and version constraints.
//!
//! Versions are dot-separated sequences of numeric and alphabetic
//! segments (`1.2.3`, `2.0.0.rc1`, `1.0-beta`). Any alphabetic segment
//! makes the version a pre-release, which orders below the release it
//! precedes. Trailing zero segments are insignificant, so `1.0` and `1`
//! compare equal.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]+(?:\.[0-9a-zA-Z]+)*(?:-[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?$")
        .expect("version pattern is valid")
});

static SEGMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+|[a-zA-Z]+").expect("segment pattern is valid"));

static TERM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(=|!=|>=|<=|>|<|~>)?\s*(\S+)\s*$").expect("constraint pattern is valid")
});

static ZERO: Segment = Segment::Number(0);

type Segments = SmallVec<[Segment; 4]>;

/// One component of a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Numeric component.
    Number(u64),
    /// Alphabetic component, marks a pre-release.
    Text(String),
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), Self::Number(_)) => Ordering::Less,
            (Self::Number(_), Self::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A package version.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    raw: String,
    segments: Segments,
    canonical: Segments,
}

impl Version {
    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
        if !VERSION_PATTERN.is_match(trimmed) {
            return Err(Error::InvalidVersion {
                input: input.to_string(),
            });
        }

        let expanded = trimmed.replace('-', ".pre.");
        let mut segments = Segments::new();
        for found in SEGMENT_PATTERN.find_iter(&expanded) {
            let text = found.as_str();
            if text.as_bytes()[0].is_ascii_digit() {
                let number = text.parse::<u64>().map_err(|_| Error::InvalidVersion {
                    input: input.to_string(),
                })?;
                segments.push(Segment::Number(number));
            } else {
                segments.push(Segment::Text(text.to_string()));
            }
        }

        Ok(Self::from_parts(trimmed.to_string(), segments))
    }

    /// The `0` version, lowest of all releases.
    #[must_use]
    pub fn zero() -> Self {
        Self::from_segments(std::iter::once(Segment::Number(0)).collect())
    }

    fn from_segments(segments: Segments) -> Self {
        let raw = segments
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        Self::from_parts(raw, segments)
    }

    fn from_parts(raw: String, segments: Segments) -> Self {
        let canonical = canonicalize(&segments);
        Self {
            raw,
            segments,
            canonical,
        }
    }

    /// Original string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether any segment is alphabetic.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Text(_)))
    }

    /// The release this version leads up to (`1.0.0.rc1` -> `1.0.0`).
    #[must_use]
    pub fn release(&self) -> Self {
        if self.is_prerelease() {
            Self::from_segments(numeric_prefix(&self.segments))
        } else {
            self.clone()
        }
    }

    /// Next significant release, used by `~>` (`1.2.3` -> `1.3`).
    #[must_use]
    pub fn bump(&self) -> Self {
        let mut segments = numeric_prefix(&self.segments);
        if segments.len() > 1 {
            segments.pop();
        }
        match segments.last_mut() {
            Some(Segment::Number(last)) => *last = last.saturating_add(1),
            _ => segments.push(Segment::Number(1)),
        }
        Self::from_segments(segments)
    }
}

fn numeric_prefix(segments: &[Segment]) -> Segments {
    segments
        .iter()
        .take_while(|s| matches!(s, Segment::Number(_)))
        .cloned()
        .collect()
}

fn trim_zeros(segments: &[Segment]) -> &[Segment] {
    let end = segments
        .iter()
        .rposition(|s| *s != ZERO)
        .map_or(0, |i| i + 1);
    &segments[..end]
}

fn canonicalize(segments: &[Segment]) -> Segments {
    let split = segments
        .iter()
        .position(|s| matches!(s, Segment::Text(_)))
        .unwrap_or(segments.len());
    let (numeric, rest) = segments.split_at(split);
    let mut out: Segments = trim_zeros(numeric).iter().cloned().collect();
    out.extend(trim_zeros(rest).iter().cloned());
    out
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.canonical.len().max(other.canonical.len());
        for i in 0..len {
            let lhs = self.canonical.get(i).unwrap_or(&ZERO);
            let rhs = other.canonical.get(i).unwrap_or(&ZERO);
            match lhs.cmp(rhs) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.raw
    }
}

/// Comparison operator of a constraint term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `~>`, at least the bound but below its next significant release.
    Pessimistic,
}

impl Operator {
    /// Symbol as written in manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Pessimistic => "~>",
        }
    }

    fn parse(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "=" => Self::Eq,
            "!=" => Self::Ne,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Ge,
            "<=" => Self::Le,
            "~>" => Self::Pessimistic,
            _ => return None,
        })
    }

    /// Whether `candidate` satisfies `self bound`.
    #[must_use]
    pub fn matches(self, candidate: &Version, bound: &Version) -> bool {
        match self {
            Self::Eq => candidate == bound,
            Self::Ne => candidate != bound,
            Self::Gt => candidate > bound,
            Self::Lt => candidate < bound,
            Self::Ge => candidate >= bound,
            Self::Le => candidate <= bound,
            Self::Pessimistic => candidate >= bound && candidate.release() < bound.bump(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conjunction of `(operator, version)` terms.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Constraint {
    terms: SmallVec<[(Operator, Version); 2]>,
}

impl Constraint {
    /// Parse a comma-separated constraint such as `~> 1.2, >= 1.2.3`.
    ///
    /// A bare version means `=`; an empty string means `>= 0`.
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::any());
        }

        let mut terms = SmallVec::new();
        for part in input.split(',') {
            let captures = TERM_PATTERN
                .captures(part)
                .ok_or_else(|| Error::InvalidConstraint {
                    input: input.to_string(),
                    reason: format!("cannot parse term '{}'", part.trim()),
                })?;
            let operator = captures
                .get(1)
                .map_or(Some(Operator::Eq), |m| Operator::parse(m.as_str()))
                .ok_or_else(|| Error::InvalidConstraint {
                    input: input.to_string(),
                    reason: "unknown operator".to_string(),
                })?;
            let version = Version::parse(&captures[2]).map_err(|_| Error::InvalidConstraint {
                input: input.to_string(),
                reason: format!("malformed version '{}'", &captures[2]),
            })?;
            terms.push((operator, version));
        }

        Ok(Self { terms })
    }

    /// The default constraint, `>= 0`.
    #[must_use]
    pub fn any() -> Self {
        Self {
            terms: smallvec::smallvec![(Operator::Ge, Version::zero())],
        }
    }

    /// Exactly `version`.
    #[must_use]
    pub fn exact(version: &Version) -> Self {
        Self {
            terms: smallvec::smallvec![(Operator::Eq, version.clone())],
        }
    }

    /// Terms of the conjunction.
    #[must_use]
    pub fn terms(&self) -> &[(Operator, Version)] {
        &self.terms
    }

    /// Whether `version` satisfies every term.
    #[must_use]
    pub fn satisfied_by(&self, version: &Version) -> bool {
        self.terms
            .iter()
            .all(|(operator, bound)| operator.matches(version, bound))
    }

    /// Whether the constraint explicitly names a pre-release.
    #[must_use]
    pub fn allows_prerelease(&self) -> bool {
        self.terms.iter().any(|(_, bound)| bound.is_prerelease())
    }

    /// Whether this is the unconstrained `>= 0`.
    #[must_use]
    pub fn is_any(&self) -> bool {
        *self == Self::any()
    }
}

impl Default for Constraint {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (operator, version)) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{operator} {version}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constraint({self})")
    }
}

impl FromStr for Constraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Constraint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Constraint> for String {
    fn from(constraint: Constraint) -> Self {
        constraint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test_case("1.0", "1.0.0" ; "trailing zeros are insignificant")]
    #[test_case("1", "1.0" ; "short form")]
    #[test_case("0", "0.0.0" ; "zero")]
    #[test_case("1.0.pre.0", "1.pre" ; "trailing zeros after text")]
    fn equal_versions(a: &str, b: &str) {
        assert_eq!(v(a), v(b));
    }

    #[test_case("1.0.0.rc1", "1.0.0" ; "prerelease below release")]
    #[test_case("1.0-beta", "1.0" ; "dash prerelease")]
    #[test_case("1.9", "1.10" ; "numeric not lexical")]
    #[test_case("1.0.a", "1.0.b" ; "alphabetic segments")]
    #[test_case("2.0.0.rc1", "2.0.0.rc2" ; "numbered prereleases")]
    #[test_case("0.9.9", "1" ; "major dominates")]
    fn ordered_versions(lower: &str, higher: &str) {
        assert!(v(lower) < v(higher));
    }

    #[test]
    fn malformed_versions() {
        assert!(Version::parse("1..0").is_err());
        assert!(Version::parse("junk").is_err());
        assert!(Version::parse("1.0 beta").is_err());
    }

    #[test]
    fn prerelease_detection() {
        assert!(v("1.0.0.rc1").is_prerelease());
        assert!(v("1.0-beta").is_prerelease());
        assert!(!v("1.0.0").is_prerelease());
    }

    #[test]
    fn release_and_bump() {
        assert_eq!(v("1.0.0.rc1").release(), v("1.0.0"));
        assert_eq!(v("1.2.3").bump(), v("1.3"));
        assert_eq!(v("1.2").bump(), v("2"));
        assert_eq!(v("5").bump(), v("6"));
    }

    #[test]
    fn hash_consistent_with_eq() {
        use std::collections::HashSet;
        let set: HashSet<_> = [v("1.0"), v("1.0.0"), v("1")].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test_case(">= 1.0", "1.0", true)]
    #[test_case(">= 1.0", "0.9", false)]
    #[test_case("> 1.0", "1.0", false)]
    #[test_case("< 2.0", "1.99", true)]
    #[test_case("<= 2.0", "2.0", true)]
    #[test_case("!= 1.5", "1.5", false)]
    #[test_case("1.5", "1.5.0", true ; "bare version is exact")]
    #[test_case("~> 1.2", "1.9", true ; "pessimistic minor")]
    #[test_case("~> 1.2", "2.0", false ; "pessimistic excludes next major")]
    #[test_case("~> 1.2.3", "1.2.9", true ; "pessimistic patch")]
    #[test_case("~> 1.2.3", "1.3.0", false ; "pessimistic excludes next minor")]
    #[test_case("~> 1.2, >= 1.2.5", "1.2.4", false ; "conjunction")]
    #[test_case(">= 1.0, < 2.0", "1.5", true ; "range")]
    fn constraint_matching(constraint: &str, version: &str, expected: bool) {
        let c = Constraint::parse(constraint).unwrap();
        assert_eq!(c.satisfied_by(&v(version)), expected);
    }

    #[test]
    fn default_constraint() {
        let c = Constraint::default();
        assert!(c.is_any());
        assert_eq!(c.to_string(), ">= 0");
        assert!(c.satisfied_by(&v("0")));
        assert!(!c.allows_prerelease());
        assert_eq!(Constraint::parse("").unwrap(), c);
    }

    #[test]
    fn prerelease_constraint() {
        assert!(Constraint::parse(">= 2.0.0.rc1").unwrap().allows_prerelease());
        assert!(!Constraint::parse("~> 2.0").unwrap().allows_prerelease());
    }

    #[test]
    fn invalid_constraints() {
        assert!(Constraint::parse("=> 1.0").is_err());
        assert!(Constraint::parse(">= one").is_err());
        assert!(Constraint::parse(">= 1.0,").is_err());
    }

    #[test]
    fn constraint_display() {
        let c = Constraint::parse("~>1.2,<1.5").unwrap();
        assert_eq!(c.to_string(), "~> 1.2, < 1.5");
        assert_eq!(Constraint::exact(&v("1.0")).to_string(), "= 1.0");
    }
}
