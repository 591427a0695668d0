//! Build platforms.
//!
//! A package build is either generic (pure, runs anywhere) or native to a
//! `cpu-os[-version]` triple such as `x86_64-linux` or
//! `universal-darwin-22`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const GENERIC: &str = "ruby";

/// Platform a build targets, or a resolution is performed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Platform {
    /// Pure build with no native code.
    #[default]
    Generic,
    /// Native build.
    Native {
        /// CPU architecture; `None` means any.
        cpu: Option<String>,
        /// Operating system.
        os: String,
        /// OS version or ABI qualifier.
        version: Option<String>,
    },
}

impl Platform {
    /// Parse a platform string. `ruby` and the empty string are generic.
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() || s == GENERIC {
            return Ok(Self::Generic);
        }
        if s.chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'))
        {
            return Err(Error::InvalidPlatform(input.to_string()));
        }

        let parts: Vec<&str> = s.split('-').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidPlatform(input.to_string()));
        }
        let platform = match parts.as_slice() {
            [os] => Self::native(None, os, None),
            [cpu, os] => Self::native(Some(cpu), os, None),
            [cpu, os, rest @ ..] => Self::native(Some(cpu), os, Some(&rest.join("-"))),
            [] => return Err(Error::InvalidPlatform(input.to_string())),
        };
        Ok(platform)
    }

    fn native(cpu: Option<&str>, os: &str, version: Option<&str>) -> Self {
        Self::Native {
            cpu: cpu.map(str::to_string),
            os: os.to_string(),
            version: version.map(str::to_string),
        }
    }

    /// Whether this is the generic platform.
    #[must_use]
    pub const fn is_generic(&self) -> bool {
        matches!(self, Self::Generic)
    }

    /// Whether a build for `self` can run on `target`.
    ///
    /// Generic builds run everywhere; native builds require a matching OS,
    /// a compatible CPU (`universal` or unspecified matches any) and, when
    /// both sides name one, the same OS version.
    #[must_use]
    pub fn runs_on(&self, target: &Self) -> bool {
        match (self, target) {
            (Self::Generic, _) => true,
            (Self::Native { .. }, Self::Generic) => false,
            (
                Self::Native { cpu, os, version },
                Self::Native {
                    cpu: target_cpu,
                    os: target_os,
                    version: target_version,
                },
            ) => {
                let any_cpu = |c: &Option<String>| c.as_deref().is_none_or(|c| c == "universal");
                let cpu_ok = any_cpu(cpu) || any_cpu(target_cpu) || cpu == target_cpu;
                let version_ok =
                    version.is_none() || target_version.is_none() || version == target_version;
                cpu_ok && os == target_os && version_ok
            }
        }
    }
}

impl Ord for Platform {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Generic, Self::Generic) => Ordering::Equal,
            (Self::Generic, _) => Ordering::Less,
            (_, Self::Generic) => Ordering::Greater,
            _ => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl PartialOrd for Platform {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => f.write_str(GENERIC),
            Self::Native { cpu, os, version } => {
                if let Some(cpu) = cpu {
                    write!(f, "{cpu}-")?;
                }
                f.write_str(os)?;
                if let Some(version) = version {
                    write!(f, "-{version}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Platform {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Platform {
        Platform::parse(s).unwrap()
    }

    #[test]
    fn parse_forms() {
        assert_eq!(p("ruby"), Platform::Generic);
        assert_eq!(p(""), Platform::Generic);
        assert_eq!(p("java").to_string(), "java");
        assert_eq!(p("x86_64-linux").to_string(), "x86_64-linux");
        assert_eq!(p("x86_64-linux-musl").to_string(), "x86_64-linux-musl");
        assert!(Platform::parse("x86_64--linux").is_err());
        assert!(Platform::parse("x86 linux").is_err());
    }

    #[test]
    fn generic_runs_everywhere() {
        assert!(Platform::Generic.runs_on(&p("x86_64-linux")));
        assert!(Platform::Generic.runs_on(&Platform::Generic));
        assert!(!p("x86_64-linux").runs_on(&Platform::Generic));
    }

    #[test]
    fn native_matching() {
        assert!(p("x86_64-linux").runs_on(&p("x86_64-linux")));
        assert!(!p("x86_64-linux").runs_on(&p("arm64-darwin")));
        assert!(p("universal-darwin").runs_on(&p("arm64-darwin")));
        assert!(p("x86_64-linux").runs_on(&p("x86_64-linux-gnu")));
        assert!(!p("x86_64-linux-musl").runs_on(&p("x86_64-linux-gnu")));
    }

    #[test]
    fn generic_sorts_first() {
        let mut platforms = vec![p("x86_64-linux"), Platform::Generic, p("java")];
        platforms.sort();
        assert_eq!(platforms[0], Platform::Generic);
        assert_eq!(platforms[1], p("java"));
    }
}
