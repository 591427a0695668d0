//! Resolver configuration.
//!
//! Settings are layered: built-in defaults, then an optional JSON
//! document, then `GARNET_*` environment variables.

use crate::locked::Unlock;
use garnet_core::{PackageName, Platform};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Environment variables understood by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVar {
    /// `GARNET_FROZEN`: refuse to change the lock.
    Frozen,
    /// `GARNET_PRERELEASE`: let every requirement match pre-releases.
    Prerelease,
    /// `GARNET_MAX_ITERATIONS`: search step budget, 0 for none.
    MaxIterations,
    /// `GARNET_UNLOCK`: `all`, or comma-separated package names.
    Unlock,
}

impl EnvVar {
    /// All variables.
    pub const ALL: [Self; 4] = [
        Self::Frozen,
        Self::Prerelease,
        Self::MaxIterations,
        Self::Unlock,
    ];

    /// Variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Frozen => "GARNET_FROZEN",
            Self::Prerelease => "GARNET_PRERELEASE",
            Self::MaxIterations => "GARNET_MAX_ITERATIONS",
            Self::Unlock => "GARNET_UNLOCK",
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolverConfig {
    /// Only locked specs may be used, and nothing may change.
    pub frozen: bool,
    /// Which locked packages may move.
    pub unlock: Unlock,
    /// Let every requirement match pre-release versions.
    pub allow_prereleases: bool,
    /// Give up after this many search steps; 0 means never.
    pub max_iterations: u64,
    /// Platforms top-level requirements are resolved for.
    pub platforms: Vec<Platform>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            frozen: false,
            unlock: Unlock::None,
            allow_prereleases: false,
            max_iterations: 0,
            platforms: vec![Platform::Generic],
        }
    }
}

impl ResolverConfig {
    /// Parse from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> garnet_core::Result<Self> {
        garnet_core::from_json(json)
    }

    /// Load a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> garnet_core::Result<Self> {
        garnet_core::from_json_file(path)
    }

    /// Apply `GARNET_*` variables from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|var| std::env::var(var.as_str()).ok())
    }

    /// Apply overrides from `lookup`. Unparseable values are logged and
    /// ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(EnvVar) -> Option<String>) -> Self {
        for var in EnvVar::ALL {
            let Some(value) = lookup(var) else {
                continue;
            };
            match var {
                EnvVar::Frozen | EnvVar::Prerelease => match parse_bool(&value) {
                    Some(flag) if var == EnvVar::Frozen => self.frozen = flag,
                    Some(flag) => self.allow_prereleases = flag,
                    None => warn!(var = var.as_str(), value = %value, "ignoring invalid boolean"),
                },
                EnvVar::MaxIterations => match value.trim().parse() {
                    Ok(limit) => self.max_iterations = limit,
                    Err(_) => warn!(var = var.as_str(), value = %value, "ignoring invalid number"),
                },
                EnvVar::Unlock => {
                    let value = value.trim();
                    self.unlock = if value.eq_ignore_ascii_case("all") {
                        Unlock::All
                    } else if value.is_empty() {
                        Unlock::None
                    } else {
                        Unlock::Names(
                            value
                                .split(',')
                                .map(str::trim)
                                .filter(|name| !name.is_empty())
                                .map(PackageName::new)
                                .collect(),
                        )
                    };
                }
            }
        }
        self
    }

    /// Platforms to resolve for, never empty.
    #[must_use]
    pub fn target_platforms(&self) -> Vec<Platform> {
        let mut platforms = self.platforms.clone();
        platforms.sort();
        platforms.dedup();
        if platforms.is_empty() {
            platforms.push(Platform::Generic);
        }
        platforms
    }
}
