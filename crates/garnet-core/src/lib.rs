//! Core types for the Garnet package manager.
//!
//! Versions, constraints, platforms, and the package metadata the
//! resolver works on.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod hash;
pub mod json;
pub mod package;
pub mod platform;
pub mod version;

pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use json::{from_json, from_json_file, to_json, to_json_pretty};
pub use package::{Dependency, DependencyKind, PackageName, SourceId, Spec, SpecKind};
pub use platform::Platform;
pub use version::{Constraint, Operator, Segment, Version};
