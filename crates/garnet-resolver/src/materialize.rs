//! Turning lazy lockfile references into full specs.

use crate::index::SourceMap;
use garnet_core::Spec;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Materialization failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    /// No source has the locked build.
    #[error("could not find {spec} in {source_id}")]
    Missing {
        /// Spec full name.
        spec: String,
        /// Where it was expected.
        source_id: String,
    },

    /// The collaborator failed for another reason.
    #[error("failed to materialize {spec}: {reason}")]
    Failed {
        /// Spec full name.
        spec: String,
        /// Error message.
        reason: String,
    },
}

/// Realises lazy specs before they are handed to installers.
pub trait Materializer: Send + Sync + fmt::Debug {
    /// Full spec for `spec`, which is a lazy reference.
    fn materialize(&self, spec: &Spec) -> Result<Arc<Spec>, MaterializeError>;
}

/// Looks lazy specs up in the resolver's own sources.
#[derive(Debug, Clone)]
pub struct IndexMaterializer {
    sources: Arc<SourceMap>,
}

impl IndexMaterializer {
    /// Materialize from `sources`.
    #[must_use]
    pub const fn new(sources: Arc<SourceMap>) -> Self {
        Self { sources }
    }
}

impl Materializer for IndexMaterializer {
    fn materialize(&self, spec: &Spec) -> Result<Arc<Spec>, MaterializeError> {
        let candidates = match self.sources.index_for(&spec.source) {
            Some(index) => index.specs_named(&spec.name),
            None => self.sources.specs_named(&spec.name),
        };
        candidates
            .into_iter()
            .find(|found| found.version == spec.version && found.platform == spec.platform)
            .ok_or_else(|| MaterializeError::Missing {
                spec: spec.full_name(),
                source_id: spec.source.to_string(),
            })
    }
}
