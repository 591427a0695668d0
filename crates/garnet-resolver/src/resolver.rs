//! Backtracking dependency resolver.
//!
//! The search keeps a queue of pending requirements and a map of
//! activated package versions. Every time it commits to a version it
//! pushes a choice point holding the untried alternatives and a snapshot
//! of the queue and activations. Both are persistent collections, so a
//! snapshot shares structure with the live state and costs O(1) to take
//! and to restore. A failed requirement does not unwind one
//! level at a time: it jumps straight to the choice point of the package
//! that introduced it, so only decisions that can actually change the
//! outcome are revisited.
//!
//! # Example
//!
//! ```rust,ignore
//! use garnet_resolver::{MemoryIndex, Resolver, ResolverConfig, SourceMap};
//!
//! let index = MemoryIndex::new(SourceId::registry("https://gems.example.org/")?);
//! index.add_version("rack", "3.0.0", vec![])?;
//!
//! let sources = SourceMap::new().with_source(Arc::new(index));
//! let resolver = Resolver::new(sources, ResolverConfig::default());
//! let resolution = resolver.resolve(&[Dependency::parse("rack", ">= 2")?])?;
//! ```

use crate::candidate::CandidateGroup;
use crate::config::ResolverConfig;
use crate::conflict::{Conflict, ConflictRecord};
use crate::index::{Index, Overrides, Query, SourceMap};
use crate::locked::LockedSpecs;
use crate::materialize::{IndexMaterializer, Materializer};
use crate::requirement::{Requirement, SearchKey};
use crate::resolution::Resolution;
use crate::types::ResolveError;
use ahash::AHashMap;
use garnet_core::{Dependency, PackageName, Platform, Version};
use rayon::prelude::*;
use im::{OrdMap, Vector};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, trace};

/// Resolver statistics for monitoring and debugging.
#[derive(Debug, Default)]
pub struct ResolverStats {
    /// Resolutions attempted.
    pub resolutions: AtomicU64,
    /// Search loop iterations.
    pub iterations: AtomicU64,
    /// Package versions activated.
    pub activations: AtomicU64,
    /// Times a choice point was revisited.
    pub backtracks: AtomicU64,
    /// Conflicts that jumped to an earlier choice point.
    pub jumps: AtomicU64,
    /// Searches answered from the per-resolution cache.
    pub cache_hits: AtomicU64,
    /// Searches that went to an index.
    pub cache_misses: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// The dependency resolver.
///
/// Holds the sources, the lock and configuration; every call to
/// [`resolve`](Self::resolve) runs a fresh search with its own state, so
/// one resolver can serve several resolutions at once.
pub struct Resolver {
    sources: Arc<SourceMap>,
    config: ResolverConfig,
    locked: Arc<LockedSpecs>,
    materializer: Arc<dyn Materializer>,
    cancel: Option<Arc<AtomicBool>>,
    stats: Arc<ResolverStats>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("sources", &self.sources.describe())
            .field("config", &self.config)
            .field("locked", &self.locked.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Create a resolver over `sources`.
    #[must_use]
    pub fn new(sources: SourceMap, config: ResolverConfig) -> Self {
        let sources = Arc::new(sources);
        Self {
            materializer: Arc::new(IndexMaterializer::new(Arc::clone(&sources))),
            sources,
            config,
            locked: Arc::new(LockedSpecs::new()),
            cancel: None,
            stats: Arc::new(ResolverStats::default()),
        }
    }

    /// Prefer, or in frozen mode require, these previously locked specs.
    #[must_use]
    pub fn with_locked(mut self, locked: LockedSpecs) -> Self {
        self.locked = Arc::new(locked);
        self
    }

    /// Use `materializer` for lazy locked specs.
    #[must_use]
    pub fn with_materializer(mut self, materializer: Arc<dyn Materializer>) -> Self {
        self.materializer = materializer;
        self
    }

    /// Abort with [`ResolveError::Cancelled`] once `flag` is set.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Get resolver statistics.
    #[must_use]
    pub fn stats(&self) -> &ResolverStats {
        &self.stats
    }

    /// Resolve `dependencies` for every configured platform.
    pub fn resolve(&self, dependencies: &[Dependency]) -> Result<Resolution, ResolveError> {
        let platforms = self.config.target_platforms();
        let roots = dependencies
            .iter()
            .flat_map(|dependency| {
                platforms.iter().map(move |platform| {
                    Requirement::root(
                        dependency,
                        platform.clone(),
                        self.sources.pin(&dependency.name).cloned(),
                    )
                })
            })
            .collect();
        self.resolve_requirements(roots)
    }

    /// Resolve independent dependency sets in parallel.
    pub fn resolve_all(
        &self,
        requests: &[Vec<Dependency>],
    ) -> Vec<Result<Resolution, ResolveError>> {
        requests
            .par_iter()
            .map(|dependencies| self.resolve(dependencies))
            .collect()
    }

    /// Resolve explicit top-level requirements.
    pub fn resolve_requirements(
        &self,
        roots: Vec<Requirement>,
    ) -> Result<Resolution, ResolveError> {
        let start = Instant::now();
        bump(&self.stats.resolutions);

        for root in &roots {
            if let Some(source) = root.source() {
                if self.sources.index_for(source).is_none() {
                    return Err(ResolveError::UnknownSource {
                        name: root.name().clone(),
                        pinned: source.clone(),
                    });
                }
            }
        }
        let overrides = self.sources.overrides()?;
        let requested: BTreeSet<PackageName> = roots.iter().map(|r| r.name().clone()).collect();

        info!(
            roots = roots.len(),
            sources = self.sources.sources().len(),
            locked = self.locked.len(),
            frozen = self.config.frozen,
            "resolution starting"
        );

        let mut search = Search::new(self, overrides, roots);
        if let Err(err) = search.run() {
            info!(
                iterations = search.iterations,
                backtracks = search.backtracks,
                elapsed_ms = start.elapsed().as_millis(),
                error = %err,
                "resolution failed"
            );
            return Err(err);
        }

        let resolution = Resolution::assemble(
            search
                .activations
                .values()
                .map(|activation| (&*activation.group, &activation.platforms)),
            &requested,
            &*self.materializer,
            start.elapsed(),
        )?;

        info!(
            packages = resolution.len(),
            iterations = search.iterations,
            backtracks = search.backtracks,
            elapsed_ms = start.elapsed().as_millis(),
            "resolution complete"
        );
        Ok(resolution)
    }
}

// ============================================================================
// Search state
// ============================================================================

/// A chosen version and the platforms it serves.
#[derive(Debug, Clone)]
struct Activation {
    group: Arc<CandidateGroup>,
    requirement: Requirement,
    platforms: BTreeSet<Platform>,
}

type Activations = OrdMap<PackageName, Arc<Activation>>;

/// Where to resume after a failed step.
#[derive(Debug)]
struct ChoicePoint {
    requirement: Requirement,
    /// Most preferred first.
    candidates: Vec<Arc<CandidateGroup>>,
    next: usize,
    queue: Vector<Requirement>,
    activations: Activations,
    /// Names whose conflicts jumped here.
    caught: BTreeSet<PackageName>,
}

#[derive(Debug)]
enum Backtrack {
    /// Unwind to `target`'s choice point, remembering `conflict` there.
    Jump {
        target: PackageName,
        conflict: PackageName,
    },
    /// Unwind to `target`'s choice point.
    Resume { target: PackageName },
    /// Try the innermost choice point's next candidate.
    Retry,
}

struct Search<'r> {
    sources: &'r SourceMap,
    overrides: Overrides,
    locked: &'r LockedSpecs,
    config: &'r ResolverConfig,
    cancel: Option<&'r AtomicBool>,
    stats: &'r ResolverStats,
    cache: AHashMap<SearchKey, Arc<[Arc<CandidateGroup>]>>,
    queue: Vector<Requirement>,
    activations: Activations,
    conflicts: ConflictRecord,
    stack: Vec<ChoicePoint>,
    iterations: u64,
    backtracks: u64,
}

impl<'r> Search<'r> {
    fn new(resolver: &'r Resolver, overrides: Overrides, roots: Vec<Requirement>) -> Self {
        Self {
            sources: &resolver.sources,
            overrides,
            locked: &resolver.locked,
            config: &resolver.config,
            cancel: resolver.cancel.as_deref(),
            stats: &resolver.stats,
            cache: AHashMap::new(),
            queue: roots.into_iter().collect(),
            activations: Activations::new(),
            conflicts: ConflictRecord::new(),
            stack: Vec::new(),
            iterations: 0,
            backtracks: 0,
        }
    }

    fn run(&mut self) -> Result<(), ResolveError> {
        loop {
            self.tick()?;
            let Some(current) = self.next_requirement() else {
                return Ok(());
            };
            trace!(requirement = %current, queued = self.queue.len(), "next requirement");

            let outcome = if self.activations.contains_key(current.name()) {
                self.revisit(current)?
            } else {
                self.open(current)?
            };
            if let Some(signal) = outcome {
                self.backtrack(signal)?;
            }
        }
    }

    fn tick(&mut self) -> Result<(), ResolveError> {
        self.iterations += 1;
        bump(&self.stats.iterations);
        let limit = self.config.max_iterations;
        if limit > 0 && self.iterations > limit {
            return Err(ResolveError::IterationLimit { limit });
        }
        Ok(())
    }

    /// Take the head of the queue as a stable sort would order it right
    /// now. The queue itself is never reordered, so snapshots held by
    /// choice points keep sharing its nodes.
    fn next_requirement(&mut self) -> Option<Requirement> {
        let queue = self.queue.clone();
        let mut best: Option<(usize, (u8, u8, u8, usize))> = None;
        for (at, requirement) in queue.iter().enumerate() {
            let key = self.priority(requirement);
            if best.as_ref().is_none_or(|(_, lowest)| key < *lowest) {
                best = Some((at, key));
            }
        }
        best.map(|(at, _)| self.queue.remove(at))
    }

    /// Activated names first, then pre-release requests, then names in
    /// conflict, then the most constrained.
    fn priority(&mut self, requirement: &Requirement) -> (u8, u8, u8, usize) {
        let activated = self.activations.contains_key(requirement.name());
        let candidates = if activated {
            0
        } else {
            self.search(requirement).len()
        };
        (
            u8::from(!activated),
            u8::from(!requirement.allows_prerelease()),
            u8::from(!self.conflicts.contains(requirement.name())),
            candidates,
        )
    }

    fn index_for(&self, requirement: &Requirement) -> Option<&Arc<dyn Index>> {
        match requirement.source() {
            Some(source) => self.sources.index_for(source),
            None => self.overrides.get(requirement.name()),
        }
    }

    fn search(&mut self, requirement: &Requirement) -> Arc<[Arc<CandidateGroup>]> {
        let key = requirement.search_key(self.config.allow_prereleases);
        if let Some(found) = self.cache.get(&key) {
            bump(&self.stats.cache_hits);
            return Arc::clone(found);
        }
        bump(&self.stats.cache_misses);

        let query = Query {
            name: &key.name,
            constraint: &key.constraint,
            platform: &key.platform,
            prerelease: key.prerelease,
        };
        let groups = if self.config.frozen {
            self.locked.search(&query)
        } else if let Some(index) = self.index_for(requirement) {
            index.search(&query)
        } else {
            self.sources.search(&query)
        };
        let found: Arc<[Arc<CandidateGroup>]> = groups.into_iter().map(Arc::new).collect();
        trace!(requirement = %requirement, found = found.len(), "searched");
        self.cache.insert(key, Arc::clone(&found));
        found
    }

    /// `current` names a package that is already activated.
    fn revisit(&mut self, current: Requirement) -> Result<Option<Backtrack>, ResolveError> {
        let name = current.name().clone();
        let Some(existing) = self.activations.get_mut(&name) else {
            return Err(ResolveError::Internal(format!("{name} is not activated")));
        };

        if current.satisfied_by(existing.group.version())
            && existing.group.supports(current.platform())
        {
            if !existing.platforms.contains(current.platform()) {
                let existing = Arc::make_mut(existing);
                existing.platforms.insert(current.platform().clone());
                let children = existing.group.activate(&current);
                trace!(
                    package = %name,
                    platform = %current.platform(),
                    children = children.len(),
                    "serving another platform"
                );
                self.queue.extend(children);
            }
            self.conflicts.clear(&name);
            return Ok(None);
        }

        let version = existing.group.version().clone();
        let activated_by = existing.requirement.clone();
        if self.config.frozen {
            return Err(self.frozen_violation(&current));
        }

        let conflict = self.capture(&current, Some((&version, &activated_by)));
        self.conflicts.record(conflict);
        let target = current
            .parent()
            .map_or_else(|| activated_by.name().clone(), |parent| parent.name().clone());
        debug!(
            requirement = %current,
            existing = %version,
            jump_to = %target,
            "conflict with activated version"
        );
        Ok(Some(Backtrack::Jump {
            target,
            conflict: name,
        }))
    }

    /// `current` names a package that is not activated yet.
    fn open(&mut self, current: Requirement) -> Result<Option<Backtrack>, ResolveError> {
        let found = self.search(&current);
        if found.is_empty() {
            if self.config.frozen {
                return Err(self.frozen_violation(&current));
            }
            if current.is_root() {
                return Err(self.not_found(&current));
            }
            debug!(requirement = %current, "no matching versions");
            let conflict = self.capture(&current, None);
            self.conflicts.record(conflict);
            return Ok(Some(Backtrack::Retry));
        }

        let candidates = self.preference_order(&current, &found);
        self.stack.push(ChoicePoint {
            requirement: current,
            candidates,
            next: 0,
            queue: self.queue.clone(),
            activations: self.activations.clone(),
            caught: BTreeSet::new(),
        });
        if self.try_next()? {
            Ok(None)
        } else {
            Err(ResolveError::Internal(
                "new choice point has no candidates".to_string(),
            ))
        }
    }

    /// Newest first, with the locked version in front unless unlocked.
    fn preference_order(
        &self,
        requirement: &Requirement,
        found: &[Arc<CandidateGroup>],
    ) -> Vec<Arc<CandidateGroup>> {
        let mut candidates: Vec<Arc<CandidateGroup>> = found.iter().rev().cloned().collect();
        let name = requirement.name();
        if !self.config.frozen && !self.config.unlock.is_unlocked(name) {
            if let Some(locked) = self.locked.version(name) {
                if let Some(at) = candidates.iter().position(|group| group.version() == locked) {
                    let preferred = candidates.remove(at);
                    candidates.insert(0, preferred);
                }
            }
        }
        candidates
    }

    /// Activate the innermost choice point's next candidate. Returns
    /// `false` once it has none left.
    fn try_next(&mut self) -> Result<bool, ResolveError> {
        if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(ResolveError::Cancelled);
        }
        let Some(frame) = self.stack.last_mut() else {
            return Ok(false);
        };
        let Some(group) = frame.candidates.get(frame.next).cloned() else {
            return Ok(false);
        };
        frame.next += 1;
        self.queue = frame.queue.clone();
        self.activations = frame.activations.clone();
        let requirement = frame.requirement.clone();
        self.activate(group, requirement);
        Ok(true)
    }

    fn activate(&mut self, group: Arc<CandidateGroup>, requirement: Requirement) {
        let children = group.activate(&requirement);
        debug!(
            package = %group.name(),
            version = %group.version(),
            platform = %requirement.platform(),
            depth = self.stack.len(),
            "activating"
        );
        bump(&self.stats.activations);
        self.activations.insert(
            group.name().clone(),
            Arc::new(Activation {
                platforms: BTreeSet::from([requirement.platform().clone()]),
                group,
                requirement,
            }),
        );
        self.queue.extend(children);
    }

    fn backtrack(&mut self, mut signal: Backtrack) -> Result<(), ResolveError> {
        loop {
            self.backtracks += 1;
            bump(&self.stats.backtracks);
            match signal {
                Backtrack::Jump { target, conflict } => {
                    let at = self.unwind_to(&target)?;
                    self.stack[at].caught.insert(conflict);
                    bump(&self.stats.jumps);
                }
                Backtrack::Resume { target } => {
                    self.unwind_to(&target)?;
                }
                Backtrack::Retry => {}
            }

            if self.stack.is_empty() {
                return Err(ResolveError::VersionConflict(self.conflicts.report()));
            }
            if self.try_next()? {
                return Ok(());
            }
            let Some(frame) = self.stack.pop() else {
                return Err(ResolveError::Internal("choice point stack underflow".into()));
            };
            signal = self.exhausted(frame);
        }
    }

    fn unwind_to(&mut self, target: &PackageName) -> Result<usize, ResolveError> {
        let at = self
            .stack
            .iter()
            .rposition(|frame| frame.requirement.name() == target)
            .ok_or_else(|| ResolveError::Internal(format!("no choice point for {target}")))?;
        self.stack.truncate(at + 1);
        Ok(at)
    }

    /// Every candidate of `frame` failed.
    fn exhausted(&mut self, frame: ChoicePoint) -> Backtrack {
        trace!(
            requirement = %frame.requirement,
            tried = frame.next,
            "choice point exhausted"
        );
        if frame.requirement.is_root() {
            let target = self
                .stack
                .iter()
                .rev()
                .map(|outer| outer.requirement.name())
                .find(|name| frame.caught.contains(*name))
                .cloned();
            return match target {
                Some(target) => {
                    debug!(
                        requirement = %frame.requirement,
                        jump_to = %target,
                        "resuming at caught conflict"
                    );
                    Backtrack::Resume { target }
                }
                None => Backtrack::Retry,
            };
        }

        let conflict = self.capture(&frame.requirement, None);
        self.conflicts.record_if_absent(conflict);
        Backtrack::Retry
    }

    fn capture(
        &self,
        requirement: &Requirement,
        existing: Option<(&Version, &Requirement)>,
    ) -> Conflict {
        Conflict::capture(requirement, existing, |name| {
            self.activations
                .get(name)
                .map(|activation| activation.group.version().clone())
        })
    }

    fn not_found(&self, requirement: &Requirement) -> ResolveError {
        let name = requirement.name();
        let (sources, available) = match self.index_for(requirement) {
            Some(index) => (vec![index.source().to_string()], index.versions(name)),
            None => (self.sources.describe(), self.sources.versions(name)),
        };
        ResolveError::NotFound {
            name: name.clone(),
            requirement: requirement.to_string(),
            sources,
            available,
        }
    }

    fn frozen_violation(&self, requirement: &Requirement) -> ResolveError {
        let name = requirement.name();
        let mut locked: Vec<Version> = self
            .locked
            .get(name)
            .unwrap_or_default()
            .iter()
            .map(|spec| spec.version.clone())
            .collect();
        locked.sort();
        locked.dedup();
        ResolveError::FrozenViolation {
            name: name.clone(),
            requirement: requirement.to_string(),
            locked,
        }
    }
}
