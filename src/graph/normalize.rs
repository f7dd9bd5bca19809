//! Transitive normalisation of imported link dependencies.
//!
//! Imported static, interface and object libraries are often published for a
//! single optimised configuration. Linking a `MinSizeRel` or `RelWithDebInfo`
//! consumer against them would then fail, so each such node is mapped onto
//! its `Release` artefact. The walk visits every node reachable from a
//! consumer's references once per session, however many consumers or diamond
//! paths lead to it.

use std::collections::HashSet;

use tracing::debug;

use super::{NodeRef, TargetGraph};
use crate::platform::Toolchain;

/// Canonical optimised configuration imported libraries are published for.
pub const RELEASE_CONFIG: &str = "Release";
/// Consumer configurations redirected to [`RELEASE_CONFIG`].
pub const REMAPPED_CONFIGS: [&str; 2] = ["MinSizeRel", "RelWithDebInfo"];

/// Node ids already normalised during the current session.
#[derive(Debug, Clone, Default)]
pub struct VisitedSet(HashSet<String>);

impl VisitedSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`, returning `false` if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.0.contains(id) {
            return false;
        }
        self.0.insert(id.to_owned())
    }

    /// Whether `id` has been normalised.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Number of normalised nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been normalised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Forget every node, starting a new session.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Walks dependency references and repairs imported nodes.
pub struct Normalizer<'s> {
    visited: &'s mut VisitedSet,
    toolchain: Toolchain,
    repaired: Vec<String>,
}

impl<'s> Normalizer<'s> {
    /// Create a normaliser recording visits in `visited`.
    pub fn new(visited: &'s mut VisitedSet, toolchain: Toolchain) -> Self {
        Self {
            visited,
            toolchain,
            repaired: Vec::new(),
        }
    }

    /// Normalise everything reachable from `refs`.
    ///
    /// Returns the ids of the imported nodes repaired by this call, in visit
    /// order. References outside the graph are skipped.
    pub fn normalize(mut self, graph: &mut TargetGraph, refs: &[NodeRef]) -> Vec<String> {
        for reference in refs {
            self.visit(graph, reference);
        }
        self.repaired
    }

    fn visit(&mut self, graph: &mut TargetGraph, reference: &NodeRef) {
        let Some(id) = graph.resolve(reference).map(str::to_owned) else {
            debug!(reference = reference.name(), "skipping reference outside the graph");
            return;
        };
        if !self.visited.insert(&id) {
            return;
        }
        let Some(node) = graph.get_mut(&id) else {
            return;
        };
        if node.imported && node.kind.is_link_time_only() {
            for config in REMAPPED_CONFIGS {
                node.config_map
                    .insert(config.to_owned(), RELEASE_CONFIG.to_owned());
            }
            if let Some(option) = self.toolchain.missing_pdb_suppression() {
                if !node.link_options.iter().any(|existing| existing == option) {
                    node.link_options.push(option.to_owned());
                }
            }
            debug!(node = %id, "mapped optimised configurations to Release");
            self.repaired.push(id);
        }
        let deps = node.deps.clone();
        for dep in &deps {
            self.visit(graph, dep);
        }
    }
}
