//! Consumer build graph.
//!
//! The graph models the targets of the project consuming installed libraries:
//! imported prebuilt libraries produced by the install engine and the
//! project's own targets that link against them. Nodes are keyed by id and
//! kept in insertion order so every walk over the graph is deterministic.
//!
//! ```
//! use depforge::graph::{GraphNode, NodeKind, NodeRef, TargetGraph};
//!
//! let mut graph = TargetGraph::default();
//! graph
//!     .add_node(GraphNode::imported("zlib::zlib", NodeKind::Static))
//!     .expect("new node");
//! graph.add_alias("ZLIB::ZLIB", "zlib::zlib").expect("new alias");
//! assert_eq!(graph.resolve(&NodeRef::alias("ZLIB::ZLIB")), Some("zlib::zlib"));
//! ```

mod apply;
mod normalize;
mod propagate;

pub use apply::{ApplyError, ApplyOutcome};
pub use normalize::{Normalizer, RELEASE_CONFIG, REMAPPED_CONFIGS, VisitedSet};
pub use propagate::{
    Propagator, RuntimeCopyAction, ScheduledCopies, alias_names_for, collect_runtime_dependencies,
};

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of artefact a graph node produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// Static archive.
    Static,
    /// Shared library.
    Shared,
    /// Loadable module (plugin).
    Module,
    /// Executable program.
    Executable,
    /// Usage requirements only, no artefact.
    Interface,
    /// Object files.
    Object,
}

impl NodeKind {
    /// Kinds whose imported configuration mapping gets repaired.
    #[must_use]
    pub const fn is_link_time_only(self) -> bool {
        matches!(self, Self::Static | Self::Interface | Self::Object)
    }
}

/// A reference from one node to a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRef {
    /// Names a node id.
    Direct(String),
    /// Names an alias resolving to another node id.
    Alias(String),
    /// Link-time-only dependency on the named node or alias. It still gets
    /// normalised but never propagates runtime artefacts.
    LinkOnly(String),
}

impl NodeRef {
    /// Reference a node id.
    #[must_use]
    pub fn direct(id: impl Into<String>) -> Self {
        Self::Direct(id.into())
    }

    /// Reference an alias.
    #[must_use]
    pub fn alias(name: impl Into<String>) -> Self {
        Self::Alias(name.into())
    }

    /// Reference a node or alias for linking only.
    #[must_use]
    pub fn link_only(name: impl Into<String>) -> Self {
        Self::LinkOnly(name.into())
    }

    /// Whether the reference is a link-only wrapper.
    #[must_use]
    pub const fn is_link_only(&self) -> bool {
        matches!(self, Self::LinkOnly(_))
    }

    /// The referenced name with any wrapper removed.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Direct(name) | Self::Alias(name) | Self::LinkOnly(name) => name,
        }
    }
}

/// One target of the consumer build graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    /// Unique id.
    pub id: String,
    /// Artefact kind.
    pub kind: NodeKind,
    /// Whether the node is a prebuilt artefact rather than a project target.
    pub imported: bool,
    /// Location of the Release artefact, when known.
    pub artifact: Option<Utf8PathBuf>,
    /// Directory the node's own build output lands in.
    pub output_dir: Option<Utf8PathBuf>,
    /// Direct dependencies, in order.
    pub deps: Vec<NodeRef>,
    /// Consumer configuration → imported configuration used for linking.
    pub config_map: BTreeMap<String, String>,
    /// Extra linker options attached to the node.
    pub link_options: Vec<String>,
    /// Runtime copies to run after the node is built.
    pub post_build: Vec<RuntimeCopyAction>,
}

impl GraphNode {
    fn new(id: impl Into<String>, kind: NodeKind, imported: bool) -> Self {
        Self {
            id: id.into(),
            kind,
            imported,
            artifact: None,
            output_dir: None,
            deps: Vec::new(),
            config_map: BTreeMap::new(),
            link_options: Vec::new(),
            post_build: Vec::new(),
        }
    }

    /// A prebuilt node.
    #[must_use]
    pub fn imported(id: impl Into<String>, kind: NodeKind) -> Self {
        Self::new(id, kind, true)
    }

    /// A node built by the project itself.
    #[must_use]
    pub fn project(id: impl Into<String>, kind: NodeKind) -> Self {
        Self::new(id, kind, false)
    }

    /// Set the artefact location.
    #[must_use]
    pub fn with_artifact(mut self, artifact: impl Into<Utf8PathBuf>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Append dependencies.
    #[must_use]
    pub fn with_deps(mut self, deps: impl IntoIterator<Item = NodeRef>) -> Self {
        self.deps.extend(deps);
        self
    }
}

/// Errors raised while assembling a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum GraphError {
    /// Two nodes share an id.
    #[error("duplicate graph node '{id}'")]
    #[diagnostic(code(depforge::graph::duplicate_node))]
    DuplicateNode {
        /// The repeated id.
        id: String,
    },
    /// An alias name is already taken by a node or another alias.
    #[error("alias '{alias}' is already defined")]
    #[diagnostic(code(depforge::graph::duplicate_alias))]
    DuplicateAlias {
        /// The repeated alias.
        alias: String,
    },
}

/// The consumer build graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetGraph {
    nodes: IndexMap<String, GraphNode>,
    aliases: IndexMap<String, String>,
}

impl TargetGraph {
    /// Insert a node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] when the id is taken by a node or alias.
    pub fn add_node(&mut self, node: GraphNode) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) || self.aliases.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode { id: node.id });
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Register `alias` as another name for `target`.
    ///
    /// The target does not need to exist yet; dangling aliases simply never
    /// resolve.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateAlias`] when the name is taken.
    pub fn add_alias(
        &mut self,
        alias: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<(), GraphError> {
        let alias = alias.into();
        if self.nodes.contains_key(&alias) || self.aliases.contains_key(&alias) {
            return Err(GraphError::DuplicateAlias { alias });
        }
        self.aliases.insert(alias, target.into());
        Ok(())
    }

    /// Whether `name` is a registered alias.
    #[must_use]
    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Look up a node by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Look up a node by id for modification.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.get_mut(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Resolve a reference to the id of a concrete node.
    ///
    /// Link-only wrappers are removed first; the inner name may be a node id
    /// or an alias. Returns `None` for names outside the graph, such as plain
    /// library files or system libraries.
    #[must_use]
    pub fn resolve(&self, reference: &NodeRef) -> Option<&str> {
        let id = match reference {
            NodeRef::Direct(id) => id.as_str(),
            NodeRef::Alias(alias) => self.aliases.get(alias)?.as_str(),
            NodeRef::LinkOnly(name) => self
                .aliases
                .get(name)
                .map_or(name.as_str(), String::as_str),
        };
        self.nodes.get_key_value(id).map(|(key, _)| key.as_str())
    }

    /// Classify a dependency name as an alias or direct reference.
    #[must_use]
    pub fn reference_to(&self, name: &str) -> NodeRef {
        if self.is_alias(name) {
            NodeRef::alias(name)
        } else {
            NodeRef::direct(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn graph() -> TargetGraph {
        let mut graph = TargetGraph::default();
        graph
            .add_node(GraphNode::imported("SDL3::SDL3-shared", NodeKind::Shared))
            .expect("node");
        graph
            .add_alias("SDL3::SDL3", "SDL3::SDL3-shared")
            .expect("alias");
        graph.add_alias("Dangling::Lib", "missing").expect("alias");
        graph
    }

    #[rstest]
    #[case(NodeRef::direct("SDL3::SDL3-shared"), Some("SDL3::SDL3-shared"))]
    #[case(NodeRef::alias("SDL3::SDL3"), Some("SDL3::SDL3-shared"))]
    #[case(NodeRef::link_only("SDL3::SDL3"), Some("SDL3::SDL3-shared"))]
    #[case(NodeRef::link_only("SDL3::SDL3-shared"), Some("SDL3::SDL3-shared"))]
    #[case(NodeRef::alias("Dangling::Lib"), None)]
    #[case(NodeRef::direct("pthread"), None)]
    #[case(NodeRef::direct("/usr/lib/libm.so"), None)]
    fn resolves_references(#[case] reference: NodeRef, #[case] expected: Option<&str>) {
        assert_eq!(graph().resolve(&reference), expected);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut graph = graph();
        let err = graph
            .add_node(GraphNode::imported("SDL3::SDL3", NodeKind::Shared))
            .expect_err("alias name taken");
        assert!(matches!(err, GraphError::DuplicateNode { .. }));
        let err = graph
            .add_alias("SDL3::SDL3-shared", "x")
            .expect_err("node name taken");
        assert!(matches!(err, GraphError::DuplicateAlias { .. }));
    }

    #[test]
    fn classifies_dependency_names() {
        let graph = graph();
        assert_eq!(graph.reference_to("SDL3::SDL3"), NodeRef::alias("SDL3::SDL3"));
        assert_eq!(graph.reference_to("m"), NodeRef::direct("m"));
    }
}
