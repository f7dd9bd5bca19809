//! Scheduling of runtime artefact copies next to consumers.
//!
//! A consumer that links a shared library needs that library beside its own
//! output to run. For every loadable dependency the propagator schedules one
//! post-build copy into the consumer's output directory and, on POSIX targets,
//! the `<stem>.so` and `<stem>.so.0` aliases loaders look for.

use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use super::{GraphNode, NodeKind, NodeRef, TargetGraph};
use crate::platform::TargetPlatform;

/// Copy of a runtime artefact into a consumer's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeCopyAction {
    /// Artefact to copy.
    pub source_artifact_path: Utf8PathBuf,
    /// Directory receiving the copy.
    pub consumer_output_dir: Utf8PathBuf,
    /// Symlink names created next to the copy, pointing at it.
    pub alias_names: Vec<String>,
}

impl RuntimeCopyAction {
    /// File name of the artefact.
    #[must_use]
    pub fn artifact_file_name(&self) -> Option<&str> {
        self.source_artifact_path.file_name()
    }

    /// Path the artefact is copied to.
    #[must_use]
    pub fn destination(&self) -> Utf8PathBuf {
        self.artifact_file_name().map_or_else(
            || self.consumer_output_dir.clone(),
            |name| self.consumer_output_dir.join(name),
        )
    }
}

/// Stem of a shared library file name: everything before the `.so` suffix
/// (with or without a version tail), or before the first dot otherwise.
fn soname_stem(file_name: &str) -> &str {
    let so_suffix = file_name.match_indices(".so").find(|(idx, _)| {
        let rest = file_name.get(idx + 3..).unwrap_or_default();
        rest.is_empty() || rest.starts_with('.')
    });
    match so_suffix {
        Some((idx, _)) => file_name.get(..idx).unwrap_or(file_name),
        None => file_name.split('.').next().unwrap_or(file_name),
    }
}

/// Conventional alias names for an artefact on `platform`.
///
/// ```
/// use depforge::graph::alias_names_for;
/// use depforge::platform::TargetPlatform;
///
/// assert_eq!(
///     alias_names_for("libSDL3.so.0.2.4", TargetPlatform::Linux),
///     ["libSDL3.so", "libSDL3.so.0"]
/// );
/// assert!(alias_names_for("SDL3.dll", TargetPlatform::Windows).is_empty());
/// ```
#[must_use]
pub fn alias_names_for(file_name: &str, platform: TargetPlatform) -> Vec<String> {
    if !platform.is_posix() {
        return Vec::new();
    }
    let stem = soname_stem(file_name);
    [format!("{stem}.so"), format!("{stem}.so.0")]
        .into_iter()
        .filter(|alias| alias != file_name)
        .collect()
}

/// `(artefact, output directory)` pairs already scheduled this session.
#[derive(Debug, Clone, Default)]
pub struct ScheduledCopies(HashSet<(Utf8PathBuf, Utf8PathBuf)>);

impl ScheduledCopies {
    /// Record a pair, returning `false` if it was already scheduled.
    pub fn insert(&mut self, artifact: &Utf8Path, output_dir: &Utf8Path) -> bool {
        self.0
            .insert((artifact.to_path_buf(), output_dir.to_path_buf()))
    }

    /// Number of scheduled copies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Forget every pair.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Ids of the nodes reachable from `refs` along runtime edges.
///
/// Anything reached only through a link-only reference is excluded; a node
/// first met through a link-only edge is upgraded when a runtime path to it
/// turns up later. Each id appears once, in discovery order.
#[must_use]
pub fn collect_runtime_dependencies(graph: &TargetGraph, refs: &[NodeRef]) -> Vec<String> {
    let mut reach: IndexMap<String, bool> = IndexMap::new();
    for reference in refs {
        walk(graph, reference, true, &mut reach);
    }
    reach
        .into_iter()
        .filter_map(|(id, runtime)| runtime.then_some(id))
        .collect()
}

fn walk(
    graph: &TargetGraph,
    reference: &NodeRef,
    runtime_path: bool,
    reach: &mut IndexMap<String, bool>,
) {
    let runtime = runtime_path && !reference.is_link_only();
    let Some(id) = graph.resolve(reference) else {
        return;
    };
    match reach.get_mut(id) {
        Some(seen) if *seen || !runtime => return,
        Some(seen) => *seen = true,
        None => {
            reach.insert(id.to_owned(), runtime);
        }
    }
    if let Some(node) = graph.get(id) {
        for dep in &node.deps {
            walk(graph, dep, runtime, reach);
        }
    }
}

const fn produces_runtime_artifact(node: &GraphNode) -> bool {
    match node.kind {
        NodeKind::Shared | NodeKind::Module => true,
        // Project executables are link targets, not something to ship.
        NodeKind::Executable => node.imported,
        NodeKind::Static | NodeKind::Interface | NodeKind::Object => false,
    }
}

/// Turns runtime dependencies into copy actions, once per artefact and
/// output directory.
pub struct Propagator<'s> {
    scheduled: &'s mut ScheduledCopies,
    platform: TargetPlatform,
}

impl<'s> Propagator<'s> {
    /// Create a propagator recording pairs in `scheduled`.
    pub const fn new(scheduled: &'s mut ScheduledCopies, platform: TargetPlatform) -> Self {
        Self {
            scheduled,
            platform,
        }
    }

    /// Schedule copies of the loadable artefacts among `runtime_ids` into
    /// `output_dir`.
    pub fn schedule(
        &mut self,
        graph: &TargetGraph,
        output_dir: &Utf8Path,
        runtime_ids: &[String],
    ) -> Vec<RuntimeCopyAction> {
        let mut actions = Vec::new();
        for id in runtime_ids {
            let Some(node) = graph.get(id) else {
                continue;
            };
            if !produces_runtime_artifact(node) {
                continue;
            }
            let Some(artifact) = &node.artifact else {
                debug!(node = %id, "no artefact location; nothing to copy");
                continue;
            };
            if !self.scheduled.insert(artifact, output_dir) {
                continue;
            }
            let alias_names = artifact
                .file_name()
                .map(|name| alias_names_for(name, self.platform))
                .unwrap_or_default();
            actions.push(RuntimeCopyAction {
                source_artifact_path: artifact.clone(),
                consumer_output_dir: output_dir.to_path_buf(),
                alias_names,
            });
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("libSDL3.so.0.2.4", "libSDL3")]
    #[case("libfoo.so", "libfoo")]
    #[case("libfoo.something.so.1", "libfoo.something")]
    #[case("libfoo.1.dylib", "libfoo")]
    #[case("plain", "plain")]
    fn derives_stem(#[case] name: &str, #[case] stem: &str) {
        assert_eq!(soname_stem(name), stem);
    }

    #[test]
    fn skips_alias_equal_to_file_name() {
        assert_eq!(
            alias_names_for("libfoo.so", TargetPlatform::Linux),
            ["libfoo.so.0"]
        );
    }

    fn diamond() -> TargetGraph {
        let mut graph = TargetGraph::default();
        graph
            .add_node(
                GraphNode::imported("a", NodeKind::Static).with_deps([NodeRef::direct("shared")]),
            )
            .expect("node");
        graph
            .add_node(
                GraphNode::imported("b", NodeKind::Static).with_deps([NodeRef::direct("shared")]),
            )
            .expect("node");
        graph
            .add_node(
                GraphNode::imported("shared", NodeKind::Shared)
                    .with_artifact("lib/libshared.so.1"),
            )
            .expect("node");
        graph
    }

    #[test]
    fn diamond_yields_one_copy() {
        let graph = diamond();
        let ids = collect_runtime_dependencies(
            &graph,
            &[NodeRef::direct("a"), NodeRef::direct("b")],
        );
        assert_eq!(ids, ["a", "shared", "b"]);
        let mut scheduled = ScheduledCopies::default();
        let actions = Propagator::new(&mut scheduled, TargetPlatform::Linux).schedule(
            &graph,
            Utf8Path::new("out"),
            &ids,
        );
        assert_eq!(
            actions,
            vec![RuntimeCopyAction {
                source_artifact_path: Utf8PathBuf::from("lib/libshared.so.1"),
                consumer_output_dir: Utf8PathBuf::from("out"),
                alias_names: vec!["libshared.so".into(), "libshared.so.0".into()],
            }]
        );
    }

    #[test]
    fn link_only_edges_do_not_propagate() {
        let graph = diamond();
        let ids = collect_runtime_dependencies(&graph, &[NodeRef::link_only("a")]);
        assert!(ids.is_empty());
    }

    #[test]
    fn runtime_path_upgrades_link_only_discovery() {
        let graph = diamond();
        let ids = collect_runtime_dependencies(
            &graph,
            &[NodeRef::link_only("a"), NodeRef::direct("b")],
        );
        assert_eq!(ids, ["shared", "b"]);
    }

    #[test]
    fn pair_is_scheduled_once_per_output_dir() {
        let graph = diamond();
        let ids = vec!["shared".to_owned()];
        let mut scheduled = ScheduledCopies::default();
        let mut propagator = Propagator::new(&mut scheduled, TargetPlatform::Windows);
        let first = propagator.schedule(&graph, Utf8Path::new("bin"), &ids);
        let again = propagator.schedule(&graph, Utf8Path::new("bin"), &ids);
        let other = propagator.schedule(&graph, Utf8Path::new("tools"), &ids);
        assert_eq!(first.len(), 1);
        assert!(first.iter().all(|action| action.alias_names.is_empty()));
        assert!(again.is_empty());
        assert_eq!(other.len(), 1);
    }
}
