//! End-to-end tests of a configuration session through the public API.

use anyhow::{Context, Result, anyhow, ensure};
use camino::Utf8PathBuf;
use depforge::engine::{EngineConfig, EngineOutput, InstallEngine, InstallError};
use depforge::graph::{GraphNode, NodeKind, NodeRef, RELEASE_CONFIG, TargetGraph};
use depforge::platform::{TargetPlatform, Toolchain};
use depforge::registry::{HeaderOnly, ManualInstall, NestedBuildProject};
use depforge::rules::parse_rules;
use depforge::session::{LinkError, Session};
use rstest::{fixture, rstest};
use std::cell::RefCell;
use std::io;

/// Engine double recording its calls and answering with a fixed result.
struct ScriptedEngine {
    code: Option<i32>,
    output: String,
    calls: RefCell<Vec<Vec<String>>>,
}

impl ScriptedEngine {
    fn exiting(code: i32, output: &str) -> Self {
        Self {
            code: Some(code),
            output: output.to_owned(),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl InstallEngine for ScriptedEngine {
    fn invoke(&self, args: &[String]) -> io::Result<EngineOutput> {
        self.calls.borrow_mut().push(args.to_vec());
        Ok(EngineOutput {
            code: self.code,
            output: self.output.clone(),
        })
    }

    fn describe(&self) -> String {
        "scripted".to_owned()
    }
}

#[fixture]
fn session() -> Session {
    let mut session = Session::new(EngineConfig::new("third_party/src", "third_party/bin"))
        .with_platform(TargetPlatform::Linux)
        .with_toolchain(Toolchain::Msvc);
    let rules = parse_rules(&[
        "public/steam/*.h",
        "include/steam",
        "redistributable_bin/linux64/*.so",
        "lib",
    ])
    .expect("valid rules");
    session
        .declare_header_only(HeaderOnly::new("gl3w", ["*.h"]).expect("header library"))
        .declare_nested_build(
            NestedBuildProject::new("glm")
                .expect("cmake library")
                .with_extra_args(["-DGLM_TEST_ENABLE=OFF"]),
        )
        .declare_manual_install(
            ManualInstall::new("SteamworksSDK", rules).expect("manual library"),
        );
    session
}

/// `game` and `editor` both link SDL through an alias; SDL pulls in a
/// static zlib, and `png` links zlib too.
fn graph() -> Result<TargetGraph> {
    let mut graph = TargetGraph::default();
    graph.add_node(GraphNode::project("game", NodeKind::Executable).with_output_dir("/out/game"))?;
    graph.add_node(
        GraphNode::project("editor", NodeKind::Executable).with_output_dir("/out/editor"),
    )?;
    graph.add_node(
        GraphNode::imported("SDL3::SDL3-shared", NodeKind::Shared)
            .with_artifact("/deps/lib/libSDL3.so.0.2.4")
            .with_deps([NodeRef::alias("ZLIB::ZLIB")]),
    )?;
    graph.add_node(
        GraphNode::imported("zlib", NodeKind::Static).with_artifact("/deps/lib/libz.a"),
    )?;
    graph.add_node(
        GraphNode::imported("png", NodeKind::Static).with_deps([NodeRef::alias("ZLIB::ZLIB")]),
    )?;
    graph.add_alias("SDL3::SDL3", "SDL3::SDL3-shared")?;
    graph.add_alias("ZLIB::ZLIB", "zlib")?;
    Ok(graph)
}

#[rstest]
fn install_passes_every_declaration_in_one_call(mut session: Session) -> Result<()> {
    let engine = ScriptedEngine::exiting(0, "");
    session.run_install(&engine)?;
    let calls = engine.calls.borrow();
    ensure!(calls.len() == 1, "engine called {} times", calls.len());
    let args = calls.first().context("one call")?;
    let commands: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|arg| arg.starts_with("add-"))
        .collect();
    ensure!(
        commands == ["add-header-lib", "add-cmake-lib", "add-manual-lib"],
        "{commands:?}"
    );
    ensure!(session.is_installed());
    Ok(())
}

#[rstest]
fn failure_names_the_reported_library(mut session: Session) -> Result<()> {
    let engine = ScriptedEngine::exiting(2, "building...\nFailed to process glm!\n");
    let err = session
        .run_install(&engine)
        .err()
        .ok_or_else(|| anyhow!("install should fail"))?;
    ensure!(
        err.to_string() == "install engine exited with status 2 while processing 'glm'",
        "{err}"
    );
    ensure!(session.is_poisoned());
    let mut graph = graph()?;
    ensure!(
        session.link_and_propagate(&mut graph, "game", &[NodeRef::alias("SDL3::SDL3")])
            == Err(LinkError::InstallFailed)
    );
    ensure!(matches!(session.run_install(&engine), Err(InstallError::Poisoned)));
    Ok(())
}

#[rstest]
fn shared_nodes_are_normalised_once_across_consumers(mut session: Session) -> Result<()> {
    let mut graph = graph()?;
    let game = session.link_and_propagate(
        &mut graph,
        "game",
        &[NodeRef::alias("SDL3::SDL3"), NodeRef::direct("png")],
    )?;
    ensure!(game.normalized == ["zlib", "png"], "{:?}", game.normalized);

    let editor = session.link_and_propagate(&mut graph, "editor", &[NodeRef::alias("SDL3::SDL3")])?;
    ensure!(editor.normalized.is_empty(), "{:?}", editor.normalized);

    let zlib = graph.get("zlib").context("zlib node")?;
    ensure!(zlib.config_map.get("MinSizeRel").map(String::as_str) == Some(RELEASE_CONFIG));
    ensure!(zlib.link_options == ["/ignore:4099"]);
    Ok(())
}

#[rstest]
fn each_consumer_gets_its_own_runtime_copies(mut session: Session) -> Result<()> {
    let mut graph = graph()?;
    let refs = [NodeRef::alias("SDL3::SDL3")];
    let game = session.link_and_propagate(&mut graph, "game", &refs)?;
    let editor = session.link_and_propagate(&mut graph, "editor", &refs)?;
    for (report, dir) in [(&game, "/out/game"), (&editor, "/out/editor")] {
        let [action] = report.actions.as_slice() else {
            return Err(anyhow!("expected one copy, got {:?}", report.actions));
        };
        ensure!(action.source_artifact_path == "/deps/lib/libSDL3.so.0.2.4");
        ensure!(action.consumer_output_dir == Utf8PathBuf::from(dir));
        ensure!(action.alias_names == ["libSDL3.so", "libSDL3.so.0"]);
    }
    ensure!(graph.get("game").context("game")?.post_build == game.actions);
    Ok(())
}

#[rstest]
fn link_only_references_never_copy(mut session: Session) -> Result<()> {
    let mut graph = graph()?;
    let report =
        session.link_and_propagate(&mut graph, "game", &[NodeRef::link_only("SDL3::SDL3")])?;
    ensure!(report.actions.is_empty(), "{:?}", report.actions);
    ensure!(report.normalized == ["zlib"], "{:?}", report.normalized);
    Ok(())
}
