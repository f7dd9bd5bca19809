//! Tests for manifest lowering.

use super::*;
use crate::graph::NodeKind;
use crate::rules::InstallRule;
use anyhow::{Result, anyhow, ensure};
use rstest::rstest;

const FULL: &str = r#"
depforge_version: "1.2.0"
settings:
  sources_dir: third_party/src
  install_dir: /opt/deps
  cache_dir: caches
  cmake_args: "-G 'Ninja Multi-Config'"
  engine: [python3, third_party/deps.py]
  toolchain: msvc
  platform: windows
  exclude_base: source_root
libraries:
  - header: gl3w
    globs: "*.h"
  - cmake: glm
    install: glm-install
    build_debug: true
    args: "-DGLM_TEST_ENABLE=OFF"
  - manual: SteamworksSDK
    rules: ["public/steam/*.h", include/steam, EXCLUDE, "*_internal.h"]
imports:
  - id: "SDL3::SDL3-shared"
    kind: shared
    location: bin/SDL3/lib/SDL3.dll
  - id: png_static
    kind: static
    deps: ["ZLIB::ZLIB"]
  - id: zlib
    kind: static
aliases:
  "SDL3::SDL3": "SDL3::SDL3-shared"
  "ZLIB::ZLIB": zlib
consumers:
  - id: game
    output_dir: build/bin
    links: ["SDL3::SDL3", {link_only: png_static}]
"#;

fn project(yaml: &str) -> Result<Project, ManifestError> {
    from_str(yaml, Utf8Path::new("/work"))
}

#[test]
fn lowers_full_manifest() -> Result<()> {
    let project = project(FULL)?;
    ensure!(project.engine.sources_dir == "/work/third_party/src");
    ensure!(project.engine.install_dir == "/opt/deps");
    ensure!(project.engine.cache_dir.as_deref() == Some(Utf8Path::new("/work/caches")));
    ensure!(project.engine.cmake_args == ["-G", "Ninja Multi-Config"]);
    ensure!(project.engine_command == ["python3", "third_party/deps.py"]);
    ensure!(project.toolchain == Toolchain::Msvc);
    ensure!(project.platform == TargetPlatform::Windows);
    ensure!(project.exclude_base == ExcludeBase::SourceRoot);

    let names: Vec<&str> = project.declarations.iter().map(|d| d.name()).collect();
    ensure!(names == ["gl3w", "glm", "SteamworksSDK"], "{names:?}");
    let Some(LibraryDeclaration::ManualInstall(steam)) = project.declarations.get(2) else {
        return Err(anyhow!("expected a manual library"));
    };
    let expected = InstallRule::new("public/steam/*.h", "include/steam").excluding("*_internal.h");
    ensure!(steam.rules == [expected]);
    Ok(())
}

#[test]
fn builds_graph_with_aliases_and_link_only_refs() -> Result<()> {
    let project = project(FULL)?;
    let png = project
        .graph
        .get("png_static")
        .ok_or_else(|| anyhow!("png node"))?;
    ensure!(png.deps == [NodeRef::alias("ZLIB::ZLIB")]);
    let sdl = project
        .graph
        .get("SDL3::SDL3-shared")
        .ok_or_else(|| anyhow!("sdl node"))?;
    ensure!(sdl.kind == NodeKind::Shared);
    ensure!(sdl.artifact.as_deref() == Some(Utf8Path::new("/work/bin/SDL3/lib/SDL3.dll")));
    let game = project.consumer("game").ok_or_else(|| anyhow!("consumer"))?;
    ensure!(game.links == [NodeRef::alias("SDL3::SDL3"), NodeRef::link_only("png_static")]);
    let node = project.graph.get("game").ok_or_else(|| anyhow!("game node"))?;
    ensure!(!node.imported && node.kind == NodeKind::Executable);
    ensure!(node.output_dir.as_deref() == Some(Utf8Path::new("/work/build/bin")));
    Ok(())
}

#[test]
fn session_registers_declarations_in_order() -> Result<()> {
    let project = project(FULL)?;
    let session = project.session();
    ensure!(session.registry().len() == 3);
    ensure!(session.toolchain() == Toolchain::Msvc);
    Ok(())
}

const MINIMAL: &str = "depforge_version: \"1.0.0\"\nsettings:\n  sources_dir: s\n  install_dir: b\n";

#[test]
fn minimal_manifest_uses_defaults() -> Result<()> {
    let project = project(MINIMAL)?;
    ensure!(project.declarations.is_empty());
    ensure!(project.engine_command.is_empty());
    ensure!(project.exclude_base == ExcludeBase::RulePrefix);
    ensure!(project.platform == TargetPlatform::host());
    Ok(())
}

#[rstest]
#[case("rule_prefix", ExcludeBase::RulePrefix)]
#[case("source_root", ExcludeBase::SourceRoot)]
#[case("source-root", ExcludeBase::SourceRoot)]
fn reads_exclude_base_spellings(
    #[case] value: &str,
    #[case] expected: ExcludeBase,
) -> Result<()> {
    let yaml = format!("{MINIMAL}  exclude_base: {value}\n");
    ensure!(project(&yaml)?.exclude_base == expected);
    Ok(())
}

#[rstest]
#[case(
    "depforge_version: \"2.0.0\"\nsettings: {sources_dir: s, install_dir: b}\n",
    "unsupported depforge_version 2.0.0"
)]
#[case(
    "depforge_version: \"1.0.0\"\nsettings: {sources_dir: s, install_dir: b}\nlibraries:\n  - manual: sdk\n    rules: [a]\n",
    "invalid library 'sdk'"
)]
#[case(
    "depforge_version: \"1.0.0\"\nsettings: {sources_dir: s, install_dir: b}\nlibraries:\n  - header: gl3w\n",
    "invalid library 'gl3w'"
)]
#[case(
    "depforge_version: \"1.0.0\"\nsettings: {sources_dir: s, install_dir: b, cmake_args: \"'open\"}\n",
    "cannot split `settings.cmake_args`"
)]
#[case(
    "depforge_version: \"1.0.0\"\nsettings: {sources_dir: s, install_dir: b}\nbogus: 1\n",
    "failed to parse manifest"
)]
fn rejects_invalid_manifests(#[case] yaml: &str, #[case] expected: &str) {
    let err = project(yaml).expect_err("invalid manifest");
    assert!(err.to_string().contains(expected), "{err}");
}

#[test]
fn rule_grammar_errors_keep_their_cause() {
    let yaml = "depforge_version: \"1.0.0\"\nsettings: {sources_dir: s, install_dir: b}\nlibraries:\n  - manual: sdk\n    rules: [a, b, EXCLUDE]\n";
    let err = project(yaml).expect_err("dangling exclude");
    assert!(matches!(
        err,
        ManifestError::Library {
            source: LibraryError::Rules(GrammarError::DanglingExclude { .. }),
            ..
        }
    ));
}
