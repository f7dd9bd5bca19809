//! Manifest loading.
//!
//! A `Depsfile` is parsed into [`DepsManifest`] and then lowered into a
//! [`Project`]: validated library declarations, engine settings with paths
//! resolved against the manifest's directory, and the consumer build graph.
//! Manual install rules are written in the flat rule grammar and parsed here,
//! so grammar errors surface naming the library they belong to.

// The miette/thiserror derives trip `unused_assignments` on some compiler
// versions only, so `#[expect]` cannot be used here.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use std::fs;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use miette::Diagnostic;
use semver::Version;
use thiserror::Error;

use crate::ast::{DepsManifest, LibrarySpec, LinkSpec, StringOrList};
use crate::engine::EngineConfig;
use crate::graph::{GraphError, GraphNode, NodeRef, TargetGraph};
use crate::platform::{TargetPlatform, Toolchain};
use crate::registry::{
    DeclarationError, HeaderOnly, LibraryDeclaration, ManualInstall, NestedBuildProject,
};
use crate::rules::{ExcludeBase, GrammarError, parse_rules};
use crate::session::Session;

mod diagnostics;

pub use diagnostics::map_yaml_error;

/// Manifest file name looked up when none is given.
pub const DEFAULT_MANIFEST: &str = "Depsfile";

/// Manifest format major version this release reads.
pub const SUPPORTED_MAJOR: u64 = 1;

/// Errors turning a manifest into a [`Project`].
#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    /// The YAML could not be parsed into a manifest.
    #[error("failed to parse manifest '{name}'")]
    #[diagnostic(code(depforge::manifest::parse))]
    Parse {
        /// Manifest name.
        name: String,
        /// Parser diagnostic.
        #[source]
        #[diagnostic_source]
        source: Box<dyn Diagnostic + Send + Sync + 'static>,
    },
    /// The manifest targets another format version.
    #[error("unsupported depforge_version {version}")]
    #[diagnostic(
        code(depforge::manifest::version),
        help("this release reads manifests with depforge_version 1.x")
    )]
    UnsupportedVersion {
        /// Declared version.
        version: Version,
    },
    /// A library entry is invalid.
    #[error("invalid library '{library}'")]
    #[diagnostic(code(depforge::manifest::library))]
    Library {
        /// Library source directory as written.
        library: String,
        /// What is wrong with it.
        #[source]
        #[diagnostic_source]
        source: LibraryError,
    },
    /// A string of arguments has unbalanced quotes.
    #[error("cannot split `{field}` value `{value}` into arguments")]
    #[diagnostic(
        code(depforge::manifest::arguments),
        help("quote arguments the way a POSIX shell would, or use a YAML list")
    )]
    Arguments {
        /// Manifest field.
        field: String,
        /// Raw value.
        value: String,
    },
    /// The consumer graph is inconsistent.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

/// Problems with a single library entry.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum LibraryError {
    /// The declaration violates an invariant.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Declaration(#[from] DeclarationError),
    /// The rule list is malformed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Rules(#[from] GrammarError),
}

/// A project target that links imported libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    /// Node id in [`Project::graph`].
    pub id: String,
    /// References the consumer links against.
    pub links: Vec<NodeRef>,
}

/// A loaded manifest ready to drive a session.
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory relative paths were resolved against.
    pub root: Utf8PathBuf,
    /// Engine settings.
    pub engine: EngineConfig,
    /// Engine command from `settings.engine`, possibly empty.
    pub engine_command: Vec<String>,
    /// Target platform.
    pub platform: TargetPlatform,
    /// Consumer toolchain.
    pub toolchain: Toolchain,
    /// Exclusion base for rule previews.
    pub exclude_base: ExcludeBase,
    /// Library declarations in manifest order.
    pub declarations: Vec<LibraryDeclaration>,
    /// Consumer build graph.
    pub graph: TargetGraph,
    /// Consumers in manifest order.
    pub consumers: Vec<Consumer>,
}

impl Project {
    /// Start a session with every declaration registered.
    #[must_use]
    pub fn session(&self) -> Session {
        let mut session = Session::new(self.engine.clone())
            .with_platform(self.platform)
            .with_toolchain(self.toolchain);
        for declaration in &self.declarations {
            session.declare(declaration.clone());
        }
        session
    }

    /// Find a consumer by id.
    #[must_use]
    pub fn consumer(&self, id: &str) -> Option<&Consumer> {
        self.consumers.iter().find(|consumer| consumer.id == id)
    }

    /// Find a declaration by source directory or name.
    #[must_use]
    pub fn declaration(&self, source_or_name: &str) -> Option<&LibraryDeclaration> {
        self.declarations.iter().find(|decl| {
            decl.source_subdir().as_str() == source_or_name || decl.name() == source_or_name
        })
    }
}

/// Parse manifest YAML.
///
/// # Errors
///
/// Returns [`ManifestError::Parse`] when the YAML does not describe a
/// manifest.
pub fn parse(yaml: &str, name: &str) -> Result<DepsManifest, ManifestError> {
    serde_saphyr::from_str(yaml).map_err(|err| ManifestError::Parse {
        name: name.to_owned(),
        source: map_yaml_error(err, yaml, name),
    })
}

fn resolve(root: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Words of an argument field: lists verbatim, strings split shell-style.
fn argument_words(field: &str, value: StringOrList) -> Result<Vec<String>, ManifestError> {
    match value {
        StringOrList::Empty => Ok(Vec::new()),
        StringOrList::List(words) => Ok(words),
        StringOrList::String(line) => {
            shlex::split(&line).ok_or_else(|| ManifestError::Arguments {
                field: field.to_owned(),
                value: line,
            })
        }
    }
}

fn pattern_list(value: StringOrList) -> Vec<String> {
    match value {
        StringOrList::Empty => Vec::new(),
        StringOrList::String(pattern) => vec![pattern],
        StringOrList::List(patterns) => patterns,
    }
}

fn lower_library(spec: LibrarySpec) -> Result<LibraryDeclaration, ManifestError> {
    let library = spec.src().to_string();
    let in_library = |source: LibraryError| ManifestError::Library {
        library: library.clone(),
        source,
    };
    let declaration = match spec {
        LibrarySpec::Cmake {
            src,
            install,
            build_dir,
            args,
            build_debug,
        } => {
            let extra_args = argument_words(&format!("libraries[{library}].args"), args)?;
            let mut project = NestedBuildProject::new(src)
                .map_err(|err| in_library(err.into()))?
                .with_extra_args(extra_args)
                .build_debug_too(build_debug);
            if let Some(install) = install {
                project = project
                    .with_install_subdir(&install)
                    .map_err(|err| in_library(err.into()))?;
            }
            if let Some(build_dir) = build_dir {
                project = project.with_build_subfolder(build_dir);
            }
            LibraryDeclaration::NestedBuildProject(project)
        }
        LibrarySpec::Header {
            src,
            install,
            globs,
        } => {
            let mut header = HeaderOnly::new(src, pattern_list(globs))
                .map_err(|err| in_library(err.into()))?;
            if let Some(install) = install {
                header = header
                    .with_install_subdir(&install)
                    .map_err(|err| in_library(err.into()))?;
            }
            LibraryDeclaration::HeaderOnly(header)
        }
        LibrarySpec::Manual {
            src,
            install,
            rules,
        } => {
            let rules = parse_rules(&rules).map_err(|err| in_library(err.into()))?;
            let mut manual =
                ManualInstall::new(src, rules).map_err(|err| in_library(err.into()))?;
            if let Some(install) = install {
                manual = manual
                    .with_install_subdir(&install)
                    .map_err(|err| in_library(err.into()))?;
            }
            LibraryDeclaration::ManualInstall(manual)
        }
    };
    Ok(declaration)
}

fn link_reference(graph: &TargetGraph, link: LinkSpec) -> NodeRef {
    match link {
        LinkSpec::Name(name) => graph.reference_to(&name),
        LinkSpec::LinkOnly { link_only } => NodeRef::link_only(link_only),
    }
}

/// Lower a parsed manifest, resolving relative paths against `root`.
///
/// # Errors
///
/// Returns [`ManifestError`] for unsupported versions, invalid libraries,
/// unsplittable argument strings and duplicate graph names.
pub fn lower(manifest: DepsManifest, root: &Utf8Path) -> Result<Project, ManifestError> {
    if manifest.depforge_version.major != SUPPORTED_MAJOR {
        return Err(ManifestError::UnsupportedVersion {
            version: manifest.depforge_version,
        });
    }
    let settings = manifest.settings;
    let mut engine = EngineConfig::new(
        resolve(root, &settings.sources_dir),
        resolve(root, &settings.install_dir),
    )
    .with_cmake_args(argument_words("settings.cmake_args", settings.cmake_args)?);
    if let Some(cache) = &settings.cache_dir {
        engine = engine.with_cache_dir(resolve(root, cache));
    }
    if let Some(subdir) = settings.header_subdir {
        engine = engine.with_header_subdir(subdir);
    }
    let engine_command = argument_words("settings.engine", settings.engine)?;
    let platform = settings.platform.unwrap_or_else(TargetPlatform::host);
    let toolchain = settings
        .toolchain
        .unwrap_or_else(|| Toolchain::default_for(platform));

    let declarations = manifest
        .libraries
        .into_iter()
        .map(lower_library)
        .collect::<Result<Vec<_>, _>>()?;

    let mut graph = TargetGraph::default();
    for (alias, target) in manifest.aliases {
        graph.add_alias(alias, target)?;
    }
    for import in manifest.imports {
        let deps: Vec<NodeRef> = import
            .deps
            .into_iter()
            .map(|link| link_reference(&graph, link))
            .collect();
        let mut node = GraphNode::imported(import.id, import.kind).with_deps(deps);
        if let Some(location) = &import.location {
            node = node.with_artifact(resolve(root, location));
        }
        graph.add_node(node)?;
    }
    let mut consumers = Vec::new();
    for spec in manifest.consumers {
        let mut node = GraphNode::project(spec.id.clone(), spec.kind);
        if let Some(dir) = &spec.output_dir {
            node = node.with_output_dir(resolve(root, dir));
        }
        graph.add_node(node)?;
        let links = spec
            .links
            .into_iter()
            .map(|link| link_reference(&graph, link))
            .collect();
        consumers.push(Consumer { id: spec.id, links });
    }

    Ok(Project {
        root: root.to_path_buf(),
        engine,
        engine_command,
        platform,
        toolchain,
        exclude_base: settings.exclude_base,
        declarations,
        graph,
        consumers,
    })
}

/// Parse and lower manifest YAML, resolving paths against `root`.
///
/// # Errors
///
/// Returns [`ManifestError`] when parsing or lowering fails.
pub fn from_str(yaml: &str, root: &Utf8Path) -> Result<Project, ManifestError> {
    lower(parse(yaml, DEFAULT_MANIFEST)?, root)
}

/// Load a manifest file, resolving paths against its directory.
///
/// # Errors
///
/// Returns an error when the file cannot be read, parsed or lowered.
pub fn from_path(path: &Utf8Path) -> Result<Project> {
    let yaml =
        fs::read_to_string(path).with_context(|| format!("failed to read manifest '{path}'"))?;
    let root = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let manifest = parse(&yaml, path.as_str())?;
    Ok(lower(manifest, root)?)
}

#[cfg(test)]
mod tests;
