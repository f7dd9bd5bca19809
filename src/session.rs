//! Configuration session.
//!
//! A [`Session`] owns everything that lives for one configuration run: the
//! declared libraries, the engine settings, the set of graph nodes already
//! normalised and the runtime copies already scheduled. Consumers link
//! through [`Session::link_and_propagate`], which borrows the session
//! mutably, so two links can never interleave.

use camino::Utf8PathBuf;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::engine::{self, EngineConfig, InstallEngine, InstallError};
use crate::graph::{
    NodeRef, Normalizer, Propagator, RuntimeCopyAction, ScheduledCopies, TargetGraph, VisitedSet,
    collect_runtime_dependencies,
};
use crate::platform::{TargetPlatform, Toolchain};
use crate::registry::{
    HeaderOnly, LibraryDeclaration, ManualInstall, NestedBuildProject, Registry,
};

/// Errors from linking a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum LinkError {
    /// The install engine failed earlier in this session.
    #[error("cannot link consumers after the install engine failed")]
    #[diagnostic(code(depforge::session::install_failed))]
    InstallFailed,
    /// The consumer is not a node of the graph.
    #[error("unknown consumer '{id}'")]
    #[diagnostic(code(depforge::session::unknown_consumer))]
    UnknownConsumer {
        /// Requested consumer id.
        id: String,
    },
}

/// What linking one consumer did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    /// Consumer id.
    pub consumer: String,
    /// Imported nodes whose configurations were mapped to Release.
    pub normalized: Vec<String>,
    /// Runtime copies newly attached to the consumer.
    pub actions: Vec<RuntimeCopyAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Configuring,
    Installed,
    Failed,
}

/// State of one configuration run.
#[derive(Debug)]
pub struct Session {
    config: EngineConfig,
    registry: Registry,
    visited: VisitedSet,
    scheduled: ScheduledCopies,
    platform: TargetPlatform,
    toolchain: Toolchain,
    state: SessionState,
}

impl Session {
    /// Start a session targeting the host platform and its default
    /// toolchain.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let platform = TargetPlatform::host();
        Self {
            config,
            registry: Registry::new(),
            visited: VisitedSet::new(),
            scheduled: ScheduledCopies::default(),
            platform,
            toolchain: Toolchain::default_for(platform),
            state: SessionState::Configuring,
        }
    }

    /// Target `platform` instead of the host.
    #[must_use]
    pub const fn with_platform(mut self, platform: TargetPlatform) -> Self {
        self.platform = platform;
        self
    }

    /// Use `toolchain` instead of the platform default.
    #[must_use]
    pub const fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Engine settings.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Declared libraries.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Target platform.
    #[must_use]
    pub const fn platform(&self) -> TargetPlatform {
        self.platform
    }

    /// Consumer toolchain.
    #[must_use]
    pub const fn toolchain(&self) -> Toolchain {
        self.toolchain
    }

    /// Nodes normalised so far.
    #[must_use]
    pub const fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    /// Whether an install failed and the session refuses further links.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.state == SessionState::Failed
    }

    /// Register any declaration.
    pub fn declare(&mut self, declaration: LibraryDeclaration) -> &mut Self {
        debug!(library = %declaration.source_subdir(), "declared library");
        self.registry.register(declaration);
        self
    }

    /// Declare a library built by a nested CMake project.
    pub fn declare_nested_build(&mut self, project: NestedBuildProject) -> &mut Self {
        self.declare(LibraryDeclaration::NestedBuildProject(project))
    }

    /// Declare a header-only library.
    pub fn declare_header_only(&mut self, library: HeaderOnly) -> &mut Self {
        self.declare(LibraryDeclaration::HeaderOnly(library))
    }

    /// Declare a library installed through explicit copy rules.
    pub fn declare_manual_install(&mut self, library: ManualInstall) -> &mut Self {
        self.declare(LibraryDeclaration::ManualInstall(library))
    }

    /// Run the install engine over every declaration.
    ///
    /// A failure poisons the session: later installs and links are refused.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError`] when the engine cannot run or fails, or
    /// [`InstallError::Poisoned`] after an earlier failure.
    pub fn run_install(&mut self, engine: &dyn InstallEngine) -> Result<(), InstallError> {
        if self.is_poisoned() {
            return Err(InstallError::Poisoned);
        }
        match engine::run_install(engine, &self.config, &self.registry) {
            Ok(()) => {
                self.state = SessionState::Installed;
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    /// Whether the install engine has run successfully.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.state == SessionState::Installed
    }

    /// Link `consumer` against `refs`.
    ///
    /// The references are appended to the consumer's dependencies, every
    /// imported node reachable from them is normalised once per session,
    /// and copies of the runtime artefacts they need are attached to the
    /// consumer as post-build steps. A consumer without an output directory
    /// gets no copies.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InstallFailed`] after a failed install and
    /// [`LinkError::UnknownConsumer`] for ids outside the graph.
    pub fn link_and_propagate(
        &mut self,
        graph: &mut TargetGraph,
        consumer: &str,
        refs: &[NodeRef],
    ) -> Result<LinkReport, LinkError> {
        if self.is_poisoned() {
            return Err(LinkError::InstallFailed);
        }
        let output_dir: Option<Utf8PathBuf> = {
            let node = graph
                .get_mut(consumer)
                .ok_or_else(|| LinkError::UnknownConsumer {
                    id: consumer.to_owned(),
                })?;
            for reference in refs {
                if !node.deps.contains(reference) {
                    node.deps.push(reference.clone());
                }
            }
            node.output_dir.clone()
        };

        let normalized = Normalizer::new(&mut self.visited, self.toolchain).normalize(graph, refs);

        let actions = match output_dir {
            Some(dir) => {
                let mut runtime = collect_runtime_dependencies(graph, refs);
                runtime.retain(|id| id != consumer);
                Propagator::new(&mut self.scheduled, self.platform).schedule(graph, &dir, &runtime)
            }
            None => {
                debug!(consumer, "consumer has no output directory; nothing to propagate");
                Vec::new()
            }
        };
        if let Some(node) = graph.get_mut(consumer) {
            node.post_build.extend(actions.iter().cloned());
        }
        Ok(LinkReport {
            consumer: consumer.to_owned(),
            normalized,
            actions,
        })
    }

    /// Forget normalised nodes and scheduled copies, starting a new run
    /// against a fresh graph. Declarations are kept.
    pub fn reset_link_state(&mut self) {
        self.visited.clear();
        self.scheduled.clear();
    }
}
