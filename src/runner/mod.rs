//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! loads the manifest, applies command-line overrides and runs the requested
//! command against a fresh [`Session`].

mod error;
mod output;
mod path_helpers;

pub use error::RunnerError;

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt::Write as _;
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::engine::{ProcessEngine, build_arguments, resolve_engine_command};
use crate::graph::TargetGraph;
use crate::manifest::{self, Project};
use crate::registry::LibraryDeclaration;
use crate::rules::{InstallRule, PlannedCopy, plan_rule};
use crate::session::{LinkReport, Session};

use path_helpers::{
    absolute, ensure_manifest_exists_or_error, resolve_cli_path, resolve_manifest_path,
};

/// Execute the parsed [`Cli`] command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or the command fails.
pub fn run(cli: &Cli) -> Result<()> {
    let command = cli.command.clone().unwrap_or(Commands::Install);
    match command {
        Commands::Install => handle_install(cli),
        Commands::Args { file } => handle_args(cli, &file),
        Commands::Plan { consumer } => handle_plan(cli, consumer.as_deref()),
        Commands::Propagate { consumer } => handle_propagate(cli, &consumer),
        Commands::Preview { library } => handle_preview(cli, &library),
    }
}

/// Load the manifest named by `cli` and apply its directory overrides.
fn load_project(cli: &Cli) -> Result<Project> {
    let manifest_path = resolve_manifest_path(cli)?;
    ensure_manifest_exists_or_error(cli, &manifest_path)?;
    let mut project = manifest::from_path(&manifest_path)
        .with_context(|| format!("loading manifest '{manifest_path}'"))?;
    if let Some(dir) = &cli.sources_dir {
        project.engine.sources_dir = absolute(&resolve_cli_path(cli, dir))?;
    }
    if let Some(dir) = &cli.install_dir {
        project.engine.install_dir = absolute(&resolve_cli_path(cli, dir))?;
    }
    if let Some(dir) = &cli.cache_dir {
        project.engine.cache_dir = Some(absolute(&resolve_cli_path(cli, dir))?);
    }
    if tracing::enabled!(tracing::Level::DEBUG) {
        let declarations = serde_json::to_string_pretty(&project.declarations)
            .context("serialising declarations")?;
        debug!("declarations:\n{declarations}");
    }
    Ok(project)
}

fn handle_install(cli: &Cli) -> Result<()> {
    let project = load_project(cli)?;
    let command = resolve_engine_command(cli.engine.as_deref(), &project.engine_command)?;
    let engine = ProcessEngine::new(command).with_working_dir(project.root.clone());
    let mut session = project.session();
    session
        .run_install(&engine)
        .with_context(|| format!("installing libraries into {}", project.engine.install_dir))?;
    info!(
        libraries = session.registry().len(),
        install_dir = %project.engine.install_dir,
        "install complete"
    );
    Ok(())
}

fn handle_args(cli: &Cli, file: &Utf8Path) -> Result<()> {
    let project = load_project(cli)?;
    let session = project.session();
    let args = build_arguments(session.config(), session.registry())
        .context("assembling engine arguments")?;
    let mut line = shlex::try_join(args.iter().map(String::as_str))
        .map_err(|err| anyhow!("cannot quote engine arguments: {err}"))?;
    line.push('\n');
    if output::is_stdout_path(file) {
        output::write_stdout(&line)
    } else {
        output::write_file(&resolve_cli_path(cli, file), &line)
    }
}

/// Link the selected consumers, or all of them, in manifest order.
fn link_consumers(
    project: &Project,
    session: &mut Session,
    graph: &mut TargetGraph,
    only: Option<&str>,
) -> Result<Vec<LinkReport>> {
    let selected: Vec<_> = match only {
        Some(id) => vec![project.consumer(id).ok_or_else(|| {
            RunnerError::unknown_consumer(id, project.consumers.iter().map(|c| c.id.as_str()))
        })?],
        None => project.consumers.iter().collect(),
    };
    let mut reports = Vec::with_capacity(selected.len());
    for consumer in selected {
        let report = session
            .link_and_propagate(graph, &consumer.id, &consumer.links)
            .with_context(|| format!("linking consumer '{}'", consumer.id))?;
        debug!(
            consumer = %consumer.id,
            normalized = report.normalized.len(),
            copies = report.actions.len(),
            "linked consumer"
        );
        reports.push(report);
    }
    Ok(reports)
}

fn handle_plan(cli: &Cli, consumer: Option<&str>) -> Result<()> {
    let project = load_project(cli)?;
    let mut graph = project.graph.clone();
    let mut session = project.session();
    let reports = link_consumers(&project, &mut session, &mut graph, consumer)?;
    let mut json = serde_json::to_string_pretty(&reports).context("serialising link plan")?;
    json.push('\n');
    output::write_stdout(&json)
}

fn handle_propagate(cli: &Cli, consumer: &str) -> Result<()> {
    let project = load_project(cli)?;
    let has_output_dir = project
        .graph
        .get(consumer)
        .is_some_and(|node| node.output_dir.is_some());
    if project.consumer(consumer).is_some() && !has_output_dir {
        return Err(RunnerError::NoOutputDir {
            id: consumer.to_owned(),
        }
        .into());
    }
    let mut graph = project.graph.clone();
    let mut session = project.session();
    let reports = link_consumers(&project, &mut session, &mut graph, Some(consumer))?;
    let mut summary = String::new();
    for action in reports.iter().flat_map(|report| &report.actions) {
        let outcome = action
            .apply()
            .with_context(|| format!("copying '{}'", action.source_artifact_path))?;
        let verb = if outcome.copied { "copied" } else { "unchanged" };
        writeln!(summary, "{verb} {}", action.destination())?;
        for link in &outcome.links {
            writeln!(summary, "linked {link}")?;
        }
    }
    output::write_stdout(&summary)
}

/// Rules of a copy-based declaration and the directory they install under.
fn preview_rules(
    project: &Project,
    declaration: &LibraryDeclaration,
) -> Result<(Vec<InstallRule>, Utf8PathBuf), RunnerError> {
    match declaration {
        LibraryDeclaration::HeaderOnly(header) => {
            Ok((header.rules(), project.engine.header_root()))
        }
        LibraryDeclaration::ManualInstall(manual) => Ok((
            manual.rules.clone(),
            project.engine.install_dir.join(&manual.install_subdir),
        )),
        LibraryDeclaration::NestedBuildProject(_) => Err(RunnerError::NotPreviewable {
            name: declaration.name().to_owned(),
        }),
    }
}

fn format_copy(copy: &PlannedCopy) -> String {
    if copy.directory {
        format!("{}/ -> {}/", copy.source, copy.destination)
    } else {
        format!("{} -> {}", copy.source, copy.destination)
    }
}

fn handle_preview(cli: &Cli, library: &str) -> Result<()> {
    let project = load_project(cli)?;
    let declaration = project
        .declaration(library)
        .ok_or_else(|| RunnerError::UnknownLibrary {
            name: library.to_owned(),
        })?;
    let (rules, install_base) = preview_rules(&project, declaration)?;
    let source_dir = project.engine.sources_dir.join(declaration.source_subdir());
    let mut listing = String::new();
    for rule in &rules {
        let copies = plan_rule(&source_dir, &install_base, rule, project.exclude_base)
            .with_context(|| format!("expanding rule '{}'", rule.src_pattern))?;
        for copy in &copies {
            listing.push_str(&format_copy(copy));
            listing.push('\n');
        }
    }
    output::write_stdout(&listing)
}
