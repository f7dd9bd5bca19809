//! Local expansion of install rules against a source tree.
//!
//! The install engine performs the real copy; this module reproduces its
//! matching so a project can preview which files a rule selects. Wildcard
//! rules keep the directory structure below the literal pattern prefix, so
//! `redistributable_bin/**/*.dll` with destination `bin` maps
//! `redistributable_bin/win64/steam_api64.dll` to `bin/win64/steam_api64.dll`.

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::{ExcludeBase, InstallRule, split_pattern};

/// A copy the install engine would perform for a rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PlannedCopy {
    /// File or directory matched in the source tree.
    pub source: Utf8PathBuf,
    /// Destination path inside the install tree.
    pub destination: Utf8PathBuf,
    /// Whether the match is a directory copied recursively.
    pub directory: bool,
}

/// Errors raised while expanding a rule.
#[derive(Debug, Error)]
pub enum PreviewError {
    /// The rule or exclusion pattern is not a valid glob.
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as handed to the glob matcher.
        pattern: String,
        /// Underlying parse failure.
        #[source]
        source: glob::PatternError,
    },
    /// Reading a directory while matching failed.
    #[error("glob failed for '{pattern}': {source}")]
    Walk {
        /// Pattern being expanded.
        pattern: String,
        /// Underlying I/O failure.
        #[source]
        source: glob::GlobError,
    },
}

/// Expand `rule` against `source_dir`, mapping matches below `install_dir`.
///
/// A missing prefix root yields no copies. A prefix naming a file copies that
/// file into the destination and ignores any exclusion.
///
/// # Errors
///
/// Returns [`PreviewError`] when a pattern is malformed or a directory cannot
/// be read during matching.
pub fn plan_rule(
    source_dir: &Utf8Path,
    install_dir: &Utf8Path,
    rule: &InstallRule,
    exclude_base: ExcludeBase,
) -> Result<Vec<PlannedCopy>, PreviewError> {
    let (prefix, sub_pattern) = split_pattern(&rule.src_pattern);
    let glob_root = source_dir.join(&prefix);
    let target_dir = match rule.dst_subdir.as_str() {
        "" | "." => install_dir.to_path_buf(),
        subdir => install_dir.join(subdir),
    };

    if !glob_root.exists() {
        warn!(root = %glob_root, "pattern base path not found");
        return Ok(Vec::new());
    }

    if glob_root.is_file() {
        if let Some(exclude) = &rule.exclude_pattern {
            warn!(
                pattern = %rule.src_pattern,
                exclude = %exclude,
                "exclusion has no effect on a rule copying a single file"
            );
        }
        let name = glob_root.file_name().unwrap_or(glob_root.as_str());
        return Ok(vec![PlannedCopy {
            destination: target_dir.join(name),
            source: glob_root,
            directory: false,
        }]);
    }

    if sub_pattern.is_empty() {
        return Ok(vec![PlannedCopy {
            source: glob_root,
            destination: target_dir,
            directory: true,
        }]);
    }

    let matches = expand(&escaped_join(&glob_root, &sub_pattern))?;
    let excluded = match &rule.exclude_pattern {
        Some(exclude) => {
            let base = match exclude_base {
                ExcludeBase::RulePrefix => glob_root.clone(),
                ExcludeBase::SourceRoot => source_dir.to_path_buf(),
            };
            expand(&escaped_join(&base, exclude))?
        }
        None => BTreeSet::new(),
    };

    let mut planned = Vec::new();
    for path in matches.difference(&excluded) {
        let Ok(relative) = path.strip_prefix(&glob_root) else {
            warn!(path = %path, "failed to compute path relative to pattern root");
            continue;
        };
        planned.push(PlannedCopy {
            destination: target_dir.join(relative),
            directory: path.is_dir(),
            source: path.clone(),
        });
    }
    Ok(planned)
}

/// Wildcards never cross a separator or select dot entries.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Join a literal directory and a glob, escaping metacharacters in the
/// directory part.
fn escaped_join(root: &Utf8Path, pattern: &str) -> String {
    let escaped = Pattern::escape(root.as_str());
    if escaped.is_empty() {
        pattern.to_owned()
    } else {
        format!("{}/{pattern}", escaped.trim_end_matches('/'))
    }
}

fn expand(pattern: &str) -> Result<BTreeSet<Utf8PathBuf>, PreviewError> {
    let entries =
        glob::glob_with(pattern, MATCH_OPTIONS).map_err(|source| PreviewError::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
    let mut found = BTreeSet::new();
    for entry in entries {
        let path = entry.map_err(|source| PreviewError::Walk {
            pattern: pattern.to_owned(),
            source,
        })?;
        match Utf8PathBuf::from_path_buf(path) {
            Ok(utf8) => {
                found.insert(utf8);
            }
            Err(path) => debug!(path = %path.display(), "skipping non UTF-8 match"),
        }
    }
    Ok(found)
}
