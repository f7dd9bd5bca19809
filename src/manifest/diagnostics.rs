//! YAML parse diagnostics for manifests.
//!
//! Parser failures become [`miette`] diagnostics pointing at the offending
//! location, with a hint for the usual YAML slips.

// The miette/thiserror derives trip `unused_assignments` on some compiler
// versions only, so `#[expect]` cannot be used here.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde_saphyr::{Error as YamlError, Location};
use thiserror::Error;

const YAML_HINTS: [(&str, &str); 4] = [
    (
        "did not find expected '-'",
        "Start list items with '-' and keep them aligned.",
    ),
    (
        "mapping values are not allowed",
        "Quote values containing ':' such as CMake generator names.",
    ),
    (
        "unknown field",
        "Check the key against the manifest reference; keys are snake_case.",
    ),
    (
        "mutually exclusive",
        "Give each library exactly one of `cmake`, `header` or `manual`.",
    ),
];

/// Byte offset of a 1-based line and column, clamped to the line's end.
fn byte_offset(src: &str, line: u64, column: u64) -> usize {
    let target_line = usize::try_from(line.saturating_sub(1)).unwrap_or(usize::MAX);
    let target_column = usize::try_from(column.saturating_sub(1)).unwrap_or(usize::MAX);
    let mut offset = 0_usize;
    for (idx, segment) in src.split_inclusive('\n').enumerate() {
        if idx == target_line {
            let text = segment.trim_end_matches(['\n', '\r']);
            let column_offset = text
                .char_indices()
                .nth(target_column)
                .map_or(text.len(), |(byte, _)| byte);
            return offset + column_offset;
        }
        offset += segment.len();
    }
    src.len()
}

fn span_at(src: &str, location: Location) -> SourceSpan {
    let at = byte_offset(src, location.line(), location.column());
    let len = src
        .get(at..)
        .and_then(|rest| rest.chars().next())
        .filter(|c| *c != '\n' && *c != '\r')
        .map_or(0, char::len_utf8);
    SourceSpan::new(at.into(), len)
}

fn starts_with_tab(src: &str, location: Option<Location>) -> bool {
    let Some(location) = location else {
        return false;
    };
    let line_idx = usize::try_from(location.line().saturating_sub(1)).unwrap_or(usize::MAX);
    src.lines().nth(line_idx).is_some_and(|line| {
        line.chars()
            .take_while(|c| c.is_whitespace())
            .any(|c| c == '\t')
    })
}

fn hint_for(message: &str, src: &str, location: Option<Location>) -> Option<String> {
    if starts_with_tab(src, location) {
        return Some("Indent with spaces; YAML does not allow tabs.".to_owned());
    }
    let lower = message.to_lowercase();
    YAML_HINTS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, hint)| (*hint).to_owned())
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(depforge::manifest::yaml))]
pub(super) struct YamlDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    span: Option<SourceSpan>,
    #[help]
    help: Option<String>,
    #[source]
    source: YamlError,
    message: String,
}

/// Wrap a parse error of the manifest `name` with source context.
#[must_use]
pub fn map_yaml_error(
    err: YamlError,
    src: &str,
    name: &str,
) -> Box<dyn Diagnostic + Send + Sync + 'static> {
    let location = err.location();
    let (line, column) = location.map_or((1, 1), |loc| (loc.line(), loc.column()));
    let span = location.map(|loc| span_at(src, loc));
    let detail = err.to_string();
    let help = hint_for(&detail, src, location);
    Box::new(YamlDiagnostic {
        src: NamedSource::new(name, src.to_owned()),
        span,
        help,
        source: err,
        message: format!("{name}:{line}:{column}: {detail}"),
    })
}
