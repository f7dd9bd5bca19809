//! Install rule grammar for manually installed libraries.
//!
//! A manual library lists its copy rules as a flat token stream:
//!
//! ```text
//! pattern dst [ EXCLUDE ex_pattern ] pattern dst ...
//! ```
//!
//! Each rule is therefore either two or four tokens wide. The parser walks the
//! stream with a cursor, picks the rule shape from a one-token lookahead and
//! rejects any trailing fragment that does not form a complete rule.
//!
//! ```
//! use depforge::rules::{InstallRule, parse_rules};
//!
//! let rules = parse_rules(&["inc/**/*.h", "include", "EXCLUDE", "inc/internal/**"])
//!     .expect("valid rule list");
//! assert_eq!(
//!     rules,
//!     vec![InstallRule::new("inc/**/*.h", "include").excluding("inc/internal/**")]
//! );
//! ```

mod expand;
mod pattern;

pub use expand::{PlannedCopy, PreviewError, plan_rule};
pub use pattern::{ExcludeBase, split_pattern};

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// Marker token introducing an exclusion pattern for the preceding rule.
pub const EXCLUDE_MARKER: &str = "EXCLUDE";

/// A single copy rule of a manual install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallRule {
    /// Glob pattern relative to the library source directory.
    pub src_pattern: String,
    /// Destination subdirectory relative to the library install directory.
    pub dst_subdir: String,
    /// Glob pattern of matches to leave out.
    pub exclude_pattern: Option<String>,
}

impl InstallRule {
    /// Create a rule without an exclusion.
    #[must_use]
    pub fn new(src_pattern: impl Into<String>, dst_subdir: impl Into<String>) -> Self {
        Self {
            src_pattern: src_pattern.into(),
            dst_subdir: dst_subdir.into(),
            exclude_pattern: None,
        }
    }

    /// Attach an exclusion pattern to the rule.
    #[must_use]
    pub fn excluding(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_pattern = Some(pattern.into());
        self
    }

    /// Render the rule back into its token form.
    ///
    /// A source pattern literally spelled `EXCLUDE` cannot follow another rule
    /// unambiguously; such a list will not re-parse to itself.
    #[must_use]
    pub fn to_tokens(&self) -> Vec<String> {
        let mut tokens = vec![self.src_pattern.clone(), self.dst_subdir.clone()];
        if let Some(exclude) = &self.exclude_pattern {
            tokens.push(EXCLUDE_MARKER.to_owned());
            tokens.push(exclude.clone());
        }
        tokens
    }
}

/// Flatten a rule list into the token stream accepted by [`parse_rules`].
#[must_use]
pub fn rules_to_tokens(rules: &[InstallRule]) -> Vec<String> {
    rules.iter().flat_map(InstallRule::to_tokens).collect()
}

/// Errors raised while parsing a rule token stream.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum GrammarError {
    /// A source pattern was the last token of the stream.
    #[error("missing destination for pattern `{pattern}`")]
    #[diagnostic(
        code(depforge::rules::missing_destination),
        help("every source pattern must be followed by a destination subdirectory")
    )]
    MissingDestination {
        /// The pattern left without a destination.
        pattern: String,
    },
    /// An `EXCLUDE` marker ended the stream.
    #[error("EXCLUDE without following pattern (rule `{pattern}`)")]
    #[diagnostic(
        code(depforge::rules::dangling_exclude),
        help("write `EXCLUDE <pattern>` or drop the marker")
    )]
    DanglingExclude {
        /// Source pattern of the rule owning the marker.
        pattern: String,
    },
}

/// The two rule shapes the grammar admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleShape {
    /// `pattern dst`
    Plain,
    /// `pattern dst EXCLUDE ex_pattern`
    WithExclude,
}

impl RuleShape {
    /// Number of tokens consumed by a rule of this shape.
    const fn width(self) -> usize {
        match self {
            Self::Plain => 2,
            Self::WithExclude => 4,
        }
    }
}

struct RuleCursor<'a, S> {
    tokens: &'a [S],
    pos: usize,
}

impl<'a, S: AsRef<str>> RuleCursor<'a, S> {
    const fn new(tokens: &'a [S]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn token(&self, offset: usize) -> Option<&'a str> {
        self.tokens.get(self.pos + offset).map(AsRef::as_ref)
    }

    fn shape(&self) -> RuleShape {
        if self.token(2) == Some(EXCLUDE_MARKER) {
            RuleShape::WithExclude
        } else {
            RuleShape::Plain
        }
    }

    fn next_rule(&mut self) -> Result<Option<InstallRule>, GrammarError> {
        let Some(pattern) = self.token(0) else {
            return Ok(None);
        };
        let Some(dst) = self.token(1) else {
            return Err(GrammarError::MissingDestination {
                pattern: pattern.to_owned(),
            });
        };
        let shape = self.shape();
        let exclude_pattern = match shape {
            RuleShape::Plain => None,
            RuleShape::WithExclude => {
                let exclude = self
                    .token(3)
                    .ok_or_else(|| GrammarError::DanglingExclude {
                        pattern: pattern.to_owned(),
                    })?;
                Some(exclude.to_owned())
            }
        };
        self.pos += shape.width();
        Ok(Some(InstallRule {
            src_pattern: pattern.to_owned(),
            dst_subdir: dst.to_owned(),
            exclude_pattern,
        }))
    }
}

/// Parse a flat token stream into install rules.
///
/// # Errors
///
/// Returns [`GrammarError::MissingDestination`] when a pattern has no
/// destination and [`GrammarError::DanglingExclude`] when `EXCLUDE` is the
/// final token. No rules are returned on failure.
pub fn parse_rules<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<InstallRule>, GrammarError> {
    let mut cursor = RuleCursor::new(tokens);
    let mut rules = Vec::new();
    while let Some(rule) = cursor.next_rule()? {
        rules.push(rule);
    }
    Ok(rules)
}
