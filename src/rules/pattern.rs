//! Splitting of rule patterns into a literal prefix and a wildcard tail.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

const WILDCARD_CHARS: [char; 3] = ['*', '?', '['];

/// Directory an exclusion pattern is evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcludeBase {
    /// Join the exclusion to the literal prefix of the rule's own pattern.
    #[default]
    #[serde(alias = "rule-prefix")]
    RulePrefix,
    /// Join the exclusion to the library source directory.
    #[serde(alias = "source-root")]
    SourceRoot,
}

/// Split `pattern` into the literal path before its first wildcard segment and
/// the remaining sub-pattern.
///
/// A segment is a wildcard segment when it contains `*`, `?` or `[`. Patterns
/// without wildcards return the whole path and an empty sub-pattern.
///
/// ```
/// use camino::Utf8PathBuf;
/// use depforge::rules::split_pattern;
///
/// let (prefix, rest) = split_pattern("redistributable_bin/**/*.dll");
/// assert_eq!(prefix, Utf8PathBuf::from("redistributable_bin"));
/// assert_eq!(rest, "**/*.dll");
/// ```
#[must_use]
pub fn split_pattern(pattern: &str) -> (Utf8PathBuf, String) {
    let components: Vec<Utf8Component<'_>> = Utf8Path::new(pattern).components().collect();
    let first_wild = components
        .iter()
        .position(|part| part.as_str().contains(WILDCARD_CHARS));
    match first_wild {
        Some(idx) => {
            let (fixed, wild) = components.split_at(idx);
            let prefix: Utf8PathBuf = fixed.iter().map(Utf8Component::as_str).collect();
            let rest = wild
                .iter()
                .map(Utf8Component::as_str)
                .collect::<Vec<_>>()
                .join("/");
            (prefix, rest)
        }
        None => (components.iter().map(Utf8Component::as_str).collect(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("redistributable_bin/**/*.dll", "redistributable_bin", "**/*.dll")]
    #[case("public/steam/*.h", "public/steam", "*.h")]
    #[case("*.h", "", "*.h")]
    #[case("include/stc.hpp", "include/stc.hpp", "")]
    #[case("lib/[ab]/x/*.so", "lib", "[ab]/x/*.so")]
    #[case("a/b?/c", "a", "b?/c")]
    fn splits_at_first_wildcard_segment(
        #[case] pattern: &str,
        #[case] prefix: &str,
        #[case] rest: &str,
    ) {
        let (got_prefix, got_rest) = split_pattern(pattern);
        assert_eq!(got_prefix, Utf8PathBuf::from(prefix));
        assert_eq!(got_rest, rest);
    }
}
