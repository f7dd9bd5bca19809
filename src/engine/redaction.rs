//! Redaction of secrets in logged engine command lines.
//!
//! Build arguments frequently carry credentials as cache variables, such as
//! `-DSTEAM_API_TOKEN=...`. Values of sensitive assignments are masked, both
//! as standalone arguments and inside the compound `--args=` and
//! `--cmake-args=` values.

const MASK: &str = "***REDACTED***";

const COMPOUND_FLAGS: [&str; 2] = ["--args", "--cmake-args"];

fn is_sensitive_key(key: &str) -> bool {
    const SENSITIVE_SEGMENTS: [&str; 8] = [
        "password",
        "passwd",
        "token",
        "secret",
        "apikey",
        "auth",
        "authorization",
        "credentials",
    ];
    let lower = key.to_ascii_lowercase();
    lower.contains("api_key")
        || lower.contains("api-key")
        || lower
            .split(['_', '-', '.'])
            .any(|segment| SENSITIVE_SEGMENTS.contains(&segment))
}

/// Key of an assignment-shaped word, with `-D` or leading dashes removed.
fn assignment_key(word: &str) -> Option<&str> {
    let body = word
        .strip_prefix("-D")
        .unwrap_or_else(|| word.trim_start_matches('-'));
    body.split_once('=').map(|(key, _)| key.trim())
}

fn redact_word(word: &str) -> Option<String> {
    let key = assignment_key(word)?;
    if !is_sensitive_key(key) {
        return None;
    }
    let (head, _) = word.split_once('=')?;
    Some(format!("{}={MASK}", head.trim_end()))
}

/// Mask sensitive values in one engine argument.
///
/// ```
/// use depforge::engine::redact_argument;
///
/// assert_eq!(redact_argument("-DSTEAM_TOKEN=abc"), "-DSTEAM_TOKEN=***REDACTED***");
/// let logged = redact_argument("--args=-DBUILD_TESTS=OFF -DAPI_KEY=xyz");
/// assert_eq!(
///     logged.strip_prefix("--args=").and_then(shlex::split),
///     Some(vec!["-DBUILD_TESTS=OFF".to_owned(), "-DAPI_KEY=***REDACTED***".to_owned()])
/// );
/// assert_eq!(redact_argument("--src=glm"), "--src=glm");
/// ```
#[must_use]
pub fn redact_argument(arg: &str) -> String {
    if let Some(redacted) = redact_word(arg) {
        return redacted;
    }
    if let Some((flag, value)) = arg.split_once('=')
        && COMPOUND_FLAGS.contains(&flag)
        && let Some(words) = shlex::split(value)
    {
        let mut changed = false;
        let masked: Vec<String> = words
            .iter()
            .map(|word| {
                redact_word(word).map_or_else(
                    || word.clone(),
                    |redacted| {
                        changed = true;
                        redacted
                    },
                )
            })
            .collect();
        if changed {
            let joined = shlex::try_join(masked.iter().map(String::as_str))
                .unwrap_or_else(|_| masked.join(" "));
            return format!("{flag}={joined}");
        }
    }
    arg.to_owned()
}

/// Mask sensitive values in every argument.
#[must_use]
pub fn redact_arguments(args: &[String]) -> Vec<String> {
    args.iter().map(|arg| redact_argument(arg)).collect()
}
