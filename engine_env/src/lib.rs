#![forbid(unsafe_code)]

//! Environment constants shared by the depforge library, its binary, and the
//! test helpers.

/// Environment variable overriding the install engine command.
///
/// The value is split shell-style, so an interpreter and script may be given
/// together (for example `python3 third_party/deps.py`).
///
/// # Examples
///
/// ```
/// use engine_env::ENGINE_ENV;
/// assert_eq!(ENGINE_ENV, "DEPFORGE_ENGINE");
/// ```
pub const ENGINE_ENV: &str = "DEPFORGE_ENGINE";

/// Engine program used when neither the manifest, the command line, nor
/// [`ENGINE_ENV`] names one.
pub const DEFAULT_ENGINE_PROGRAM: &str = "depforge-engine";
