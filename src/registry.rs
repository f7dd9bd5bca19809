//! Library declarations and their install engine command fragments.
//!
//! The registry keeps declarations in the order they were made because the
//! engine builds libraries in that order; a nested project that consumes
//! another one must be declared after it. Registering the same library twice
//! is allowed and produces two fragments.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::rules::InstallRule;

/// Sub-command adding a nested CMake project.
pub const ADD_CMAKE_LIB: &str = "add-cmake-lib";
/// Sub-command adding a header-only library.
pub const ADD_HEADER_LIB: &str = "add-header-lib";
/// Sub-command adding a library installed by explicit copy rules.
pub const ADD_MANUAL_LIB: &str = "add-manual-lib";
/// Sub-fragment introducing one copy rule of a manual library.
pub const RULE: &str = "rule";

const DEFAULT_BUILD_SUBFOLDER: &str = "build";

/// Errors raised while building or serialising a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum DeclarationError {
    /// The source subdirectory was empty.
    #[error("library source directory must not be empty")]
    #[diagnostic(code(depforge::registry::empty_source))]
    EmptySource,
    /// The source subdirectory has no final component to derive a name from.
    #[error("cannot derive an install directory from source '{source_subdir}'")]
    #[diagnostic(
        code(depforge::registry::no_basename),
        help("name the install directory explicitly")
    )]
    NoBasename {
        /// Offending source subdirectory.
        source_subdir: Utf8PathBuf,
    },
    /// An install subdirectory was absolute or climbed above its root.
    #[error("install directory '{path}' must stay inside the install root")]
    #[diagnostic(code(depforge::registry::escaping_install_dir))]
    EscapingInstallDir {
        /// Offending install subdirectory.
        path: Utf8PathBuf,
    },
    /// A header-only library listed no header patterns.
    #[error("header-only library '{source_subdir}' lists no header globs")]
    #[diagnostic(code(depforge::registry::no_globs))]
    NoGlobs {
        /// Source subdirectory of the library.
        source_subdir: Utf8PathBuf,
    },
    /// A manual library listed no copy rules.
    #[error("manual library '{source_subdir}' lists no install rules")]
    #[diagnostic(code(depforge::registry::no_rules))]
    NoRules {
        /// Source subdirectory of the library.
        source_subdir: Utf8PathBuf,
    },
    /// Extra arguments could not be quoted for the engine.
    #[error("cannot quote build arguments of '{source_subdir}': {reason}")]
    #[diagnostic(code(depforge::registry::unquotable_args))]
    UnquotableArgs {
        /// Source subdirectory of the library.
        source_subdir: Utf8PathBuf,
        /// Why quoting failed.
        reason: String,
    },
}

fn checked_source(source_subdir: Utf8PathBuf) -> Result<Utf8PathBuf, DeclarationError> {
    if source_subdir.as_str().trim().is_empty() {
        return Err(DeclarationError::EmptySource);
    }
    Ok(source_subdir)
}

fn basename(source_subdir: &Utf8Path) -> Result<Utf8PathBuf, DeclarationError> {
    source_subdir
        .file_name()
        .map(Utf8PathBuf::from)
        .ok_or_else(|| DeclarationError::NoBasename {
            source_subdir: source_subdir.to_path_buf(),
        })
}

/// Normalise an install subdirectory into a relative path without `.` or
/// `..` segments. An empty result becomes `.`.
///
/// # Errors
///
/// Returns [`DeclarationError::EscapingInstallDir`] for absolute paths or
/// paths climbing above their root.
pub fn normalize_install_subdir(path: &Utf8Path) -> Result<Utf8PathBuf, DeclarationError> {
    let escaping = || DeclarationError::EscapingInstallDir {
        path: path.to_path_buf(),
    };
    let mut parts: Vec<&str> = Vec::new();
    for component in path.components() {
        match component {
            Utf8Component::Normal(part) => parts.push(part),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                parts.pop().ok_or_else(escaping)?;
            }
            Utf8Component::RootDir | Utf8Component::Prefix(_) => return Err(escaping()),
        }
    }
    if parts.is_empty() {
        Ok(Utf8PathBuf::from("."))
    } else {
        Ok(parts.into_iter().collect())
    }
}

/// A library built by a nested CMake configuration and installed from its
/// output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedBuildProject {
    /// Source directory relative to the sources root.
    pub source_subdir: Utf8PathBuf,
    /// Install directory relative to the install root.
    pub install_subdir: Utf8PathBuf,
    /// Build directory relative to the source directory.
    pub build_subfolder: Utf8PathBuf,
    /// Extra configure arguments, in order.
    pub extra_args: Vec<String>,
    /// Also build and install the Debug configuration.
    pub build_debug_too: bool,
}

impl NestedBuildProject {
    /// Declare a nested project installed under the basename of its source.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError`] when the source is empty or has no
    /// basename.
    pub fn new(source_subdir: impl Into<Utf8PathBuf>) -> Result<Self, DeclarationError> {
        let source_subdir = checked_source(source_subdir.into())?;
        let install_subdir = normalize_install_subdir(&basename(&source_subdir)?)?;
        Ok(Self {
            source_subdir,
            install_subdir,
            build_subfolder: Utf8PathBuf::from(DEFAULT_BUILD_SUBFOLDER),
            extra_args: Vec::new(),
            build_debug_too: false,
        })
    }

    /// Install into `install_subdir` instead of the source basename.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::EscapingInstallDir`] when the directory
    /// leaves the install root.
    pub fn with_install_subdir(
        mut self,
        install_subdir: &Utf8Path,
    ) -> Result<Self, DeclarationError> {
        self.install_subdir = normalize_install_subdir(install_subdir)?;
        Ok(self)
    }

    /// Use `build_subfolder` as the build directory.
    #[must_use]
    pub fn with_build_subfolder(mut self, build_subfolder: impl Into<Utf8PathBuf>) -> Self {
        self.build_subfolder = build_subfolder.into();
        self
    }

    /// Append configure arguments.
    #[must_use]
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build the Debug configuration after Release.
    #[must_use]
    pub const fn build_debug_too(mut self, enabled: bool) -> Self {
        self.build_debug_too = enabled;
        self
    }
}

/// A library installed by copying matching headers verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderOnly {
    /// Source directory relative to the sources root.
    pub source_subdir: Utf8PathBuf,
    /// Directory relative to the shared header root.
    pub install_subdir: Utf8PathBuf,
    /// Header glob patterns, in order.
    pub header_globs: Vec<String>,
}

impl HeaderOnly {
    /// Declare a header-only library copying `header_globs` into the header
    /// root.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError`] when the source is empty or no glob is
    /// given.
    pub fn new<I, S>(
        source_subdir: impl Into<Utf8PathBuf>,
        header_globs: I,
    ) -> Result<Self, DeclarationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source_subdir = checked_source(source_subdir.into())?;
        let header_globs: Vec<String> = header_globs.into_iter().map(Into::into).collect();
        if header_globs.is_empty() {
            return Err(DeclarationError::NoGlobs { source_subdir });
        }
        Ok(Self {
            source_subdir,
            install_subdir: Utf8PathBuf::from("."),
            header_globs,
        })
    }

    /// Install below `install_subdir` of the header root.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::EscapingInstallDir`] when the directory
    /// leaves the header root.
    pub fn with_install_subdir(
        mut self,
        install_subdir: &Utf8Path,
    ) -> Result<Self, DeclarationError> {
        self.install_subdir = normalize_install_subdir(install_subdir)?;
        Ok(self)
    }

    /// The header globs as copy rules into the install subdirectory.
    #[must_use]
    pub fn rules(&self) -> Vec<InstallRule> {
        self.header_globs
            .iter()
            .map(|glob| InstallRule::new(glob.as_str(), self.install_subdir.as_str()))
            .collect()
    }
}

/// A library installed through explicit copy rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualInstall {
    /// Source directory relative to the sources root.
    pub source_subdir: Utf8PathBuf,
    /// Install directory relative to the install root.
    pub install_subdir: Utf8PathBuf,
    /// Copy rules, in order.
    pub rules: Vec<InstallRule>,
}

impl ManualInstall {
    /// Declare a manual library installed under the basename of its source.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError`] when the source is empty, has no basename,
    /// or no rule is given.
    pub fn new(
        source_subdir: impl Into<Utf8PathBuf>,
        rules: Vec<InstallRule>,
    ) -> Result<Self, DeclarationError> {
        let source_subdir = checked_source(source_subdir.into())?;
        if rules.is_empty() {
            return Err(DeclarationError::NoRules { source_subdir });
        }
        let install_subdir = normalize_install_subdir(&basename(&source_subdir)?)?;
        Ok(Self {
            source_subdir,
            install_subdir,
            rules,
        })
    }

    /// Install into `install_subdir` instead of the source basename.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::EscapingInstallDir`] when the directory
    /// leaves the install root.
    pub fn with_install_subdir(
        mut self,
        install_subdir: &Utf8Path,
    ) -> Result<Self, DeclarationError> {
        self.install_subdir = normalize_install_subdir(install_subdir)?;
        Ok(self)
    }
}

/// One declared library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LibraryDeclaration {
    /// Built by a nested CMake configuration.
    NestedBuildProject(NestedBuildProject),
    /// Copied header files.
    HeaderOnly(HeaderOnly),
    /// Copied through explicit rules.
    ManualInstall(ManualInstall),
}

impl LibraryDeclaration {
    /// Source directory relative to the sources root.
    #[must_use]
    pub fn source_subdir(&self) -> &Utf8Path {
        match self {
            Self::NestedBuildProject(lib) => &lib.source_subdir,
            Self::HeaderOnly(lib) => &lib.source_subdir,
            Self::ManualInstall(lib) => &lib.source_subdir,
        }
    }

    /// Name the engine reports the library under: the last source component.
    #[must_use]
    pub fn name(&self) -> &str {
        let source = self.source_subdir();
        source.file_name().unwrap_or(source.as_str())
    }

    /// Serialise the declaration into its engine command fragment.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::UnquotableArgs`] when extra arguments
    /// contain characters the engine's shell-style split cannot recover.
    pub fn to_fragment(&self) -> Result<Fragment, DeclarationError> {
        let mut fragment = Fragment::default();
        match self {
            Self::NestedBuildProject(lib) => {
                let joined = shlex::try_join(lib.extra_args.iter().map(String::as_str)).map_err(
                    |err| DeclarationError::UnquotableArgs {
                        source_subdir: lib.source_subdir.clone(),
                        reason: err.to_string(),
                    },
                )?;
                fragment.push(ADD_CMAKE_LIB);
                fragment.push_flag("src", lib.source_subdir.as_str());
                fragment.push_flag("install", lib.install_subdir.as_str());
                fragment.push_flag("build-dir", lib.build_subfolder.as_str());
                fragment.push_flag("args", &joined);
                if lib.build_debug_too {
                    fragment.push("--build-debug");
                }
            }
            Self::HeaderOnly(lib) => {
                fragment.push(ADD_HEADER_LIB);
                fragment.push_flag("src", lib.source_subdir.as_str());
                fragment.push_flag("install-subdir", lib.install_subdir.as_str());
                for glob in &lib.header_globs {
                    fragment.push_flag("glob", glob);
                }
            }
            Self::ManualInstall(lib) => {
                fragment.push(ADD_MANUAL_LIB);
                fragment.push_flag("src", lib.source_subdir.as_str());
                fragment.push_flag("install", lib.install_subdir.as_str());
                for rule in &lib.rules {
                    fragment.push(RULE);
                    fragment.push_flag("src", &rule.src_pattern);
                    fragment.push_flag("dst", &rule.dst_subdir);
                    if let Some(exclude) = &rule.exclude_pattern {
                        fragment.push_flag("ex", exclude);
                    }
                }
            }
        }
        Ok(fragment)
    }
}

/// Ordered engine arguments describing one library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment(Vec<String>);

impl Fragment {
    fn push(&mut self, arg: &str) {
        self.0.push(arg.to_owned());
    }

    fn push_flag(&mut self, name: &str, value: &str) {
        self.0.push(format!("--{name}={value}"));
    }

    /// Borrow the arguments.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Consume the fragment returning its arguments.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Declarations accumulated during one configuration run.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    declarations: Vec<LibraryDeclaration>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            declarations: Vec::new(),
        }
    }

    /// Append a declaration.
    pub fn register(&mut self, declaration: LibraryDeclaration) {
        self.declarations.push(declaration);
    }

    /// Declarations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &LibraryDeclaration> {
        self.declarations.iter()
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Whether nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Find the first declaration with the given source subdirectory or name.
    #[must_use]
    pub fn find(&self, source_or_name: &str) -> Option<&LibraryDeclaration> {
        self.declarations.iter().find(|decl| {
            decl.source_subdir().as_str() == source_or_name || decl.name() == source_or_name
        })
    }

    /// Serialise every declaration, in registration order.
    ///
    /// # Errors
    ///
    /// Propagates the first [`DeclarationError`] raised by a declaration.
    pub fn fragments(&self) -> Result<Vec<Fragment>, DeclarationError> {
        self.declarations
            .iter()
            .map(LibraryDeclaration::to_fragment)
            .collect()
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a LibraryDeclaration;
    type IntoIter = std::slice::Iter<'a, LibraryDeclaration>;

    fn into_iter(self) -> Self::IntoIter {
        self.declarations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("glm", "glm")]
    #[case("vendor/SDL", "SDL")]
    fn nested_project_installs_under_basename(#[case] source: &str, #[case] install: &str) {
        let lib = NestedBuildProject::new(source).expect("declaration");
        assert_eq!(lib.install_subdir, Utf8PathBuf::from(install));
        assert_eq!(lib.build_subfolder, Utf8PathBuf::from("build"));
    }

    #[rstest]
    #[case("SDL3", "SDL3")]
    #[case("./libs/../SDL3/", "SDL3")]
    #[case("a/./b", "a/b")]
    #[case("", ".")]
    #[case(".", ".")]
    fn install_subdir_is_normalised(#[case] raw: &str, #[case] expected: &str) {
        let normalised = normalize_install_subdir(Utf8Path::new(raw)).expect("relative path");
        assert_eq!(normalised, Utf8PathBuf::from(expected));
    }

    #[rstest]
    #[case("..")]
    #[case("a/../../b")]
    #[case("/abs/dir")]
    fn install_subdir_must_stay_inside_root(#[case] raw: &str) {
        let err = normalize_install_subdir(Utf8Path::new(raw)).expect_err("escaping path");
        assert!(matches!(err, DeclarationError::EscapingInstallDir { .. }));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn empty_source_is_rejected(#[case] source: &str) {
        assert_eq!(
            NestedBuildProject::new(source).expect_err("empty source"),
            DeclarationError::EmptySource
        );
    }

    #[test]
    fn nested_fragment_quotes_extra_args() {
        let lib = NestedBuildProject::new("SDL_image")
            .expect("declaration")
            .with_install_subdir(Utf8Path::new("SDL3_image"))
            .expect("install dir")
            .with_extra_args(["-DSDLIMAGE_AVIF=OFF", "-DNAME=two words"])
            .build_debug_too(true);
        let fragment = LibraryDeclaration::NestedBuildProject(lib)
            .to_fragment()
            .expect("fragment");
        let args = fragment.as_slice();
        assert_eq!(
            args.iter().map(String::as_str).take(4).collect::<Vec<_>>(),
            [
                "add-cmake-lib",
                "--src=SDL_image",
                "--install=SDL3_image",
                "--build-dir=build",
            ]
        );
        assert_eq!(args.last().map(String::as_str), Some("--build-debug"));
        let joined = args
            .iter()
            .find_map(|arg| arg.strip_prefix("--args="))
            .expect("args flag");
        assert_eq!(
            shlex::split(joined),
            Some(vec![
                "-DSDLIMAGE_AVIF=OFF".to_owned(),
                "-DNAME=two words".to_owned()
            ])
        );
    }

    #[test]
    fn header_fragment_repeats_globs() {
        let lib = HeaderOnly::new("simple_term_colors", ["include/stc.hpp", "*.h"])
            .expect("declaration");
        let fragment = LibraryDeclaration::HeaderOnly(lib).to_fragment().expect("fragment");
        assert_eq!(
            fragment.as_slice(),
            [
                "add-header-lib",
                "--src=simple_term_colors",
                "--install-subdir=.",
                "--glob=include/stc.hpp",
                "--glob=*.h",
            ]
        );
    }

    #[test]
    fn manual_fragment_emits_rule_sub_fragments() {
        let lib = ManualInstall::new(
            "SteamworksSDK",
            vec![
                InstallRule::new("redistributable_bin/**/*.dll", "bin"),
                InstallRule::new("public/steam/*.h", "include/steam").excluding("*_internal.h"),
            ],
        )
        .expect("declaration");
        let fragment = LibraryDeclaration::ManualInstall(lib).to_fragment().expect("fragment");
        assert_eq!(
            fragment.as_slice(),
            [
                "add-manual-lib",
                "--src=SteamworksSDK",
                "--install=SteamworksSDK",
                "rule",
                "--src=redistributable_bin/**/*.dll",
                "--dst=bin",
                "rule",
                "--src=public/steam/*.h",
                "--dst=include/steam",
                "--ex=*_internal.h",
            ]
        );
    }

    #[test]
    fn manual_library_needs_rules() {
        let err = ManualInstall::new("SteamworksSDK", Vec::new()).expect_err("no rules");
        assert!(matches!(err, DeclarationError::NoRules { .. }));
    }

    #[test]
    fn header_library_needs_globs() {
        let err = HeaderOnly::new("gl3w", Vec::<String>::new()).expect_err("no globs");
        assert!(matches!(err, DeclarationError::NoGlobs { .. }));
    }

    #[test]
    fn nul_bytes_in_args_are_rejected() {
        let lib = NestedBuildProject::new("glm")
            .expect("declaration")
            .with_extra_args(["-DBAD=\0"]);
        let err = LibraryDeclaration::NestedBuildProject(lib)
            .to_fragment()
            .expect_err("unquotable");
        assert!(matches!(err, DeclarationError::UnquotableArgs { .. }));
    }

    #[test]
    fn registry_keeps_order_and_duplicates() {
        let mut registry = Registry::new();
        let glm = NestedBuildProject::new("glm").expect("declaration");
        registry.register(LibraryDeclaration::NestedBuildProject(glm.clone()));
        registry.register(LibraryDeclaration::NestedBuildProject(glm));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.fragments().expect("fragments").len(), 2);
        assert!(registry.find("glm").is_some());
    }
}
