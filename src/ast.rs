//! Serde structures for the `Depsfile` manifest.
//!
//! The manifest is YAML. Each library entry names its kind by the key that
//! carries its source directory:
//!
//! ```yaml
//! depforge_version: "1.0.0"
//! settings:
//!   sources_dir: third_party/src
//!   install_dir: third_party/bin
//! libraries:
//!   - header: gl3w
//!     globs: ["*.h"]
//!   - cmake: glm
//!     build_debug: true
//!     args: ["-DGLM_TEST_ENABLE=OFF"]
//!   - manual: SteamworksSDK
//!     rules: [public/steam/*.h, include/steam]
//! ```
//!
//! Everything here is purely structural; validation and path resolution
//! happen in [`crate::manifest`].

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Deserializer};

use crate::graph::NodeKind;
use crate::platform::{TargetPlatform, Toolchain};
use crate::rules::ExcludeBase;

/// Top-level manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepsManifest {
    /// Manifest format version.
    pub depforge_version: Version,
    /// Engine and target settings.
    pub settings: Settings,
    /// Declared libraries, in install order.
    #[serde(default)]
    pub libraries: Vec<LibrarySpec>,
    /// Prebuilt targets of the consumer build graph.
    #[serde(default)]
    pub imports: Vec<ImportSpec>,
    /// Alternative names for imported targets.
    #[serde(default)]
    pub aliases: IndexMap<String, String>,
    /// Project targets linking against the imports.
    #[serde(default)]
    pub consumers: Vec<ConsumerSpec>,
}

/// The `settings` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Root of the library sources.
    pub sources_dir: Utf8PathBuf,
    /// Root of the installed libraries.
    pub install_dir: Utf8PathBuf,
    /// Engine cache directory.
    #[serde(default)]
    pub cache_dir: Option<Utf8PathBuf>,
    /// CMake arguments for every nested build.
    #[serde(default)]
    pub cmake_args: StringOrList,
    /// Install subdirectory for header-only libraries.
    #[serde(default)]
    pub header_subdir: Option<String>,
    /// Engine command line.
    #[serde(default)]
    pub engine: StringOrList,
    /// Toolchain of the consuming build.
    #[serde(default)]
    pub toolchain: Option<Toolchain>,
    /// Target platform of the consuming build.
    #[serde(default)]
    pub platform: Option<TargetPlatform>,
    /// Where rule exclusions are evaluated.
    #[serde(default)]
    pub exclude_base: ExcludeBase,
}

/// One or more strings.
///
/// A single string is kept whole for lists of patterns and split shell-style
/// where the field holds command-line arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    /// Not given.
    #[default]
    Empty,
    /// A single string.
    String(String),
    /// A list of strings.
    List(Vec<String>),
}

impl StringOrList {
    /// Whether no value was provided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::String(value) => value.is_empty(),
            Self::List(values) => values.is_empty(),
        }
    }
}

/// A declared library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySpec {
    /// Built through a nested CMake project.
    Cmake {
        /// Source subdirectory.
        src: Utf8PathBuf,
        /// Install subdirectory.
        install: Option<Utf8PathBuf>,
        /// Build folder inside the source directory.
        build_dir: Option<Utf8PathBuf>,
        /// Extra configure arguments.
        args: StringOrList,
        /// Also build and install the Debug configuration.
        build_debug: bool,
    },
    /// Header files copied by glob.
    Header {
        /// Source subdirectory.
        src: Utf8PathBuf,
        /// Install subdirectory below the header root.
        install: Option<Utf8PathBuf>,
        /// Header globs.
        globs: StringOrList,
    },
    /// Files copied through explicit rules.
    Manual {
        /// Source subdirectory.
        src: Utf8PathBuf,
        /// Install subdirectory.
        install: Option<Utf8PathBuf>,
        /// Flat rule token list.
        rules: Vec<String>,
    },
}

impl LibrarySpec {
    /// Source subdirectory as written.
    #[must_use]
    pub const fn src(&self) -> &Utf8PathBuf {
        match self {
            Self::Cmake { src, .. } | Self::Header { src, .. } | Self::Manual { src, .. } => src,
        }
    }
}

impl<'de> Deserialize<'de> for LibrarySpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct RawLibrary {
            cmake: Option<Utf8PathBuf>,
            header: Option<Utf8PathBuf>,
            manual: Option<Utf8PathBuf>,
            install: Option<Utf8PathBuf>,
            build_dir: Option<Utf8PathBuf>,
            args: Option<StringOrList>,
            build_debug: Option<bool>,
            globs: Option<StringOrList>,
            rules: Option<Vec<String>>,
        }

        fn reject_foreign<E: serde::de::Error>(
            kind: &str,
            fields: &[(&str, bool)],
        ) -> Result<(), E> {
            let foreign: Vec<&str> = fields
                .iter()
                .filter_map(|(name, present)| present.then_some(*name))
                .collect();
            if foreign.is_empty() {
                Ok(())
            } else {
                Err(E::custom(format!(
                    "fields {} do not apply to {kind} libraries",
                    foreign.join(", ")
                )))
            }
        }

        let raw = RawLibrary::deserialize(deserializer)?;
        match (raw.cmake, raw.header, raw.manual) {
            (Some(src), None, None) => {
                reject_foreign(
                    "cmake",
                    &[("globs", raw.globs.is_some()), ("rules", raw.rules.is_some())],
                )?;
                Ok(Self::Cmake {
                    src,
                    install: raw.install,
                    build_dir: raw.build_dir,
                    args: raw.args.unwrap_or_default(),
                    build_debug: raw.build_debug.unwrap_or(false),
                })
            }
            (None, Some(src), None) => {
                reject_foreign(
                    "header",
                    &[
                        ("build_dir", raw.build_dir.is_some()),
                        ("args", raw.args.is_some()),
                        ("build_debug", raw.build_debug.is_some()),
                        ("rules", raw.rules.is_some()),
                    ],
                )?;
                Ok(Self::Header {
                    src,
                    install: raw.install,
                    globs: raw.globs.unwrap_or_default(),
                })
            }
            (None, None, Some(src)) => {
                reject_foreign(
                    "manual",
                    &[
                        ("build_dir", raw.build_dir.is_some()),
                        ("args", raw.args.is_some()),
                        ("build_debug", raw.build_debug.is_some()),
                        ("globs", raw.globs.is_some()),
                    ],
                )?;
                Ok(Self::Manual {
                    src,
                    install: raw.install,
                    rules: raw.rules.unwrap_or_default(),
                })
            }
            (None, None, None) => Err(serde::de::Error::custom(
                "missing one of cmake, header, or manual",
            )),
            (cmake, header, manual) => {
                let present: Vec<&str> = [
                    ("cmake", cmake.is_some()),
                    ("header", header.is_some()),
                    ("manual", manual.is_some()),
                ]
                .into_iter()
                .filter_map(|(name, is_present)| is_present.then_some(name))
                .collect();
                Err(serde::de::Error::custom(format!(
                    "fields {} are mutually exclusive",
                    present.join(", ")
                )))
            }
        }
    }
}

/// A prebuilt target of the consumer graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportSpec {
    /// Target id.
    pub id: String,
    /// Artefact kind.
    pub kind: NodeKind,
    /// Release artefact location.
    #[serde(default)]
    pub location: Option<Utf8PathBuf>,
    /// Interface link dependencies.
    #[serde(default)]
    pub deps: Vec<LinkSpec>,
}

const fn default_consumer_kind() -> NodeKind {
    NodeKind::Executable
}

/// A project target linking against imports.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumerSpec {
    /// Target id.
    pub id: String,
    /// Artefact kind, an executable unless stated.
    #[serde(default = "default_consumer_kind")]
    pub kind: NodeKind,
    /// Directory the target is built into.
    #[serde(default)]
    pub output_dir: Option<Utf8PathBuf>,
    /// Libraries the target links.
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

/// A dependency reference as written in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LinkSpec {
    /// Node id or alias.
    Name(String),
    /// Needed at link time only.
    LinkOnly {
        /// Node id or alias.
        link_only: String,
    },
}
