//! Target platform and toolchain descriptors.
//!
//! Both are explicit values rather than `cfg!` checks so a configuration run
//! can describe a target other than the host (and tests can exercise every
//! branch on any machine).

use serde::{Deserialize, Serialize};

/// Operating system family of the build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetPlatform {
    /// Microsoft Windows.
    Windows,
    /// Linux and other ELF-based Unix systems.
    Linux,
    /// Apple macOS.
    Macos,
}

impl TargetPlatform {
    /// Platform of the running host.
    #[must_use]
    pub fn host() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    fn from_os(os: &str) -> Self {
        match os {
            "windows" => Self::Windows,
            "macos" | "ios" => Self::Macos,
            _ => Self::Linux,
        }
    }

    /// Whether shared libraries follow POSIX `soname` conventions.
    #[must_use]
    pub const fn is_posix(self) -> bool {
        !matches!(self, Self::Windows)
    }
}

/// Compiler/linker family used by the consuming build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Toolchain {
    /// Microsoft Visual C++ and `link.exe`.
    Msvc,
    /// GCC with GNU binutils.
    Gnu,
    /// LLVM Clang.
    Clang,
    /// Apple Clang.
    AppleClang,
}

impl Toolchain {
    /// Default toolchain for `platform`.
    #[must_use]
    pub const fn default_for(platform: TargetPlatform) -> Self {
        match platform {
            TargetPlatform::Windows => Self::Msvc,
            TargetPlatform::Linux => Self::Gnu,
            TargetPlatform::Macos => Self::AppleClang,
        }
    }

    /// Linker option silencing warnings about missing debug symbols of
    /// imported static libraries, for toolchains that emit them.
    #[must_use]
    pub const fn missing_pdb_suppression(self) -> Option<&'static str> {
        match self {
            // LNK4099: PDB was not found with the object.
            Self::Msvc => Some("/ignore:4099"),
            Self::Gnu | Self::Clang | Self::AppleClang => None,
        }
    }
}
