//! Conda platform taxonomy.
//!
//! A [`Platform`] is an operating system paired with an architecture and is
//! written `"{os}-{arch}"`, e.g. `linux-64` or `osx-arm64`. Every platform
//! string must decompose into exactly one known OS token and one known arch
//! token, split on the first `-`.
//!
//! # Example
//!
//! ```
//! use forge_schema::{Platform, PlatformArch, PlatformOs};
//!
//! let p: Platform = "linux-aarch64".parse().unwrap();
//! assert_eq!(p.split(), (PlatformOs::Linux, PlatformArch::Aarch64));
//! assert_eq!(p.to_string(), "linux-aarch64");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SchemaError};

/// Operating system half of a platform.
///
/// The declaration order is significant: asset classification scans the
/// tokens in this order and accepts the first substring hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlatformOs {
    /// Emscripten (browser) targets.
    Emscripten,
    /// WebAssembly System Interface.
    Wasi,
    /// Linux.
    Linux,
    /// macOS (`darwin` on the host side).
    Osx,
    /// Windows.
    Win,
    /// Fallback for hosts that map to nothing else.
    Unknown,
}

impl PlatformOs {
    /// All operating systems in classification order.
    pub const ALL: [Self; 6] = [
        Self::Emscripten,
        Self::Wasi,
        Self::Linux,
        Self::Osx,
        Self::Win,
        Self::Unknown,
    ];

    /// The OS the current process was compiled for.
    ///
    /// Unrecognised hosts map to [`PlatformOs::Unknown`] instead of failing
    /// so the tool keeps running with degraded platform matching.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Osx
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "windows") {
            Self::Win
        } else {
            Self::Unknown
        }
    }

    /// Canonical token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emscripten => "emscripten",
            Self::Wasi => "wasi",
            Self::Linux => "linux",
            Self::Osx => "osx",
            Self::Win => "win",
            Self::Unknown => "unknown",
        }
    }

    /// True for Linux and macOS.
    pub fn is_unix(self) -> bool {
        matches!(self, Self::Linux | Self::Osx)
    }

    /// Appends `.exe` to `name` when this OS is Windows.
    pub fn exe(self, name: &str) -> String {
        if self == Self::Win {
            format!("{name}.exe")
        } else {
            name.to_string()
        }
    }
}

impl fmt::Display for PlatformOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformOs {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|os| os.as_str() == s)
            .ok_or_else(|| SchemaError::InvalidPlatform(s.to_string()))
    }
}

/// Architecture half of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlatformArch {
    /// 32-bit x86.
    X32,
    /// 64-bit x86.
    X64,
    /// 64-bit ARM, Apple and Windows spelling.
    Arm64,
    /// 64-bit ARM, Linux spelling.
    Aarch64,
    /// ARMv6 little-endian.
    Armv6l,
    /// ARMv7 little-endian.
    Armv7l,
    /// POWER little-endian.
    Ppc64le,
    /// POWER big-endian.
    Ppc64,
    /// IBM Z.
    S390x,
    /// 32-bit RISC-V.
    Riscv32,
    /// 64-bit RISC-V.
    Riscv64,
    /// 32-bit WebAssembly.
    Wasm32,
    /// Fallback for hosts that map to nothing else.
    Unknown,
}

impl PlatformArch {
    /// All architectures in classification order.
    pub const ALL: [Self; 13] = [
        Self::X32,
        Self::X64,
        Self::Arm64,
        Self::Aarch64,
        Self::Armv6l,
        Self::Armv7l,
        Self::Ppc64le,
        Self::Ppc64,
        Self::S390x,
        Self::Riscv32,
        Self::Riscv64,
        Self::Wasm32,
        Self::Unknown,
    ];

    /// The architecture the current process was compiled for.
    pub fn current() -> Self {
        if cfg!(target_arch = "aarch64") {
            Self::Arm64
        } else if cfg!(target_arch = "x86_64") {
            Self::X64
        } else {
            Self::Unknown
        }
    }

    /// Canonical token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X32 => "32",
            Self::X64 => "64",
            Self::Arm64 => "arm64",
            Self::Aarch64 => "aarch64",
            Self::Armv6l => "armv6l",
            Self::Armv7l => "armv7l",
            Self::Ppc64le => "ppc64le",
            Self::Ppc64 => "ppc64",
            Self::S390x => "s390x",
            Self::Riscv32 => "riscv32",
            Self::Riscv64 => "riscv64",
            Self::Wasm32 => "wasm32",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PlatformArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformArch {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.as_str() == s)
            .ok_or_else(|| SchemaError::InvalidPlatform(s.to_string()))
    }
}

/// An `{os}-{arch}` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Platform {
    os: PlatformOs,
    arch: PlatformArch,
}

/// `linux-64`, `osx-64` and `win-64`.
pub const COMMON_64_PLATFORMS: [Platform; 3] = [
    Platform::new(PlatformOs::Linux, PlatformArch::X64),
    Platform::new(PlatformOs::Osx, PlatformArch::X64),
    Platform::new(PlatformOs::Win, PlatformArch::X64),
];

/// `linux-aarch64`, `osx-arm64` and `win-arm64`.
pub const COMMON_ARM64_PLATFORMS: [Platform; 3] = [
    Platform::new(PlatformOs::Linux, PlatformArch::Aarch64),
    Platform::new(PlatformOs::Osx, PlatformArch::Arm64),
    Platform::new(PlatformOs::Win, PlatformArch::Arm64),
];

impl Platform {
    /// Pairs an OS with an architecture.
    pub const fn new(os: PlatformOs, arch: PlatformArch) -> Self {
        Self { os, arch }
    }

    /// The platform of the running host, normalised like a classified asset.
    pub fn current() -> Self {
        Self::new(PlatformOs::current(), PlatformArch::current()).normalized()
    }

    /// Operating system half.
    pub const fn os(self) -> PlatformOs {
        self.os
    }

    /// Architecture half.
    pub const fn arch(self) -> PlatformArch {
        self.arch
    }

    /// Both halves at once.
    pub const fn split(self) -> (PlatformOs, PlatformArch) {
        (self.os, self.arch)
    }

    /// True for Linux and macOS platforms.
    pub fn is_unix(self) -> bool {
        self.os.is_unix()
    }

    /// Appends `.exe` to `name` when targeting Windows.
    pub fn exe(self, name: &str) -> String {
        self.os.exe(name)
    }

    /// Reconciles vendor ARM naming with the conda spelling.
    ///
    /// There is no `linux-arm64` in conda, only `linux-aarch64`; macOS and
    /// Windows use `arm64`.
    pub fn normalized(self) -> Self {
        let arch = match (self.os, self.arch) {
            (PlatformOs::Linux, PlatformArch::Arm64) => PlatformArch::Aarch64,
            (PlatformOs::Osx | PlatformOs::Win, PlatformArch::Aarch64) => PlatformArch::Arm64,
            (_, arch) => arch,
        };
        Self::new(self.os, arch)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SchemaError::InvalidPlatform(s.to_string());
        let (os, arch) = s.split_once('-').ok_or_else(invalid)?;
        let os = os.parse::<PlatformOs>().map_err(|_| invalid())?;
        let arch = arch.parse::<PlatformArch>().map_err(|_| invalid())?;
        Ok(Self::new(os, arch))
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses an `{os}-{arch}` string.
pub fn parse_platform(s: &str) -> Result<Platform> {
    s.parse()
}

/// Builds a closure that suffixes file names with `.exe` for Windows.
pub fn suffix_exe(os: PlatformOs) -> impl Fn(&str) -> String {
    move |name| os.exe(name)
}
