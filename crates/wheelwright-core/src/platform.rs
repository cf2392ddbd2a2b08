//! Operating system families, runtime versions and platform tags.
//!
//! Every runner label resolves to exactly one [`OsFamily`] and every
//! [`PlatformTag`] belongs to exactly one family, so per-OS behaviour is a
//! `match` over a closed enum instead of string comparisons scattered
//! through the build steps.

use crate::error::ConfigError;
use crate::pipeline::DependencyConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    Linux,
    Macos,
}

impl OsFamily {
    /// Resolve the family from a runner label such as `ubuntu-latest` or `macos-14`.
    pub fn from_runner_label(label: &str) -> Result<Self, ConfigError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ConfigError::EmptyField("os"));
        }

        let lower = label.to_ascii_lowercase();
        if lower.starts_with("ubuntu") {
            Ok(OsFamily::Linux)
        } else if lower.starts_with("macos") {
            Ok(OsFamily::Macos)
        } else {
            Err(ConfigError::UnknownOs(label.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Macos => "macos",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runner label together with the family it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RunnerImage {
    label: String,
    family: OsFamily,
}

impl RunnerImage {
    pub fn parse(label: &str) -> Result<Self, ConfigError> {
        let family = OsFamily::from_runner_label(label)?;
        Ok(Self {
            label: label.trim().to_string(),
            family,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn family(&self) -> OsFamily {
        self.family
    }
}

impl fmt::Display for RunnerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Interpreter version, written either compact (`39`, `310`) or dotted (`3.9`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PythonVersion {
    pub major: u8,
    pub minor: u8,
}

impl PythonVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// CPython ABI tag used in build selectors, e.g. `cp39`.
    pub fn abi_tag(&self) -> String {
        format!("cp{}{}", self.major, self.minor)
    }

    /// Dotted form used to locate interpreters, e.g. `3.9`.
    pub fn dotted(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl FromStr for PythonVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(ConfigError::EmptyField("python"));
        }
        let invalid = || ConfigError::InvalidVersion(raw.to_string());

        let digits = raw.strip_prefix("cp").unwrap_or(raw);
        if !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(invalid());
        }
        let (major, minor) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None if digits.len() >= 2 => digits.split_at(1),
            None => return Err(invalid()),
        };

        if major.is_empty() || minor.is_empty() || minor.contains('.') {
            return Err(invalid());
        }

        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Target platform of a binary artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum PlatformTag {
    #[serde(rename = "manylinux_x86_64")]
    ManylinuxX86_64,
    #[serde(rename = "manylinux_i686")]
    ManylinuxI686,
    #[serde(rename = "manylinux_aarch64")]
    ManylinuxAarch64,
    #[serde(rename = "musllinux_x86_64")]
    MusllinuxX86_64,
    #[serde(rename = "musllinux_aarch64")]
    MusllinuxAarch64,
    #[serde(rename = "macosx_x86_64")]
    MacosxX86_64,
    #[serde(rename = "macosx_arm64")]
    MacosxArm64,
    #[serde(rename = "macosx_universal2")]
    MacosxUniversal2,
}

impl PlatformTag {
    pub const ALL: [PlatformTag; 8] = [
        PlatformTag::ManylinuxX86_64,
        PlatformTag::ManylinuxI686,
        PlatformTag::ManylinuxAarch64,
        PlatformTag::MusllinuxX86_64,
        PlatformTag::MusllinuxAarch64,
        PlatformTag::MacosxX86_64,
        PlatformTag::MacosxArm64,
        PlatformTag::MacosxUniversal2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformTag::ManylinuxX86_64 => "manylinux_x86_64",
            PlatformTag::ManylinuxI686 => "manylinux_i686",
            PlatformTag::ManylinuxAarch64 => "manylinux_aarch64",
            PlatformTag::MusllinuxX86_64 => "musllinux_x86_64",
            PlatformTag::MusllinuxAarch64 => "musllinux_aarch64",
            PlatformTag::MacosxX86_64 => "macosx_x86_64",
            PlatformTag::MacosxArm64 => "macosx_arm64",
            PlatformTag::MacosxUniversal2 => "macosx_universal2",
        }
    }

    pub fn family(&self) -> OsFamily {
        match self {
            PlatformTag::ManylinuxX86_64
            | PlatformTag::ManylinuxI686
            | PlatformTag::ManylinuxAarch64
            | PlatformTag::MusllinuxX86_64
            | PlatformTag::MusllinuxAarch64 => OsFamily::Linux,
            PlatformTag::MacosxX86_64 | PlatformTag::MacosxArm64 | PlatformTag::MacosxUniversal2 => {
                OsFamily::Macos
            }
        }
    }

    /// Environment variable the compile tool reads the container image from.
    /// Only Linux builds run inside an image.
    pub fn image_variable(&self) -> Option<&'static str> {
        match self {
            PlatformTag::ManylinuxX86_64 => Some("CIBW_MANYLINUX_X86_64_IMAGE"),
            PlatformTag::ManylinuxI686 => Some("CIBW_MANYLINUX_I686_IMAGE"),
            PlatformTag::ManylinuxAarch64 => Some("CIBW_MANYLINUX_AARCH64_IMAGE"),
            PlatformTag::MusllinuxX86_64 => Some("CIBW_MUSLLINUX_X86_64_IMAGE"),
            PlatformTag::MusllinuxAarch64 => Some("CIBW_MUSLLINUX_AARCH64_IMAGE"),
            PlatformTag::MacosxX86_64 | PlatformTag::MacosxArm64 | PlatformTag::MacosxUniversal2 => {
                None
            }
        }
    }
}

impl FromStr for PlatformTag {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(ConfigError::EmptyField("platform_id"));
        }
        PlatformTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == raw)
            .ok_or_else(|| ConfigError::UnknownPlatform(raw.to_string()))
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System dependency installation, selected by OS family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "manager", rename_all = "snake_case")]
pub enum DependencyProcedure {
    Apt { packages: Vec<String> },
    Homebrew { packages: Vec<String> },
}

impl DependencyProcedure {
    pub fn for_family(family: OsFamily, config: &DependencyConfig) -> Self {
        match family {
            OsFamily::Linux => DependencyProcedure::Apt {
                packages: config.linux.clone(),
            },
            OsFamily::Macos => DependencyProcedure::Homebrew {
                packages: config.macos.clone(),
            },
        }
    }

    pub fn packages(&self) -> &[String] {
        match self {
            DependencyProcedure::Apt { packages } | DependencyProcedure::Homebrew { packages } => {
                packages
            }
        }
    }
}
