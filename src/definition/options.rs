use crate::definition::Recipe;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The chip families the firmware library can be compiled for. The spelling
/// of each name is exactly what the toolchain expects in `-DCompile_Target=`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
pub enum TargetChip {
    #[serde(rename = "STM32F103")]
    Stm32F103,
    #[serde(rename = "STM32F407")]
    Stm32F407,
    #[serde(rename = "STM32F030")]
    Stm32F030,
    #[serde(rename = "STM32H743")]
    Stm32H743,
    #[serde(rename = "STM32L476")]
    Stm32L476,
    #[serde(rename = "STM32F303")]
    Stm32F303,
    #[serde(rename = "testing")]
    Testing,
}

impl TargetChip {
    pub const ALL: [TargetChip; 7] = [
        TargetChip::Stm32F103,
        TargetChip::Stm32F407,
        TargetChip::Stm32F030,
        TargetChip::Stm32H743,
        TargetChip::Stm32L476,
        TargetChip::Stm32F303,
        TargetChip::Testing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TargetChip::Stm32F103 => "STM32F103",
            TargetChip::Stm32F407 => "STM32F407",
            TargetChip::Stm32F030 => "STM32F030",
            TargetChip::Stm32H743 => "STM32H743",
            TargetChip::Stm32L476 => "STM32L476",
            TargetChip::Stm32F303 => "STM32F303",
            TargetChip::Testing => "testing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|chip| chip.name().eq_ignore_ascii_case(raw))
    }

    /// The host-tested variant runs on whatever machine the tests run on, so
    /// it is exempt from the ARM object-code check.
    pub fn is_hardware(&self) -> bool {
        !matches!(self, TargetChip::Testing)
    }
}

impl fmt::Display for TargetChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
pub enum LibraryType {
    Static,
    Shared,
}

impl LibraryType {
    pub fn name(&self) -> &'static str {
        match self {
            LibraryType::Static => "Static",
            LibraryType::Shared => "Shared",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        [LibraryType::Static, LibraryType::Shared]
            .into_iter()
            .find(|library| library.name().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
pub enum OptimizeLevel {
    Debug,
    ReleaseFast,
    ReleaseSafe,
    ReleaseSmall,
}

impl OptimizeLevel {
    pub const ALL: [OptimizeLevel; 4] = [
        OptimizeLevel::Debug,
        OptimizeLevel::ReleaseFast,
        OptimizeLevel::ReleaseSafe,
        OptimizeLevel::ReleaseSmall,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OptimizeLevel::Debug => "Debug",
            OptimizeLevel::ReleaseFast => "ReleaseFast",
            OptimizeLevel::ReleaseSafe => "ReleaseSafe",
            OptimizeLevel::ReleaseSmall => "ReleaseSmall",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for OptimizeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no target chip selected, pass --target with one of the recipe's supported chips")]
    MissingTarget,
    #[error("no optimization level selected, pass --optimize (Debug, ReleaseFast, ReleaseSafe or ReleaseSmall)")]
    MissingOptimize,
    #[error("recipe `{recipe}` does not support target {target}")]
    UnsupportedTarget { target: TargetChip, recipe: String },
    #[error("unknown target chip `{0}`")]
    UnknownTarget(String),
    #[error("unknown library type `{0}`, expected static or shared")]
    UnknownLibrary(String),
    #[error("unknown optimization level `{0}`")]
    UnknownOptimize(String),
}

/// What the caller asked for on the command line, before validation. Fields
/// stay optional here; only `validate` turns them into something buildable.
#[derive(Default, Debug, Copy, Clone)]
pub struct BuildOptions {
    pub target: Option<TargetChip>,
    pub library: Option<LibraryType>,
    pub optimize: Option<OptimizeLevel>,
}

impl BuildOptions {
    pub fn from_cli(
        target: Option<&str>,
        library: Option<&str>,
        optimize: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let target = target
            .map(|raw| {
                TargetChip::parse(raw).ok_or_else(|| ConfigError::UnknownTarget(raw.to_string()))
            })
            .transpose()?;
        let library = library
            .map(|raw| {
                LibraryType::parse(raw).ok_or_else(|| ConfigError::UnknownLibrary(raw.to_string()))
            })
            .transpose()?;
        let optimize = optimize
            .map(|raw| {
                OptimizeLevel::parse(raw)
                    .ok_or_else(|| ConfigError::UnknownOptimize(raw.to_string()))
            })
            .transpose()?;

        Ok(BuildOptions {
            target,
            library,
            optimize,
        })
    }

    /// Checks the selection against the recipe and fills the defaults in.
    /// Touches nothing on disk, so a failure here leaves no build tree
    /// behind.
    pub fn validate(&self, recipe: &Recipe) -> Result<BuildConfig, ConfigError> {
        let target = self.target.ok_or(ConfigError::MissingTarget)?;
        let optimize = self.optimize.ok_or(ConfigError::MissingOptimize)?;

        if !recipe.supports(target) {
            return Err(ConfigError::UnsupportedTarget {
                target,
                recipe: recipe.name.clone(),
            });
        }

        Ok(BuildConfig {
            target,
            library: self.library.unwrap_or(recipe.default_library),
            optimize,
        })
    }
}

/// A fully validated selection. Every field is set, the struct is `Copy`, and
/// it travels through the pipeline as a plain parameter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
pub struct BuildConfig {
    pub target: TargetChip,
    pub library: LibraryType,
    pub optimize: OptimizeLevel,
}

impl BuildConfig {
    /// Path component scoping build trees and package dirs, one per
    /// configuration.
    pub fn slug(&self) -> String {
        format!("{}-{}-{}", self.target, self.library, self.optimize).to_lowercase()
    }

    /// The toolchain argv after the program name. Flag order is part of the
    /// toolchain's interface and never varies.
    pub fn toolchain_args(&self) -> [String; 4] {
        [
            "build".to_string(),
            format!("-Doptimize={}", self.optimize),
            format!("-DLibrary_Type={}", self.library),
            format!("-DCompile_Target={}", self.target),
        ]
    }

    pub fn command_line(&self, toolchain: &str) -> String {
        format!("{} {}", toolchain, self.toolchain_args().join(" "))
    }
}

impl fmt::Display for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.target, self.library, self.optimize)
    }
}
