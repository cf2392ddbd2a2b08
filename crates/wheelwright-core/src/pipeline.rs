//! Pipeline definition types.
//!
//! These types represent the user-authored `wheelwright.yaml` configuration.
//! Matrix entries keep their axis values as plain strings; they are validated
//! one by one during expansion so that a single bad entry fails only its own
//! job.

use crate::manifest::SourceManifest;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineDefinition {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub package: PackageConfig,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub wheels: WheelsConfig,
    #[serde(default)]
    pub sdist: SdistConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub release: ReleaseConfig,
    #[serde(default)]
    pub regression: Option<RegressionConfig>,
}

impl PipelineDefinition {
    pub fn from_yaml(content: &str) -> crate::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PackageConfig {
    pub name: String,
    #[serde(default = "default_extras")]
    pub extras: Vec<String>,
}

fn default_extras() -> Vec<String> {
    vec!["full".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    PullRequest,
    Push,
    Schedule,
    Release,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::PullRequest => "pull_request",
            TriggerType::Push => "push",
            TriggerType::Schedule => "schedule",
            TriggerType::Release => "release",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary artifact matrix: an explicit list of allowed tuples.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WheelsConfig {
    #[serde(default)]
    pub include: Vec<MatrixEntry>,
    #[serde(default)]
    pub max_parallel: Option<u32>,
    #[serde(default = "default_wheel_dir")]
    pub output_dir: String,
    #[serde(default = "default_wheel_prefix")]
    pub artifact_prefix: String,
    #[serde(default = "default_wheel_glob")]
    pub artifact_glob: String,
    #[serde(default)]
    pub build: CompileSettings,
    #[serde(default)]
    pub dependencies: DependencyConfig,
}

impl Default for WheelsConfig {
    fn default() -> Self {
        Self {
            include: vec![],
            max_parallel: None,
            output_dir: default_wheel_dir(),
            artifact_prefix: default_wheel_prefix(),
            artifact_glob: default_wheel_glob(),
            build: CompileSettings::default(),
            dependencies: DependencyConfig::default(),
        }
    }
}

fn default_wheel_dir() -> String {
    "wheelhouse".to_string()
}

fn default_wheel_prefix() -> String {
    "cibw-wheels".to_string()
}

fn default_wheel_glob() -> String {
    "*.whl".to_string()
}

/// One declared matrix tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct MatrixEntry {
    pub os: String,
    pub python: String,
    pub platform_id: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Parameters handed to the external compile tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompileSettings {
    #[serde(default = "default_compile_program")]
    pub program: String,
    #[serde(default = "default_archs")]
    pub archs: String,
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,
    #[serde(default)]
    pub image: Option<String>,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            program: default_compile_program(),
            archs: default_archs(),
            verbosity: default_verbosity(),
            image: None,
        }
    }
}

fn default_compile_program() -> String {
    "cibuildwheel".to_string()
}

fn default_archs() -> String {
    "all".to_string()
}

fn default_verbosity() -> u8 {
    1
}

/// System packages installed before the build, per OS family.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DependencyConfig {
    #[serde(default)]
    pub linux: Vec<String>,
    #[serde(default)]
    pub macos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SdistConfig {
    #[serde(default = "default_sdist_command")]
    pub command: Vec<String>,
    #[serde(default = "default_sdist_dir")]
    pub output_dir: String,
    #[serde(default = "default_sdist_key")]
    pub artifact_key: String,
    #[serde(default = "default_sdist_glob")]
    pub artifact_glob: String,
    #[serde(default)]
    pub manifest: SourceManifest,
}

impl Default for SdistConfig {
    fn default() -> Self {
        Self {
            command: default_sdist_command(),
            output_dir: default_sdist_dir(),
            artifact_key: default_sdist_key(),
            artifact_glob: default_sdist_glob(),
            manifest: SourceManifest::default(),
        }
    }
}

fn default_sdist_command() -> Vec<String> {
    ["pipx", "run", "build", "--sdist"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sdist_dir() -> String {
    "dist".to_string()
}

fn default_sdist_key() -> String {
    "cibw-sdist".to_string()
}

fn default_sdist_glob() -> String {
    "*.tar.gz".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VerifyConfig {
    #[serde(default = "default_test_paths")]
    pub test_paths: Vec<String>,
    #[serde(default = "default_slowest")]
    pub slowest: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            test_paths: default_test_paths(),
            slowest: default_slowest(),
        }
    }
}

fn default_test_paths() -> Vec<String> {
    vec!["tests".to_string()]
}

fn default_slowest() -> u32 {
    10
}

/// Release stage. Disabled unless an operator turns it on.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReleaseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_needs")]
    pub needs: Vec<String>,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_release_pattern")]
    pub artifact_pattern: String,
    #[serde(default = "default_true")]
    pub merge_multiple: bool,
    #[serde(default = "default_sdist_dir")]
    pub download_dir: String,
    #[serde(default = "default_true")]
    pub skip_existing: bool,
    #[serde(default)]
    pub index: IndexConfig,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            needs: default_needs(),
            environment: default_environment(),
            artifact_pattern: default_release_pattern(),
            merge_multiple: true,
            download_dir: default_sdist_dir(),
            skip_existing: true,
            index: IndexConfig::default(),
        }
    }
}

fn default_needs() -> Vec<String> {
    vec!["build_wheels".to_string(), "build_sdist".to_string()]
}

fn default_environment() -> String {
    "pypi".to_string()
}

fn default_release_pattern() -> String {
    "cibw-*".to_string()
}

/// Destination package index identity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    #[serde(default = "default_mint_url")]
    pub mint_token_url: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    /// Simple-API URL installs resolve against. pip's own default when unset.
    #[serde(default)]
    pub install_url: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            upload_url: default_upload_url(),
            mint_token_url: default_mint_url(),
            audience: default_audience(),
            install_url: None,
        }
    }
}

fn default_index_name() -> String {
    "pypi".to_string()
}

fn default_upload_url() -> String {
    "https://upload.pypi.org/legacy/".to_string()
}

fn default_mint_url() -> String {
    "https://pypi.org/_/oidc/mint-token".to_string()
}

fn default_audience() -> String {
    "pypi".to_string()
}

/// Time-triggered check of the already-published package.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RegressionConfig {
    #[serde(default = "default_monthly")]
    pub cron: String,
    #[serde(default)]
    pub include: Vec<RegressionEntry>,
    #[serde(default = "default_true")]
    pub pre: bool,
}

fn default_monthly() -> String {
    "0 0 1 * *".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RegressionEntry {
    pub os: String,
    pub python: String,
}

fn default_true() -> bool {
    true
}
