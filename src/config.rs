use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::MigrafixError;

/// Configuration file structure for migrafix.
///
/// Describes the toolchains available on this machine, the ordered
/// transformation stages, how tests are run and reported, and how the fix
/// oracle is reached. Configuration files are loaded from the current
/// directory or a specified path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Toolchain name to home directory, in declaration order
    #[serde(default = "default_toolchains")]
    pub toolchains: IndexMap<String, PathBuf>,

    /// Transformation stages, applied in list order
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub tests: TestsConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StageConfig {
    /// Human-readable stage identifier (e.g. "runtime-upgrade")
    pub name: String,

    /// Recipe passed to the transformation engine
    pub recipe: String,

    /// Name of the toolchain that must be active while the recipe runs
    pub toolchain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Transformation engine executable
    #[serde(default = "default_engine_program")]
    pub program: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestsConfig {
    /// Test toolchain executable
    #[serde(default = "default_tests_program")]
    pub program: String,

    /// Arguments passed to the test toolchain
    #[serde(default = "default_tests_args")]
    pub args: Vec<String>,

    /// Report directory, relative to the workspace
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    #[serde(default = "default_report_prefix")]
    pub report_prefix: String,

    #[serde(default = "default_report_suffix")]
    pub report_suffix: String,

    /// Root of the test sources, relative to the workspace
    #[serde(default = "default_test_sources")]
    pub test_sources: PathBuf,

    /// Root of the main sources, relative to the workspace
    #[serde(default = "default_main_sources")]
    pub main_sources: PathBuf,

    /// Source file extension, without the dot
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Suffixes stripped from a test unit name to find its subject
    #[serde(default = "default_subject_suffixes")]
    pub subject_suffixes: Vec<String>,

    /// Toolchain to activate for test runs; inherits the environment when unset
    pub toolchain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OracleConfig {
    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,

    #[serde(default = "default_oracle_model")]
    pub model: String,

    /// Oracle API key
    pub api_key: Option<String>,

    /// Oracle calls allowed per failing test
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between two oracle calls for the same test
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Words one of which must appear in a usable replacement
    #[serde(default = "default_structural_markers")]
    pub structural_markers: Vec<String>,

    /// Source language named in the prompt
    #[serde(default = "default_source_language")]
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitConfig {
    #[serde(default = "default_git_program")]
    pub program: String,

    /// Base name for the result branch; a timestamp is appended per run
    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    pub author_name: Option<String>,

    pub author_email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceConfig {
    /// Directory under which each run gets its own workspace
    pub root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            toolchains: default_toolchains(),
            stages: default_stages(),
            engine: EngineConfig::default(),
            tests: TestsConfig::default(),
            oracle: OracleConfig::default(),
            git: GitConfig::default(),
            workspace: WorkspaceConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_engine_program(),
        }
    }
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            program: default_tests_program(),
            args: default_tests_args(),
            report_dir: default_report_dir(),
            report_prefix: default_report_prefix(),
            report_suffix: default_report_suffix(),
            test_sources: default_test_sources(),
            main_sources: default_main_sources(),
            source_extension: default_source_extension(),
            subject_suffixes: default_subject_suffixes(),
            toolchain: None,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_oracle_base_url(),
            model: default_oracle_model(),
            api_key: None,
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            structural_markers: default_structural_markers(),
            language: default_source_language(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            branch: default_branch(),
            commit_message: default_commit_message(),
            author_name: None,
            author_email: None,
        }
    }
}

fn default_toolchains() -> IndexMap<String, PathBuf> {
    let mut toolchains = IndexMap::new();
    toolchains.insert("jdk-11".to_string(), PathBuf::from("/usr/lib/jvm/jdk-11"));
    toolchains.insert("jdk-17".to_string(), PathBuf::from("/usr/lib/jvm/jdk-17"));
    toolchains
}

fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig {
            name: "runtime-upgrade".to_string(),
            recipe: "UpgradeToJava21".to_string(),
            toolchain: "jdk-11".to_string(),
        },
        StageConfig {
            name: "framework-upgrade".to_string(),
            recipe: "UpgradeSpringBoot_3_5".to_string(),
            toolchain: "jdk-17".to_string(),
        },
    ]
}

fn default_engine_program() -> String {
    "mod".to_string()
}

fn default_tests_program() -> String {
    "mvn".to_string()
}

fn default_tests_args() -> Vec<String> {
    vec![
        "test".to_string(),
        "-Dmaven.test.failure.ignore=true".to_string(),
    ]
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("target").join("surefire-reports")
}

fn default_report_prefix() -> String {
    "TEST-".to_string()
}

fn default_report_suffix() -> String {
    ".xml".to_string()
}

fn default_test_sources() -> PathBuf {
    PathBuf::from("src").join("test").join("java")
}

fn default_main_sources() -> PathBuf {
    PathBuf::from("src").join("main").join("java")
}

fn default_source_extension() -> String {
    "java".to_string()
}

fn default_subject_suffixes() -> Vec<String> {
    vec!["Tests".to_string(), "Test".to_string()]
}

fn default_oracle_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_oracle_model() -> String {
    "gemini-1.5-pro-latest".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_structural_markers() -> Vec<String> {
    ["class", "interface", "enum", "record"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_source_language() -> String {
    "Java".to_string()
}

fn default_git_program() -> String {
    "git".to_string()
}

fn default_branch() -> String {
    "refactor/upgrade".to_string()
}

fn default_commit_message() -> String {
    "Upgrade project to Java 21 and Spring Boot 3.5".to_string()
}

impl OracleConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl WorkspaceConfig {
    /// Resolves the workspace root: configured value, else the platform
    /// cache directory, else the OS temp directory.
    pub fn resolved_root(&self) -> PathBuf {
        if let Some(root) = &self.root {
            return root.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("migrafix")
            .join("workspaces")
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./migrafix.toml
    /// 3. ./migrafix.json
    /// 4. ./migrafix.yaml
    /// 5. ./migrafix.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "migrafix.toml",
            "migrafix.json",
            "migrafix.yaml",
            "migrafix.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Checks the static invariants of the configuration.
    ///
    /// Everything checked here is a fatal configuration error; nothing is
    /// retried. Toolchain homes are checked later, right before each stage.
    pub fn validate(&self, repair_enabled: bool) -> crate::error::Result<()> {
        if self.stages.is_empty() {
            return Err(MigrafixError::Config(
                "at least one transformation stage is required".to_string(),
            ));
        }

        for (index, stage) in self.stages.iter().enumerate() {
            if self.stages[..index].iter().any(|s| s.name == stage.name) {
                return Err(MigrafixError::Config(format!(
                    "stage '{}' is declared more than once",
                    stage.name
                )));
            }
            if !self.toolchains.contains_key(&stage.toolchain) {
                return Err(MigrafixError::Config(format!(
                    "stage '{}' requires undeclared toolchain '{}'",
                    stage.name, stage.toolchain
                )));
            }
        }

        if let Some(toolchain) = &self.tests.toolchain {
            if !self.toolchains.contains_key(toolchain) {
                return Err(MigrafixError::Config(format!(
                    "tests require undeclared toolchain '{toolchain}'"
                )));
            }
        }

        if self.oracle.max_attempts == 0 {
            return Err(MigrafixError::Config(
                "oracle max-attempts must be at least 1".to_string(),
            ));
        }

        if repair_enabled
            && self
                .oracle
                .api_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            return Err(MigrafixError::Config(
                "an oracle API key is required (set GEMINI_API_KEY or [oracle] api-key)"
                    .to_string(),
            ));
        }

        Ok(())
    }
}
