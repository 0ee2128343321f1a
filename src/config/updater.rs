//! The updater configuration file.
//!
//! Every section and field is optional; missing values fall back to the
//! defaults in [`crate::constants`]. The preservation catalog in particular is
//! plain data here so that it can be audited and overridden without touching
//! the swap logic.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{
    CRATES_IO_URL, DEFAULT_MARKER_LINES, DEFAULT_MAX_RETRIES, DEFAULT_PATCH_SUFFIX,
    DEFAULT_PATCHES_DIR, DEFAULT_POST_UPDATE_HOOK, DEFAULT_UPDATE_BRANCH, GITHUB_API_URL,
    MAX_BACKOFF_DELAY_MS, NETWORK_TIMEOUT, PACKAGE_TIMEOUT, PROCESS_TIMEOUT,
    STARTING_BACKOFF_DELAY_MS, default_parallelism,
};
use crate::core::UpdaterError;
use crate::utils::resolve_path;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "VENDUP_CONFIG";

/// Files and directories carried from the old tree into the new one.
///
/// Matched as glob patterns against the top-level entries of the package.
pub const DEFAULT_PRESERVED_PATTERNS: &[&str] = &[
    // build descriptors
    "*Android.bp",
    "Android.mk",
    "CleanSpec.mk",
    "rules.mk",
    "TEST_MAPPING",
    // license and notice files
    "LICENSE",
    "NOTICE",
    "MODULE_LICENSE_*",
    // metadata record
    "METADATA",
    "METADATA.toml",
    // version control
    ".git",
    ".gitignore",
    // local customizations
    "patches",
    "post_update.sh",
    "OWNERS",
    "README.android",
    // regeneration inputs
    "cargo2android*",
    "cargo2rulesmk*",
    "cargo_embargo*",
];

/// Complete updater configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Which local files survive an update.
    pub preservation: PreservationConfig,
    /// Where local patches live.
    pub patches: PatchConfig,
    /// Post-update hook settings.
    pub hooks: HookConfig,
    /// Upstream query settings.
    pub network: NetworkConfig,
    /// External process time budgets.
    pub process: ProcessConfig,
    /// Batch concurrency.
    pub batch: BatchConfig,
    /// Descriptor regeneration rules, tried in order.
    pub regenerators: Vec<RegeneratorConfig>,
    /// Staging, build and upload collaborators.
    pub downstream: DownstreamConfig,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            preservation: PreservationConfig::default(),
            patches: PatchConfig::default(),
            hooks: HookConfig::default(),
            network: NetworkConfig::default(),
            process: ProcessConfig::default(),
            batch: BatchConfig::default(),
            regenerators: default_regenerators(),
            downstream: DownstreamConfig::default(),
        }
    }
}

/// Preservation catalog.
///
/// ```toml
/// [preservation]
/// extra = ["BUILD.gn"]          # appended to the default catalog
/// # patterns = ["LICENSE"]      # replaces the default catalog entirely
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PreservationConfig {
    /// Replacement for the default catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,
    /// Patterns appended to the catalog.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PatchConfig {
    /// Directory relative to the package root.
    pub dir: String,
    /// Only files with this suffix are applied.
    pub suffix: String,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            dir: DEFAULT_PATCHES_DIR.to_string(),
            suffix: DEFAULT_PATCH_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HookConfig {
    /// Hook file name relative to the package root.
    pub post_update: String,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            post_update: DEFAULT_POST_UPDATE_HOOK.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first failed attempt.
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub github_api_url: String,
    pub crates_api_url: String,
    /// Name of the environment variable holding a GitHub token.
    pub github_token_env: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: NETWORK_TIMEOUT.as_secs(),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: STARTING_BACKOFF_DELAY_MS,
            max_backoff_ms: MAX_BACKOFF_DELAY_MS,
            github_api_url: GITHUB_API_URL.to_string(),
            crates_api_url: CRATES_IO_URL.to_string(),
            github_token_env: "GITHUB_TOKEN".to_string(),
        }
    }
}

impl NetworkConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// GitHub token from the configured environment variable, if set.
    #[must_use]
    pub fn github_token(&self) -> Option<String> {
        std::env::var(&self.github_token_env).ok().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessConfig {
    /// Budget for one external process.
    pub timeout_secs: u64,
    /// Budget for every pre-swap step of one package together.
    pub package_timeout_secs: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: PROCESS_TIMEOUT.as_secs(),
            package_timeout_secs: PACKAGE_TIMEOUT.as_secs(),
        }
    }
}

impl ProcessConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub const fn package_timeout(&self) -> Duration {
        Duration::from_secs(self.package_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BatchConfig {
    /// Upper bound on concurrently processed packages. Unset means
    /// [`default_parallelism`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
}

impl BatchConfig {
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        self.max_parallel.filter(|n| *n > 0).unwrap_or_else(default_parallelism)
    }
}

/// A descriptor-regeneration rule.
///
/// The rule fires when `descriptor` exists in the old tree and one of its first
/// `marker_lines` lines contains `marker`. `command` is then run through `sh -c`
/// in the new tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegeneratorConfig {
    pub descriptor: String,
    pub marker: String,
    pub command: String,
    #[serde(default = "default_marker_lines")]
    pub marker_lines: usize,
}

const fn default_marker_lines() -> usize {
    DEFAULT_MARKER_LINES
}

fn default_regenerators() -> Vec<RegeneratorConfig> {
    vec![
        RegeneratorConfig {
            descriptor: "Android.bp".to_string(),
            marker: "cargo_embargo".to_string(),
            command: "cargo_embargo generate cargo_embargo.json".to_string(),
            marker_lines: DEFAULT_MARKER_LINES,
        },
        RegeneratorConfig {
            descriptor: "Android.bp".to_string(),
            marker: "cargo2android".to_string(),
            command: "cargo2android.py --config cargo2android.json".to_string(),
            marker_lines: DEFAULT_MARKER_LINES,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Branch started before committing an update.
    pub branch: String,
    /// Run with `sh -c` in the package directory after the swap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,
    /// Run with `sh -c` in the package directory after committing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_command: Option<String>,
    /// Remote the update branch is based on.
    pub remote: String,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            branch: DEFAULT_UPDATE_BRANCH.to_string(),
            build_command: None,
            upload_command: None,
            remote: "origin".to_string(),
        }
    }
}

impl UpdaterConfig {
    /// Loads the configuration, honoring an explicit path first.
    ///
    /// Lookup order: `path`, then `$VENDUP_CONFIG`, then
    /// [`UpdaterConfig::default_path`]. A missing implicit file yields the
    /// defaults; a missing explicit file is an error.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path).await;
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR)
            && !env_path.is_empty()
        {
            return Self::load_from(&resolve_path(&env_path)?).await;
        }

        match Self::default_path() {
            Ok(path) if path.exists() => Self::load_from(&path).await,
            _ => Ok(Self::default()),
        }
    }

    /// Loads and validates the configuration at `path`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read vendup config from {}", path.display()))?;

        let config: Self = toml::from_str(&content).map_err(|e| UpdaterError::ConfigError {
            message: format!("{}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty TOML, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize vendup config")?;
        crate::utils::fs::atomic_write(path, content.as_bytes())
            .with_context(|| format!("Failed to write vendup config to {}", path.display()))
    }

    /// `~/.vendup/config.toml`, or `%LOCALAPPDATA%\vendup\config.toml` on Windows.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("vendup")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".vendup")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Rejects values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), UpdaterError> {
        let invalid = |message: &str| UpdaterError::ConfigError {
            message: message.to_string(),
        };

        if self.patches.dir.is_empty() || Path::new(&self.patches.dir).is_absolute() {
            return Err(invalid("[patches] dir must be a relative path"));
        }
        if self.hooks.post_update.is_empty() || Path::new(&self.hooks.post_update).is_absolute() {
            return Err(invalid("[hooks] post_update must be a relative path"));
        }
        if self.network.initial_backoff_ms > self.network.max_backoff_ms {
            return Err(invalid("[network] initial_backoff_ms exceeds max_backoff_ms"));
        }
        if self.process.timeout_secs == 0 || self.process.package_timeout_secs == 0 {
            return Err(invalid("[process] timeouts must be positive"));
        }
        for pattern in self.preserved_patterns() {
            glob::Pattern::new(&pattern)
                .map_err(|e| invalid(&format!("invalid preservation pattern '{pattern}': {e}")))?;
        }
        for regen in &self.regenerators {
            if regen.descriptor.is_empty() || regen.marker.is_empty() || regen.command.is_empty() {
                return Err(invalid("[[regenerators]] entries need descriptor, marker and command"));
            }
        }
        Ok(())
    }

    /// The effective preservation catalog.
    ///
    /// Always contains the configured patch directory and hook so that they
    /// survive into the new tree, whatever the catalog says.
    #[must_use]
    pub fn preserved_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = match &self.preservation.patterns {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_PRESERVED_PATTERNS.iter().map(|p| (*p).to_string()).collect(),
        };
        patterns.extend(self.preservation.extra.iter().cloned());

        for required in [&self.patches.dir, &self.hooks.post_update] {
            // Only the top-level component matters for matching
            let top = required.split(['/', '\\']).next().unwrap_or(required).to_string();
            if !patterns.contains(&top) {
                patterns.push(top);
            }
        }
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_constants() {
        let config = UpdaterConfig::default();
        assert_eq!(config.patches.dir, "patches");
        assert_eq!(config.patches.suffix, ".diff");
        assert_eq!(config.hooks.post_update, "post_update.sh");
        assert_eq!(config.network.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_default_regenerators() {
        let config: UpdaterConfig = toml::from_str("").unwrap();
        assert_eq!(config.regenerators.len(), 2);
        assert_eq!(config.regenerators[0].descriptor, "Android.bp");
    }

    #[test]
    fn test_default_catalog_covers_local_customizations() {
        let patterns = UpdaterConfig::default().preserved_patterns();
        for expected in ["LICENSE", "METADATA.toml", "patches", "post_update.sh", "OWNERS", ".gitignore"]
        {
            assert!(patterns.iter().any(|p| p == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_patterns_replace_and_extra_append() {
        let config: UpdaterConfig = toml::from_str(
            r#"
            [preservation]
            patterns = ["LICENSE"]
            extra = ["BUILD.gn"]

            [patches]
            dir = "local/patches"
            "#,
        )
        .unwrap();

        let patterns = config.preserved_patterns();
        assert_eq!(patterns, vec!["LICENSE", "BUILD.gn", "local", "post_update.sh"]);
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let config: UpdaterConfig = toml::from_str(
            r#"
            [preservation]
            extra = ["[unterminated"]
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(UpdaterError::ConfigError { .. })));
    }

    #[test]
    fn test_validate_rejects_absolute_patch_dir() {
        let mut config = UpdaterConfig::default();
        config.patches.dir = "/etc/patches".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_parallelism_override() {
        let mut batch = BatchConfig::default();
        assert!(batch.effective_parallelism() >= crate::constants::MIN_PARALLELISM);
        batch.max_parallel = Some(2);
        assert_eq!(batch.effective_parallelism(), 2);
        batch.max_parallel = Some(0);
        assert!(batch.effective_parallelism() >= crate::constants::MIN_PARALLELISM);
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = UpdaterConfig::default();
        config.batch.max_parallel = Some(3);
        config.downstream.build_command = Some("make".to_string());
        config.save_to(&path).await.unwrap();

        let loaded = UpdaterConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_load_honors_env_var() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("env-config.toml");
        std::fs::write(&path, "[batch]\nmax_parallel = 7\n").unwrap();

        // SAFETY: serialized with every other test touching the environment
        unsafe {
            std::env::set_var(CONFIG_ENV_VAR, &path);
        }
        let loaded = UpdaterConfig::load(None).await;
        unsafe {
            std::env::remove_var(CONFIG_ENV_VAR);
        }

        assert_eq!(loaded.unwrap().batch.max_parallel, Some(7));
    }

    #[tokio::test]
    async fn test_load_explicit_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let result = UpdaterConfig::load(Some(&temp.path().join("absent.toml"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_from_invalid_toml_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[network\n").unwrap();

        let err = UpdaterConfig::load_from(&path).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpdaterError>(),
            Some(UpdaterError::ConfigError { .. })
        ));
    }
}
