//! Configuration for the `pk` application.
//!
//! Two layers: a per-repository file at `.pancake/config` (authoritative for
//! everything stack-related) and an optional global file at
//! `~/.config/pancake/config.toml` (editor/pager defaults). `PANCAKE_CONFIG`
//! overrides the global path; `GITHUB_TOKEN`/`GITLAB_TOKEN` override the
//! configured forge token.

use crate::{
    constants::{CONFIG_FILE_NAME, DEFAULT_MAX_DEPTH, PANCAKE_DIR},
    errors::{PkError, PkResult},
};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Per-repository configuration, serialized to `.pancake/config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkConfig {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub pr: PrConfig,
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default)]
    pub forge: ForgeConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// The trunk branch every stack is rooted at.
    pub main_branch: String,
    /// The git remote that PRs are opened against.
    pub remote: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrConfig {
    /// Submit PRs automatically after a successful restack.
    #[serde(default)]
    pub auto_submit: bool,
    /// Open PRs as drafts unless `--no-draft` is passed.
    #[serde(default)]
    pub draft_by_default: bool,
    /// Path to a PR body template, relative to the repository root.
    #[serde(default = "PrConfig::default_template")]
    pub template: String,
}

impl PrConfig {
    fn default_template() -> String {
        ".github/pull_request_template.md".to_string()
    }
}

impl Default for PrConfig {
    fn default() -> Self {
        Self {
            auto_submit: false,
            draft_by_default: false,
            template: Self::default_template(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Maximum number of branches above trunk.
    #[serde(default = "StackConfig::default_max_depth")]
    pub max_depth: usize,
    /// Branch name prefix eligible for adoption during `pk init`.
    #[serde(default)]
    pub prefix: String,
}

impl StackConfig {
    fn default_max_depth() -> usize {
        DEFAULT_MAX_DEPTH
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::default_max_depth(),
            prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// API token for the forge. Prefer `GITHUB_TOKEN` over storing this.
    #[serde(default)]
    pub api_token: String,
    /// Per-call timeout for forge requests, in seconds.
    #[serde(default = "ForgeConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ForgeConfig {
    fn default_timeout_secs() -> u64 {
        crate::constants::DEFAULT_FORGE_TIMEOUT_SECS
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl PkConfig {
    /// Builds a fresh config for `pk init`.
    pub fn new(main_branch: &str, remote: &str) -> Self {
        Self {
            repository: RepositoryConfig {
                main_branch: main_branch.to_string(),
                remote: remote.to_string(),
            },
            ..Default::default()
        }
    }

    /// Path of the repo config file under the given repository root.
    pub fn path(repo_root: &Path) -> PathBuf {
        repo_root.join(PANCAKE_DIR).join(CONFIG_FILE_NAME)
    }

    /// Loads the repo config, or [None] if `pk init` has not run yet.
    pub fn try_load(repo_root: &Path) -> PkResult<Option<Self>> {
        let path = Self::path(repo_root);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        Ok(Some(toml::from_str(&raw)?))
    }

    /// Loads the repo config, erroring if pancake is not initialized.
    pub fn load(repo_root: &Path) -> PkResult<Self> {
        Self::try_load(repo_root)?.ok_or(PkError::NotInitialized)
    }

    /// Persists the repo config.
    pub fn save(&self, repo_root: &Path) -> PkResult<()> {
        let path = Self::path(repo_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The forge token: environment wins over the config file.
    pub fn forge_token(&self) -> Option<String> {
        for var in ["GITHUB_TOKEN", "GITLAB_TOKEN"] {
            if let Ok(token) = env::var(var) {
                if !token.is_empty() {
                    return Some(token);
                }
            }
        }
        (!self.forge.api_token.is_empty()).then(|| self.forge.api_token.clone())
    }
}

/// Global defaults, serialized to `~/.config/pancake/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub editor: Option<String>,
    #[serde(default)]
    pub pager: Option<String>,
}

impl GlobalConfig {
    /// Path of the global config file, honoring `PANCAKE_CONFIG`.
    pub fn path() -> Option<PathBuf> {
        if let Ok(path) = env::var("PANCAKE_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("pancake").join("config.toml"))
    }

    /// Loads the global config; missing file yields defaults.
    pub fn load() -> PkResult<Self> {
        let Some(path) = Self::path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Whether colored output is suppressed via `PANCAKE_NO_COLOR`.
pub fn color_disabled() -> bool {
    env::var_os("PANCAKE_NO_COLOR").is_some()
}
