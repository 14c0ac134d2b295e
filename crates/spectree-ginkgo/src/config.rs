//! `spectree.toml` config loading.

use crate::error::{Result, RunnerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// File name looked up in the workspace root.
pub const CONFIG_FILE_NAME: &str = "spectree.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Ginkgo executable, resolved through `PATH` when not absolute.
    #[serde(default = "default_ginkgo_path")]
    pub ginkgo_path: String,

    /// Merged over the inherited environment for every invocation.
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,

    /// Passed as `--tags=a,b` when non-empty.
    #[serde(default)]
    pub build_tags: Vec<String>,

    /// Quiet period before a file change triggers rediscovery.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Only files whose name ends with this suffix trigger rediscovery and
    /// get code lenses.
    #[serde(default = "default_watch_suffix")]
    pub watch_glob_suffix: String,
}

fn default_ginkgo_path() -> String {
    "ginkgo".to_string()
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_watch_suffix() -> String {
    "_test.go".to_string()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ginkgo_path: default_ginkgo_path(),
            environment_variables: BTreeMap::new(),
            build_tags: Vec::new(),
            debounce_ms: default_debounce_ms(),
            watch_glob_suffix: default_watch_suffix(),
        }
    }
}

impl RunnerConfig {
    /// Strict load: a missing, unreadable or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|source| RunnerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Missing file means defaults; anything else wrong is logged and also
    /// falls back to defaults.
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<RunnerConfig>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// [`load_optional`](Self::load_optional) on `<root>/spectree.toml`.
    pub fn for_workspace(root: &Path) -> Self {
        Self::load_optional(&root.join(CONFIG_FILE_NAME))
    }

    pub fn with_ginkgo_path(mut self, path: impl Into<String>) -> Self {
        self.ginkgo_path = path.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_variables.insert(key.into(), value.into());
        self
    }

    pub fn with_build_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// The `--tags=...` argument, if any tags are configured.
    pub fn tags_arg(&self) -> Option<String> {
        let tags: Vec<&str> = self
            .build_tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        (!tags.is_empty()).then(|| format!("--tags={}", tags.join(",")))
    }

    /// Whether a change to `path` should trigger rediscovery.
    pub fn watches(&self, path: &Path) -> bool {
        path.file_name()
            .map(|n| n.to_string_lossy().ends_with(&self.watch_glob_suffix))
            .unwrap_or(false)
    }
}
