//! Project configuration, read from `.repograph/config.toml`.
//!
//! Every section is optional. A missing file gives the defaults; a file that
//! fails to parse is reported and also falls back to the defaults, so a bad
//! config never blocks indexing.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{RepoGraphError, Result};
use crate::parser::denylist::{ModuleDenylist, DEFAULT_NOISE_SYMBOLS};
use crate::parser::SupportedLanguage;

/// Directory (relative to the indexed root) holding the index and config.
pub const REPOGRAPH_DIR: &str = ".repograph";
/// Config file name inside [`REPOGRAPH_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Directories never descended into during discovery.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "out",
    "target",
    "coverage",
    "vendor",
    "__pycache__",
    "site-packages",
    "venv",
    ".venv",
    "env",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".next",
    ".nuxt",
    ".git",
    REPOGRAPH_DIR,
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepoGraphConfig {
    pub build: BuildConfig,
    pub filter: FilterConfig,
    pub index: IndexConfig,
    pub egograph: EgographDefaults,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Extra directory names to skip, on top of [`DEFAULT_EXCLUDE_DIRS`].
    pub exclude_dirs: Vec<String>,
    /// Restrict indexing to these languages (`typescript`, `javascript`, `python`).
    pub languages: Option<Vec<String>>,
    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: Vec::new(),
            languages: None,
            max_file_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub extra_denylist: Vec<String>,
    pub allow_modules: Vec<String>,
    /// Replaces the default noise list when present.
    pub noise_symbols: Option<Vec<String>>,
    /// Relative path prefixes whose nodes are dropped.
    pub exclude_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub max_age_hours: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { max_age_hours: 24 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EgographDefaults {
    pub k: usize,
    pub max_nodes: usize,
    pub max_edges: usize,
}

impl Default for EgographDefaults {
    fn default() -> Self {
        Self {
            k: 2,
            max_nodes: 100,
            max_edges: 200,
        }
    }
}

impl RepoGraphConfig {
    /// Load config from a path, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        match Self::try_load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Load `<root>/.repograph/config.toml`.
    pub fn load_for_root(root: &Path) -> Self {
        Self::load(&Self::config_path(root))
    }

    pub fn try_load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RepoGraphError::Config(e.to_string()))
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(REPOGRAPH_DIR).join(CONFIG_FILE)
    }

    /// Built-in excluded directories plus the configured ones.
    pub fn exclude_dirs(&self) -> Vec<String> {
        DEFAULT_EXCLUDE_DIRS
            .iter()
            .map(|d| d.to_string())
            .chain(self.build.exclude_dirs.iter().cloned())
            .collect()
    }

    /// Languages to index. Unknown names in the config are ignored.
    pub fn languages(&self) -> Option<Vec<SupportedLanguage>> {
        self.build.languages.as_ref().map(|names| {
            names
                .iter()
                .filter_map(|name| {
                    let lang = SupportedLanguage::from_name(name);
                    if lang.is_none() {
                        warn!(language = %name, "unknown language in config, ignoring");
                    }
                    lang
                })
                .collect()
        })
    }

    pub fn denylist(&self) -> ModuleDenylist {
        ModuleDenylist::with_defaults()
            .extend(self.filter.extra_denylist.iter().cloned())
            .allow(self.filter.allow_modules.iter().map(String::as_str))
    }

    pub fn noise_symbols(&self) -> Vec<String> {
        match &self.filter.noise_symbols {
            Some(symbols) => symbols.clone(),
            None => DEFAULT_NOISE_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn max_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.index.max_age_hours * 3600)
    }
}
