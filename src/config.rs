//! Personality configuration
//!
//! Defaults, optionally overridden by a JSON file, then by `HAL_*`
//! environment variables. The binary applies its command-line flags last.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HalError, HalResult};
use crate::reply::ReplySettings;

/// Order of a personality that has no brain yet and no configured order.
pub const DEFAULT_ORDER: usize = 2;

/// Personality configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Personality name, used as the stem of every file it owns
    pub name: String,
    /// Context depth of the model (1..=5). When set, a loaded brain of
    /// another order is relearned at this one; unset keeps the brain's order.
    pub order: Option<usize>,
    /// Directory holding the corpus and word tables
    pub resources_dir: PathBuf,
    /// Directory the brain and its text dumps are written to
    pub cache_dir: PathBuf,
    /// Reply search budget in milliseconds
    pub timeout_ms: u64,
    /// Longest reply in words, 0 for unlimited
    pub max_reply_words: usize,
    /// Prefer rare continuations when scoring replies
    pub favor_rare: bool,
    /// Node budget used by trimming
    pub max_nodes: usize,
    /// Learn from every line the user types
    pub learning: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "hal".to_string(),
            order: None,
            resources_dir: PathBuf::from("data"),
            cache_dir: PathBuf::from("brains"),
            timeout_ms: 1000,
            max_reply_words: 0,
            favor_rare: false,
            max_nodes: 100_000,
            learning: true,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Read a JSON config file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> HalResult<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|err| HalError::format(format!("{}: {}", path.display(), err)))
    }

    /// Apply `HAL_*` environment variables on top of `self`.
    pub fn from_env(self) -> Self {
        self.with_vars(|key| env::var(key).ok())
    }

    /// Apply overrides from any variable source. Unparsable values are
    /// ignored with a warning.
    pub fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        macro_rules! parsed {
            ($key:literal, $field:expr, $parse:expr) => {
                if let Some(raw) = var($key) {
                    match $parse(raw.trim()) {
                        Some(value) => $field = value,
                        None => tracing::warn!("ignoring {}={:?}", $key, raw),
                    }
                }
            };
        }

        if let Some(name) = var("HAL_NAME") {
            self.name = name;
        }
        if let Some(dir) = var("HAL_RESOURCES") {
            self.resources_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("HAL_CACHE") {
            self.cache_dir = PathBuf::from(dir);
        }
        parsed!("HAL_ORDER", self.order, |v: &str| v.parse().ok().map(Some));
        parsed!("HAL_TIMEOUT_MS", self.timeout_ms, |v: &str| v.parse().ok());
        parsed!("HAL_MAX_REPLY_WORDS", self.max_reply_words, |v: &str| v.parse().ok());
        parsed!("HAL_MAX_NODES", self.max_nodes, |v: &str| v.parse().ok());
        parsed!("HAL_FAVOR_RARE", self.favor_rare, parse_flag);
        parsed!("HAL_LEARNING", self.learning, parse_flag);
        self
    }

    /// Order a fresh model starts with.
    pub fn fresh_order(&self) -> usize {
        self.order.unwrap_or(DEFAULT_ORDER)
    }

    pub fn reply_settings(&self) -> ReplySettings {
        ReplySettings {
            timeout: Duration::from_millis(self.timeout_ms),
            max_reply_words: self.max_reply_words,
            favor_rare: self.favor_rare,
        }
    }

    fn resource(&self, ext: &str) -> PathBuf {
        self.resources_dir.join(format!("{}.{}", self.name, ext))
    }

    fn cached(&self, ext: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", self.name, ext))
    }

    pub fn brain_path(&self) -> PathBuf {
        self.cached("brn")
    }

    pub fn phrases_path(&self) -> PathBuf {
        self.cached("phr")
    }

    pub fn dictionary_path(&self) -> PathBuf {
        self.cached("dic")
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.resource("trn")
    }

    pub fn ban_path(&self) -> PathBuf {
        self.resource("ban")
    }

    pub fn aux_path(&self) -> PathBuf {
        self.resource("aux")
    }

    pub fn swap_path(&self) -> PathBuf {
        self.resource("swp")
    }
}
