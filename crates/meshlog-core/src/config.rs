//! Run configuration.
//!
//! Values resolve in three layers: built-in defaults, then the optional
//! `meshlog.toml` in the database directory, then environment overrides.
//! The resolved structs are passed explicitly to the pipeline; nothing here
//! is global.

use chrono::Duration;
use serde::Deserialize;
use std::path::Path;

use crate::error::ErrorCode;

/// Name of the optional configuration file inside the database directory.
pub const CONFIG_FILE: &str = "meshlog.toml";

pub const DEFAULT_MAX_LOG_ENTRIES: usize = 10_000;
pub const DEFAULT_MAX_FEED_ENTRIES: usize = 100;
pub const DEFAULT_MAP_NODE_URL: &str = "http://vogtland.freifunk.net/map/#!v:m;n:";
pub const DEFAULT_OFFLINE_THRESHOLD_MINUTES: u32 = 0;
pub const DEFAULT_NEW_NODE_WINDOW_DAYS: u32 = 14;
pub const DEFAULT_GRAVEYARD_HORIZON_DAYS: u32 = 14;

/// Configuration errors. All are fatal and raised before any file is written.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {key}: expected a non-negative integer")]
    InvalidValue { key: String, value: String },
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } | Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::InvalidValue { .. } => ErrorCode::InvalidConfigValue,
        }
    }
}

/// Metadata of the generated Atom feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMeta {
    pub title: String,
    pub id: String,
    pub author: String,
}

impl Default for FeedMeta {
    fn default() -> Self {
        Self {
            title: "Freifunk Vogtland Node Events".to_string(),
            id: "urn:uuid:e4aebb54-5a38-11e6-ad9d-507b9dce2683".to_string(),
            author: "nodes2eventlog".to_string(),
        }
    }
}

/// Configuration of one `nodes2eventlog` cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Event log retention cap; oldest events are evicted first.
    pub max_log_entries: usize,
    /// Number of most recent events exposed in the feed.
    pub max_feed_entries: usize,
    /// Prefix for node deep links. Empty disables links.
    pub map_node_url: String,
    /// Grace period before an offline report is accepted.
    pub offline_threshold: Duration,
    /// Unknown nodes first seen within this window count as new.
    pub new_node_window: Duration,
    pub feed: FeedMeta,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            max_feed_entries: DEFAULT_MAX_FEED_ENTRIES,
            map_node_url: DEFAULT_MAP_NODE_URL.to_string(),
            offline_threshold: Duration::minutes(i64::from(DEFAULT_OFFLINE_THRESHOLD_MINUTES)),
            new_node_window: Duration::days(i64::from(DEFAULT_NEW_NODE_WINDOW_DAYS)),
            feed: FeedMeta::default(),
        }
    }
}

impl RunConfig {
    /// Resolve defaults, `<db_dir>/meshlog.toml`, then the process environment.
    pub fn load(db_dir: &Path) -> Result<Self, ConfigError> {
        let file = load_file_config(db_dir)?;
        let mut cfg = Self::default();
        cfg.apply_file(&file);
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    fn apply_file(&mut self, file: &FileConfig) {
        if let Some(v) = file.max_log_entries {
            self.max_log_entries = v;
        }
        if let Some(v) = file.max_feed_entries {
            self.max_feed_entries = v;
        }
        if let Some(v) = &file.map_node_url {
            self.map_node_url.clone_from(v);
        }
        if let Some(v) = file.offline_threshold_minutes {
            self.offline_threshold = Duration::minutes(i64::from(v));
        }
        if let Some(v) = file.new_node_window_days {
            self.new_node_window = Duration::days(i64::from(v));
        }
        if let Some(title) = &file.feed.title {
            self.feed.title.clone_from(title);
        }
        if let Some(id) = &file.feed.id {
            self.feed.id.clone_from(id);
        }
        if let Some(author) = &file.feed.author {
            self.feed.author.clone_from(author);
        }
    }

    /// Apply environment overrides through `lookup` so tests need not touch
    /// the process environment.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("MAX_LOG_ENTRIES") {
            self.max_log_entries = parse_non_negative("MAX_LOG_ENTRIES", &raw)?;
        }
        if let Some(raw) = lookup("MAX_FEED_ENTRIES") {
            self.max_feed_entries = parse_non_negative("MAX_FEED_ENTRIES", &raw)?;
        }
        if let Some(raw) = lookup("MAP_NODE_URL") {
            self.map_node_url = raw;
        }
        if let Some(raw) = lookup("OFFLINE_THRESHOLD") {
            let minutes: u32 = parse_non_negative("OFFLINE_THRESHOLD", &raw)?;
            self.offline_threshold = Duration::minutes(i64::from(minutes));
        }
        if let Some(raw) = lookup("FEED_TITLE") {
            self.feed.title = raw;
        }
        if let Some(raw) = lookup("FEED_ID") {
            self.feed.id = raw;
        }
        Ok(())
    }
}

/// Configuration of one `graveyard2rst` cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraveyardConfig {
    /// Only nodes last seen within this window before now are reported.
    pub horizon: Duration,
    pub title: String,
}

impl Default for GraveyardConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::days(i64::from(DEFAULT_GRAVEYARD_HORIZON_DAYS)),
            title: "Graveyard".to_string(),
        }
    }
}

impl GraveyardConfig {
    pub fn load(db_dir: &Path) -> Result<Self, ConfigError> {
        let file = load_file_config(db_dir)?;
        let mut cfg = Self::default();
        if let Some(days) = file.graveyard.horizon_days {
            cfg.horizon = Duration::days(i64::from(days));
        }
        if let Some(title) = file.graveyard.title {
            cfg.title = title;
        }
        Ok(cfg)
    }
}

/// On-disk shape of `meshlog.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    max_log_entries: Option<usize>,
    max_feed_entries: Option<usize>,
    map_node_url: Option<String>,
    offline_threshold_minutes: Option<u32>,
    new_node_window_days: Option<u32>,
    #[serde(default)]
    feed: FileFeedConfig,
    #[serde(default)]
    graveyard: FileGraveyardConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileFeedConfig {
    title: Option<String>,
    id: Option<String>,
    author: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileGraveyardConfig {
    horizon_days: Option<u32>,
    title: Option<String>,
}

fn load_file_config(db_dir: &Path) -> Result<FileConfig, ConfigError> {
    let path = db_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(FileConfig::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str::<FileConfig>(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn parse_non_negative<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.max_log_entries, 10_000);
        assert_eq!(cfg.max_feed_entries, 100);
        assert_eq!(cfg.offline_threshold, Duration::zero());
        assert_eq!(cfg.new_node_window, Duration::days(14));
        assert!(cfg.map_node_url.starts_with("http://"));

        let grave = GraveyardConfig::default();
        assert_eq!(grave.horizon, Duration::days(14));
        assert_eq!(grave.title, "Graveyard");
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = load_file_config(dir.path()).expect("load should succeed");
        let mut cfg = RunConfig::default();
        cfg.apply_file(&file);
        assert_eq!(cfg, RunConfig::default());
    }

    #[test]
    fn env_overrides_every_documented_key() {
        let mut cfg = RunConfig::default();
        cfg.apply_env(env(&[
            ("MAX_LOG_ENTRIES", "3"),
            ("MAX_FEED_ENTRIES", "2"),
            ("MAP_NODE_URL", "https://map.example/#!n:"),
            ("OFFLINE_THRESHOLD", "30"),
            ("FEED_TITLE", "Mesh Events"),
        ]))
        .expect("overrides should parse");

        assert_eq!(cfg.max_log_entries, 3);
        assert_eq!(cfg.max_feed_entries, 2);
        assert_eq!(cfg.map_node_url, "https://map.example/#!n:");
        assert_eq!(cfg.offline_threshold, Duration::minutes(30));
        assert_eq!(cfg.feed.title, "Mesh Events");
    }

    #[test]
    fn negative_override_is_rejected() {
        let mut cfg = RunConfig::default();
        let err = cfg
            .apply_env(env(&[("OFFLINE_THRESHOLD", "-5")]))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfigValue);
        assert!(err.to_string().contains("OFFLINE_THRESHOLD"));
    }

    #[test]
    fn non_numeric_override_is_rejected() {
        let mut cfg = RunConfig::default();
        assert!(cfg.apply_env(env(&[("MAX_LOG_ENTRIES", "lots")])).is_err());
    }

    #[test]
    fn env_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "max_feed_entries = 10\noffline_threshold_minutes = 15\n\n[feed]\nauthor = \"bot\"\n",
        )
        .unwrap();

        let file = load_file_config(dir.path()).unwrap();
        let mut cfg = RunConfig::default();
        cfg.apply_file(&file);
        assert_eq!(cfg.max_feed_entries, 10);
        assert_eq!(cfg.offline_threshold, Duration::minutes(15));
        assert_eq!(cfg.feed.author, "bot");

        cfg.apply_env(env(&[("MAX_FEED_ENTRIES", "5")])).unwrap();
        assert_eq!(cfg.max_feed_entries, 5);
        assert_eq!(cfg.offline_threshold, Duration::minutes(15));
    }

    #[test]
    fn unknown_file_key_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "max_entries = 1\n").unwrap();
        let err = load_file_config(dir.path()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigParseError);
    }

    #[test]
    fn graveyard_section_is_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[graveyard]\nhorizon_days = 30\ntitle = \"Friedhof\"\n",
        )
        .unwrap();
        let cfg = GraveyardConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.horizon, Duration::days(30));
        assert_eq!(cfg.title, "Friedhof");
    }
}
