//! Configuration file model, loading and saving.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use super::ConfigKey;
use crate::entity::LngLat;
use crate::feed::{FeedSource, DEFAULT_FEED_URL, DEFAULT_TIMEOUT};
use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::sink::SinkMode;
use crate::surface::ClusterOptions;
use crate::view::{ViewConfig, DEFAULT_CENTER, DEFAULT_STYLE_URL, DEFAULT_ZOOM};

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

const CONFIG_DIR_NAME: &str = ".transithq";
const LOG_FILE_NAME: &str = "transithq.log";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("Config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not valid INI.
    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// No such `section.key`.
    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    /// A value was rejected.
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// `[feed]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    /// Positions endpoint.
    pub url: String,
    /// Local JSON file used instead of `url` when set.
    pub file: Option<PathBuf>,
    /// Time between retrievals.
    pub interval: Duration,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            file: None,
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// `[map]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSettings {
    pub style: String,
    pub center: LngLat,
    pub zoom: f64,
    pub mode: SinkMode,
    pub cluster: ClusterOptions,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            style: DEFAULT_STYLE_URL.to_string(),
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            mode: SinkMode::default(),
            cluster: ClusterOptions::default(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Default filter level (`RUST_LOG` overrides it).
    pub level: String,
    /// Log file path.
    pub file: PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: config_directory().join(LOG_FILE_NAME),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub feed: FeedSettings,
    pub map: MapSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Load from the default location, falling back to defaults if the file
    /// does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(e) => ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }

        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories as needed.
    ///
    /// Unset optional values are omitted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source: io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path).map_err(io_error)
    }

    /// Where positions come from.
    pub fn feed_source(&self) -> FeedSource {
        match &self.feed.file {
            Some(path) => FeedSource::file(path.clone()),
            None => FeedSource::Http {
                url: self.feed.url.clone(),
                timeout: self.feed.timeout,
            },
        }
    }

    /// View settings.
    pub fn view_config(&self) -> ViewConfig {
        ViewConfig::default()
            .with_style(self.map.style.clone())
            .with_center(self.map.center)
            .with_zoom(self.map.zoom)
            .with_poll_interval(self.feed.interval)
            .with_mode(self.map.mode)
            .with_cluster(self.map.cluster)
    }
}

/// Directory holding the config and log files (`~/.transithq`).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Expand a leading `~/` to the home directory.
pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ConfigFile::default();
        assert_eq!(config.feed.url, "http://localhost:8000/api/vehicles");
        assert_eq!(config.feed.interval, Duration::from_secs(10));
        assert_eq!(config.map.mode, SinkMode::Clustered);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.feed_source(), FeedSource::http(DEFAULT_FEED_URL));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = ConfigFile::default();
        config.feed.url = "https://transit.example/api/vehicles".to_string();
        config.feed.interval = Duration::from_secs(5);
        config.map.mode = SinkMode::Markers;
        config.map.cluster.radius = 80;
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[feed]\nfile = /tmp/vehicles.json\n\n[map]\nzoom = 11").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.map.zoom, 11.0);
        assert_eq!(config.map.style, DEFAULT_STYLE_URL);
        assert_eq!(
            config.feed_source(),
            FeedSource::file("/tmp/vehicles.json")
        );
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[feed]\ninterval_secs = often\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "feed.interval_secs"));
    }

    #[test]
    fn test_view_config_from_file_settings() {
        let mut config = ConfigFile::default();
        config.map.zoom = 9.5;
        config.feed.interval = Duration::from_secs(3);

        let view = config.view_config();
        assert_eq!(view.zoom, 9.5);
        assert_eq!(view.poll_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/var/log/x.log"), PathBuf::from("/var/log/x.log"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/x.log"), home.join("x.log"));
        }
    }
}
