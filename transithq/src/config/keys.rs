//! Addressable configuration keys (`section.key`).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::file::expand_tilde;
use super::{ConfigError, ConfigFile};
use crate::sink::SinkMode;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    FeedUrl,
    FeedFile,
    FeedIntervalSecs,
    FeedTimeoutSecs,
    MapStyle,
    MapCenterLon,
    MapCenterLat,
    MapZoom,
    MapMode,
    MapClusterMaxZoom,
    MapClusterRadius,
    LoggingLevel,
    LoggingFile,
}

impl ConfigKey {
    /// Every key, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::FeedUrl,
            ConfigKey::FeedFile,
            ConfigKey::FeedIntervalSecs,
            ConfigKey::FeedTimeoutSecs,
            ConfigKey::MapStyle,
            ConfigKey::MapCenterLon,
            ConfigKey::MapCenterLat,
            ConfigKey::MapZoom,
            ConfigKey::MapMode,
            ConfigKey::MapClusterMaxZoom,
            ConfigKey::MapClusterRadius,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingFile,
        ]
    }

    /// INI section.
    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::FeedUrl
            | ConfigKey::FeedFile
            | ConfigKey::FeedIntervalSecs
            | ConfigKey::FeedTimeoutSecs => "feed",
            ConfigKey::MapStyle
            | ConfigKey::MapCenterLon
            | ConfigKey::MapCenterLat
            | ConfigKey::MapZoom
            | ConfigKey::MapMode
            | ConfigKey::MapClusterMaxZoom
            | ConfigKey::MapClusterRadius => "map",
            ConfigKey::LoggingLevel | ConfigKey::LoggingFile => "logging",
        }
    }

    /// Key within the section.
    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::FeedUrl => "url",
            ConfigKey::FeedFile => "file",
            ConfigKey::FeedIntervalSecs => "interval_secs",
            ConfigKey::FeedTimeoutSecs => "timeout_secs",
            ConfigKey::MapStyle => "style",
            ConfigKey::MapCenterLon => "center_lon",
            ConfigKey::MapCenterLat => "center_lat",
            ConfigKey::MapZoom => "zoom",
            ConfigKey::MapMode => "mode",
            ConfigKey::MapClusterMaxZoom => "cluster_max_zoom",
            ConfigKey::MapClusterRadius => "cluster_radius",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingFile => "file",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::FeedUrl => config.feed.url.clone(),
            ConfigKey::FeedFile => config
                .feed
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            ConfigKey::FeedIntervalSecs => config.feed.interval.as_secs().to_string(),
            ConfigKey::FeedTimeoutSecs => config.feed.timeout.as_secs().to_string(),
            ConfigKey::MapStyle => config.map.style.clone(),
            ConfigKey::MapCenterLon => config.map.center.lon.to_string(),
            ConfigKey::MapCenterLat => config.map.center.lat.to_string(),
            ConfigKey::MapZoom => config.map.zoom.to_string(),
            ConfigKey::MapMode => config.map.mode.to_string(),
            ConfigKey::MapClusterMaxZoom => config.map.cluster.max_zoom.to_string(),
            ConfigKey::MapClusterRadius => config.map.cluster.radius.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingFile => config.logging.file.display().to_string(),
        }
    }

    /// Validate `value` and store it.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::FeedUrl => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(self.invalid(value, "expected an http:// or https:// URL"));
                }
                config.feed.url = value.to_string();
            }
            ConfigKey::FeedFile => {
                config.feed.file = (!value.is_empty()).then(|| expand_tilde(value));
            }
            ConfigKey::FeedIntervalSecs => {
                config.feed.interval = Duration::from_secs(self.parse_positive(value)?);
            }
            ConfigKey::FeedTimeoutSecs => {
                config.feed.timeout = Duration::from_secs(self.parse_positive(value)?);
            }
            ConfigKey::MapStyle => {
                if value.is_empty() {
                    return Err(self.invalid(value, "style URL must not be empty"));
                }
                config.map.style = value.to_string();
            }
            ConfigKey::MapCenterLon => {
                config.map.center.lon = self.parse_in_range(value, -180.0, 180.0)?;
            }
            ConfigKey::MapCenterLat => {
                config.map.center.lat = self.parse_in_range(value, -90.0, 90.0)?;
            }
            ConfigKey::MapZoom => {
                config.map.zoom = self.parse_in_range(value, 0.0, 22.0)?;
            }
            ConfigKey::MapMode => {
                config.map.mode = value
                    .parse::<SinkMode>()
                    .map_err(|reason| self.invalid(value, &reason))?;
            }
            ConfigKey::MapClusterMaxZoom => {
                let zoom: u8 = value
                    .parse()
                    .map_err(|_| self.invalid(value, "expected a zoom level"))?;
                if zoom > 22 {
                    return Err(self.invalid(value, "must be between 0 and 22"));
                }
                config.map.cluster.max_zoom = zoom;
            }
            ConfigKey::MapClusterRadius => {
                config.map.cluster.radius = u32::try_from(self.parse_positive(value)?)
                    .map_err(|_| self.invalid(value, "radius too large"))?;
            }
            ConfigKey::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(self.invalid(value, "expected trace, debug, info, warn or error"));
                }
                config.logging.level = level;
            }
            ConfigKey::LoggingFile => {
                if value.is_empty() {
                    return Err(self.invalid(value, "log file path must not be empty"));
                }
                config.logging.file = expand_tilde(value);
            }
        }
        Ok(())
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn parse_positive(&self, value: &str) -> Result<u64, ConfigError> {
        match value.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(self.invalid(value, "expected a positive whole number")),
        }
    }

    fn parse_in_range(&self, value: &str, min: f64, max: f64) -> Result<f64, ConfigError> {
        match value.parse::<f64>() {
            Ok(n) if (min..=max).contains(&n) => Ok(n),
            _ => Err(self.invalid(value, &format!("expected a number between {} and {}", min, max))),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_every_key_by_name() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
        assert!("feed.nope".parse::<ConfigKey>().is_err());
        assert_eq!("MAP.Zoom".parse::<ConfigKey>().unwrap(), ConfigKey::MapZoom);
    }

    #[test]
    fn test_get_reflects_set() {
        let mut config = ConfigFile::default();
        ConfigKey::MapMode.set(&mut config, "markers").unwrap();
        ConfigKey::FeedIntervalSecs.set(&mut config, "15").unwrap();
        ConfigKey::FeedFile.set(&mut config, "/srv/vehicles.json").unwrap();

        assert_eq!(ConfigKey::MapMode.get(&config), "markers");
        assert_eq!(ConfigKey::FeedIntervalSecs.get(&config), "15");
        assert_eq!(config.feed.file, Some(PathBuf::from("/srv/vehicles.json")));

        ConfigKey::FeedFile.set(&mut config, "").unwrap();
        assert_eq!(ConfigKey::FeedFile.get(&config), "");
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = ConfigFile::default();
        let cases = [
            (ConfigKey::FeedUrl, "ftp://example.com"),
            (ConfigKey::FeedIntervalSecs, "0"),
            (ConfigKey::MapCenterLat, "91"),
            (ConfigKey::MapZoom, "abc"),
            (ConfigKey::MapMode, "heatmap"),
            (ConfigKey::MapClusterMaxZoom, "30"),
            (ConfigKey::LoggingLevel, "loud"),
        ];
        for (key, value) in cases {
            assert!(key.set(&mut config, value).is_err(), "{} = {}", key, value);
        }
        assert_eq!(config, ConfigFile::default(), "rejected values leave config untouched");
    }

    #[test]
    fn test_sections_are_contiguous() {
        let sections: Vec<_> = ConfigKey::all().iter().map(|k| k.section()).collect();
        let mut deduped = sections.clone();
        deduped.dedup();
        assert_eq!(deduped, vec!["feed", "map", "logging"]);
    }
}
