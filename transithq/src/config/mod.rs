//! Persistent configuration.
//!
//! Settings live in an INI file at `~/.transithq/config.ini`:
//!
//! ```ini
//! [feed]
//! url = http://localhost:8000/api/vehicles
//! interval_secs = 10
//! timeout_secs = 30
//!
//! [map]
//! style = https://demotiles.maplibre.org/style.json
//! center_lon = -117.1611
//! center_lat = 32.7157
//! zoom = 13
//! mode = clustered
//! cluster_max_zoom = 14
//! cluster_radius = 50
//!
//! [logging]
//! level = info
//! file = ~/.transithq/transithq.log
//! ```
//!
//! Missing keys keep their defaults. Every key is addressable as
//! `section.key` through [`ConfigKey`], which is also what the loader uses,
//! so a value accepted by `config set` is exactly a value the file may hold.

mod file;
mod keys;

pub use file::{
    config_directory, config_file_path, ConfigError, ConfigFile, FeedSettings, LoggingSettings,
    MapSettings, CONFIG_FILE_NAME,
};
pub use keys::ConfigKey;
