//! Argument groups shared by several commands.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use transithq::config::ConfigFile;
use transithq::feed::FeedSource;
use transithq::sink::SinkMode;

/// Overrides for where positions come from.
#[derive(Debug, Clone, Default, Args)]
pub struct FeedArgs {
    /// Positions endpoint (overrides feed.url)
    #[arg(long, conflicts_with = "file")]
    pub url: Option<String>,

    /// Read positions from a JSON file instead of HTTP (overrides feed.file)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl FeedArgs {
    /// Command-line overrides first, then the config file.
    pub fn resolve(&self, config: &ConfigFile) -> FeedSource {
        if let Some(path) = &self.file {
            return FeedSource::file(path.clone());
        }
        if let Some(url) = &self.url {
            return FeedSource::Http {
                url: url.clone(),
                timeout: config.feed.timeout,
            };
        }
        config.feed_source()
    }
}

/// How vehicles are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DisplayMode {
    /// One clustered GeoJSON layer
    Clustered,
    /// One marker per vehicle
    Markers,
}

impl From<DisplayMode> for SinkMode {
    fn from(mode: DisplayMode) -> Self {
        match mode {
            DisplayMode::Clustered => SinkMode::Clustered,
            DisplayMode::Markers => SinkMode::Markers,
        }
    }
}
