//! View configuration.

use std::time::Duration;

use crate::entity::LngLat;
use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::sink::SinkMode;
use crate::surface::{ClusterOptions, SurfaceOptions};

/// Default map style document.
pub const DEFAULT_STYLE_URL: &str = "https://demotiles.maplibre.org/style.json";

/// Default camera center (downtown San Diego).
pub const DEFAULT_CENTER: LngLat = LngLat {
    lon: -117.1611,
    lat: 32.7157,
};

/// Default zoom level.
pub const DEFAULT_ZOOM: f64 = 13.0;

/// Settings of one mounted view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    /// Map style document URL.
    pub style: String,
    /// Initial camera center.
    pub center: LngLat,
    /// Initial zoom.
    pub zoom: f64,
    /// Time between retrievals.
    pub poll_interval: Duration,
    /// Markers or clustered layer.
    pub mode: SinkMode,
    /// Clustering parameters (clustered mode only).
    pub cluster: ClusterOptions,
    /// Show zoom/rotation controls.
    pub navigation_control: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            style: DEFAULT_STYLE_URL.to_string(),
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            poll_interval: DEFAULT_POLL_INTERVAL,
            mode: SinkMode::default(),
            cluster: ClusterOptions::default(),
            navigation_control: true,
        }
    }
}

impl ViewConfig {
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_center(mut self, center: LngLat) -> Self {
        self.center = center;
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_mode(mut self, mode: SinkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cluster(mut self, cluster: ClusterOptions) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn with_navigation_control(mut self, enabled: bool) -> Self {
        self.navigation_control = enabled;
        self
    }

    /// Construction parameters for the rendering surface.
    pub fn surface_options(&self) -> SurfaceOptions {
        SurfaceOptions {
            style: self.style.clone(),
            center: self.center,
            zoom: self.zoom,
            navigation_control: self.navigation_control,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ViewConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(10_000));
        assert_eq!(config.center, LngLat::new(-117.1611, 32.7157));
        assert_eq!(config.zoom, 13.0);
        assert_eq!(config.mode, SinkMode::Clustered);
        assert_eq!(config.cluster, ClusterOptions { max_zoom: 14, radius: 50 });
    }

    #[test]
    fn test_builders_feed_surface_options() {
        let options = ViewConfig::default()
            .with_style("https://tiles.example/style.json")
            .with_zoom(10.0)
            .with_navigation_control(false)
            .surface_options();

        assert_eq!(options.style, "https://tiles.example/style.json");
        assert_eq!(options.zoom, 10.0);
        assert!(!options.navigation_control);
    }
}
