use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// View configuration
///
/// Every field has a default; a JSON config file only needs to name the
/// fields it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewConfig {
    /// Movement larger than this on either axis snaps instead of interpolating
    pub jump_threshold: f64,
    /// Interpolation window for a regular position update
    pub smoothing_ms: f64,
    /// Dots not seen for this long are dropped
    pub stale_timeout_ms: f64,
    /// Search radius for re-homing an orphaned dot to a new entity id
    pub rehome_radius: f64,
    /// Search radius for matching portraits onto dots
    pub portrait_radius: f64,
    /// Spatial hash cell edge, in tiles
    pub cell_size: f64,
    /// Keys fetched concurrently per background batch
    pub texture_batch_size: usize,
    /// Pause between background batches
    pub texture_batch_delay_ms: u64,
    pub tint_cache_capacity: usize,
    pub min_tile_size: f64,
    pub max_tile_size: f64,
    pub zoom_step: f64,
    pub initial_tile_size: f64,
    pub frame_interval_ms: u64,
    /// Extra tiles drawn around the viewport before culling things
    pub cull_margin: f64,
    pub show_grid: bool,
    pub follow_on_start: bool,
    /// Persistent texture store directory; `None` uses the user cache dir
    pub texture_store_dir: Option<PathBuf>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            jump_threshold: 5.0,
            smoothing_ms: 100.0,
            stale_timeout_ms: 60_000.0,
            rehome_radius: 2.0,
            portrait_radius: 5.0,
            cell_size: 2.0,
            texture_batch_size: 8,
            texture_batch_delay_ms: 50,
            tint_cache_capacity: 500,
            min_tile_size: 16.0,
            max_tile_size: 64.0,
            zoom_step: 4.0,
            initial_tile_size: 32.0,
            frame_interval_ms: 16,
            cull_margin: 2.0,
            show_grid: true,
            follow_on_start: true,
            texture_store_dir: None,
        }
    }
}

impl ViewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn smoothing(mut self, ms: f64) -> Self {
        self.smoothing_ms = ms;
        self
    }

    pub fn stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout_ms = timeout.as_secs_f64() * 1000.0;
        self
    }

    pub fn texture_batches(mut self, size: usize, delay: Duration) -> Self {
        self.texture_batch_size = size.max(1);
        self.texture_batch_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn tint_capacity(mut self, capacity: usize) -> Self {
        self.tint_cache_capacity = capacity;
        self
    }

    pub fn texture_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.texture_store_dir = Some(dir.into());
        self
    }

    pub fn show_grid(mut self, show: bool) -> Self {
        self.show_grid = show;
        self
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn texture_batch_delay(&self) -> Duration {
        Duration::from_millis(self.texture_batch_delay_ms)
    }

    /// Resolved persistent store directory.
    pub fn resolved_store_dir(&self) -> PathBuf {
        self.texture_store_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("colony-view")
                .join("textures")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ViewConfig::default();
        assert_eq!(config.jump_threshold, 5.0);
        assert_eq!(config.stale_timeout_ms, 60_000.0);
        assert_eq!(config.texture_batch_size, 8);
        assert_eq!(config.tint_cache_capacity, 500);
        assert_eq!((config.min_tile_size, config.max_tile_size), (16.0, 64.0));
    }

    #[test]
    fn test_partial_json_override() {
        let config = ViewConfig::from_json_str(r#"{ "smoothing_ms": 250.0, "show_grid": false }"#).unwrap();
        assert_eq!(config.smoothing_ms, 250.0);
        assert!(!config.show_grid);
        assert_eq!(config.rehome_radius, 2.0);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(ViewConfig::from_json_str(r#"{ "smoothing": 1 }"#).is_err());
    }

    #[test]
    fn test_builder() {
        let config = ViewConfig::new()
            .stale_timeout(Duration::from_secs(5))
            .texture_batches(0, Duration::from_millis(10))
            .texture_store_dir("/tmp/tex");
        assert_eq!(config.stale_timeout_ms, 5000.0);
        assert_eq!(config.texture_batch_size, 1);
        assert_eq!(config.resolved_store_dir(), PathBuf::from("/tmp/tex"));
    }
}
