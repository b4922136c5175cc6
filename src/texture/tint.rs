//! Bounded cache of colour-tinted copies of textures.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::codec::Color;
use crate::texture::ImageHandle;

/// Multiply every pixel's RGB by `color`; alpha is kept.
pub fn tint_image(source: &image::RgbaImage, color: Color) -> image::RgbaImage {
    let mut out = source.clone();
    for px in out.pixels_mut() {
        px[0] = ((px[0] as u16 * color.r as u16) / 255) as u8;
        px[1] = ((px[1] as u16 * color.g as u16) / 255) as u8;
        px[2] = ((px[2] as u16 * color.b as u16) / 255) as u8;
    }
    out
}

/// Pre-composited tints keyed by (source texture key, colour string).
///
/// Insertion ordered: once over capacity the oldest quarter is evicted in
/// one go.
#[derive(Debug)]
pub struct TintCache {
    entries: IndexMap<(String, String), ImageHandle>,
    capacity: usize,
}

impl TintCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, source_key: &str, color: &str) -> bool {
        self.entries.contains_key(&(source_key.to_string(), color.to_string()))
    }

    /// Tinted copy of `source`, compositing and caching it on first use.
    pub fn get_or_tint(&mut self, source_key: &str, source: &ImageHandle, color_key: &str, color: Color) -> ImageHandle {
        let key = (source_key.to_string(), color_key.to_string());
        if let Some(img) = self.entries.get(&key) {
            return img.clone();
        }
        let tinted = Arc::new(tint_image(source, color));
        self.insert(key, tinted.clone());
        tinted
    }

    fn insert(&mut self, key: (String, String), img: ImageHandle) {
        self.entries.insert(key, img);
        if self.entries.len() > self.capacity {
            let evict = (self.capacity / 4).max(1);
            self.entries.drain(..evict);
            trace!(evicted = evict, remaining = self.entries.len(), "tint cache eviction");
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn white() -> ImageHandle {
        Arc::new(RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 128])))
    }

    #[test]
    fn test_tint_multiplies_rgb_keeps_alpha() {
        let out = tint_image(&white(), Color::rgb(255, 128, 0));
        assert_eq!(out.get_pixel(0, 0), &Rgba([255, 128, 0, 128]));
    }

    #[test]
    fn test_hit_returns_same_bitmap() {
        let mut cache = TintCache::new(500);
        let src = white();
        let a = cache.get_or_tint("thing:Chair", &src, "#ff0000", Color::rgb(255, 0, 0));
        let b = cache.get_or_tint("thing:Chair", &src, "#ff0000", Color::rgb(255, 0, 0));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_drops_oldest_quarter() {
        let mut cache = TintCache::new(500);
        let src = Arc::new(RgbaImage::new(1, 1));
        for i in 0..500 {
            cache.get_or_tint(&format!("thing:{}", i), &src, "#ffffff", Color::rgb(255, 255, 255));
        }
        assert_eq!(cache.len(), 500);

        cache.get_or_tint("thing:500", &src, "#ffffff", Color::rgb(255, 255, 255));

        assert!(cache.len() <= 500);
        for i in 0..125 {
            assert!(!cache.contains(&format!("thing:{}", i), "#ffffff"));
        }
        assert!(cache.contains("thing:125", "#ffffff"));
        assert!(cache.contains("thing:500", "#ffffff"));
    }
}
