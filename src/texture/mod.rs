//! Texture acquisition: two-tier cache, persistent store and tint compositing.

pub mod cache;
pub mod store;
pub mod tint;

use std::sync::Arc;

use base64::Engine;

pub use cache::{TextureCache, LoadOutcome, LoadResult};
pub use store::{LocalStore, DiskStore, MemoryStore};
pub use tint::{TintCache, tint_image};

/// Shared decoded RGBA bitmap
pub type ImageHandle = Arc<image::RgbaImage>;

/// Texture namespace on the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Terrain,
    Thing,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Terrain => "terrain",
            Namespace::Thing => "thing",
        }
    }

    /// `"namespace:key"`, the key used by every cache tier.
    pub fn cache_key(self, key: &str) -> String {
        format!("{}:{}", self.as_str(), key)
    }
}

/// Decode PNG/JPEG bytes into a shareable RGBA bitmap.
pub fn decode_image(bytes: &[u8]) -> crate::error::Result<ImageHandle> {
    let img = image::load_from_memory(bytes)?;
    Ok(Arc::new(img.to_rgba8()))
}

/// Decode a base64 payload, accepting a `data:...;base64,` prefix.
pub fn decode_base64(payload: &str) -> crate::error::Result<Vec<u8>> {
    let data = match payload.find(";base64,") {
        Some(i) if payload.starts_with("data:") => &payload[i + 8..],
        _ => payload,
    };
    Ok(base64::engine::general_purpose::STANDARD.decode(data.trim())?)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key() {
        assert_eq!(Namespace::Terrain.cache_key("Soil"), "terrain:Soil");
        assert_eq!(Namespace::Thing.cache_key("Wall"), "thing:Wall");
    }

    #[test]
    fn test_decode_image() {
        let img = decode_image(&test_support::png(3, 2, [1, 2, 3, 255])).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert!(decode_image(b"not an image").is_err());
    }

    #[test]
    fn test_decode_base64_data_url() {
        assert_eq!(decode_base64("aGk=").unwrap(), b"hi");
        assert_eq!(decode_base64("data:image/png;base64,aGk=").unwrap(), b"hi");
        assert!(decode_base64("***").is_err());
    }
}
