//! Seams to the external collaborators that serve terrain and textures.
//!
//! The view never talks HTTP itself; the embedding application supplies
//! implementations of these traits. `StaticTerrainSource` and
//! `StaticTextureSource` serve fixed data and back the tests and the replay
//! tool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture};

use crate::codec::TerrainResponse;
use crate::error::{Error, Result};
use crate::texture::Namespace;

/// Serves decoded terrain for a map/session id
pub trait TerrainSource: Send + Sync {
    fn fetch_terrain(&self, map_id: &str) -> BoxFuture<'static, Result<TerrainResponse>>;
}

/// Serves raw texture bytes.
///
/// A definitive absence (HTTP 404) must be reported as
/// `Error::TextureNotFound`; every other failure is retryable.
pub trait TextureSource: Send + Sync {
    fn fetch_texture(&self, namespace: Namespace, key: &str) -> BoxFuture<'static, Result<Vec<u8>>>;
}

/// Maps an HTTP-style status to the texture result it implies.
pub fn texture_status(namespace: Namespace, key: &str, status: u16, body: Vec<u8>) -> Result<Vec<u8>> {
    match status {
        200..=299 => Ok(body),
        404 => Err(Error::TextureNotFound { key: namespace.cache_key(key) }),
        _ => Err(Error::TextureStatus { key: namespace.cache_key(key), status }),
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticTerrainSource {
    maps: HashMap<String, TerrainResponse>,
}

impl StaticTerrainSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(mut self, map_id: impl Into<String>, terrain: TerrainResponse) -> Self {
        self.maps.insert(map_id.into(), terrain);
        self
    }
}

impl TerrainSource for StaticTerrainSource {
    fn fetch_terrain(&self, map_id: &str) -> BoxFuture<'static, Result<TerrainResponse>> {
        let result = self
            .maps
            .get(map_id)
            .cloned()
            .ok_or(Error::TerrainStatus { status: 404 });
        Box::pin(future::ready(result))
    }
}

/// Fixed texture table. Keys not in the table answer with `missing_status`
/// (404 by default). Counts every fetch so tests can check deduplication.
#[derive(Debug, Clone)]
pub struct StaticTextureSource {
    textures: Arc<HashMap<(Namespace, String), Vec<u8>>>,
    missing_status: u16,
    fetches: Arc<AtomicUsize>,
}

impl Default for StaticTextureSource {
    fn default() -> Self {
        Self {
            textures: Arc::new(HashMap::new()),
            missing_status: 404,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl StaticTextureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_texture(mut self, namespace: Namespace, key: impl Into<String>, bytes: Vec<u8>) -> Self {
        Arc::make_mut(&mut self.textures).insert((namespace, key.into()), bytes);
        self
    }

    pub fn missing_status(mut self, status: u16) -> Self {
        self.missing_status = status;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl TextureSource for StaticTextureSource {
    fn fetch_texture(&self, namespace: Namespace, key: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let result = match self.textures.get(&(namespace, key.to_string())) {
            Some(bytes) => texture_status(namespace, key, 200, bytes.clone()),
            None => texture_status(namespace, key, self.missing_status, Vec::new()),
        };
        Box::pin(future::ready(result))
    }
}
