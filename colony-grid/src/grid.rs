//! Dense terrain grid with palette-addressed layers.

use crate::rle::{decode, Run};

/// Floor index meaning "no floor on this tile".
pub const NO_FLOOR: u32 = 0;

/// Which layer of the grid to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Terrain,
    Floor,
}

/// Decoded map grid. Immutable once built; replaced wholesale on refetch.
///
/// Tiles are stored row-major with row 0 at `z = 0`, so the tile at `(x, z)`
/// lives at `z * width + x`.
#[derive(Debug, Clone, Default)]
pub struct TerrainGrid {
    pub width: u32,
    pub height: u32,
    pub terrain_palette: Vec<String>,
    pub floor_palette: Vec<String>,
    terrain_index: Vec<u32>,
    floor_index: Vec<u32>,
}

impl TerrainGrid {
    /// Build a grid from RLE layers. A missing floor layer decodes to all
    /// `NO_FLOOR`.
    pub fn from_runs(
        width: u32,
        height: u32,
        terrain_palette: Vec<String>,
        terrain_runs: &[Run],
        floor_palette: Vec<String>,
        floor_runs: Option<&[Run]>,
    ) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            terrain_palette,
            floor_palette,
            terrain_index: decode(terrain_runs, len),
            floor_index: floor_runs.map(|r| decode(r, len)).unwrap_or_else(|| vec![NO_FLOOR; len]),
        }
    }

    pub fn tile_count(&self) -> usize {
        self.terrain_index.len()
    }

    pub fn contains(&self, x: i64, z: i64) -> bool {
        x >= 0 && z >= 0 && x < self.width as i64 && z < self.height as i64
    }

    fn offset(&self, x: i64, z: i64) -> Option<usize> {
        if !self.contains(x, z) {
            return None;
        }
        Some(z as usize * self.width as usize + x as usize)
    }

    /// Raw palette index of a layer at a tile, `None` outside the grid.
    pub fn index_at(&self, layer: Layer, x: i64, z: i64) -> Option<u32> {
        let offset = self.offset(x, z)?;
        match layer {
            Layer::Terrain => self.terrain_index.get(offset).copied(),
            Layer::Floor => self.floor_index.get(offset).copied(),
        }
    }

    /// Terrain texture key at a tile.
    pub fn terrain_key(&self, x: i64, z: i64) -> Option<&str> {
        let index = self.index_at(Layer::Terrain, x, z)?;
        lookup(index as usize, &self.terrain_palette)
    }

    /// Floor texture key at a tile. Index 0 is "no floor" and index `k`
    /// addresses `floor_palette[k - 1]`.
    pub fn floor_key(&self, x: i64, z: i64) -> Option<&str> {
        let index = self.index_at(Layer::Floor, x, z)?;
        if index == NO_FLOOR {
            return None;
        }
        lookup(index as usize - 1, &self.floor_palette)
    }

    /// Every distinct key referenced by either palette, terrain first.
    pub fn palette_keys(&self) -> impl Iterator<Item = &str> {
        self.terrain_palette.iter().chain(self.floor_palette.iter()).map(|s| s.as_str())
    }
}

/// Palette lookup that yields `None` for out-of-range indices.
pub fn lookup(index: usize, palette: &[String]) -> Option<&str> {
    palette.get(index).map(|s| s.as_str())
}
