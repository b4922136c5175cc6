use crate::codec::{Color, WorldPosition, WorldRect};
use crate::grid::TerrainGrid;
use crate::texture::{Namespace, TextureCache};

use super::camera::ViewTransform;
use super::draw::{DrawCommand, DrawLayer, FrameBuilder};

/// Stable placeholder colour for a texture key: a `h * 31 + c` string hash
/// folded into RGB.
pub fn fallback_color(key: &str) -> Color {
    let mut h: u32 = 0;
    for c in key.chars() {
        h = h.wrapping_mul(31).wrapping_add(c as u32);
    }
    let folded = h ^ (h >> 24);
    Color::rgb((folded >> 16) as u8, (folded >> 8) as u8, folded as u8)
}

/// Inclusive-exclusive tile span covered by the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpan {
    pub x0: i64,
    pub x1: i64,
    pub z0: i64,
    pub z1: i64,
}

impl TileSpan {
    /// Tiles touched by `view`, clipped to the grid.
    pub fn visible(view: WorldRect, width: u32, height: u32) -> Self {
        Self {
            x0: (view.min.x.floor() as i64).max(0),
            x1: (view.max.x.ceil() as i64).min(width as i64),
            z0: (view.min.z.floor() as i64).max(0),
            z1: (view.max.z.ceil() as i64).min(height as i64),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.z0 >= self.z1
    }
}

/// Screen rect of tile `(x, z)`; its top edge is `z + 1`.
fn tile_rect(transform: &ViewTransform, x: i64, z: i64) -> (f32, f32, f32) {
    let (sx, sy) = transform.world_to_screen(WorldPosition::new(x as f64, (z + 1) as f64));
    (sx as f32, sy as f32, transform.tile_size as f32)
}

fn push_tile(frame: &mut FrameBuilder, layer: DrawLayer, textures: &TextureCache, ns: Namespace, key: &str, rect: (f32, f32, f32)) {
    let (x, y, size) = rect;
    let command = match textures.peek(ns, key) {
        Some(image) => DrawCommand::Image { image, x, y, w: size, h: size, rotation: 0 },
        None => DrawCommand::Rect { x, y, w: size, h: size, color: fallback_color(key) },
    };
    frame.push(layer, command);
}

/// Terrain pass. Returns tiles drawn.
pub fn draw_terrain(frame: &mut FrameBuilder, grid: &TerrainGrid, span: TileSpan, transform: &ViewTransform, textures: &TextureCache) -> usize {
    let mut drawn = 0;
    for z in (span.z0..span.z1).rev() {
        for x in span.x0..span.x1 {
            if let Some(key) = grid.terrain_key(x, z) {
                push_tile(frame, DrawLayer::Terrain, textures, Namespace::Terrain, key, tile_rect(transform, x, z));
                drawn += 1;
            }
        }
    }
    drawn
}

/// Floor overlay pass; tiles with no floor are skipped. Returns tiles drawn.
pub fn draw_floors(frame: &mut FrameBuilder, grid: &TerrainGrid, span: TileSpan, transform: &ViewTransform, textures: &TextureCache) -> usize {
    let mut drawn = 0;
    for z in (span.z0..span.z1).rev() {
        for x in span.x0..span.x1 {
            if let Some(key) = grid.floor_key(x, z) {
                push_tile(frame, DrawLayer::Floor, textures, Namespace::Terrain, key, tile_rect(transform, x, z));
                drawn += 1;
            }
        }
    }
    drawn
}
