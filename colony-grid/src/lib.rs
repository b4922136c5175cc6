//! Terrain and floor grid decoding
//!
//! Maps arrive as run-length encoded index grids plus palettes of texture
//! keys. This crate expands them into dense per-tile arrays and resolves
//! palette lookups.
//!
//! - `rle` - `(count, value)` run expansion with defensive truncation
//! - `grid` - `TerrainGrid` with terrain and floor layers

pub mod rle;
pub mod grid;

pub use rle::{decode, Run};
pub use grid::{TerrainGrid, Layer, lookup, NO_FLOOR};
