//! Colony View
//!
//! Turns an asynchronous, multi-rate stream of partial colony snapshots into
//! a stable, smoothly animated top-down map: terrain and floors, static
//! things, and tracked colonists/animals ("dots") with camera follow.

pub mod codec;
pub mod config;
pub mod error;
pub mod state;
pub mod texture;
pub mod transport;
pub mod renderer;
pub mod client;
pub use colony_grid as grid;

pub use error::{Error, Result};
pub use config::ViewConfig;
pub use codec::{
    WorldPosition, TilePosition, WorldRect, Color, Facing,
    TerrainResponse, ThingsDelta, PositionUpdate, Tier, TieredPositions,
};
pub use state::{EntityReconciler, Dot, DotId, ThingStore};
pub use texture::{TextureCache, TintCache, Namespace, ImageHandle};
pub use transport::{TerrainSource, TextureSource};
pub use renderer::{ViewEngine, ViewState, Surface, DrawList, FrameStats};
pub use client::{ViewBuilder, ViewHandle, ViewDriver, ViewMessage, OrderEvent};
