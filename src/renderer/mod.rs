//! Top-down rendering: camera math, layered draw passes and the engine that
//! owns view state.
//!
//! Frames are backend-agnostic display lists (`DrawItem`) handed to a
//! `Surface`; `DrawList` is the recording surface used headlessly.

pub mod camera;
pub mod draw;
pub mod overlay;
pub mod sprites;
pub mod tilemap;
pub mod view;

pub use camera::{Camera2D, ViewTransform};
pub use draw::{DrawCommand, DrawItem, DrawLayer, DrawList, FrameBuilder, FrameStats, Surface};
pub use tilemap::{fallback_color, TileSpan};
pub use view::{ViewEngine, ViewState};
