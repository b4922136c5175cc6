use crate::codec::{Color, TilePosition, WorldPosition};
use crate::state::Dot;

use super::camera::ViewTransform;
use super::draw::{DrawCommand, DrawLayer, FrameBuilder};
use super::sprites::dot_geometry;
use super::tilemap::TileSpan;

const GRID_COLOR: Color = Color::new(0, 0, 0, 40);
const HOVER_COLOR: Color = Color::new(255, 255, 255, 60);
const LABEL_COLOR: Color = Color::rgb(255, 255, 255);
const STATUS_COLOR: Color = Color::rgb(255, 120, 120);

/// Tile sizes below this skip per-dot name labels
const LABEL_MIN_TILE: f64 = 24.0;

/// One line per tile edge inside `span`.
pub fn draw_grid(frame: &mut FrameBuilder, span: TileSpan, transform: &ViewTransform) {
    if span.is_empty() {
        return;
    }
    let (_, top) = transform.world_to_screen(WorldPosition::new(0.0, span.z1 as f64));
    let (_, bottom) = transform.world_to_screen(WorldPosition::new(0.0, span.z0 as f64));
    for x in span.x0..=span.x1 {
        let (sx, _) = transform.world_to_screen(WorldPosition::new(x as f64, 0.0));
        frame.push(
            DrawLayer::Grid,
            DrawCommand::Line { x0: sx as f32, y0: top as f32, x1: sx as f32, y1: bottom as f32, color: GRID_COLOR },
        );
    }
    let (left, _) = transform.world_to_screen(WorldPosition::new(span.x0 as f64, 0.0));
    let (right, _) = transform.world_to_screen(WorldPosition::new(span.x1 as f64, 0.0));
    for z in span.z0..=span.z1 {
        let (_, sy) = transform.world_to_screen(WorldPosition::new(0.0, z as f64));
        frame.push(
            DrawLayer::Grid,
            DrawCommand::Line { x0: left as f32, y0: sy as f32, x1: right as f32, y1: sy as f32, color: GRID_COLOR },
        );
    }
}

/// Highlight the hovered tile and label whatever is under it.
pub fn draw_hover(frame: &mut FrameBuilder, hover: WorldPosition, label: Option<&str>, transform: &ViewTransform) {
    let tile = TilePosition::from(hover);
    let (x, y) = transform.world_to_screen(WorldPosition::new(tile.x as f64, (tile.z + 1) as f64));
    let size = transform.tile_size as f32;
    frame.push(
        DrawLayer::Overlay,
        DrawCommand::Rect { x: x as f32, y: y as f32, w: size, h: size, color: HOVER_COLOR },
    );
    if let Some(text) = label {
        frame.push(
            DrawLayer::Overlay,
            DrawCommand::Label { x: x as f32, y: y as f32 - 4.0, text: text.to_string(), color: LABEL_COLOR },
        );
    }
}

/// Name tags under named dots, skipped when zoomed far out.
pub fn draw_name_labels<'a>(frame: &mut FrameBuilder, dots: impl Iterator<Item = &'a Dot>, transform: &ViewTransform) {
    if transform.tile_size < LABEL_MIN_TILE {
        return;
    }
    for dot in dots {
        if let Some(name) = &dot.name {
            let (cx, cy, radius) = dot_geometry(dot, transform);
            frame.push(
                DrawLayer::Overlay,
                DrawCommand::Label { x: cx, y: cy + radius + 10.0, text: name.clone(), color: LABEL_COLOR },
            );
        }
    }
}

/// Degraded-state banner in the top-left corner.
pub fn draw_status(frame: &mut FrameBuilder, text: &str) {
    frame.push(
        DrawLayer::Overlay,
        DrawCommand::Label { x: 8.0, y: 16.0, text: text.to_string(), color: STATUS_COLOR },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::camera::Camera2D;

    #[test]
    fn test_grid_line_count() {
        let mut cam = Camera2D::new(32.0, 16.0, 64.0, 4.0);
        cam.set_viewport(128, 64);
        cam.focus(WorldPosition::new(2.0, 1.0));
        let span = TileSpan { x0: 0, x1: 4, z0: 0, z1: 2 };
        let mut frame = FrameBuilder::new();
        draw_grid(&mut frame, span, &cam.transform());
        assert_eq!(frame.len(), 5 + 3);
    }

    #[test]
    fn test_hover_label() {
        let mut cam = Camera2D::new(32.0, 16.0, 64.0, 4.0);
        cam.set_viewport(128, 64);
        cam.focus(WorldPosition::new(2.0, 1.0));
        let mut frame = FrameBuilder::new();
        draw_hover(&mut frame, WorldPosition::new(1.7, 0.2), Some("Bed"), &cam.transform());
        let items = frame.finish();
        assert!(matches!(items[0].command, DrawCommand::Rect { x, y, .. } if x == 32.0 && y == 32.0));
        assert!(matches!(&items[1].command, DrawCommand::Label { text, .. } if text == "Bed"));
    }

    #[test]
    fn test_labels_hidden_when_zoomed_out() {
        let mut cam = Camera2D::new(16.0, 16.0, 64.0, 4.0);
        cam.set_viewport(128, 64);
        let mut dot = Dot::new(crate::state::DotId(1), "p1".into(), Default::default(), WorldPosition::new(0.0, 0.0), 0.0);
        dot.name = Some("Ada".into());
        let mut frame = FrameBuilder::new();
        draw_name_labels(&mut frame, std::iter::once(&dot), &cam.transform());
        assert!(frame.is_empty());
    }
}
