use crate::codec::{Color, EntityKind, WorldPosition, WorldRect};
use crate::state::{Dot, DotId, ThingStore};
use crate::texture::{Namespace, TextureCache, TintCache};

use super::camera::ViewTransform;
use super::draw::{DrawCommand, DrawLayer, FrameBuilder};
use super::tilemap::fallback_color;

const COLONIST_COLOR: Color = Color::rgb(70, 160, 255);
const DRAFTED_COLOR: Color = Color::rgb(220, 60, 60);
const ANIMAL_COLOR: Color = Color::rgb(230, 170, 60);
const LOCAL_RING_COLOR: Color = Color::rgb(255, 220, 0);

/// Fraction of a tile covered by a dot's radius
const DOT_RADIUS: f64 = 0.4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThingPass {
    pub drawn: usize,
    pub culled: usize,
}

/// Static things touching `view` widened by `margin` tiles. Footprints are
/// anchored at the thing's position and extend toward increasing x and z.
pub fn draw_things(
    frame: &mut FrameBuilder,
    store: &ThingStore,
    view: WorldRect,
    margin: f64,
    transform: &ViewTransform,
    textures: &TextureCache,
    tints: &mut TintCache,
) -> ThingPass {
    let visible = store.things_in_rect(view.expand(margin));
    let tile = transform.tile_size;
    for thing in &visible {
        let (w, d) = thing.footprint;
        let top_left = WorldPosition::new(thing.position.x, thing.position.z + d as f64);
        let (x, y) = transform.world_to_screen(top_left);
        let (x, y, w, h) = (x as f32, y as f32, (w as f64 * tile) as f32, (d as f64 * tile) as f32);

        let command = match textures.peek(Namespace::Thing, &thing.def_name) {
            Some(image) => {
                let image = match (&thing.color, thing.tint) {
                    (Some(color_key), Some(tint)) => {
                        let source_key = Namespace::Thing.cache_key(&thing.def_name);
                        tints.get_or_tint(&source_key, &image, color_key, tint)
                    }
                    _ => image,
                };
                DrawCommand::Image { image, x, y, w, h, rotation: thing.rotation }
            }
            None => DrawCommand::Rect { x, y, w, h, color: thing.tint.unwrap_or_else(|| fallback_color(&thing.def_name)) },
        };
        frame.push(DrawLayer::Things, command);
    }
    ThingPass {
        drawn: visible.len(),
        culled: store.len() - visible.len(),
    }
}

fn dot_color(dot: &Dot) -> Color {
    match dot.kind {
        EntityKind::Colonist if dot.drafted => DRAFTED_COLOR,
        EntityKind::Colonist => COLONIST_COLOR,
        EntityKind::Animal => ANIMAL_COLOR,
    }
}

/// Screen centre and radius of a dot.
pub fn dot_geometry(dot: &Dot, transform: &ViewTransform) -> (f32, f32, f32) {
    let centre = WorldPosition::new(dot.current.x + 0.5, dot.current.z + 0.5);
    let (cx, cy) = transform.world_to_screen(centre);
    (cx as f32, cy as f32, (transform.tile_size * DOT_RADIUS) as f32)
}

fn push_dot(frame: &mut FrameBuilder, dot: &Dot, transform: &ViewTransform, textures: &TextureCache) {
    let (cx, cy, radius) = dot_geometry(dot, transform);
    if let Some(image) = &dot.portrait {
        frame.push(DrawLayer::Dots, DrawCommand::Portrait { image: image.clone(), cx, cy, radius });
        return;
    }
    let sprite = dot.def_name.as_deref().and_then(|def| textures.peek(Namespace::Thing, def));
    let command = match sprite {
        Some(image) => DrawCommand::Image {
            image,
            x: cx - radius,
            y: cy - radius,
            w: radius * 2.0,
            h: radius * 2.0,
            rotation: dot.facing.quarter_turns(),
        },
        None => DrawCommand::Circle { cx, cy, radius, color: dot_color(dot) },
    };
    frame.push(DrawLayer::Dots, command);
}

/// Dots inside `view`; the local dot is drawn last with a highlight ring.
/// Returns dots drawn.
pub fn draw_dots<'a>(
    frame: &mut FrameBuilder,
    dots: impl Iterator<Item = &'a Dot>,
    local: Option<DotId>,
    view: WorldRect,
    transform: &ViewTransform,
    textures: &TextureCache,
) -> usize {
    let view = view.expand(1.0);
    let mut drawn = 0;
    let mut local_dot = None;
    for dot in dots.filter(|d| view.contains(d.current)) {
        if Some(dot.id) == local {
            local_dot = Some(dot);
            continue;
        }
        push_dot(frame, dot, transform, textures);
        drawn += 1;
    }
    if let Some(dot) = local_dot {
        push_dot(frame, dot, transform, textures);
        let (cx, cy, radius) = dot_geometry(dot, transform);
        frame.push(
            DrawLayer::Dots,
            DrawCommand::Ring { cx, cy, radius: radius + 3.0, width: 2.0, color: LOCAL_RING_COLOR },
        );
        drawn += 1;
    }
    drawn
}
