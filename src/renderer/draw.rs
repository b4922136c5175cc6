use std::fmt;

use crate::codec::Color;
use crate::texture::ImageHandle;

/// Paint order. Items within one frame never go backwards in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DrawLayer {
    Background,
    Terrain,
    Floor,
    Things,
    Dots,
    Grid,
    Overlay,
}

/// Backend-agnostic display list entry. Coordinates are screen pixels.
#[derive(Clone)]
pub enum DrawCommand {
    Clear(Color),
    Image { image: ImageHandle, x: f32, y: f32, w: f32, h: f32, rotation: u8 },
    Rect { x: f32, y: f32, w: f32, h: f32, color: Color },
    Circle { cx: f32, cy: f32, radius: f32, color: Color },
    /// Image clipped to a circle
    Portrait { image: ImageHandle, cx: f32, cy: f32, radius: f32 },
    Ring { cx: f32, cy: f32, radius: f32, width: f32, color: Color },
    Line { x0: f32, y0: f32, x1: f32, y1: f32, color: Color },
    Label { x: f32, y: f32, text: String, color: Color },
}

impl fmt::Debug for DrawCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawCommand::Clear(c) => write!(f, "Clear({:?})", c),
            DrawCommand::Image { image, x, y, w, h, rotation } => write!(
                f,
                "Image({}x{} @ {},{} {}x{} r{})",
                image.width(),
                image.height(),
                x,
                y,
                w,
                h,
                rotation
            ),
            DrawCommand::Rect { x, y, w, h, color } => write!(f, "Rect({},{} {}x{} {:?})", x, y, w, h, color),
            DrawCommand::Circle { cx, cy, radius, color } => write!(f, "Circle({},{} r{} {:?})", cx, cy, radius, color),
            DrawCommand::Portrait { cx, cy, radius, .. } => write!(f, "Portrait({},{} r{})", cx, cy, radius),
            DrawCommand::Ring { cx, cy, radius, .. } => write!(f, "Ring({},{} r{})", cx, cy, radius),
            DrawCommand::Line { x0, y0, x1, y1, .. } => write!(f, "Line({},{} -> {},{})", x0, y0, x1, y1),
            DrawCommand::Label { x, y, text, .. } => write!(f, "Label({:?} @ {},{})", text, x, y),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DrawItem {
    pub layer: DrawLayer,
    pub command: DrawCommand,
}

/// Per-frame counters returned by `ViewEngine::render_frame`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub tiles: usize,
    pub floors: usize,
    pub things: usize,
    pub things_culled: usize,
    pub dots: usize,
    pub commands: usize,
}

/// Something that can show a finished display list.
pub trait Surface: Send {
    fn size(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32);
    fn present(&mut self, items: &[DrawItem]);
}

/// A surface that only records what it was asked to draw.
#[derive(Debug)]
pub struct DrawList {
    width: u32,
    height: u32,
    last: Vec<DrawItem>,
    presented: u64,
}

impl DrawList {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, last: Vec::new(), presented: 0 }
    }

    pub fn last_frame(&self) -> &[DrawItem] {
        &self.last
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn count(&self, layer: DrawLayer) -> usize {
        self.last.iter().filter(|i| i.layer == layer).count()
    }
}

impl Surface for DrawList {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn present(&mut self, items: &[DrawItem]) {
        self.last = items.to_vec();
        self.presented += 1;
    }
}

/// Frame under construction.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    items: Vec<DrawItem>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: DrawLayer, command: DrawCommand) {
        debug_assert!(self.items.last().map_or(true, |l| l.layer <= layer), "draw order regressed");
        self.items.push(DrawItem { layer, command });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn finish(self) -> Vec<DrawItem> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_list_records_last_frame() {
        let mut list = DrawList::new(100, 50);
        let mut frame = FrameBuilder::new();
        frame.push(DrawLayer::Background, DrawCommand::Clear(Color::rgb(0, 0, 0)));
        frame.push(DrawLayer::Dots, DrawCommand::Circle { cx: 1.0, cy: 2.0, radius: 3.0, color: Color::rgb(1, 2, 3) });
        list.present(&frame.finish());
        assert_eq!(list.presented(), 1);
        assert_eq!(list.count(DrawLayer::Dots), 1);
        assert_eq!(list.last_frame().len(), 2);

        list.resize(10, 20);
        assert_eq!(list.size(), (10, 20));
    }

    #[test]
    fn test_layers_are_ordered() {
        assert!(DrawLayer::Terrain < DrawLayer::Floor);
        assert!(DrawLayer::Floor < DrawLayer::Things);
        assert!(DrawLayer::Things < DrawLayer::Dots);
        assert!(DrawLayer::Dots < DrawLayer::Grid);
        assert!(DrawLayer::Grid < DrawLayer::Overlay);
    }
}
