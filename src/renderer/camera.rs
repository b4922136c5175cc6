use crate::codec::{WorldPosition, WorldRect};

/// Integer tile origin plus the sub-tile pixel offset applied to every
/// drawn tile and sprite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// `floor(view_left)`
    pub origin_x: i64,
    /// `ceil(view_top)`
    pub origin_z: i64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub tile_size: f64,
}

impl ViewTransform {
    pub fn world_to_screen(&self, pos: WorldPosition) -> (f64, f64) {
        (
            (pos.x - self.origin_x as f64) * self.tile_size - self.offset_x,
            (self.origin_z as f64 - pos.z) * self.tile_size - self.offset_y,
        )
    }

    pub fn screen_to_world(&self, sx: f64, sy: f64) -> WorldPosition {
        WorldPosition::new(
            (sx + self.offset_x) / self.tile_size + self.origin_x as f64,
            self.origin_z as f64 - (sy + self.offset_y) / self.tile_size,
        )
    }
}

pub struct Camera2D {
    pub x: f64,
    pub z: f64,
    /// Pixels per tile
    pub tile_size: f64,
    pub follow: bool,
    pub viewport_px: (u32, u32),
    min_tile: f64,
    max_tile: f64,
    zoom_step: f64,
}

impl Camera2D {
    pub fn new(tile_size: f64, min_tile: f64, max_tile: f64, zoom_step: f64) -> Self {
        Self {
            x: 0.0,
            z: 0.0,
            tile_size: tile_size.clamp(min_tile, max_tile),
            follow: true,
            viewport_px: (800, 600),
            min_tile,
            max_tile,
            zoom_step,
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport_px = (width.max(1), height.max(1));
    }

    /// Visible tiles (wide, high), fractional.
    pub fn viewport_tiles(&self) -> (f64, f64) {
        (
            self.viewport_px.0 as f64 / self.tile_size,
            self.viewport_px.1 as f64 / self.tile_size,
        )
    }

    pub fn view_left(&self) -> f64 {
        self.x - self.viewport_tiles().0 / 2.0
    }

    /// z increases up, so the top edge is the larger z.
    pub fn view_top(&self) -> f64 {
        self.z + self.viewport_tiles().1 / 2.0
    }

    pub fn visible_rect(&self) -> WorldRect {
        let (vw, vh) = self.viewport_tiles();
        WorldRect::new(self.view_left(), self.view_top() - vh, self.view_left() + vw, self.view_top())
    }

    pub fn transform(&self) -> ViewTransform {
        let left = self.view_left();
        let top = self.view_top();
        let origin_x = left.floor();
        let origin_z = top.ceil();
        ViewTransform {
            origin_x: origin_x as i64,
            origin_z: origin_z as i64,
            offset_x: (left - origin_x) * self.tile_size,
            offset_y: (origin_z - top) * self.tile_size,
            tile_size: self.tile_size,
        }
    }

    pub fn world_to_screen(&self, pos: WorldPosition) -> (f64, f64) {
        self.transform().world_to_screen(pos)
    }

    pub fn screen_to_world(&self, sx: f64, sy: f64) -> WorldPosition {
        self.transform().screen_to_world(sx, sy)
    }

    pub fn focus(&mut self, pos: WorldPosition) {
        self.x = pos.x;
        self.z = pos.z;
    }

    /// Keep the viewport inside `[0, width] x [0, height]`. On an axis where
    /// the map is smaller than the viewport the map is centred instead.
    pub fn clamp_to_map(&mut self, width: f64, height: f64) {
        let (vw, vh) = self.viewport_tiles();
        self.x = clamp_axis(self.x, vw, width);
        self.z = clamp_axis(self.z, vh, height);
    }

    /// Manual pan in screen pixels; drops out of follow mode.
    pub fn pan(&mut self, dx_px: f64, dy_px: f64) {
        self.follow = false;
        self.x -= dx_px / self.tile_size;
        self.z += dy_px / self.tile_size;
    }

    /// Zoom by discrete steps. Focus is unchanged.
    pub fn zoom_by(&mut self, steps: i32) {
        self.tile_size = (self.tile_size + steps as f64 * self.zoom_step).clamp(self.min_tile, self.max_tile);
    }
}

fn clamp_axis(center: f64, view: f64, extent: f64) -> f64 {
    let half = view / 2.0;
    if extent <= view {
        extent / 2.0
    } else {
        center.clamp(half, extent - half)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(w: u32, h: u32, tile: f64) -> Camera2D {
        let mut cam = Camera2D::new(tile, 16.0, 64.0, 4.0);
        cam.set_viewport(w, h);
        cam
    }

    #[test]
    fn test_view_edges() {
        let mut cam = camera(320, 160, 32.0);
        cam.focus(WorldPosition::new(20.0, 10.0));
        assert_eq!(cam.viewport_tiles(), (10.0, 5.0));
        assert_eq!(cam.view_left(), 15.0);
        assert_eq!(cam.view_top(), 12.5);
    }

    #[test]
    fn test_sub_tile_offset() {
        let mut cam = camera(320, 320, 32.0);
        cam.focus(WorldPosition::new(20.25, 10.0));
        let t = cam.transform();
        assert_eq!(t.origin_x, 15);
        assert_eq!(t.origin_z, 15);
        assert_eq!(t.offset_x, 8.0);
        assert_eq!(t.offset_y, 0.0);

        // the focus point lands in the middle of the screen
        assert_eq!(t.world_to_screen(WorldPosition::new(20.25, 10.0)), (160.0, 160.0));
    }

    #[test]
    fn test_panning_is_continuous() {
        let mut cam = camera(320, 320, 32.0);
        cam.focus(WorldPosition::new(20.0, 10.0));
        let a = cam.world_to_screen(WorldPosition::new(21.0, 10.0));
        cam.focus(WorldPosition::new(20.1, 10.0));
        let b = cam.world_to_screen(WorldPosition::new(21.0, 10.0));
        assert!((a.0 - b.0 - 3.2).abs() < 1e-9);
    }

    #[test]
    fn test_screen_world_inverse() {
        let mut cam = camera(640, 480, 24.0);
        cam.focus(WorldPosition::new(33.3, 71.7));
        let p = WorldPosition::new(30.1, 70.4);
        let (sx, sy) = cam.world_to_screen(p);
        let back = cam.screen_to_world(sx, sy);
        assert!((back.x - p.x).abs() < 1e-9 && (back.z - p.z).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_holds_for_many_targets() {
        for (w, h) in [(50.0, 50.0), (200.0, 30.0), (25.0, 400.0)] {
            for (vpx, vpy, tile) in [(320, 240, 16.0), (640, 480, 32.0), (800, 600, 64.0)] {
                let mut cam = camera(vpx, vpy, tile);
                let (vw, vh) = cam.viewport_tiles();
                if vw > w || vh > h {
                    continue;
                }
                for (tx, tz) in [(-100.0, -100.0), (0.0, 0.0), (w / 2.0, h / 2.0), (w, h), (1e6, -3.0)] {
                    cam.focus(WorldPosition::new(tx, tz));
                    cam.clamp_to_map(w, h);
                    assert!(cam.x >= vw / 2.0 && cam.x <= w - vw / 2.0, "x {} for map {}", cam.x, w);
                    assert!(cam.z >= vh / 2.0 && cam.z <= h - vh / 2.0, "z {} for map {}", cam.z, h);
                }
            }
        }
    }

    #[test]
    fn test_clamp_small_map_centres() {
        let mut cam = camera(640, 640, 32.0);
        cam.focus(WorldPosition::new(100.0, -5.0));
        cam.clamp_to_map(10.0, 8.0);
        assert_eq!((cam.x, cam.z), (5.0, 4.0));
    }

    #[test]
    fn test_zoom_clamped_and_keeps_focus() {
        let mut cam = camera(640, 480, 32.0);
        cam.focus(WorldPosition::new(12.0, 8.0));
        cam.zoom_by(100);
        assert_eq!(cam.tile_size, 64.0);
        cam.zoom_by(-100);
        assert_eq!(cam.tile_size, 16.0);
        assert_eq!(cam.viewport_tiles(), (40.0, 30.0));
        assert_eq!((cam.x, cam.z), (12.0, 8.0));
    }

    #[test]
    fn test_pan_leaves_follow() {
        let mut cam = camera(640, 480, 32.0);
        cam.pan(32.0, 0.0);
        assert!(!cam.follow);
        assert_eq!(cam.x, -1.0);
    }
}
