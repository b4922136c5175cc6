//! The view engine: owns every piece of view state and turns it into frames.
//!
//! Snapshot deltas mutate state synchronously through `apply_*`; the frame
//! callback (`render_frame`) advances interpolation, re-evaluates camera
//! follow and paints. Nothing here awaits except `load_terrain`.

use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::client::events::{EventCollector, EventHandler, OrderEvent, ViewEvent};
use crate::codec::{
    Color, EntityKind, PositionUpdate, TerrainResponse, ThingsDelta, Tier, TieredPositions, WorldPosition,
};
use crate::config::ViewConfig;
use crate::error::Result;
use crate::grid::TerrainGrid;
use crate::state::{BatchReport, EntityReconciler, PortraitCandidate, ReconcilerConfig, ThingStore, ThingsApplied};
use crate::texture::{decode_base64, decode_image, Namespace, TextureCache, TintCache};
use crate::transport::TerrainSource;

use super::camera::Camera2D;
use super::draw::{DrawCommand, DrawLayer, FrameBuilder, FrameStats, Surface};
use super::overlay::{draw_grid, draw_hover, draw_name_labels, draw_status};
use super::sprites::{draw_dots, draw_things};
use super::tilemap::{draw_floors, draw_terrain, TileSpan};

const BACKGROUND: Color = Color::rgb(18, 18, 22);

/// Hover distance (tiles) at which a dot's name is shown
const HOVER_PICK_RADIUS: f64 = 0.75;

/// View lifecycle. `Destroyed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Uninitialized,
    Loading,
    Ready,
    /// Terrain could not be loaded; the view keeps drawing without it
    Error(String),
    Destroyed,
}

impl ViewState {
    pub fn name(&self) -> &'static str {
        match self {
            ViewState::Uninitialized => "uninitialized",
            ViewState::Loading => "loading",
            ViewState::Ready => "ready",
            ViewState::Error(_) => "error",
            ViewState::Destroyed => "destroyed",
        }
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self, ViewState::Destroyed)
    }
}

pub struct ViewEngine {
    config: ViewConfig,
    state: ViewState,
    camera: Camera2D,
    grid: Option<TerrainGrid>,
    reconciler: EntityReconciler,
    things: ThingStore,
    textures: TextureCache,
    tints: TintCache,
    surface: Option<Box<dyn Surface>>,
    hover: Option<WorldPosition>,
    orders: Option<mpsc::UnboundedSender<OrderEvent>>,
    events: EventCollector,
    redraw_pending: bool,
    loop_active: bool,
    frame: u64,
    last_stats: FrameStats,
}

impl ViewEngine {
    pub fn new(config: ViewConfig, textures: TextureCache, surface: Box<dyn Surface>) -> Self {
        let mut camera = Camera2D::new(
            config.initial_tile_size,
            config.min_tile_size,
            config.max_tile_size,
            config.zoom_step,
        );
        let (w, h) = surface.size();
        camera.set_viewport(w, h);
        camera.follow = config.follow_on_start;

        Self {
            reconciler: EntityReconciler::new(ReconcilerConfig::from(&config)),
            tints: TintCache::new(config.tint_cache_capacity),
            config,
            state: ViewState::Uninitialized,
            camera,
            grid: None,
            things: ThingStore::new(),
            textures,
            surface: Some(surface),
            hover: None,
            orders: None,
            events: EventCollector::new(),
            redraw_pending: false,
            loop_active: false,
            frame: 0,
            last_stats: FrameStats::default(),
        }
    }

    /// Forward clicks to an order dispatcher.
    pub fn with_orders(mut self, orders: mpsc::UnboundedSender<OrderEvent>) -> Self {
        self.orders = Some(orders);
        self
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera2D {
        &self.camera
    }

    pub fn grid(&self) -> Option<&TerrainGrid> {
        self.grid.as_ref()
    }

    pub fn reconciler(&self) -> &EntityReconciler {
        &self.reconciler
    }

    pub fn things(&self) -> &ThingStore {
        &self.things
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    pub fn tints(&self) -> &TintCache {
        &self.tints
    }

    pub fn hover(&self) -> Option<WorldPosition> {
        self.hover
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// True once data has been applied and until teardown; the driver runs
    /// the per-frame loop only while this holds.
    pub fn is_loop_active(&self) -> bool {
        self.loop_active
    }

    pub fn needs_redraw(&self) -> bool {
        self.redraw_pending
    }

    /// Fired when background texture loads have finished.
    pub fn texture_signal(&self) -> Arc<Notify> {
        self.textures.redraw_signal()
    }

    pub fn drain_events(&mut self) -> Vec<ViewEvent> {
        self.events.drain()
    }

    fn set_state(&mut self, to: ViewState) {
        if self.state == to || self.state.is_destroyed() {
            return;
        }
        info!(from = self.state.name(), to = to.name(), "view state");
        let from = std::mem::replace(&mut self.state, to.clone());
        self.events.on_event(ViewEvent::StateChanged { from, to });
    }

    fn mark_data_applied(&mut self) {
        if !self.loop_active {
            self.loop_active = true;
            debug!("first data applied, frame loop active");
            self.events.on_event(ViewEvent::FrameLoopStarted);
        }
    }

    /// Enter `Loading`. Returns false once destroyed.
    pub fn begin_terrain_load(&mut self, map_id: &str) -> bool {
        if self.state.is_destroyed() {
            return false;
        }
        debug!(map_id, "loading terrain");
        self.set_state(ViewState::Loading);
        true
    }

    /// Install a fetched grid, or fall into `Error` if the fetch failed.
    pub fn finish_terrain_load(&mut self, map_id: &str, result: Result<TerrainResponse>) {
        if self.state.is_destroyed() {
            return;
        }
        match result {
            Ok(response) => {
                let grid = response.into_grid();
                info!(map_id, width = grid.width, height = grid.height, "terrain loaded");
                self.textures.load_background(Namespace::Terrain, grid.palette_keys());
                if !self.camera.follow || self.reconciler.local_dot().is_none() {
                    self.camera.focus(WorldPosition::new(grid.width as f64 / 2.0, grid.height as f64 / 2.0));
                }
                self.grid = Some(grid);
                self.set_state(ViewState::Ready);
            }
            Err(e) => {
                warn!(map_id, error = %e, "terrain fetch failed");
                self.set_state(ViewState::Error(e.to_string()));
            }
        }
        self.request_redraw();
    }

    /// Fetch terrain through `source` and install it.
    pub async fn load_terrain(&mut self, source: &dyn TerrainSource, map_id: &str) {
        if !self.begin_terrain_load(map_id) {
            return;
        }
        let result = source.fetch_terrain(map_id).await;
        self.finish_terrain_load(map_id, result);
    }

    /// Merge a things delta. Embedded textures go straight into the cache;
    /// every def-name still missing art is queued for background loading,
    /// along with any terrain textures still missing.
    pub fn apply_things(&mut self, delta: &ThingsDelta) -> ThingsApplied {
        if self.state.is_destroyed() {
            return ThingsApplied::default();
        }
        for (def_name, payload) in &delta.textures {
            let seeded = decode_base64(payload)
                .and_then(|bytes| self.textures.insert_encoded(Namespace::Thing, def_name, &bytes));
            if let Err(e) = seeded {
                warn!(def_name = %def_name, error = %e, "bad embedded texture");
            }
        }

        let applied = self.things.apply_delta(delta);
        // Cached, in-flight and permanently missing keys are filtered by the
        // cache, so transient failures get another try on each delta.
        self.textures.load_background(Namespace::Thing, &applied.def_names);
        if let Some(grid) = &self.grid {
            self.textures.load_background(Namespace::Terrain, grid.palette_keys());
        }
        self.mark_data_applied();
        self.request_redraw();
        applied
    }

    /// Reconcile one tier of position records. Slow-tier records carrying a
    /// portrait also feed the portrait matcher.
    pub fn apply_positions(&mut self, tier: Tier, updates: &[PositionUpdate], now: f64) -> BatchReport {
        if self.state.is_destroyed() {
            return BatchReport::default();
        }
        let report = self.reconciler.apply_updates(updates, now);
        if report.expired > 0 {
            self.events.on_event(ViewEvent::DotsExpired { count: report.expired });
        }

        if tier == Tier::Slow && self.reconciler.needs_portraits() {
            let candidates = portrait_candidates(updates);
            if !candidates.is_empty() {
                self.reconciler.match_portraits(&candidates, now);
            }
        }

        let defs: Vec<&str> = updates.iter().filter_map(|u| u.meta.def_name.as_deref()).collect();
        if !defs.is_empty() {
            self.textures.load_background(Namespace::Thing, defs);
        }

        debug!(tier = tier.name(), applied = report.applied(), dots = self.reconciler.len(), "applied positions");
        self.mark_data_applied();
        self.request_redraw();
        report
    }

    /// Apply every tier of a snapshot, slowest first. Returns records applied.
    pub fn apply_tiered(&mut self, positions: &TieredPositions, now: f64) -> usize {
        positions
            .batches()
            .into_iter()
            .map(|(tier, updates)| self.apply_positions(tier, &updates, now).applied())
            .sum()
    }

    /// Schedule a redraw. Returns false if one is already pending, so bursts
    /// of deltas collapse into a single extra frame.
    pub fn request_redraw(&mut self) -> bool {
        if self.state.is_destroyed() || self.redraw_pending {
            return false;
        }
        self.redraw_pending = true;
        true
    }

    fn update_camera(&mut self) {
        if self.camera.follow {
            if let Some(dot) = self.reconciler.local_dot() {
                self.camera.focus(dot.current);
            }
        }
        if let Some(grid) = &self.grid {
            self.camera.clamp_to_map(grid.width as f64, grid.height as f64);
        }
    }

    fn hover_label(&self, hover: WorldPosition) -> Option<String> {
        let dot = self
            .reconciler
            .dots()
            .map(|d| (WorldPosition::new(d.current.x + 0.5, d.current.z + 0.5).distance_to(hover), d))
            .filter(|(dist, _)| *dist <= HOVER_PICK_RADIUS)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, d)| d.name.clone().unwrap_or_else(|| d.entity_id.clone()));
        dot.or_else(|| self.things.thing_at(hover).map(|t| t.def_name.clone()))
    }

    /// Draw one frame at `now` (milliseconds). Returns `None` once destroyed.
    pub fn render_frame(&mut self, now: f64) -> Option<FrameStats> {
        if self.state.is_destroyed() {
            return None;
        }
        self.textures.poll_completed();
        self.reconciler.advance_all(now);
        self.update_camera();

        let transform = self.camera.transform();
        let view = self.camera.visible_rect();
        let mut frame = FrameBuilder::new();
        let mut stats = FrameStats { frame: self.frame + 1, ..FrameStats::default() };

        frame.push(DrawLayer::Background, DrawCommand::Clear(BACKGROUND));

        let span = self
            .grid
            .as_ref()
            .map(|g| TileSpan::visible(view, g.width, g.height));
        if let (Some(grid), Some(span)) = (&self.grid, span) {
            stats.tiles = draw_terrain(&mut frame, grid, span, &transform, &self.textures);
            stats.floors = draw_floors(&mut frame, grid, span, &transform, &self.textures);
        }

        let things = draw_things(
            &mut frame,
            &self.things,
            view,
            self.config.cull_margin,
            &transform,
            &self.textures,
            &mut self.tints,
        );
        stats.things = things.drawn;
        stats.things_culled = things.culled;

        let local = self.reconciler.local_dot().map(|d| d.id);
        stats.dots = draw_dots(&mut frame, self.reconciler.dots(), local, view, &transform, &self.textures);

        if self.config.show_grid {
            if let Some(span) = span {
                draw_grid(&mut frame, span, &transform);
            }
        }

        draw_name_labels(&mut frame, self.reconciler.dots().filter(|d| view.contains(d.current)), &transform);
        if let Some(hover) = self.hover {
            let label = self.hover_label(hover);
            draw_hover(&mut frame, hover, label.as_deref(), &transform);
        }
        match &self.state {
            ViewState::Loading => draw_status(&mut frame, "loading map"),
            ViewState::Error(reason) => draw_status(&mut frame, &format!("map unavailable: {}", reason)),
            _ => {}
        }

        let items = frame.finish();
        stats.commands = items.len();
        if let Some(surface) = self.surface.as_mut() {
            surface.present(&items);
        }

        self.frame += 1;
        self.redraw_pending = false;
        self.last_stats = stats;
        Some(stats)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.state.is_destroyed() {
            return;
        }
        if let Some(surface) = self.surface.as_mut() {
            surface.resize(width, height);
        }
        self.camera.set_viewport(width, height);
        self.request_redraw();
    }

    pub fn pointer_moved(&mut self, x: f64, y: f64) {
        if self.state.is_destroyed() {
            return;
        }
        self.hover = Some(self.camera.screen_to_world(x, y));
        self.request_redraw();
    }

    pub fn pointer_left(&mut self) {
        if self.hover.take().is_some() {
            self.request_redraw();
        }
    }

    /// Turn a click at screen `(x, y)` into an order at the world point.
    pub fn click(&mut self, x: f64, y: f64) -> Option<OrderEvent> {
        if self.state.is_destroyed() {
            return None;
        }
        let order = OrderEvent::from(self.camera.screen_to_world(x, y));
        debug!(x = order.x, z = order.z, "order");
        if let Some(tx) = &self.orders {
            if tx.send(order).is_err() {
                debug!("order receiver gone");
                self.orders = None;
            }
        }
        self.events.on_event(ViewEvent::Order(order));
        Some(order)
    }

    pub fn zoom_by(&mut self, steps: i32) {
        if self.state.is_destroyed() {
            return;
        }
        self.camera.zoom_by(steps);
        self.request_redraw();
    }

    /// Manual pan in screen pixels. Leaves follow mode.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if self.state.is_destroyed() {
            return;
        }
        self.camera.pan(dx, dy);
        self.request_redraw();
    }

    pub fn set_follow(&mut self, follow: bool) {
        self.camera.follow = follow;
        self.request_redraw();
    }

    pub fn set_local_entity(&mut self, entity_id: Option<String>) {
        if self.state.is_destroyed() {
            return;
        }
        self.reconciler.set_local_entity(entity_id);
        self.request_redraw();
    }

    /// Tear down: stop the loop, drop every map and cache and release the
    /// surface. Further input is ignored.
    pub fn destroy(&mut self) {
        if self.state.is_destroyed() {
            return;
        }
        self.set_state(ViewState::Destroyed);
        self.loop_active = false;
        self.redraw_pending = false;
        self.reconciler.clear();
        self.things.clear();
        self.textures.clear();
        self.tints.clear();
        self.grid = None;
        self.hover = None;
        self.orders = None;
        self.surface = None;
        info!(frames = self.frame, "view destroyed");
    }
}

/// Decoded portraits from colonist records that carry one.
fn portrait_candidates(updates: &[PositionUpdate]) -> Vec<PortraitCandidate> {
    updates
        .iter()
        .filter(|u| u.kind != Some(EntityKind::Animal))
        .filter_map(|u| {
            let payload = u.meta.portrait.as_deref()?;
            match decode_base64(payload).and_then(|bytes| decode_image(&bytes)) {
                Ok(portrait) => Some(PortraitCandidate {
                    entity_id: u.entity_id.clone(),
                    position: u.position,
                    portrait,
                    name: u.meta.name.clone(),
                }),
                Err(e) => {
                    debug!(entity = %u.entity_id, error = %e, "bad portrait");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::draw::{DrawItem, DrawList};
    use crate::texture::{test_support, MemoryStore};
    use crate::transport::{StaticTerrainSource, StaticTextureSource};
    use base64::Engine;
    use std::sync::Mutex;

    /// Surface that shares what it records with the test.
    #[derive(Clone, Default)]
    struct SharedList(Arc<Mutex<Vec<DrawItem>>>, Arc<Mutex<(u32, u32)>>);

    impl Surface for SharedList {
        fn size(&self) -> (u32, u32) {
            let size = *self.1.lock().unwrap();
            if size == (0, 0) { (320, 320) } else { size }
        }

        fn resize(&mut self, width: u32, height: u32) {
            *self.1.lock().unwrap() = (width, height);
        }

        fn present(&mut self, items: &[DrawItem]) {
            *self.0.lock().unwrap() = items.to_vec();
        }
    }

    fn engine_with(source: StaticTextureSource) -> ViewEngine {
        let textures = TextureCache::new(Arc::new(source), Arc::new(MemoryStore::new()))
            .with_batching(8, std::time::Duration::ZERO);
        ViewEngine::new(ViewConfig::default(), textures, Box::new(DrawList::new(320, 320)))
    }

    fn engine() -> ViewEngine {
        engine_with(StaticTextureSource::new())
    }

    fn terrain(width: u32, height: u32) -> StaticTerrainSource {
        let json = format!(
            r#"{{"width": {w}, "height": {h}, "palette": ["Soil"], "grid": [[{n}, 0]],
                "floorPalette": ["Wood"], "floorGrid": [[1, 1], [{rest}, 0]]}}"#,
            w = width,
            h = height,
            n = width * height,
            rest = width * height - 1
        );
        StaticTerrainSource::new().with_map("m1", TerrainResponse::from_json(json.as_bytes()).unwrap())
    }

    fn states(engine: &mut ViewEngine) -> Vec<ViewState> {
        engine
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                ViewEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_terrain_lifecycle() {
        let mut view = engine();
        assert_eq!(view.state(), &ViewState::Uninitialized);
        view.load_terrain(&terrain(50, 40), "m1").await;
        assert_eq!(view.state(), &ViewState::Ready);
        assert_eq!(states(&mut view), vec![ViewState::Loading, ViewState::Ready]);
        assert_eq!(view.grid().map(|g| g.floor_key(0, 0)), Some(Some("Wood")));
        assert!(view.needs_redraw());
    }

    #[tokio::test]
    async fn test_terrain_failure_degrades() {
        let mut view = engine();
        view.load_terrain(&StaticTerrainSource::new(), "missing").await;
        assert!(matches!(view.state(), ViewState::Error(_)));

        let surface = SharedList::default();
        let textures = TextureCache::new(Arc::new(StaticTextureSource::new()), Arc::new(MemoryStore::new()));
        let mut view = ViewEngine::new(ViewConfig::default(), textures, Box::new(surface.clone()));
        view.load_terrain(&StaticTerrainSource::new(), "missing").await;
        let stats = view.render_frame(0.0).unwrap();
        assert_eq!(stats.tiles, 0);
        let frame = surface.0.lock().unwrap();
        assert!(frame
            .iter()
            .any(|i| matches!(&i.command, DrawCommand::Label { text, .. } if text.starts_with("map unavailable"))));
    }

    #[tokio::test]
    async fn test_frame_draw_order() {
        let surface = SharedList::default();
        let textures = TextureCache::new(Arc::new(StaticTextureSource::new()), Arc::new(MemoryStore::new()));
        let mut view = ViewEngine::new(ViewConfig::default(), textures, Box::new(surface.clone()));
        view.load_terrain(&terrain(20, 20), "m1").await;

        let delta: ThingsDelta = serde_json::from_value(serde_json::json!({
            "things": [{"id": "t1", "defName": "Table", "position": {"x": 10, "z": 10}}]
        }))
        .unwrap();
        view.apply_things(&delta);
        view.apply_positions(Tier::Ultrafast, &[PositionUpdate::new("p1", 9.0, 9.0).with_name("Ada")], 0.0);
        view.pointer_moved(160.0, 160.0);

        let stats = view.render_frame(0.0).unwrap();
        assert_eq!(stats.tiles, 100);
        assert_eq!(stats.floors, 0);
        assert_eq!(stats.things, 1);
        assert_eq!(stats.dots, 1);

        let frame = surface.0.lock().unwrap();
        assert!(frame.windows(2).all(|w| w[0].layer <= w[1].layer));
        for layer in [DrawLayer::Terrain, DrawLayer::Things, DrawLayer::Dots, DrawLayer::Grid, DrawLayer::Overlay] {
            assert!(frame.iter().any(|i| i.layer == layer), "missing {:?}", layer);
        }
        assert!(!view.needs_redraw());
    }

    #[tokio::test]
    async fn test_camera_follows_and_clamps() {
        let mut view = engine();
        view.load_terrain(&terrain(50, 50), "m1").await;
        view.set_local_entity(Some("me".into()));

        view.apply_positions(Tier::Ultrafast, &[PositionUpdate::new("me", 30.0, 20.0)], 0.0);
        view.render_frame(0.0);
        assert_eq!((view.camera().x, view.camera().z), (30.0, 20.0));

        // 10x10 tile viewport: focus may not pass 45
        view.apply_positions(Tier::Ultrafast, &[PositionUpdate::new("me", 49.0, 49.0)], 1000.0);
        view.render_frame(1000.0);
        assert_eq!((view.camera().x, view.camera().z), (45.0, 45.0));

        view.pan_by(64.0, 0.0);
        assert!(!view.camera().follow);
        view.render_frame(1100.0);
        assert_eq!(view.camera().x, 43.0);
    }

    #[tokio::test]
    async fn test_follow_uses_interpolated_position() {
        let mut view = engine();
        view.load_terrain(&terrain(100, 100), "m1").await;
        view.set_local_entity(Some("me".into()));
        view.apply_positions(Tier::Ultrafast, &[PositionUpdate::new("me", 50.0, 50.0)], 0.0);
        view.apply_positions(Tier::Ultrafast, &[PositionUpdate::new("me", 52.0, 50.0)], 1000.0);
        view.render_frame(1050.0);
        let x = view.camera().x;
        assert!(x > 50.0 && x < 52.0, "camera at {}", x);
    }

    #[tokio::test]
    async fn test_click_emits_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut view = engine().with_orders(tx);
        view.load_terrain(&terrain(50, 50), "m1").await;
        view.set_follow(false);
        view.render_frame(0.0);

        // map centred at (25, 25); screen centre maps there
        let order = view.click(160.0, 160.0).unwrap();
        assert_eq!(order, OrderEvent { x: 25.0, z: 25.0 });
        assert_eq!(rx.try_recv().unwrap(), order);
        assert!(view.drain_events().contains(&ViewEvent::Order(order)));
    }

    #[tokio::test]
    async fn test_redraw_requests_coalesce() {
        let mut view = engine();
        assert!(view.request_redraw());
        assert!(!view.request_redraw());
        view.render_frame(0.0);
        assert!(view.request_redraw());
    }

    #[tokio::test]
    async fn test_loop_starts_on_first_data() {
        let mut view = engine();
        view.load_terrain(&terrain(10, 10), "m1").await;
        assert!(!view.is_loop_active());
        view.apply_positions(Tier::Fast, &[PositionUpdate::new("a", 1.0, 1.0)], 0.0);
        assert!(view.is_loop_active());
        assert!(view.drain_events().contains(&ViewEvent::FrameLoopStarted));
    }

    #[tokio::test]
    async fn test_embedded_textures_skip_fetch() {
        let source = StaticTextureSource::new();
        let mut view = engine_with(source.clone());
        let png = base64::engine::general_purpose::STANDARD.encode(test_support::png(2, 2, [9, 9, 9, 255]));
        let delta: ThingsDelta = serde_json::from_value(serde_json::json!({
            "things": [{"id": "w1", "defName": "Wall", "position": {"x": 1, "z": 1}}],
            "textures": {"Wall": png}
        }))
        .unwrap();
        let applied = view.apply_things(&delta);
        assert_eq!(applied.new_def_names, vec!["Wall".to_string()]);
        assert!(view.textures().peek(Namespace::Thing, "Wall").is_some());
        tokio::task::yield_now().await;
        assert_eq!(source.fetch_count(), 0);
    }

    fn wall_delta() -> ThingsDelta {
        serde_json::from_value(serde_json::json!({
            "things": [{"id": "w1", "defName": "Wall", "position": {"x": 1, "z": 1}}]
        }))
        .unwrap()
    }

    /// Render frames until none of `keys` is in flight.
    async fn settle(view: &mut ViewEngine, keys: &[(Namespace, &str)]) {
        for _ in 0..200 {
            view.render_frame(0.0);
            if keys.iter().all(|(ns, key)| !view.textures().is_in_flight(*ns, key)) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_transient_texture_failure_retried_next_delta() {
        let source = StaticTextureSource::new().missing_status(503);
        let mut view = engine_with(source.clone());
        for round in 1..=3 {
            view.apply_things(&wall_delta());
            settle(&mut view, &[(Namespace::Thing, "Wall")]).await;
            assert_eq!(source.fetch_count(), round);
        }
        assert!(!view.textures().is_failed(Namespace::Thing, "Wall"));

        // a 404 is final
        let source = StaticTextureSource::new();
        let mut view = engine_with(source.clone());
        for _ in 0..3 {
            view.apply_things(&wall_delta());
            settle(&mut view, &[(Namespace::Thing, "Wall")]).await;
        }
        assert_eq!(source.fetch_count(), 1);
        assert!(view.textures().is_failed(Namespace::Thing, "Wall"));
    }

    #[tokio::test]
    async fn test_terrain_textures_retried_next_delta() {
        let source = StaticTextureSource::new().missing_status(503);
        let mut view = engine_with(source.clone());
        let keys = [(Namespace::Terrain, "Soil"), (Namespace::Terrain, "Wood")];

        view.load_terrain(&terrain(10, 10), "m1").await;
        settle(&mut view, &keys).await;
        assert_eq!(source.fetch_count(), 2);

        let empty: ThingsDelta = serde_json::from_value(serde_json::json!({"things": []})).unwrap();
        view.apply_things(&empty);
        settle(&mut view, &keys).await;
        assert_eq!(source.fetch_count(), 4);
    }

    #[test]
    fn test_data_applies_outside_runtime() {
        let source = StaticTextureSource::new().with_texture(Namespace::Thing, "Wall", test_support::png(1, 1, [1, 1, 1, 255]));
        let mut view = engine_with(source.clone());
        let response = tokio_test::block_on(terrain(10, 10).fetch_terrain("m1")).unwrap();

        view.begin_terrain_load("m1");
        view.finish_terrain_load("m1", Ok(response));
        let applied = view.apply_things(&wall_delta());
        assert_eq!(applied.new_def_names, vec!["Wall".to_string()]);
        view.apply_positions(Tier::Fast, &[PositionUpdate::new("p1", 2.0, 2.0)], 0.0);

        assert_eq!(view.state(), &ViewState::Ready);
        assert!(!view.textures().is_in_flight(Namespace::Thing, "Wall"));
        assert_eq!(source.fetch_count(), 0);
        let stats = view.render_frame(0.0).unwrap();
        assert_eq!(stats.things, 1);
        assert_eq!(stats.dots, 1);
    }

    #[tokio::test]
    async fn test_slow_tier_portraits() {
        let mut view = engine();
        view.apply_positions(Tier::Ultrafast, &[PositionUpdate::new("p1", 10.0, 10.0)], 0.0);

        let png = base64::engine::general_purpose::STANDARD.encode(test_support::png(4, 4, [1, 1, 1, 255]));
        let mut slow = PositionUpdate::new("p1", 10.0, 10.0).with_name("Ada");
        slow.meta.portrait = Some(png);
        view.apply_positions(Tier::Slow, &[slow], 10.0);

        let dot = view.reconciler().dot_for_entity("p1").unwrap();
        assert!(dot.portrait.is_some());
        assert_eq!(dot.name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_destroy_releases_everything() {
        let mut view = engine();
        view.load_terrain(&terrain(10, 10), "m1").await;
        view.apply_positions(Tier::Ultrafast, &[PositionUpdate::new("a", 1.0, 1.0)], 0.0);
        view.pointer_moved(10.0, 10.0);
        view.destroy();

        assert_eq!(view.state(), &ViewState::Destroyed);
        assert!(view.reconciler().is_empty());
        assert!(view.things().is_empty());
        assert!(view.textures().is_empty());
        assert!(view.grid().is_none());
        assert!(!view.has_surface());
        assert!(!view.is_loop_active());

        assert!(view.render_frame(1.0).is_none());
        assert!(view.click(1.0, 1.0).is_none());
        assert_eq!(view.apply_positions(Tier::Fast, &[PositionUpdate::new("b", 1.0, 1.0)], 2.0).applied(), 0);
        assert!(view.reconciler().is_empty());
        assert!(!view.request_redraw());

        // terminal: a late terrain result changes nothing
        view.finish_terrain_load("m1", Err(crate::error::Error::Destroyed));
        assert_eq!(view.state(), &ViewState::Destroyed);
    }

    #[tokio::test]
    async fn test_resize_updates_viewport() {
        let mut view = engine();
        view.resize(640, 320);
        assert_eq!(view.camera().viewport_tiles(), (20.0, 10.0));
        view.zoom_by(8);
        assert_eq!(view.camera().tile_size, 64.0);
        assert_eq!(view.camera().viewport_tiles(), (10.0, 5.0));
    }
}
