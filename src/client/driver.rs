//! Async loop that owns a `ViewEngine` and feeds it.
//!
//! One task, no locks: snapshot messages, the frame interval, coalesced
//! redraw deadlines, texture completions and resizes are all `select!`ed
//! here and applied to the engine in turn.

use std::future::pending;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::client::events::ViewMessage;
use crate::codec::TerrainResponse;
use crate::error::Result;
use crate::renderer::ViewEngine;
use crate::transport::TerrainSource;

type TerrainResult = (String, Result<TerrainResponse>);

pub struct ViewDriver {
    engine: ViewEngine,
    terrain: Arc<dyn TerrainSource>,
    inbox: mpsc::Receiver<ViewMessage>,
    resize: Option<watch::Receiver<(u32, u32)>>,
    started: Instant,
}

impl ViewDriver {
    pub fn new(engine: ViewEngine, terrain: Arc<dyn TerrainSource>, inbox: mpsc::Receiver<ViewMessage>) -> Self {
        Self {
            engine,
            terrain,
            inbox,
            resize: None,
            started: Instant::now(),
        }
    }

    /// Follow surface size changes published on `resize`.
    pub fn with_resize(mut self, resize: watch::Receiver<(u32, u32)>) -> Self {
        self.resize = Some(resize);
        self
    }

    /// Run until `Shutdown` or until every sender is gone, then tear the
    /// engine down and hand it back.
    pub async fn run(self) -> ViewEngine {
        let ViewDriver { mut engine, terrain, mut inbox, mut resize, started } = self;
        let (terrain_tx, mut terrain_rx) = mpsc::unbounded_channel::<TerrainResult>();
        let textures_ready = engine.texture_signal();
        let frame_interval = engine.config().frame_interval();
        let now_ms = || started.elapsed().as_secs_f64() * 1000.0;

        let mut frames: Option<Interval> = None;
        let mut redraw_at: Option<Instant> = None;

        loop {
            if frames.is_none() && engine.is_loop_active() {
                let mut interval = time::interval(frame_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                frames = Some(interval);
                redraw_at = None;
                info!(interval_ms = frame_interval.as_millis() as u64, "frame loop started");
            }
            // Outside the loop at most one extra frame is ever scheduled
            if frames.is_none() && redraw_at.is_none() && engine.needs_redraw() {
                redraw_at = Some(Instant::now() + frame_interval);
            }

            tokio::select! {
                msg = inbox.recv() => match msg {
                    Some(ViewMessage::Shutdown) | None => break,
                    Some(msg) => handle_message(&mut engine, msg, &terrain, &terrain_tx, now_ms()),
                },
                Some((map_id, result)) = terrain_rx.recv() => {
                    engine.finish_terrain_load(&map_id, result);
                }
                _ = next_tick(&mut frames) => {
                    engine.render_frame(now_ms());
                }
                _ = deadline(redraw_at) => {
                    redraw_at = None;
                    engine.render_frame(now_ms());
                }
                _ = textures_ready.notified() => {
                    engine.request_redraw();
                }
                size = next_size(&mut resize) => match size {
                    Some((width, height)) => engine.resize(width, height),
                    None => {
                        debug!("resize source closed");
                        resize = None;
                    }
                },
            }
        }

        drop(resize);
        drop(frames);
        engine.destroy();
        engine
    }
}

fn handle_message(
    engine: &mut ViewEngine,
    msg: ViewMessage,
    terrain: &Arc<dyn TerrainSource>,
    terrain_tx: &mpsc::UnboundedSender<TerrainResult>,
    now: f64,
) {
    match msg {
        ViewMessage::LoadTerrain { map_id } => {
            if engine.begin_terrain_load(&map_id) {
                let fetch = terrain.fetch_terrain(&map_id);
                let tx = terrain_tx.clone();
                tokio::spawn(async move {
                    let result = fetch.await;
                    let _ = tx.send((map_id, result));
                });
            }
        }
        ViewMessage::TerrainLoaded { map_id, result } => engine.finish_terrain_load(&map_id, result),
        ViewMessage::Things(delta) => {
            engine.apply_things(&delta);
        }
        ViewMessage::Positions { tier, updates } => {
            engine.apply_positions(tier, &updates, now);
        }
        ViewMessage::Tiered(positions) => {
            engine.apply_tiered(&positions, now);
        }
        ViewMessage::Pointer { x, y } => engine.pointer_moved(x, y),
        ViewMessage::Click { x, y } => {
            engine.click(x, y);
        }
        ViewMessage::Zoom(steps) => engine.zoom_by(steps),
        ViewMessage::Pan { dx, dy } => engine.pan_by(dx, dy),
        ViewMessage::Follow(follow) => engine.set_follow(follow),
        ViewMessage::LocalEntity(entity_id) => engine.set_local_entity(entity_id),
        ViewMessage::Stats(reply) => {
            let _ = reply.send(engine.last_stats());
        }
        ViewMessage::Shutdown => {}
    }
}

async fn next_tick(frames: &mut Option<Interval>) {
    match frames {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => pending().await,
    }
}

/// Next published size; `None` once the publisher is gone.
async fn next_size(resize: &mut Option<watch::Receiver<(u32, u32)>>) -> Option<(u32, u32)> {
    let rx = match resize {
        Some(rx) => rx,
        None => return pending().await,
    };
    match rx.changed().await {
        Ok(()) => Some(*rx.borrow_and_update()),
        Err(_) => None,
    }
}
