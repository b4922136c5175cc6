//! Replay a JSON-lines snapshot log through a headless view and print frame
//! statistics.
//!
//! Each line is an object with a log time `t` (ms) and any of:
//! `terrain`, `things`, `positions` (`{ultrafast, fast, slow}`), `local`,
//! `click` (`[x, y]` screen pixels), `zoom` (steps).
//!
//! Run with: cargo run --bin view-replay -- session.jsonl --frame-ms 100

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use colony_view::client::{EventCollector, EventHandler};
use colony_view::codec::{TerrainResponse, ThingsDelta, TieredPositions};
use colony_view::texture::{DiskStore, LocalStore, MemoryStore};
use colony_view::{DrawList, FrameStats, ViewBuilder, ViewConfig, ViewEngine};

/// Frames drawn per log line when catching up across a gap
const MAX_CATCH_UP_FRAMES: u64 = 100;

#[derive(Parser)]
#[command(name = "view-replay")]
#[command(about = "Replay a snapshot log through a headless map view")]
struct Cli {
    /// JSON-lines snapshot log
    log: PathBuf,
    /// JSON config file overriding the defaults
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 800)]
    width: u32,
    #[arg(long, default_value_t = 600)]
    height: u32,
    /// Log-time spacing of rendered frames
    #[arg(long, default_value_t = 100.0)]
    frame_ms: f64,
    /// Entity id of the locally controlled pawn
    #[arg(long)]
    local: Option<String>,
    /// Use the persistent disk texture store instead of memory
    #[arg(long)]
    disk_store: bool,
    /// Only print the summary line
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    t: f64,
    #[serde(default)]
    terrain: Option<TerrainResponse>,
    #[serde(default)]
    things: Option<ThingsDelta>,
    #[serde(default)]
    positions: Option<TieredPositions>,
    #[serde(default)]
    local: Option<String>,
    #[serde(default)]
    click: Option<(f64, f64)>,
    #[serde(default)]
    zoom: Option<i32>,
}

struct Replay {
    engine: ViewEngine,
    events: EventCollector,
    frame_ms: f64,
    /// Log time of the next frame; starts at the first entry
    next_frame: Option<f64>,
    frames: u64,
    quiet: bool,
}

impl Replay {
    /// Render every frame due up to log time `t`. Across a long gap only the
    /// last `MAX_CATCH_UP_FRAMES` frames are drawn.
    fn render_until(&mut self, t: f64) {
        let mut next = self.next_frame.unwrap_or(t);
        let behind = (t - next) / self.frame_ms;
        if behind > MAX_CATCH_UP_FRAMES as f64 {
            let skip = behind.floor() - MAX_CATCH_UP_FRAMES as f64;
            warn!(t, skipped = skip as u64, "long gap in log, skipping frames");
            next += skip * self.frame_ms;
        }

        let mut rendered = 0;
        while next <= t && rendered <= MAX_CATCH_UP_FRAMES {
            if let Some(stats) = self.engine.render_frame(next) {
                self.frames += 1;
                if !self.quiet {
                    print_stats(next, &stats);
                }
            }
            rendered += 1;
            next += self.frame_ms;
        }
        // frame_ms can vanish below f64 precision at huge t
        if next <= t {
            next = t + self.frame_ms;
        }
        self.next_frame = Some(next);
    }

    fn apply(&mut self, line: ReplayLine) {
        self.render_until(line.t);
        if let Some(terrain) = line.terrain {
            self.engine.begin_terrain_load("replay");
            self.engine.finish_terrain_load("replay", Ok(terrain));
        }
        if let Some(id) = line.local {
            self.engine.set_local_entity(Some(id));
        }
        if let Some(things) = line.things {
            self.engine.apply_things(&things);
        }
        if let Some(positions) = line.positions {
            self.engine.apply_tiered(&positions, line.t);
        }
        if let Some((x, y)) = line.click {
            self.engine.click(x, y);
        }
        if let Some(steps) = line.zoom {
            self.engine.zoom_by(steps);
        }
        for event in self.engine.drain_events() {
            self.events.on_event(event);
        }
    }
}

fn print_stats(t: f64, s: &FrameStats) {
    println!(
        "t={:>9.1} frame={:>5} tiles={:>5} floors={:>4} things={:>4} culled={:>4} dots={:>3} cmds={:>5}",
        t, s.frame, s.tiles, s.floors, s.things, s.things_culled, s.dots, s.commands
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ViewConfig::from_json_file(path)?,
        None => ViewConfig::default(),
    };

    let store: Arc<dyn LocalStore> = if cli.disk_store {
        Arc::new(DiskStore::new(config.resolved_store_dir()))
    } else {
        Arc::new(MemoryStore::new())
    };
    let mut builder = ViewBuilder::new(config).store(store);
    let mut engine = builder.build_engine(Box::new(DrawList::new(cli.width, cli.height)));
    if cli.local.is_some() {
        engine.set_local_entity(cli.local.clone());
    }

    let mut replay = Replay {
        engine,
        events: EventCollector::new(),
        frame_ms: cli.frame_ms.max(1.0),
        next_frame: None,
        frames: 0,
        quiet: cli.quiet,
    };

    let file = std::fs::File::open(&cli.log)?;
    let mut skipped = 0usize;
    let mut last_t = 0.0f64;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ReplayLine>(&line) {
            Ok(entry) => {
                last_t = last_t.max(entry.t);
                replay.apply(entry);
            }
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping malformed log line");
                skipped += 1;
            }
        }
    }
    replay.render_until(last_t);

    let dots = replay.engine.reconciler().len();
    let things = replay.engine.things().len();
    let orders = replay.events.orders().count();
    replay.engine.destroy();

    info!(frames = replay.frames, dots, things, orders, skipped, "replay finished");
    println!(
        "frames={} dots={} things={} orders={} skipped_lines={}",
        replay.frames, dots, things, orders, skipped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(frame_ms: f64) -> Replay {
        let engine = ViewBuilder::new(ViewConfig::default())
            .store(Arc::new(MemoryStore::new()))
            .build_engine(Box::new(DrawList::new(64, 64)));
        Replay { engine, events: EventCollector::new(), frame_ms, next_frame: None, frames: 0, quiet: true }
    }

    #[test]
    fn test_frames_follow_log_time() {
        let mut r = replay(100.0);
        r.render_until(0.0);
        r.render_until(250.0);
        assert_eq!(r.frames, 3);
        assert_eq!(r.next_frame, Some(300.0));
    }

    #[test]
    fn test_long_gap_caps_catch_up() {
        let mut r = replay(100.0);
        r.render_until(0.0);
        r.render_until(1e12);
        assert!(r.frames <= MAX_CATCH_UP_FRAMES + 2, "rendered {}", r.frames);
        assert!(r.next_frame.unwrap() > 1e12);

        let before = r.frames;
        r.render_until(1e300);
        assert!(r.frames - before <= MAX_CATCH_UP_FRAMES + 1);
    }
}
