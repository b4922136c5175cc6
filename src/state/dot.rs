use crate::codec::{EntityKind, Facing, UpdateMeta, WorldPosition};
use crate::texture::ImageHandle;

/// Synthetic dot identifier, never reused while the reconciler lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DotId(pub u64);

impl std::fmt::Display for DotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dot#{}", self.0)
    }
}

/// Ease-out curve `t * (2 - t)` on `[0, 1]`.
pub fn ease_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * (2.0 - t)
}

/// One tracked avatar on screen
#[derive(Debug, Clone)]
pub struct Dot {
    pub id: DotId,
    /// Upstream entity this dot currently represents
    pub entity_id: String,
    pub kind: EntityKind,
    pub name: Option<String>,
    pub def_name: Option<String>,
    pub drafted: bool,
    /// Interpolated position as of the last `advance`
    pub current: WorldPosition,
    pub start: WorldPosition,
    pub target: WorldPosition,
    pub started_at: f64,
    pub duration_ms: f64,
    pub last_seen: f64,
    /// Source-supplied ordering key of the applied position
    pub position_timestamp: Option<f64>,
    pub portrait: Option<ImageHandle>,
    pub facing: Facing,
}

impl Dot {
    pub fn new(id: DotId, entity_id: String, kind: EntityKind, pos: WorldPosition, now: f64) -> Self {
        Self {
            id,
            entity_id,
            kind,
            name: None,
            def_name: None,
            drafted: false,
            current: pos,
            start: pos,
            target: pos,
            started_at: now,
            duration_ms: 0.0,
            last_seen: now,
            position_timestamp: None,
            portrait: None,
            facing: Facing::default(),
        }
    }

    /// Interpolated position at `now`. Exactly `start` at elapsed 0 and
    /// exactly `target` once the window has passed.
    pub fn position_at(&self, now: f64) -> WorldPosition {
        if self.duration_ms <= 0.0 {
            return self.target;
        }
        let elapsed = now - self.started_at;
        if elapsed <= 0.0 {
            return self.start;
        }
        if elapsed >= self.duration_ms {
            return self.target;
        }
        let e = ease_out(elapsed / self.duration_ms);
        WorldPosition::new(
            self.start.x + (self.target.x - self.start.x) * e,
            self.start.z + (self.target.z - self.start.z) * e,
        )
    }

    pub fn advance(&mut self, now: f64) {
        self.current = self.position_at(now);
    }

    pub fn is_moving(&self, now: f64) -> bool {
        self.duration_ms > 0.0 && now - self.started_at < self.duration_ms
    }

    /// Jump straight to `pos` with no interpolation.
    pub fn snap_to(&mut self, pos: WorldPosition, now: f64) {
        self.current = pos;
        self.start = pos;
        self.target = pos;
        self.started_at = now;
        self.duration_ms = 0.0;
    }

    /// Interpolate from the current on-screen position to `pos`.
    pub fn glide_to(&mut self, pos: WorldPosition, now: f64, duration_ms: f64) {
        let from = self.position_at(now);
        if let Some(facing) = Facing::from_delta(pos.x - from.x, pos.z - from.z) {
            self.facing = facing;
        }
        self.current = from;
        self.start = from;
        self.target = pos;
        self.started_at = now;
        self.duration_ms = duration_ms;
    }

    pub fn apply_meta(&mut self, kind: Option<EntityKind>, meta: &UpdateMeta) {
        if let Some(kind) = kind {
            self.kind = kind;
        }
        if let Some(name) = &meta.name {
            self.name = Some(name.clone());
        }
        if let Some(def_name) = &meta.def_name {
            self.def_name = Some(def_name.clone());
        }
        if let Some(drafted) = meta.drafted {
            self.drafted = drafted;
        }
    }

    /// Drop texture references held by this dot.
    pub fn release(&mut self) {
        self.portrait = None;
    }
}
