//! Dot tracking: binds upstream entity ids to on-screen dots.
//!
//! All three indexes (`dots`, `entity_to_dot`, `spatial`) are only written by
//! the private helpers at the bottom of the impl, which keep the id <-> dot
//! mapping a bijection.

use ahash::{AHashMap, AHashSet};
use tracing::{debug, trace};

use crate::codec::{EntityKind, PositionUpdate, WorldPosition};
use crate::config::ViewConfig;
use crate::state::dot::{Dot, DotId};
use crate::state::spatial::SpatialHash;
use crate::texture::ImageHandle;

/// Reconciler tuning, taken from `ViewConfig`
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerConfig {
    pub jump_threshold: f64,
    pub smoothing_ms: f64,
    pub stale_timeout_ms: f64,
    pub rehome_radius: f64,
    pub portrait_radius: f64,
    pub cell_size: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::from(&ViewConfig::default())
    }
}

impl From<&ViewConfig> for ReconcilerConfig {
    fn from(c: &ViewConfig) -> Self {
        Self {
            jump_threshold: c.jump_threshold,
            smoothing_ms: c.smoothing_ms,
            stale_timeout_ms: c.stale_timeout_ms,
            rehome_radius: c.rehome_radius,
            portrait_radius: c.portrait_radius,
            cell_size: c.cell_size,
        }
    }
}

/// What one `apply_batch` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub updated: usize,
    pub snapped: usize,
    pub rehomed: usize,
    pub created: usize,
    pub stale: usize,
    pub skipped: usize,
    pub expired: usize,
}

impl BatchReport {
    pub fn applied(&self) -> usize {
        self.updated + self.rehomed + self.created
    }
}

/// A colonist position carrying a portrait, for `match_portraits`
#[derive(Debug, Clone)]
pub struct PortraitCandidate {
    pub entity_id: String,
    pub position: WorldPosition,
    pub portrait: ImageHandle,
    pub name: Option<String>,
}

pub struct EntityReconciler {
    config: ReconcilerConfig,
    dots: AHashMap<DotId, Dot>,
    entity_to_dot: AHashMap<String, DotId>,
    spatial: SpatialHash<DotId>,
    local_entity: Option<String>,
    next_dot_id: u64,
}

impl EntityReconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            dots: AHashMap::new(),
            entity_to_dot: AHashMap::new(),
            spatial: SpatialHash::new(config.cell_size),
            local_entity: None,
            next_dot_id: 1,
        }
    }

    pub fn set_local_entity(&mut self, entity_id: Option<String>) {
        self.local_entity = entity_id;
    }

    pub fn local_entity(&self) -> Option<&str> {
        self.local_entity.as_deref()
    }

    /// Dot bound to the locally controlled entity
    pub fn local_dot(&self) -> Option<&Dot> {
        let id = self.entity_to_dot.get(self.local_entity.as_deref()?)?;
        self.dots.get(id)
    }

    pub fn dot(&self, id: DotId) -> Option<&Dot> {
        self.dots.get(&id)
    }

    pub fn dot_for_entity(&self, entity_id: &str) -> Option<&Dot> {
        self.dots.get(self.entity_to_dot.get(entity_id)?)
    }

    pub fn dots(&self) -> impl Iterator<Item = &Dot> {
        self.dots.values()
    }

    pub fn len(&self) -> usize {
        self.dots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dots.is_empty()
    }

    pub fn is_bound(&self, entity_id: &str) -> bool {
        self.entity_to_dot.contains_key(entity_id)
    }

    pub fn in_spatial_index(&self, id: DotId) -> bool {
        self.spatial.contains(id)
    }

    /// Apply a batch with its id set derived from the updates themselves.
    pub fn apply_updates(&mut self, updates: &[PositionUpdate], now: f64) -> BatchReport {
        let batch_ids: AHashSet<String> = updates.iter().map(|u| u.entity_id.clone()).collect();
        self.apply_batch(updates, &batch_ids, now)
    }

    /// Reconcile one batch of position updates.
    ///
    /// `batch_ids` is every entity id present in the batch; a dot whose bound
    /// id is missing from it is an orphan for the duration of this call.
    pub fn apply_batch(&mut self, updates: &[PositionUpdate], batch_ids: &AHashSet<String>, now: f64) -> BatchReport {
        let mut report = BatchReport::default();

        for update in updates {
            if update.entity_id.is_empty() || !update.position.is_finite() {
                report.skipped += 1;
                continue;
            }

            if let Some(&dot_id) = self.entity_to_dot.get(&update.entity_id) {
                match self.update_bound(dot_id, update, now) {
                    Some(true) => report.snapped += 1,
                    Some(false) => report.updated += 1,
                    None => report.stale += 1,
                }
                continue;
            }

            if let Some(dot_id) = self.find_orphan(update.position, batch_ids) {
                self.rebind(dot_id, &update.entity_id);
                if let Some(dot) = self.dots.get_mut(&dot_id) {
                    dot.position_timestamp = None;
                }
                self.update_bound(dot_id, update, now);
                report.rehomed += 1;
                continue;
            }

            self.create(update, now);
            report.created += 1;
        }

        report.expired = self.cleanup(now);
        if report.stale > 0 || report.rehomed > 0 || report.expired > 0 {
            debug!(
                applied = report.applied(),
                stale = report.stale,
                rehomed = report.rehomed,
                expired = report.expired,
                dots = self.dots.len(),
                "reconciled batch"
            );
        }
        report
    }

    /// Returns `None` when the update is older than what the dot already
    /// shows, otherwise whether the move snapped.
    fn update_bound(&mut self, dot_id: DotId, update: &PositionUpdate, now: f64) -> Option<bool> {
        let config = self.config;
        let dot = self.dots.get_mut(&dot_id)?;

        if let (Some(incoming), Some(applied)) = (update.timestamp, dot.position_timestamp) {
            if applied > incoming {
                trace!(entity = %update.entity_id, incoming, applied, "dropping stale update");
                return None;
            }
        }

        let current = dot.position_at(now);
        let dx = (update.position.x - current.x).abs();
        let dz = (update.position.z - current.z).abs();
        let snapped = dx > config.jump_threshold || dz > config.jump_threshold;
        if snapped {
            dot.snap_to(update.position, now);
        } else {
            dot.glide_to(update.position, now, config.smoothing_ms);
        }

        dot.last_seen = now;
        if let Some(ts) = update.timestamp {
            if dot.position_timestamp.map_or(true, |prev| ts > prev) {
                dot.position_timestamp = Some(ts);
            }
        }
        dot.apply_meta(update.kind, &update.meta);

        self.spatial.update(dot_id, update.position);
        Some(snapped)
    }

    /// Nearest dot within the re-home radius whose entity is absent from this
    /// batch and which isn't the local user's dot.
    fn find_orphan(&self, pos: WorldPosition, batch_ids: &AHashSet<String>) -> Option<DotId> {
        let radius = self.config.rehome_radius;
        self.spatial
            .query(pos, radius)
            .into_iter()
            .filter_map(|id| self.dots.get(&id))
            .filter(|dot| !batch_ids.contains(&dot.entity_id))
            .filter(|dot| self.local_entity.as_deref() != Some(dot.entity_id.as_str()))
            .map(|dot| (dot.target.distance_to(pos), dot.id))
            .filter(|(dist, _)| *dist <= radius)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, id)| id)
    }

    /// Drop dots not seen within the stale timeout. Returns how many went.
    pub fn cleanup(&mut self, now: f64) -> usize {
        let timeout = self.config.stale_timeout_ms;
        let expired: Vec<DotId> = self
            .dots
            .values()
            .filter(|d| now - d.last_seen > timeout)
            .map(|d| d.id)
            .collect();

        for id in &expired {
            if let Some(dot) = self.remove_dot(*id) {
                debug!(dot = %dot.id, entity = %dot.entity_id, "expired dot");
            }
        }
        expired.len()
    }

    /// True while some colonist dot has no portrait yet. Animals never get
    /// one, so they don't count.
    pub fn needs_portraits(&self) -> bool {
        self.dots.values().any(|d| d.kind == EntityKind::Colonist && d.portrait.is_none())
    }

    /// Greedy nearest-first assignment of portraits onto portrait-less
    /// colonist dots. Returns the number of portraits assigned.
    pub fn match_portraits(&mut self, candidates: &[PortraitCandidate], now: f64) -> usize {
        if !self.needs_portraits() {
            return 0;
        }

        let radius = self.config.portrait_radius;
        let local_dot = self
            .local_entity
            .as_deref()
            .and_then(|e| self.entity_to_dot.get(e))
            .copied();

        let mut pairs: Vec<(f64, DotId, usize)> = Vec::new();
        for dot in self.dots.values().filter(|d| d.portrait.is_none() && d.kind == EntityKind::Colonist) {
            let pos = dot.position_at(now);
            for (ci, candidate) in candidates.iter().enumerate() {
                let dist = pos.distance_to(candidate.position);
                if dist <= radius {
                    pairs.push((dist, dot.id, ci));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut used_dots = AHashSet::new();
        let mut used_candidates = AHashSet::new();
        let mut assigned = 0;

        for (_, dot_id, ci) in pairs {
            if used_dots.contains(&dot_id) || used_candidates.contains(&ci) {
                continue;
            }
            let candidate = &candidates[ci];
            if Some(dot_id) == local_dot && self.local_entity.as_deref() != Some(candidate.entity_id.as_str()) {
                continue;
            }
            let Some(dot) = self.dots.get_mut(&dot_id) else { continue };
            dot.portrait = Some(candidate.portrait.clone());
            if dot.name.is_none() {
                dot.name = candidate.name.clone();
            }
            used_dots.insert(dot_id);
            used_candidates.insert(ci);
            assigned += 1;
        }

        if assigned > 0 {
            debug!(assigned, "matched portraits");
        }
        assigned
    }

    /// Advance every dot's interpolated position to `now`.
    pub fn advance_all(&mut self, now: f64) {
        for dot in self.dots.values_mut() {
            dot.advance(now);
        }
    }

    /// True while any dot is still mid-glide.
    pub fn is_animating(&self, now: f64) -> bool {
        self.dots.values().any(|d| d.is_moving(now))
    }

    pub fn clear(&mut self) {
        for dot in self.dots.values_mut() {
            dot.release();
        }
        self.dots.clear();
        self.entity_to_dot.clear();
        self.spatial.clear();
    }

    fn create(&mut self, update: &PositionUpdate, now: f64) -> DotId {
        let id = DotId(self.next_dot_id);
        self.next_dot_id += 1;

        let mut dot = Dot::new(id, update.entity_id.clone(), update.kind.unwrap_or_default(), update.position, now);
        dot.position_timestamp = update.timestamp;
        dot.apply_meta(update.kind, &update.meta);

        self.entity_to_dot.insert(update.entity_id.clone(), id);
        self.spatial.update(id, update.position);
        self.dots.insert(id, dot);
        trace!(dot = %id, entity = %update.entity_id, "created dot");
        id
    }

    fn rebind(&mut self, dot_id: DotId, entity_id: &str) {
        let Some(dot) = self.dots.get_mut(&dot_id) else { return };
        debug!(dot = %dot_id, from = %dot.entity_id, to = %entity_id, "re-homed orphan dot");
        if self.entity_to_dot.get(&dot.entity_id) == Some(&dot_id) {
            self.entity_to_dot.remove(&dot.entity_id);
        }
        dot.entity_id = entity_id.to_string();
        self.entity_to_dot.insert(entity_id.to_string(), dot_id);
    }

    fn remove_dot(&mut self, id: DotId) -> Option<Dot> {
        let mut dot = self.dots.remove(&id)?;
        if self.entity_to_dot.get(&dot.entity_id) == Some(&id) {
            self.entity_to_dot.remove(&dot.entity_id);
        }
        self.spatial.remove(id);
        dot.release();
        Some(dot)
    }
}
