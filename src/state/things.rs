use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::codec::{Color, ThingRecord, ThingsDelta, TilePosition, WorldPosition, WorldRect};

/// A static object on the map
#[derive(Debug, Clone, PartialEq)]
pub struct Thing {
    pub id: String,
    pub def_name: String,
    pub position: WorldPosition,
    /// Footprint after rotation (wide, deep)
    pub footprint: (u32, u32),
    pub rotation: u8,
    /// Raw colour string, also the tint cache key
    pub color: Option<String>,
    pub tint: Option<Color>,
    has_stable_id: bool,
}

impl Thing {
    pub fn from_record(record: &ThingRecord) -> Self {
        Self {
            id: record.identity(),
            def_name: record.def_name.clone(),
            position: record.position,
            footprint: record.rotated_size(),
            rotation: record.rotation,
            color: record.color.clone(),
            tint: record.color.as_deref().and_then(Color::parse),
            has_stable_id: record.id.is_some(),
        }
    }

    pub fn has_stable_id(&self) -> bool {
        self.has_stable_id
    }

    fn bucket(&self) -> TilePosition {
        TilePosition::from(self.position)
    }
}

/// Summary of one applied delta
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThingsApplied {
    pub upserted: usize,
    pub removed: usize,
    /// Every distinct def-name in the delta, in first-seen order
    pub def_names: Vec<String>,
    /// Def-names never seen before by this store
    pub new_def_names: Vec<String>,
}

/// Id-keyed thing store with a tile-bucket index for id-less entries
#[derive(Debug, Default)]
pub struct ThingStore {
    things: AHashMap<String, Thing>,
    buckets: AHashMap<TilePosition, AHashSet<String>>,
    known_defs: AHashSet<String>,
}

impl ThingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.things.len()
    }

    pub fn is_empty(&self) -> bool {
        self.things.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Thing> {
        self.things.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thing> {
        self.things.values()
    }

    /// Merge a delta. Inside each focus zone the delta is authoritative:
    /// things there that the delta doesn't mention are deleted. Things
    /// outside every zone are left alone.
    pub fn apply_delta(&mut self, delta: &ThingsDelta) -> ThingsApplied {
        let mut applied = ThingsApplied::default();
        let mut seen = AHashSet::new();

        for record in delta.records() {
            let thing = Thing::from_record(&record);
            if !thing.has_stable_id {
                self.replace_duplicate(&thing);
            }
            if !applied.def_names.contains(&thing.def_name) {
                applied.def_names.push(thing.def_name.clone());
            }
            if self.known_defs.insert(thing.def_name.clone()) {
                applied.new_def_names.push(thing.def_name.clone());
            }
            seen.insert(thing.id.clone());
            self.insert(thing);
            applied.upserted += 1;
        }

        if !delta.focus_zones.is_empty() {
            let doomed: Vec<String> = self
                .things
                .values()
                .filter(|t| !seen.contains(&t.id))
                .filter(|t| delta.focus_zones.iter().any(|z| z.contains(t.position)))
                .map(|t| t.id.clone())
                .collect();
            for id in &doomed {
                self.remove(id);
            }
            applied.removed = doomed.len();
        }

        debug!(
            upserted = applied.upserted,
            removed = applied.removed,
            new_defs = applied.new_def_names.len(),
            total = self.things.len(),
            "applied things delta"
        );
        applied
    }

    /// An id-less thing replaces any other id-less thing of the same def in
    /// the same tile bucket.
    fn replace_duplicate(&mut self, thing: &Thing) {
        let Some(bucket) = self.buckets.get(&thing.bucket()) else { return };
        let dupes: Vec<String> = bucket
            .iter()
            .filter(|id| **id != thing.id)
            .filter(|id| self.things.get(*id).is_some_and(|t| t.def_name == thing.def_name))
            .cloned()
            .collect();
        for id in &dupes {
            self.remove(id);
        }
    }

    fn insert(&mut self, thing: Thing) {
        if let Some(old) = self.things.get(&thing.id) {
            let old_bucket = old.bucket();
            let old_stable = old.has_stable_id;
            if !old_stable {
                self.detach_bucket(&thing.id, old_bucket);
            }
        }
        if !thing.has_stable_id {
            self.buckets.entry(thing.bucket()).or_default().insert(thing.id.clone());
        }
        self.things.insert(thing.id.clone(), thing);
    }

    pub fn remove(&mut self, id: &str) -> Option<Thing> {
        let thing = self.things.remove(id)?;
        if !thing.has_stable_id {
            self.detach_bucket(id, thing.bucket());
        }
        Some(thing)
    }

    fn detach_bucket(&mut self, id: &str, bucket: TilePosition) {
        if let Some(set) = self.buckets.get_mut(&bucket) {
            set.remove(id);
            if set.is_empty() {
                self.buckets.remove(&bucket);
            }
        }
    }

    /// Things whose footprint touches `rect`, in draw order (top rows first).
    pub fn things_in_rect(&self, rect: WorldRect) -> Vec<&Thing> {
        let mut out: Vec<&Thing> = self
            .things
            .values()
            .filter(|t| rect.intersects(t.position.x, t.position.z, t.footprint.0 as f64, t.footprint.1 as f64))
            .collect();
        out.sort_by(|a, b| {
            b.position.z
                .total_cmp(&a.position.z)
                .then(a.position.x.total_cmp(&b.position.x))
                .then(a.id.cmp(&b.id))
        });
        out
    }

    /// Thing whose footprint covers `pos`, if any.
    pub fn thing_at(&self, pos: WorldPosition) -> Option<&Thing> {
        self.things.values().find(|t| {
            pos.x >= t.position.x
                && pos.x < t.position.x + t.footprint.0 as f64
                && pos.z >= t.position.z
                && pos.z < t.position.z + t.footprint.1 as f64
        })
    }

    pub fn clear(&mut self) {
        self.things.clear();
        self.buckets.clear();
        self.known_defs.clear();
    }
}
