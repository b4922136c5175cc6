//! Coarse grid-cell index for proximity queries.

use std::hash::Hash;

use ahash::{AHashMap, AHashSet};

use crate::codec::WorldPosition;

/// Cell key: position integer-divided by the cell size.
pub type CellKey = (i64, i64);

/// Spatial hash from cell to the ids whose last known position falls in it.
///
/// Updated incrementally: callers move an id between cells with `update`
/// rather than rebuilding the whole index.
#[derive(Debug, Clone)]
pub struct SpatialHash<K: Eq + Hash + Copy> {
    cell_size: f64,
    cells: AHashMap<CellKey, AHashSet<K>>,
    /// Reverse index so moves and removals don't need the old position
    positions: AHashMap<K, CellKey>,
}

impl<K: Eq + Hash + Copy> SpatialHash<K> {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 1.0 },
            cells: AHashMap::new(),
            positions: AHashMap::new(),
        }
    }

    pub fn cell_key(&self, pos: WorldPosition) -> CellKey {
        (
            (pos.x / self.cell_size).floor() as i64,
            (pos.z / self.cell_size).floor() as i64,
        )
    }

    /// Insert or move `id` to the cell containing `pos`.
    pub fn update(&mut self, id: K, pos: WorldPosition) {
        let key = self.cell_key(pos);
        if let Some(old) = self.positions.insert(id, key) {
            if old == key {
                return;
            }
            self.detach(id, old);
        }
        self.cells.entry(key).or_default().insert(id);
    }

    pub fn remove(&mut self, id: K) -> bool {
        match self.positions.remove(&id) {
            Some(key) => {
                self.detach(id, key);
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, id: K, key: CellKey) {
        if let Some(set) = self.cells.get_mut(&key) {
            set.remove(&id);
            if set.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    pub fn contains(&self, id: K) -> bool {
        self.positions.contains_key(&id)
    }

    /// Ids in every cell overlapping the square of half-width `radius`
    /// around `pos`. Callers filter by exact distance.
    pub fn query(&self, pos: WorldPosition, radius: f64) -> Vec<K> {
        let r = (radius / self.cell_size).ceil() as i64;
        let (cx, cz) = self.cell_key(pos);
        let mut out = Vec::new();
        for ix in (cx - r)..=(cx + r) {
            for iz in (cz - r)..=(cz + r) {
                if let Some(ids) = self.cells.get(&(ix, iz)) {
                    out.extend(ids.iter().copied());
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.positions.clear();
    }
}
