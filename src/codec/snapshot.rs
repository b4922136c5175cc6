//! Wire payloads and their normalisation into canonical records.
//!
//! Upstream payloads are loosely typed: the same coordinate shows up under
//! several field names and any field may be missing. Everything is funnelled
//! through the functions here so the rest of the crate only sees
//! `PositionUpdate` and `ThingRecord`.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use colony_grid::{Run, TerrainGrid};

use crate::codec::types::WorldPosition;
use crate::error::Result;

/// Terrain fetch response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainResponse {
    pub width: u32,
    pub height: u32,
    pub palette: Vec<String>,
    pub grid: Vec<Run>,
    #[serde(default, alias = "floor_palette")]
    pub floor_palette: Vec<String>,
    #[serde(default, alias = "floor_grid")]
    pub floor_grid: Option<Vec<Run>>,
}

impl TerrainResponse {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn into_grid(self) -> TerrainGrid {
        TerrainGrid::from_runs(
            self.width,
            self.height,
            self.palette,
            &self.grid,
            self.floor_palette,
            self.floor_grid.as_deref(),
        )
    }
}

/// Area inside which a things delta is authoritative
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FocusZone {
    pub x: f64,
    pub z: f64,
    pub radius: f64,
}

impl FocusZone {
    pub fn contains(&self, pos: WorldPosition) -> bool {
        pos.distance_to(WorldPosition::new(self.x, self.z)) <= self.radius
    }
}

/// Things delta as received. Records stay raw so one bad entry cannot
/// reject the whole delta.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThingsDelta {
    #[serde(default)]
    pub things: Vec<Value>,
    /// def-name -> base64 image
    #[serde(default)]
    pub textures: HashMap<String, String>,
    #[serde(default, alias = "focusZones")]
    pub focus_zones: Vec<FocusZone>,
}

impl ThingsDelta {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Normalised records, skipping malformed entries.
    pub fn records(&self) -> impl Iterator<Item = ThingRecord> + '_ {
        self.things.iter().filter_map(ThingRecord::from_value)
    }
}

/// Canonical static-object record
#[derive(Debug, Clone, PartialEq)]
pub struct ThingRecord {
    pub id: Option<String>,
    pub def_name: String,
    pub position: WorldPosition,
    /// Footprint in tiles (wide, deep) before rotation
    pub size: (u32, u32),
    /// Quarter turns clockwise
    pub rotation: u8,
    pub color: Option<String>,
}

impl ThingRecord {
    pub fn from_value(value: &Value) -> Option<Self> {
        let def_name = str_field(value, &["defName", "def_name", "def"])?.to_string();
        let position = position_of(value)?;

        let size = match first_field(value, &["size"]) {
            Some(s @ Value::Object(_)) => (
                num_field(s, &["x", "width", "w"]).unwrap_or(1.0),
                num_field(s, &["z", "y", "depth", "h"]).unwrap_or(1.0),
            ),
            Some(Value::Array(a)) if a.len() >= 2 => (
                a[0].as_f64().unwrap_or(1.0),
                a[1].as_f64().unwrap_or(1.0),
            ),
            Some(v) => {
                let n = v.as_f64().unwrap_or(1.0);
                (n, n)
            }
            None => (1.0, 1.0),
        };
        let footprint = |v: f64| if v.is_finite() && v >= 1.0 { v.round() as u32 } else { 1 };

        let rotation = num_field(value, &["rotation", "rot"])
            .filter(|r| r.is_finite())
            .map(|r| (r.round() as i64).rem_euclid(4) as u8)
            .unwrap_or(0);

        Some(Self {
            id: id_of(value),
            def_name,
            position,
            size: (footprint(size.0), footprint(size.1)),
            rotation,
            color: str_field(value, &["color", "colour", "stuffColor"]).map(str::to_string),
        })
    }

    /// Stable identity: explicit id, or `defName_x_z`.
    pub fn identity(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}_{}_{}", self.def_name, self.position.x, self.position.z),
        }
    }

    /// Footprint after rotation; odd quarter turns swap width and depth.
    pub fn rotated_size(&self) -> (u32, u32) {
        if self.rotation % 2 == 1 {
            (self.size.1, self.size.0)
        } else {
            self.size
        }
    }
}

/// Update-rate class a position batch arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// ~10Hz, positions only
    Ultrafast,
    /// ~1Hz, vitals and thing deltas
    Fast,
    /// ~0.2Hz, full detail including portraits
    Slow,
}

impl Tier {
    pub fn name(self) -> &'static str {
        match self {
            Tier::Ultrafast => "ultrafast",
            Tier::Fast => "fast",
            Tier::Slow => "slow",
        }
    }
}

/// Kind of tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityKind {
    #[default]
    Colonist,
    Animal,
}

impl EntityKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "colonist" | "pawn" | "humanlike" | "human" => Some(Self::Colonist),
            "animal" => Some(Self::Animal),
            _ => None,
        }
    }
}

/// Optional descriptive fields carried by fast/slow records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateMeta {
    pub name: Option<String>,
    pub def_name: Option<String>,
    pub drafted: Option<bool>,
    /// Base64 portrait image, slow tier only
    pub portrait: Option<String>,
}

/// Canonical position record
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub entity_id: String,
    pub kind: Option<EntityKind>,
    pub position: WorldPosition,
    /// Source ordering key
    pub timestamp: Option<f64>,
    pub meta: UpdateMeta,
}

impl PositionUpdate {
    pub fn new(entity_id: impl Into<String>, x: f64, z: f64) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind: None,
            position: WorldPosition::new(x, z),
            timestamp: None,
            meta: UpdateMeta::default(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = Some(name.into());
        self
    }
}

/// Normalise one raw position/vital record. Records with no id or no finite
/// position yield `None`.
pub fn normalize_record(value: &Value) -> Option<PositionUpdate> {
    let entity_id = id_of(value)?;
    let position = position_of(value)?;

    Some(PositionUpdate {
        entity_id,
        kind: str_field(value, &["type", "kind"]).and_then(EntityKind::parse),
        position,
        timestamp: num_field(value, &["timestamp", "ts", "positionTimestamp", "position_timestamp"])
            .filter(|t| t.is_finite()),
        meta: UpdateMeta {
            name: str_field(value, &["name", "label", "nickname"]).map(str::to_string),
            def_name: str_field(value, &["defName", "def_name", "def"]).map(str::to_string),
            drafted: first_field(value, &["drafted", "isDrafted"]).and_then(Value::as_bool),
            portrait: str_field(value, &["portrait"]).map(str::to_string),
        },
    })
}

/// Per-tier arrays of raw records
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TieredPositions {
    #[serde(default)]
    pub ultrafast: Vec<Value>,
    #[serde(default)]
    pub fast: Vec<Value>,
    #[serde(default)]
    pub slow: Vec<Value>,
}

impl TieredPositions {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Non-empty tiers, slowest first so the freshest data is applied last.
    pub fn batches(&self) -> Vec<(Tier, Vec<PositionUpdate>)> {
        [(Tier::Slow, &self.slow), (Tier::Fast, &self.fast), (Tier::Ultrafast, &self.ultrafast)]
            .into_iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(tier, records)| (tier, records.iter().filter_map(normalize_record).collect()))
            .collect()
    }
}

fn first_field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| value.get(*n)).filter(|v| !v.is_null())
}

fn str_field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a str> {
    first_field(value, names).and_then(Value::as_str)
}

fn num_field(value: &Value, names: &[&str]) -> Option<f64> {
    let v = first_field(value, names)?;
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn id_of(value: &Value) -> Option<String> {
    match first_field(value, &["id", "entityId", "thingId", "pawnId", "thingID"])? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn position_of(value: &Value) -> Option<WorldPosition> {
    let container = first_field(value, &["position", "pos", "Position"]).unwrap_or(value);
    let x = num_field(container, &["x", "X"])?;
    let z = num_field(container, &["z", "Z", "y", "Y"])?;
    Some(WorldPosition::new(x, z)).filter(|p| p.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_spellings() {
        let a = normalize_record(&json!({ "id": "p1", "position": { "x": 1.5, "z": 2.0 }, "timestamp": 1000 })).unwrap();
        let b = normalize_record(&json!({ "pawnId": "p1", "pos": { "x": 1.5, "y": 2.0 }, "ts": 1000 })).unwrap();
        let c = normalize_record(&json!({ "entityId": "p1", "x": "1.5", "z": 2 })).unwrap();

        assert_eq!(a.entity_id, "p1");
        assert_eq!(a.position, WorldPosition::new(1.5, 2.0));
        assert_eq!(a.position, b.position);
        assert_eq!(a.position, c.position);
        assert_eq!(b.timestamp, Some(1000.0));
        assert_eq!(c.timestamp, None);
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        assert!(normalize_record(&json!({ "id": "p1" })).is_none());
        assert!(normalize_record(&json!({ "position": { "x": 1, "z": 1 } })).is_none());
        assert!(normalize_record(&json!({ "id": "p1", "position": { "x": "nope", "z": 1 } })).is_none());
        assert!(normalize_record(&json!("garbage")).is_none());
    }

    #[test]
    fn test_normalize_meta() {
        let u = normalize_record(&json!({
            "id": 42, "x": 0, "z": 0, "type": "Animal", "name": "Muffalo",
            "defName": "Muffalo", "drafted": false
        }))
        .unwrap();
        assert_eq!(u.entity_id, "42");
        assert_eq!(u.kind, Some(EntityKind::Animal));
        assert_eq!(u.meta.name.as_deref(), Some("Muffalo"));
        assert_eq!(u.meta.drafted, Some(false));
    }

    #[test]
    fn test_thing_identity_fallback() {
        let t = ThingRecord::from_value(&json!({ "defName": "Wall", "position": { "x": 3, "z": 4 } })).unwrap();
        assert_eq!(t.identity(), "Wall_3_4");
        assert_eq!(t.size, (1, 1));

        let t = ThingRecord::from_value(&json!({
            "id": "Bed12", "defName": "Bed", "position": { "x": 3, "z": 4 },
            "size": { "x": 1, "z": 2 }, "rotation": 1, "color": "#aa0000"
        }))
        .unwrap();
        assert_eq!(t.identity(), "Bed12");
        assert_eq!(t.rotated_size(), (2, 1));
        assert_eq!(t.color.as_deref(), Some("#aa0000"));
    }

    #[test]
    fn test_things_delta_skips_bad_records() {
        let delta = ThingsDelta::from_json(
            br#"{ "things": [ { "defName": "Wall", "position": { "x": 1, "z": 1 } }, { "id": "x" } ],
                  "focusZones": [ { "x": 0, "z": 0, "radius": 10 } ] }"#,
        )
        .unwrap();
        assert_eq!(delta.records().count(), 1);
        assert_eq!(delta.focus_zones.len(), 1);
    }

    #[test]
    fn test_terrain_response() {
        let resp = TerrainResponse::from_json(
            br#"{ "width": 5, "height": 1, "palette": ["Soil"], "grid": [[5, 0]],
                  "floorPalette": ["A", "B", "C", "D", "E"], "floorGrid": [[3, 0], [2, 5]] }"#,
        )
        .unwrap();
        let grid = resp.into_grid();
        assert_eq!(grid.floor_key(4, 0), Some("E"));
        assert_eq!(grid.floor_key(0, 0), None);
    }

    #[test]
    fn test_tier_batch_order() {
        let tiers = TieredPositions::from_json(
            br#"{ "ultrafast": [ { "id": "a", "x": 1, "z": 1 } ], "slow": [ { "id": "a", "x": 0, "z": 0 }, {} ] }"#,
        )
        .unwrap();
        let batches = tiers.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].0, Tier::Slow);
        assert_eq!(batches[0].1.len(), 1);
        assert_eq!(batches[1].0, Tier::Ultrafast);
    }
}
