pub mod types;
pub mod snapshot;

pub use types::*;
pub use snapshot::{
    TerrainResponse, ThingsDelta, ThingRecord, FocusZone,
    PositionUpdate, UpdateMeta, EntityKind, Tier, TieredPositions,
    normalize_record,
};
