pub mod dot;
pub mod spatial;
pub mod reconciler;
pub mod things;

pub use dot::{Dot, DotId, ease_out};
pub use spatial::{SpatialHash, CellKey};
pub use reconciler::{
    EntityReconciler, ReconcilerConfig, BatchReport, PortraitCandidate,
};
pub use things::{Thing, ThingStore, ThingsApplied};
