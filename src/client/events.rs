use tokio::sync::oneshot;

use crate::codec::{ThingsDelta, Tier, TieredPositions, PositionUpdate, TerrainResponse, WorldPosition};
use crate::error::Result;
use crate::renderer::{FrameStats, ViewState};

/// World-coordinate click forwarded to whoever dispatches orders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderEvent {
    pub x: f64,
    pub z: f64,
}

impl From<WorldPosition> for OrderEvent {
    fn from(p: WorldPosition) -> Self {
        Self { x: p.x, z: p.z }
    }
}

/// Events produced by the view
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// Lifecycle transition
    StateChanged {
        from: ViewState,
        to: ViewState,
    },

    /// User clicked the map
    Order(OrderEvent),

    /// Per-frame loop started after the first data arrived
    FrameLoopStarted,

    /// Stale dots dropped by a cleanup pass
    DotsExpired {
        count: usize,
    },
}

/// Inputs accepted by `ViewDriver`
#[derive(Debug)]
pub enum ViewMessage {
    /// Fetch and install terrain for a map
    LoadTerrain {
        map_id: String,
    },

    /// Terrain fetch finished (sent by the driver's own fetch task)
    TerrainLoaded {
        map_id: String,
        result: Result<TerrainResponse>,
    },

    /// Static object delta
    Things(ThingsDelta),

    /// One tier of position records
    Positions {
        tier: Tier,
        updates: Vec<PositionUpdate>,
    },

    /// All tiers from one snapshot
    Tiered(TieredPositions),

    Pointer {
        x: f64,
        y: f64,
    },

    Click {
        x: f64,
        y: f64,
    },

    Zoom(i32),

    Pan {
        dx: f64,
        dy: f64,
    },

    Follow(bool),

    LocalEntity(Option<String>),

    /// Ask for the latest frame statistics
    Stats(oneshot::Sender<FrameStats>),

    /// Tear down and stop the driver
    Shutdown,
}

/// Event handler trait
pub trait EventHandler {
    fn on_event(&mut self, event: ViewEvent);
}

/// Simple event collector
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<ViewEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn drain(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn orders(&self) -> impl Iterator<Item = &OrderEvent> {
        self.events.iter().filter_map(|e| match e {
            ViewEvent::Order(o) => Some(o),
            _ => None,
        })
    }
}

impl EventHandler for EventCollector {
    fn on_event(&mut self, event: ViewEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_filters_orders() {
        let mut c = EventCollector::new();
        c.on_event(ViewEvent::FrameLoopStarted);
        c.on_event(ViewEvent::Order(OrderEvent { x: 1.5, z: 2.0 }));
        assert_eq!(c.len(), 2);
        assert_eq!(c.orders().collect::<Vec<_>>(), vec![&OrderEvent { x: 1.5, z: 2.0 }]);
        assert_eq!(c.drain().len(), 2);
        assert!(c.is_empty());
    }

    #[test]
    fn test_order_from_world() {
        let o: OrderEvent = WorldPosition::new(3.0, 4.0).into();
        assert_eq!(o, OrderEvent { x: 3.0, z: 4.0 });
    }
}
